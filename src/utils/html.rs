// src/utils/html.rs

/// Strips markup from admin-entered text such as test titles.
///
/// Titles are rendered by the admin panel and the test-taker page, so tags
/// like <script> or <iframe> and event-handler attributes are removed while
/// harmless inline tags survive.
pub fn clean_html(input: &str) -> String {
    ammonia::clean(input.trim())
}
