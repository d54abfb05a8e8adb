// src/routes.rs

use axum::{
    Router,
    extract::DefaultBodyLimit,
    http::{HeaderName, HeaderValue, Method, header},
    middleware,
    routing::{get, post, put},
};
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    services::ServeDir,
    trace::TraceLayer,
};

use crate::{
    config::{ADMIN_KEY_HEADER, MAX_BODY_BYTES, UPLOAD_URL_PREFIX},
    handlers::{admin, submissions, tests},
    state::AppState,
    utils::admin_key::admin_key_middleware,
};

/// Assembles the main application router.
///
/// * Public routes: test selection and submission.
/// * Admin routes behind the shared-secret gate.
/// * Stored image assets served under `/uploads`.
/// * Applies global middleware (Trace, CORS).
pub fn create_router(state: AppState) -> Router {
    let origins: Vec<HeaderValue> = state
        .config
        .cors_origins
        .iter()
        .filter_map(|origin| match origin.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!("Ignoring invalid CORS origin: {}", origin);
                None
            }
        })
        .collect();

    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([
            header::CONTENT_TYPE,
            HeaderName::from_static(ADMIN_KEY_HEADER),
        ]);

    let public_routes = Router::new()
        .route("/tests", get(tests::pick_test))
        .route("/submissions", post(submissions::create_submission));

    let admin_routes = Router::new()
        .route("/tests", get(admin::list_tests).post(admin::upload_test))
        .route(
            "/tests/{id}",
            get(admin::get_test)
                .put(admin::update_test)
                .delete(admin::delete_test),
        )
        .route("/tests/{id}/image", put(admin::replace_test_image))
        .route("/submissions", get(admin::list_submissions))
        .route(
            "/submissions/{id}",
            get(admin::get_submission).delete(admin::delete_submission),
        )
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            admin_key_middleware,
        ));

    let assets = ServeDir::new(state.assets.root());

    Router::new()
        .merge(public_routes)
        .nest("/admin", admin_routes)
        .nest_service(UPLOAD_URL_PREFIX, assets)
        // Global Middleware (applied from outside in)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
