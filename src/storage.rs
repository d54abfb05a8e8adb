// src/storage.rs

use std::io;
use std::path::{Component, Path, PathBuf};

use chrono::Utc;

/// Extensions longer than this (dot included) are truncated.
const MAX_EXTENSION_LEN: usize = 6;
const DEFAULT_EXTENSION: &str = ".png";

/// Image assets on the local filesystem, addressed by relative URL.
///
/// A stored file `<root>/<name>` is referenced as `<url_prefix>/<name>`.
#[derive(Debug, Clone)]
pub struct AssetStore {
    root: PathBuf,
    url_prefix: String,
}

impl AssetStore {
    pub fn new(root: impl Into<PathBuf>, url_prefix: &str) -> Self {
        Self {
            root: root.into(),
            url_prefix: url_prefix.trim_end_matches('/').to_string(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Writes `bytes` under a fresh name and returns its URL.
    pub async fn save(&self, original_name: Option<&str>, bytes: &[u8]) -> io::Result<String> {
        tokio::fs::create_dir_all(&self.root).await?;

        let file_name = generate_file_name(original_name);
        tokio::fs::write(self.root.join(&file_name), bytes).await?;

        tracing::debug!("Stored asset {} ({} bytes)", file_name, bytes.len());
        Ok(format!("{}/{}", self.url_prefix, file_name))
    }

    /// Maps an asset URL back to its file, or `None` if the URL does not
    /// point directly inside the store.
    pub fn path_for_url(&self, url: &str) -> Option<PathBuf> {
        let name = url
            .strip_prefix(&self.url_prefix)?
            .strip_prefix('/')?;

        let mut components = Path::new(name).components();
        match (components.next(), components.next()) {
            (Some(Component::Normal(file)), None) => Some(self.root.join(file)),
            _ => None,
        }
    }

    /// Removes the file behind `url`. Returns `false` when there was nothing
    /// to remove.
    pub async fn delete(&self, url: &str) -> io::Result<bool> {
        let Some(path) = self.path_for_url(url) else {
            return Ok(false);
        };

        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Deletes an asset, logging instead of failing.
    pub async fn delete_best_effort(&self, url: Option<&str>) {
        let Some(url) = url else {
            return;
        };

        match self.delete(url).await {
            Ok(true) => tracing::info!("Deleted asset {}", url),
            Ok(false) => tracing::debug!("Asset {} already gone", url),
            Err(e) => tracing::warn!("Failed to delete asset {}: {:?}", url, e),
        }
    }
}

/// `<unix millis>-<random>.<ext>`
fn generate_file_name(original_name: Option<&str>) -> String {
    let suffix = uuid::Uuid::new_v4().simple().to_string();
    format!(
        "{}-{}{}",
        Utc::now().timestamp_millis(),
        &suffix[..8],
        extension_of(original_name)
    )
}

/// Lower-cased extension of the uploaded file name with its leading dot,
/// capped at six characters.
fn extension_of(original_name: Option<&str>) -> String {
    original_name
        .and_then(|name| Path::new(name).extension())
        .and_then(|ext| ext.to_str())
        .filter(|ext| !ext.is_empty() && ext.chars().all(|c| c.is_ascii_alphanumeric()))
        .map(|ext| {
            format!(".{}", ext.to_ascii_lowercase())
                .chars()
                .take(MAX_EXTENSION_LEN)
                .collect()
        })
        .unwrap_or_else(|| DEFAULT_EXTENSION.to_string())
}
