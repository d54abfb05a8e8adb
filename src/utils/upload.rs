// src/utils/upload.rs

use std::collections::HashMap;

use axum::extract::Multipart;

use crate::{config::MAX_IMAGE_BYTES, error::AppError};

/// Multipart field carrying the question-sheet image.
pub const IMAGE_FIELD: &str = "image";

/// An image file received in a multipart form.
#[derive(Debug, Clone)]
pub struct UploadedImage {
    pub file_name: Option<String>,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

/// Text fields plus the optional image of an admin test form.
#[derive(Debug, Default)]
pub struct TestForm {
    fields: HashMap<String, String>,
    pub image: Option<UploadedImage>,
}

impl TestForm {
    pub fn from_fields(fields: HashMap<String, String>) -> Self {
        Self {
            fields,
            image: None,
        }
    }

    /// Drains the multipart stream.
    ///
    /// The image must declare an `image/*` content type and fit within
    /// [`MAX_IMAGE_BYTES`]. An empty file part (no file chosen) counts as no
    /// image.
    pub async fn read(multipart: &mut Multipart) -> Result<Self, AppError> {
        let mut form = TestForm::default();

        while let Some(mut field) = multipart.next_field().await? {
            let name = field.name().unwrap_or("").to_string();

            if name == IMAGE_FIELD {
                let file_name = field.file_name().map(str::to_string);
                let content_type = field
                    .content_type()
                    .map(str::to_ascii_lowercase)
                    .unwrap_or_default();

                let mut bytes = Vec::new();
                while let Some(chunk) = field.chunk().await? {
                    if bytes.len() + chunk.len() > MAX_IMAGE_BYTES {
                        return Err(AppError::PayloadTooLarge(format!(
                            "Image exceeds the {}MB limit",
                            MAX_IMAGE_BYTES / (1024 * 1024)
                        )));
                    }
                    bytes.extend_from_slice(&chunk);
                }

                if bytes.is_empty() && file_name.as_deref().unwrap_or("").is_empty() {
                    continue;
                }

                if !is_image_mime(&content_type) {
                    return Err(AppError::BadRequest(format!(
                        "Uploaded file must be an image, got '{}'",
                        content_type
                    )));
                }

                form.image = Some(UploadedImage {
                    file_name,
                    content_type,
                    bytes,
                });
            } else if !name.is_empty() {
                let value = field.text().await?;
                form.fields.insert(name, value);
            }
        }

        Ok(form)
    }

    /// Trimmed text value; blank fields count as absent.
    pub fn text(&self, name: &str) -> Option<&str> {
        self.fields
            .get(name)
            .map(|value| value.trim())
            .filter(|value| !value.is_empty())
    }

    pub fn integer(&self, name: &str) -> Result<Option<i32>, AppError> {
        self.text(name)
            .map(|raw| {
                raw.parse::<i32>()
                    .map_err(|_| AppError::BadRequest(format!("{} must be an integer", name)))
            })
            .transpose()
    }

    /// Checkbox-style flag: `true`, `1`, `on` or `yes`.
    pub fn flag(&self, name: &str) -> bool {
        self.text(name)
            .map(|value| {
                matches!(
                    value.to_ascii_lowercase().as_str(),
                    "true" | "1" | "on" | "yes"
                )
            })
            .unwrap_or(false)
    }

    pub fn take_image(&mut self) -> Option<UploadedImage> {
        self.image.take()
    }
}

fn is_image_mime(content_type: &str) -> bool {
    content_type
        .strip_prefix("image/")
        .is_some_and(|subtype| !subtype.trim().is_empty())
}
