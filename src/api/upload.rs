//! Multipart reading shared by the avatar and post media endpoints
//!
//! Type and size checks happen in the media store; this module only turns
//! form fields into [`UploadedFile`]s.

use axum::extract::Multipart;

use crate::api::middleware::ApiError;
use crate::services::UploadedFile;

/// Collect every file field whose name is in `names`
pub async fn read_files(
    multipart: &mut Multipart,
    names: &[&str],
) -> Result<Vec<UploadedFile>, ApiError> {
    let mut files = Vec::new();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::validation_error(format!("Failed to read multipart: {}", e)))?
    {
        let name = field.name().unwrap_or("").to_string();
        if !names.contains(&name.as_str()) {
            continue;
        }

        let filename = field
            .file_name()
            .map(|s| s.to_string())
            .unwrap_or_else(|| "unknown".to_string());

        let content_type = field
            .content_type()
            .map(|s| s.to_string())
            .unwrap_or_else(|| "application/octet-stream".to_string());

        let data = field
            .bytes()
            .await
            .map_err(|e| ApiError::validation_error(format!("Failed to read file: {}", e)))?;

        files.push(UploadedFile {
            filename,
            content_type,
            data: data.to_vec(),
        });
    }

    Ok(files)
}

/// The first file field named `name`
pub async fn read_file(multipart: &mut Multipart, name: &str) -> Result<UploadedFile, ApiError> {
    read_files(multipart, &[name])
        .await?
        .into_iter()
        .next()
        .ok_or_else(|| ApiError::validation_error("No file provided"))
}
