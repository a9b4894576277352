//! Uploaded file storage
//!
//! Files are written below the configured media root with a random name and
//! are served back under `/media/`. The stored path is relative to the root,
//! e.g. `avatars/3f0c....png`.

use crate::config::{MediaKind, UploadConfig};
use crate::services::error::ContentError;
use anyhow::Context;
use std::path::Path;
use tokio::fs;
use uuid::Uuid;

pub const AVATAR_DIR: &str = "avatars";
pub const POST_MEDIA_DIR: &str = "post_media";

/// A file received from a client
#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub filename: String,
    pub content_type: String,
    pub data: Vec<u8>,
}

/// A file written to the media root
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredFile {
    /// Path relative to the media root
    pub path: String,
    pub kind: MediaKind,
    pub size: u64,
}

impl StoredFile {
    pub fn url(&self) -> String {
        format!("/media/{}", self.path)
    }
}

pub struct MediaStore {
    config: UploadConfig,
}

impl MediaStore {
    pub fn new(config: UploadConfig) -> Self {
        Self { config }
    }

    pub fn root(&self) -> &Path {
        &self.config.path
    }

    /// Store an image (or, with `allow_video`, a video) under `subdir`
    pub async fn save(
        &self,
        subdir: &str,
        file: &UploadedFile,
        allow_video: bool,
    ) -> Result<StoredFile, ContentError> {
        let kind = match self.config.classify(&file.content_type) {
            Some(MediaKind::Video) if !allow_video => None,
            other => other,
        };
        let kind = kind.ok_or_else(|| {
            ContentError::validation(format!("Invalid file type: {}", file.content_type))
        })?;

        if file.data.is_empty() {
            return Err(ContentError::validation("The submitted file is empty."));
        }
        if file.data.len() as u64 > self.config.max_file_size {
            return Err(ContentError::validation(format!(
                "File too large. Maximum size: {} MB",
                self.config.max_file_size / 1024 / 1024
            )));
        }

        let dir = self.config.path.join(subdir);
        fs::create_dir_all(&dir)
            .await
            .with_context(|| format!("Failed to create upload dir {}", dir.display()))?;

        let name = format!(
            "{}.{}",
            Uuid::new_v4().simple(),
            self.config.get_extension(&file.content_type)
        );
        fs::write(dir.join(&name), &file.data)
            .await
            .context("Failed to save file")?;

        tracing::debug!("Stored upload {} as {}/{}", file.filename, subdir, name);
        Ok(StoredFile {
            path: format!("{}/{}", subdir, name),
            kind,
            size: file.data.len() as u64,
        })
    }

    /// Remove a stored file; a missing file is not an error
    pub async fn remove(&self, path: &str) -> anyhow::Result<()> {
        match fs::remove_file(self.config.path.join(path)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e).context("Failed to remove file"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn store(dir: &TempDir) -> MediaStore {
        MediaStore::new(UploadConfig {
            path: dir.path().to_path_buf(),
            max_file_size: 16,
            ..Default::default()
        })
    }

    fn upload(content_type: &str, size: usize) -> UploadedFile {
        UploadedFile {
            filename: "clip".into(),
            content_type: content_type.into(),
            data: vec![7; size],
        }
    }

    #[tokio::test]
    async fn test_save_image() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);

        let stored = store
            .save(AVATAR_DIR, &upload("image/png", 8), false)
            .await
            .unwrap();
        assert!(stored.path.starts_with("avatars/"));
        assert!(stored.path.ends_with(".png"));
        assert_eq!(stored.kind, MediaKind::Image);
        assert!(stored.url().starts_with("/media/avatars/"));
        assert_eq!(std::fs::read(dir.path().join(&stored.path)).unwrap().len(), 8);

        store.remove(&stored.path).await.unwrap();
        store.remove(&stored.path).await.unwrap();
        assert!(!dir.path().join(&stored.path).exists());
    }

    #[tokio::test]
    async fn test_video_only_when_allowed() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);

        assert!(store
            .save(AVATAR_DIR, &upload("video/mp4", 8), false)
            .await
            .is_err());
        let stored = store
            .save(POST_MEDIA_DIR, &upload("video/mp4", 8), true)
            .await
            .unwrap();
        assert_eq!(stored.kind, MediaKind::Video);
    }

    #[tokio::test]
    async fn test_rejects_bad_type_and_size() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);

        let err = store
            .save(POST_MEDIA_DIR, &upload("application/pdf", 8), true)
            .await
            .unwrap_err();
        assert!(matches!(err, ContentError::Validation(_)));
        assert!(store
            .save(POST_MEDIA_DIR, &upload("image/png", 17), true)
            .await
            .is_err());
        assert!(store
            .save(POST_MEDIA_DIR, &upload("image/png", 0), true)
            .await
            .is_err());
    }
}
