//! Per-board file persistence with image thumbnails.
//!
//! Layout: `{upload_dir}/{board_id}/{stored_name}` with thumbnails mirrored
//! under `{upload_dir}/{board_id}/thumbs/`. Stored names are
//! `{uuid}{.ext}`, never derived from the client's filename beyond the
//! lowercased extension.

use std::path::{Path, PathBuf};

use anyhow::Context;
use tracing::{debug, warn};

const IMAGE_EXTENSIONS: &[&str] = &[".jpg", ".jpeg", ".png", ".gif", ".webp", ".bmp", ".svg"];
const DOCUMENT_EXTENSIONS: &[&str] = &[".pdf", ".doc", ".docx", ".xls", ".xlsx", ".ppt", ".pptx", ".txt"];

const THUMB_SIZE: u32 = 300;

/// Metadata of a file accepted by [`FileStore::save_upload`].
#[derive(Debug, Clone)]
pub struct StoredFile {
    pub id: String,
    pub original_name: String,
    pub stored_name: String,
    pub mime_type: String,
    pub file_size: i64,
    /// `false` when a thumbnail was expected but could not be produced.
    pub thumbnail_ok: bool,
}

pub struct FileStore {
    upload_dir: PathBuf,
}

impl FileStore {
    pub fn new(upload_dir: impl Into<PathBuf>) -> Self {
        Self {
            upload_dir: upload_dir.into(),
        }
    }

    pub fn upload_dir(&self) -> &Path {
        &self.upload_dir
    }

    pub fn board_dir(&self, board_id: &str) -> PathBuf {
        self.upload_dir.join(board_id)
    }

    pub fn thumb_dir(&self, board_id: &str) -> PathBuf {
        self.board_dir(board_id).join("thumbs")
    }

    /// Store an uploaded blob for a board. Returns `None` if the filename's
    /// extension is not on the allow-list.
    pub async fn save_upload(
        &self,
        board_id: &str,
        original_name: &str,
        content_type: Option<&str>,
        data: &[u8],
    ) -> std::io::Result<Option<StoredFile>> {
        let Some(ext) = allowed_extension(original_name) else {
            return Ok(None);
        };

        let id = uuid::Uuid::new_v4().to_string();
        let stored_name = format!("{}{}", id, ext);

        let dir = self.board_dir(board_id);
        tokio::fs::create_dir_all(&dir).await?;
        let path = dir.join(&stored_name);
        tokio::fs::write(&path, data).await?;

        let mut thumbnail_ok = true;
        if IMAGE_EXTENSIONS.contains(&ext.as_str()) && ext != ".svg" {
            let thumb_dir = self.thumb_dir(board_id);
            let thumb_path = thumb_dir.join(&stored_name);
            let result = tokio::task::spawn_blocking(move || -> anyhow::Result<()> {
                std::fs::create_dir_all(&thumb_dir)?;
                generate_thumbnail(&path, &thumb_path)
            })
            .await;
            match result {
                Ok(Ok(())) => debug!(stored_name = %stored_name, "Thumbnail generated"),
                Ok(Err(e)) => {
                    warn!("Thumbnail generation failed for {}: {:#}", stored_name, e);
                    thumbnail_ok = false;
                }
                Err(e) => {
                    warn!("Thumbnail task failed for {}: {}", stored_name, e);
                    thumbnail_ok = false;
                }
            }
        }

        Ok(Some(StoredFile {
            id,
            original_name: original_name.to_string(),
            stored_name,
            mime_type: content_type
                .filter(|ct| !ct.is_empty())
                .unwrap_or("application/octet-stream")
                .to_string(),
            file_size: data.len() as i64,
            thumbnail_ok,
        }))
    }

    /// Copy a file into a board's directory under `stored_name`, leaving the
    /// source in place. Returns the number of bytes copied.
    pub async fn copy_into_board(&self, source: &Path, board_id: &str, stored_name: &str) -> std::io::Result<u64> {
        let dir = self.board_dir(board_id);
        tokio::fs::create_dir_all(&dir).await?;
        tokio::fs::copy(source, dir.join(stored_name)).await
    }

    /// Remove a stored file and its thumbnail. Missing files are ignored.
    pub async fn remove(&self, board_id: &str, stored_name: &str) {
        for path in [
            self.board_dir(board_id).join(stored_name),
            self.thumb_dir(board_id).join(stored_name),
        ] {
            if let Err(e) = tokio::fs::remove_file(&path).await {
                if e.kind() != std::io::ErrorKind::NotFound {
                    warn!("Failed to remove {}: {}", path.display(), e);
                }
            }
        }
    }

    /// Drop a deleted board's whole upload directory, thumbnails included.
    pub async fn remove_board(&self, board_id: &str) {
        let dir = self.board_dir(board_id);
        match tokio::fs::remove_dir_all(&dir).await {
            Ok(()) => debug!("Removed {}", dir.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!("Failed to remove {}: {}", dir.display(), e),
        }
    }

    /// Thumbnail URL, or the file URL when no thumbnail exists on disk.
    pub fn thumb_url(&self, board_id: &str, stored_name: &str) -> String {
        if self.thumb_dir(board_id).join(stored_name).is_file() {
            format!("/static/uploads/{}/thumbs/{}", board_id, stored_name)
        } else {
            file_url(board_id, stored_name)
        }
    }
}

pub fn file_url(board_id: &str, stored_name: &str) -> String {
    format!("/static/uploads/{}/{}", board_id, stored_name)
}

pub fn is_image(mime_type: &str) -> bool {
    mime_type.starts_with("image/")
}

/// Lowercased `.ext` of `filename` when it is on the upload allow-list.
pub fn allowed_extension(filename: &str) -> Option<String> {
    let ext = Path::new(filename).extension()?.to_str()?.to_ascii_lowercase();
    let ext = format!(".{}", ext);
    (IMAGE_EXTENSIONS.contains(&ext.as_str()) || DOCUMENT_EXTENSIONS.contains(&ext.as_str())).then_some(ext)
}

/// Shrink an image to fit a 300×300 box, keeping aspect ratio. Images that
/// already fit are written unchanged.
pub fn generate_thumbnail(source: &Path, dest: &Path) -> anyhow::Result<()> {
    let img = image::open(source).with_context(|| format!("decoding {}", source.display()))?;
    let thumb = if img.width() > THUMB_SIZE || img.height() > THUMB_SIZE {
        img.thumbnail(THUMB_SIZE, THUMB_SIZE)
    } else {
        img
    };
    thumb
        .save(dest)
        .with_context(|| format!("writing {}", dest.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn png_bytes(width: u32, height: u32) -> Vec<u8> {
        let img = image::RgbImage::from_pixel(width, height, image::Rgb([200, 30, 30]));
        let mut out = std::io::Cursor::new(Vec::new());
        image::DynamicImage::ImageRgb8(img)
            .write_to(&mut out, image::ImageFormat::Png)
            .unwrap();
        out.into_inner()
    }

    #[test]
    fn allow_list_is_case_insensitive() {
        assert_eq!(allowed_extension("Photo.JPG").as_deref(), Some(".jpg"));
        assert_eq!(allowed_extension("deck.pptx").as_deref(), Some(".pptx"));
        assert_eq!(allowed_extension("run.exe"), None);
        assert_eq!(allowed_extension("README"), None);
    }

    #[tokio::test]
    async fn rejected_uploads_write_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path());
        let saved = store.save_upload("b1", "evil.sh", None, b"#!/bin/sh").await.unwrap();
        assert!(saved.is_none());
        assert!(!store.board_dir("b1").exists());
    }

    #[tokio::test]
    async fn images_get_bounded_thumbnails() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path());
        let saved = store
            .save_upload("b1", "../../wide.png", Some("image/png"), &png_bytes(900, 450))
            .await
            .unwrap()
            .unwrap();

        assert!(saved.thumbnail_ok);
        assert!(saved.stored_name.starts_with(&saved.id));
        assert!(saved.stored_name.ends_with(".png"));
        assert!(store.board_dir("b1").join(&saved.stored_name).is_file());

        let thumb = image::open(store.thumb_dir("b1").join(&saved.stored_name)).unwrap();
        assert_eq!((thumb.width(), thumb.height()), (300, 150));
        assert_eq!(
            store.thumb_url("b1", &saved.stored_name),
            format!("/static/uploads/b1/thumbs/{}", saved.stored_name)
        );
    }

    #[tokio::test]
    async fn broken_images_still_upload() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path());
        let saved = store
            .save_upload("b1", "broken.jpg", Some("image/jpeg"), b"not really a jpeg")
            .await
            .unwrap()
            .unwrap();

        assert!(!saved.thumbnail_ok);
        assert_eq!(saved.file_size, 17);
        assert_eq!(
            store.thumb_url("b1", &saved.stored_name),
            file_url("b1", &saved.stored_name)
        );
    }

    #[tokio::test]
    async fn svg_is_never_thumbnailed() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path());
        let saved = store
            .save_upload("b1", "logo.svg", Some("image/svg+xml"), b"<svg/>")
            .await
            .unwrap()
            .unwrap();
        assert!(saved.thumbnail_ok);
        assert!(!store.thumb_dir("b1").join(&saved.stored_name).exists());
        assert!(is_image(&saved.mime_type));
    }
}
