//! On-disk storage for listing photos and channel profile pictures.

use std::path::{Path, PathBuf};

use crate::error::ScoutError;

#[derive(Debug, Clone)]
pub struct MediaStore {
    root: PathBuf,
}

/// Keeps only characters that are safe in a file name.
fn file_component(raw: &str) -> String {
    raw.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

impl MediaStore {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn listing_image_path(&self, channel_id: i64, message_id: i64, file_unique_id: &str) -> PathBuf {
        self.root.join("listings").join(format!(
            "listing_{}_{}_{}.jpg",
            channel_id,
            message_id,
            file_component(file_unique_id)
        ))
    }

    pub fn profile_photo_path(&self, channel_id: i64) -> PathBuf {
        self.root
            .join("profiles")
            .join(format!("profile_{}.jpg", channel_id))
    }

    pub async fn store_listing_image(
        &self,
        channel_id: i64,
        message_id: i64,
        file_unique_id: &str,
        bytes: &[u8],
    ) -> Result<PathBuf, ScoutError> {
        let path = self.listing_image_path(channel_id, message_id, file_unique_id);
        write_atomic(&path, bytes).await?;
        Ok(path)
    }

    pub async fn store_profile_photo(&self, channel_id: i64, bytes: &[u8]) -> Result<PathBuf, ScoutError> {
        let path = self.profile_photo_path(channel_id);
        write_atomic(&path, bytes).await?;
        Ok(path)
    }
}

fn media_err(path: &Path) -> impl FnOnce(std::io::Error) -> ScoutError {
    let path = path.to_path_buf();
    move |source| ScoutError::Media { path, source }
}

/// Writes to a sibling temp file and renames it into place, so a reader
/// never sees a partial image.
async fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), ScoutError> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(media_err(parent))?;
    }
    let tmp = path.with_extension("jpg.part");
    tokio::fs::write(&tmp, bytes).await.map_err(media_err(&tmp))?;
    tokio::fs::rename(&tmp, path).await.map_err(media_err(path))?;
    Ok(())
}
