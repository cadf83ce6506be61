use std::{
    fmt,
    path::{Path, PathBuf},
};

use base64::{engine::general_purpose::STANDARD, Engine as _};
use thiserror::Error;

pub const MAX_PHOTO_BYTES: u64 = 5 * 1024 * 1024;

fn whole_mib(bytes: &u64) -> u64 {
    bytes / (1024 * 1024)
}

/// Rejections of a picked photo. These are shown to the user as an alert and
/// never touch the submission state.
#[derive(Debug, Error)]
pub enum PhotoError {
    #[error("Photo size must be less than {}MB", whole_mib(.limit))]
    TooLarge { size: u64, limit: u64 },
    #[error("Please select a valid image file")]
    NotAnImage { mime_type: String },
    #[error("failed to read photo '{}': {source}", .path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// A picked image file: name, MIME type and raw bytes.
#[derive(Clone, PartialEq, Eq)]
pub struct PhotoFile {
    pub file_name: String,
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

impl fmt::Debug for PhotoFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PhotoFile")
            .field("file_name", &self.file_name)
            .field("mime_type", &self.mime_type)
            .field("size_bytes", &self.bytes.len())
            .finish()
    }
}

impl PhotoFile {
    pub fn new(file_name: impl Into<String>, mime_type: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            file_name: file_name.into(),
            mime_type: mime_type.into(),
            bytes,
        }
    }

    /// Reads a photo from disk, guessing the MIME type from the extension.
    pub async fn from_path(path: &Path) -> Result<Self, PhotoError> {
        let bytes = tokio::fs::read(path).await.map_err(|source| PhotoError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let mime_type = mime_guess::from_path(path)
            .first_or_octet_stream()
            .essence_str()
            .to_string();
        let file_name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "photo".to_string());

        Ok(Self::new(file_name, mime_type, bytes))
    }

    pub fn size(&self) -> u64 {
        self.bytes.len() as u64
    }

    pub fn validate(&self, max_bytes: u64) -> Result<(), PhotoError> {
        if self.size() > max_bytes {
            return Err(PhotoError::TooLarge {
                size: self.size(),
                limit: max_bytes,
            });
        }
        if !self.mime_type.starts_with("image/") {
            return Err(PhotoError::NotAnImage {
                mime_type: self.mime_type.clone(),
            });
        }
        Ok(())
    }

    /// `data:` URL suitable for an `<img src>` preview.
    pub fn preview_data_url(&self) -> String {
        format!(
            "data:{};base64,{}",
            self.mime_type,
            STANDARD.encode(&self.bytes)
        )
    }
}

#[cfg(test)]
#[path = "tests/photo_tests.rs"]
mod tests;
