//! Post media validation and upload paths
//!
//! Media attached to a post is validated locally before any upload starts:
//! at most 5 MiB, and only JPEG, PNG and GIF images or MP4 and QuickTime
//! videos. Uploads land under `posts/{uid}/{millis}_{random}.{ext}`.

use crate::shared::error::RemoteError;
use crate::shared::models::MediaKind;
use bytes::Bytes;
use rand::Rng;
use thiserror::Error;

/// Largest accepted attachment
pub const MAX_MEDIA_BYTES: usize = 5 * 1024 * 1024;

/// Accepted content types
pub const ALLOWED_CONTENT_TYPES: &[&str] = &[
    "image/jpeg",
    "image/png",
    "image/gif",
    "video/mp4",
    "video/quicktime",
];

const SUFFIX_ALPHABET: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";

/// Media rejected or failed to upload
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MediaError {
    #[error("file size must be less than 5MB (got {size} bytes)")]
    TooLarge { size: usize, max: usize },

    #[error("unsupported file type {0}; upload a JPG, PNG or GIF image or an MP4 or MOV video")]
    UnsupportedType(String),

    #[error("media uploads need a connection")]
    Offline,

    #[error("upload failed: {0}")]
    Upload(#[from] RemoteError),
}

/// A file picked for upload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaFile {
    pub file_name: String,
    pub content_type: String,
    pub data: Bytes,
}

impl MediaFile {
    pub fn new(file_name: impl Into<String>, content_type: impl Into<String>, data: impl Into<Bytes>) -> Self {
        Self {
            file_name: file_name.into(),
            content_type: content_type.into(),
            data: data.into(),
        }
    }

    /// Check size and type; returns the kind of media on success
    pub fn validate(&self) -> Result<MediaKind, MediaError> {
        if self.data.len() > MAX_MEDIA_BYTES {
            return Err(MediaError::TooLarge {
                size: self.data.len(),
                max: MAX_MEDIA_BYTES,
            });
        }
        if !ALLOWED_CONTENT_TYPES.contains(&self.content_type.as_str()) {
            return Err(MediaError::UnsupportedType(self.content_type.clone()));
        }
        Ok(if self.content_type.starts_with("image/") {
            MediaKind::Image
        } else {
            MediaKind::Video
        })
    }

    /// Extension taken from the file name, falling back to the content type
    pub fn extension(&self) -> String {
        match self.file_name.rsplit_once('.') {
            Some((_, ext)) if !ext.is_empty() => ext.to_ascii_lowercase(),
            _ => self
                .content_type
                .rsplit('/')
                .next()
                .unwrap_or("bin")
                .to_string(),
        }
    }
}

/// Storage path of a new upload by `user_id`
pub fn upload_path(user_id: &str, file: &MediaFile, millis: i64) -> String {
    let mut rng = rand::thread_rng();
    let suffix: String = (0..7)
        .map(|_| SUFFIX_ALPHABET[rng.gen_range(0..SUFFIX_ALPHABET.len())] as char)
        .collect();
    format!("posts/{}/{}_{}.{}", user_id, millis, suffix, file.extension())
}
