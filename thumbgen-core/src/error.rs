use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ThumbgenError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to decode {path}: {source}")]
    Decode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    #[error("Transcoder failed for {path} ({status}): {stderr}")]
    Transcoder {
        path: PathBuf,
        status: String,
        stderr: String,
    },

    #[error("Transcoder timed out after {timeout:?} for {path}")]
    TranscoderTimeout { path: PathBuf, timeout: Duration },

    #[error("Failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to encode preview {path}: {source}")]
    Encode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    #[error("Failed to scan {path}: {source}")]
    Scan {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Watcher error: {0}")]
    Watch(#[from] notify::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ThumbgenError {
    /// True for failures caused by the external transcoder rather than our own I/O.
    pub fn is_transcoder(&self) -> bool {
        matches!(
            self,
            ThumbgenError::Transcoder { .. } | ThumbgenError::TranscoderTimeout { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, ThumbgenError>;
