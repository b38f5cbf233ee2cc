//! Extension based media classification.
//!
//! Classification is a pure lookup on the file name. Hidden names (leading
//! `.`) are never classified, which keeps editor swap files, our own temp
//! files and the control sentinels out of the pipeline.

use std::ffi::OsStr;
use std::fmt;
use std::path::Path;

const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "gif", "bmp"];
const VIDEO_EXTENSIONS: &[&str] = &["mp4", "mov", "avi", "mkv", "webm"];
const HEIC_EXTENSIONS: &[&str] = &["heic", "heif"];

/// Kind of an original file, derived from its extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MediaKind {
    Image,
    Video,
    Heic,
    Unsupported,
}

impl MediaKind {
    pub fn is_supported(self) -> bool {
        !matches!(self, MediaKind::Unsupported)
    }

    /// Kinds whose frame comes from the external transcoder.
    pub fn needs_transcoder(self) -> bool {
        matches!(self, MediaKind::Video | MediaKind::Heic)
    }
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            MediaKind::Image => "image",
            MediaKind::Video => "video",
            MediaKind::Heic => "heic",
            MediaKind::Unsupported => "unsupported",
        };
        f.write_str(label)
    }
}

/// Classify a bare file name (no directory components expected).
pub fn classify(name: &str) -> MediaKind {
    if is_hidden(name) {
        return MediaKind::Unsupported;
    }

    let Some(ext) = Path::new(name).extension().and_then(OsStr::to_str) else {
        return MediaKind::Unsupported;
    };
    let ext = ext.to_ascii_lowercase();

    if IMAGE_EXTENSIONS.contains(&ext.as_str()) {
        MediaKind::Image
    } else if VIDEO_EXTENSIONS.contains(&ext.as_str()) {
        MediaKind::Video
    } else if HEIC_EXTENSIONS.contains(&ext.as_str()) {
        MediaKind::Heic
    } else {
        MediaKind::Unsupported
    }
}

/// Classify the final component of a path.
pub fn classify_path(path: &Path) -> MediaKind {
    match file_name(path) {
        Some(name) => classify(name),
        None => MediaKind::Unsupported,
    }
}

pub fn is_hidden(name: &str) -> bool {
    name.starts_with('.')
}

/// File name with its last extension removed: `clip.final.mp4` -> `clip.final`.
pub fn base_name(name: &str) -> &str {
    match name.rfind('.') {
        Some(0) | None => name,
        Some(idx) => &name[..idx],
    }
}

/// UTF-8 final component of `path`, if it has one.
pub fn file_name(path: &Path) -> Option<&str> {
    path.file_name().and_then(OsStr::to_str)
}
