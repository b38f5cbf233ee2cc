//! On-disk naming convention shared with the upload backend.
//!
//! Originals live directly in the upload root. Every configured size owns a
//! subdirectory holding `<base-name>.jpg` previews. Consumers only need this
//! module to find a preview; nothing else is exchanged.

use std::fmt;
use std::path::{Path, PathBuf};

use crate::error::{Result, ThumbgenError};
use crate::media::{base_name, file_name};

/// Sentinel requesting an out-of-band garbage-collection pass.
pub const GC_SENTINEL: &str = ".trigger_gc";
/// Sentinel requesting a full regeneration pass.
pub const REGENERATE_SENTINEL: &str = ".trigger_regenerate";

/// Extension of every preview file.
pub const PREVIEW_EXTENSION: &str = "jpg";

/// One target bounding box and the subdirectory its previews live in.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PreviewSize {
    pub name: String,
    pub width: u32,
    pub height: u32,
}

impl PreviewSize {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            name: format!("{width}x{height}"),
            width,
            height,
        }
    }

    pub fn named(name: impl Into<String>, width: u32, height: u32) -> Self {
        Self {
            name: name.into(),
            width,
            height,
        }
    }

    /// Parse the `WIDTHxHEIGHT` shorthand used in env overrides.
    pub fn parse(raw: &str) -> Option<Self> {
        let (w, h) = raw.trim().split_once(['x', 'X'])?;
        let width = w.trim().parse().ok()?;
        let height = h.trim().parse().ok()?;
        Some(Self::new(width, height))
    }

    /// The four sizes the upload backend links to.
    pub fn defaults() -> Vec<Self> {
        vec![
            Self::new(320, 200),
            Self::new(800, 600),
            Self::new(160, 100),
            Self::new(640, 400),
        ]
    }
}

impl fmt::Display for PreviewSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}x{})", self.name, self.width, self.height)
    }
}

/// Resolves original and preview locations under one upload root.
#[derive(Debug, Clone)]
pub struct PreviewLayout {
    root: PathBuf,
    sizes: Vec<PreviewSize>,
}

impl PreviewLayout {
    pub fn new(root: impl Into<PathBuf>, sizes: Vec<PreviewSize>) -> Self {
        Self {
            root: root.into(),
            sizes,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn sizes(&self) -> &[PreviewSize] {
        &self.sizes
    }

    pub fn size_by_name(&self, name: &str) -> Option<&PreviewSize> {
        self.sizes.iter().find(|size| size.name == name)
    }

    pub fn size_dir(&self, size: &PreviewSize) -> PathBuf {
        self.root.join(&size.name)
    }

    /// `<root>/<size>/<base>.jpg` for an original file name.
    pub fn preview_path(&self, size: &PreviewSize, original_name: &str) -> PathBuf {
        self.size_dir(size).join(preview_file_name(original_name))
    }

    pub fn preview_paths(&self, original_name: &str) -> Vec<PathBuf> {
        self.sizes
            .iter()
            .map(|size| self.preview_path(size, original_name))
            .collect()
    }

    /// Size whose directory contains `path` (or is `path`).
    ///
    /// Only the component directly below the root is inspected, so a root
    /// that itself happens to contain `320x200` in its path does not match.
    pub fn size_for_path(&self, path: &Path) -> Option<&PreviewSize> {
        let rel = path.strip_prefix(&self.root).ok()?;
        let first = rel.components().next()?.as_os_str().to_str()?;
        self.size_by_name(first)
    }

    pub fn is_sentinel(name: &str) -> bool {
        name == GC_SENTINEL || name == REGENERATE_SENTINEL
    }

    /// Create every size directory. Failure here means the process has
    /// nowhere to write and is fatal to startup.
    pub fn ensure_size_dirs(&self) -> Result<()> {
        for size in &self.sizes {
            let dir = self.size_dir(size);
            std::fs::create_dir_all(&dir)
                .map_err(|source| ThumbgenError::Write { path: dir, source })?;
        }
        Ok(())
    }
}

/// `<base>.jpg` for an original file name.
pub fn preview_file_name(original_name: &str) -> String {
    format!("{}.{PREVIEW_EXTENSION}", base_name(original_name))
}

/// Public URL the upload backend hands out for a stored original.
///
/// `base_url` is used verbatim as the prefix, e.g. `/api/thumbnail/`.
pub fn preview_url(base_url: &str, size_name: &str, stored_name: &str) -> String {
    let stored = file_name(Path::new(stored_name)).unwrap_or(stored_name);
    format!("{base_url}{size_name}/{}", preview_file_name(stored))
}
