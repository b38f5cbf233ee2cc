//! Reconciles previews against originals.
//!
//! A preview is kept only while an original with the same base name and a
//! supported kind sits in the upload root. The pass needs no watcher events,
//! so it also repairs drift that happened while nothing was watching.

use std::collections::HashSet;
use std::fs::DirEntry;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::error::{Result, ThumbgenError};
use crate::layout::PreviewLayout;
use crate::media::{base_name, classify, is_hidden};

/// Render temp files at least this old are treated as abandoned by a killed
/// render. Live renders finish well inside it.
pub const STALE_TEMP_AGE: Duration = Duration::from_secs(15 * 60);

const TEMP_SUFFIX: &str = ".tmp";

/// Summary of one collection pass.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct GcReport {
    /// Distinct base names with a supported original.
    pub valid_originals: usize,
    /// Preview files inspected across all size directories.
    pub scanned: usize,
    pub deleted: Vec<PathBuf>,
    /// Abandoned render temp files that were removed.
    pub temps_removed: Vec<PathBuf>,
    /// Orphans that could not be removed.
    pub failed: usize,
    /// Size directories that did not exist.
    pub missing_dirs: Vec<String>,
}

impl GcReport {
    pub fn is_clean(&self) -> bool {
        self.deleted.is_empty() && self.failed == 0
    }
}

#[derive(Debug, Clone)]
pub struct GarbageCollector {
    layout: PreviewLayout,
}

impl GarbageCollector {
    pub fn new(layout: PreviewLayout) -> Self {
        Self { layout }
    }

    /// Run one full pass. Only an unreadable upload root is an error; every
    /// per-directory or per-file problem is logged and skipped.
    pub fn collect(&self) -> Result<GcReport> {
        self.collect_with_temp_age(STALE_TEMP_AGE)
    }

    /// Like [`collect`](Self::collect), also removing render temp files at
    /// least `max_age` old. `Duration::ZERO` sweeps all of them, which is
    /// only safe while no render can be in flight.
    pub fn collect_with_temp_age(&self, max_age: Duration) -> Result<GcReport> {
        let valid = self.valid_base_names()?;
        let mut report = GcReport {
            valid_originals: valid.len(),
            ..GcReport::default()
        };

        for size in self.layout.sizes() {
            let dir = self.layout.size_dir(size);
            let entries = match std::fs::read_dir(&dir) {
                Ok(entries) => entries,
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                    debug!(dir = %dir.display(), "size directory missing, skipping");
                    report.missing_dirs.push(size.name.clone());
                    continue;
                }
                Err(err) => {
                    warn!(dir = %dir.display(), error = %err, "cannot scan size directory");
                    continue;
                }
            };

            for entry in entries.flatten() {
                let is_file = entry.file_type().map(|t| t.is_file()).unwrap_or(false);
                let name = entry.file_name();
                let Some(name) = name.to_str() else { continue };
                if !is_file {
                    continue;
                }

                if is_hidden(name) {
                    if is_render_temp(name) && is_older_than(&entry, max_age) {
                        let path = entry.path();
                        match remove_file(&path) {
                            Some(true) => {
                                info!(path = %path.display(), "deleted abandoned temp file");
                                report.temps_removed.push(path);
                            }
                            Some(false) => {}
                            None => report.failed += 1,
                        }
                    }
                    continue;
                }

                report.scanned += 1;
                if valid.contains(base_name(name)) {
                    continue;
                }

                let path = entry.path();
                match remove_file(&path) {
                    Some(true) => {
                        info!(path = %path.display(), "deleted orphan preview");
                        report.deleted.push(path);
                    }
                    Some(false) => {}
                    None => report.failed += 1,
                }
            }
        }

        Ok(report)
    }

    /// Base names of supported, non-hidden regular files in the root.
    pub fn valid_base_names(&self) -> Result<HashSet<String>> {
        let root = self.layout.root();
        let entries = std::fs::read_dir(root).map_err(|source| ThumbgenError::Scan {
            path: root.to_path_buf(),
            source,
        })?;

        let mut valid = HashSet::new();
        for entry in entries.flatten() {
            if entry.file_type().map(|t| t.is_dir()).unwrap_or(true) {
                continue;
            }
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            if classify(name).is_supported() {
                valid.insert(base_name(name).to_string());
            }
        }
        Ok(valid)
    }

    /// Remove every size's preview for one original, ignoring missing files.
    pub fn delete_previews_for(&self, original_name: &str) -> Vec<PathBuf> {
        delete_previews(&self.layout, original_name)
    }
}

/// Remove `<size>/<base>.jpg` in every size directory.
pub fn delete_previews(layout: &PreviewLayout, original_name: &str) -> Vec<PathBuf> {
    let mut removed = Vec::new();
    for path in layout.preview_paths(original_name) {
        match std::fs::remove_file(&path) {
            Ok(()) => {
                debug!(path = %path.display(), "deleted preview");
                removed.push(path);
            }
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
            Err(err) => warn!(path = %path.display(), error = %err, "failed to delete preview"),
        }
    }
    removed
}

/// `.<base>.jpg.<suffix>.tmp`, as written by the renderer.
fn is_render_temp(name: &str) -> bool {
    is_hidden(name) && name.ends_with(TEMP_SUFFIX)
}

fn is_older_than(entry: &DirEntry, max_age: Duration) -> bool {
    if max_age.is_zero() {
        return true;
    }
    entry
        .metadata()
        .and_then(|meta| meta.modified())
        .ok()
        .and_then(|modified| modified.elapsed().ok())
        .is_some_and(|age| age >= max_age)
}

/// `Some(true)` when removed, `Some(false)` when already gone, `None` on
/// failure (logged).
fn remove_file(path: &Path) -> Option<bool> {
    match std::fs::remove_file(path) {
        Ok(()) => Some(true),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Some(false),
        Err(err) => {
            warn!(path = %path.display(), error = %err, "failed to delete file");
            None
        }
    }
}

/// Whether `path` is a direct entry of the root rather than something nested.
pub(crate) fn is_root_entry(layout: &PreviewLayout, path: &Path) -> bool {
    path.parent() == Some(layout.root())
}
