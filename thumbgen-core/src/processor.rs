//! Debounced classify -> extract -> render for one original.
//!
//! Every invocation waits out a settle delay before reading the file. A
//! per-base-name in-flight map coalesces bursts: while a name is being
//! processed, further events only schedule one more cycle for it instead of
//! starting a competing worker. Nothing here is persisted; a restart simply
//! forgets what was in flight.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tracing::{debug, info, trace, warn};

use crate::config::PipelineConfig;
use crate::error::ThumbgenError;
use crate::extract::FrameExtractor;
use crate::media::{MediaKind, base_name, classify, file_name, is_hidden};
use crate::render::ThumbnailRenderer;

/// Why a path produced no previews without it being an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    Hidden,
    Unsupported,
    /// The path vanished during the settle delay.
    Missing,
    NotAFile,
}

#[derive(Debug)]
pub enum ProcessOutcome {
    Rendered { written: usize, failed: usize },
    Skipped(SkipReason),
    /// Another worker owns this base name and will run once more for it.
    Coalesced,
    Failed(ThumbgenError),
}

impl ProcessOutcome {
    pub fn is_rendered(&self) -> bool {
        matches!(self, ProcessOutcome::Rendered { failed: 0, .. })
    }
}

/// Base name -> path of a follow-up cycle requested while in flight.
type InFlight = DashMap<String, Option<PathBuf>>;

pub struct FileProcessor {
    extractor: FrameExtractor,
    renderer: ThumbnailRenderer,
    settle_delay: Duration,
    in_flight: Arc<InFlight>,
}

impl fmt::Debug for FileProcessor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileProcessor")
            .field("settle_delay", &self.settle_delay)
            .field("in_flight", &self.in_flight.len())
            .finish()
    }
}

impl FileProcessor {
    pub fn new(config: &PipelineConfig) -> Self {
        Self {
            extractor: FrameExtractor::new(config.transcoder.clone()),
            renderer: ThumbnailRenderer::new(config.layout(), config.jpeg_quality),
            settle_delay: config.settle_delay,
            in_flight: Arc::new(DashMap::new()),
        }
    }

    /// Number of base names currently being processed.
    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }

    pub async fn handle(&self, path: &Path) -> ProcessOutcome {
        let Some(name) = file_name(path) else {
            return ProcessOutcome::Skipped(SkipReason::Unsupported);
        };
        if is_hidden(name) {
            trace!(path = %path.display(), "ignoring hidden file");
            return ProcessOutcome::Skipped(SkipReason::Hidden);
        }
        if !classify(name).is_supported() {
            return ProcessOutcome::Skipped(SkipReason::Unsupported);
        }

        let key = base_name(name).to_string();
        match self.in_flight.entry(key.clone()) {
            Entry::Occupied(mut pending) => {
                debug!(path = %path.display(), "already in flight, coalescing");
                *pending.get_mut() = Some(path.to_path_buf());
                return ProcessOutcome::Coalesced;
            }
            Entry::Vacant(slot) => {
                slot.insert(None);
            }
        }

        let mut guard = InFlightGuard {
            map: Arc::clone(&self.in_flight),
            key,
            armed: true,
        };
        let mut current = path.to_path_buf();

        loop {
            tokio::time::sleep(self.settle_delay).await;
            let outcome = self.process_once(&current).await;

            if self
                .in_flight
                .remove_if(&guard.key, |_, rerun| rerun.is_none())
                .is_some()
            {
                guard.armed = false;
                return outcome;
            }

            let next = self
                .in_flight
                .get_mut(&guard.key)
                .and_then(|mut rerun| rerun.take());
            if let Some(next) = next {
                debug!(path = %next.display(), "changed while processing, running again");
                current = next;
            }
        }
    }

    async fn process_once(&self, path: &Path) -> ProcessOutcome {
        let Some(name) = file_name(path) else {
            return ProcessOutcome::Skipped(SkipReason::Unsupported);
        };
        let kind = classify(name);
        if !kind.is_supported() {
            return ProcessOutcome::Skipped(SkipReason::Unsupported);
        }

        match tokio::fs::metadata(path).await {
            Ok(meta) if meta.is_file() => {}
            Ok(_) => return ProcessOutcome::Skipped(SkipReason::NotAFile),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "file disappeared before processing");
                return ProcessOutcome::Skipped(SkipReason::Missing);
            }
            Err(err) => {
                warn!(path = %path.display(), error = %err, "cannot stat original");
                return ProcessOutcome::Failed(err.into());
            }
        }

        info!(path = %path.display(), kind = %kind, "generating previews");

        let frame = match self.extractor.extract(path, kind).await {
            Ok(frame) => frame,
            Err(err) => {
                warn!(path = %path.display(), kind = %kind, error = %err, "frame extraction failed, skipping");
                return ProcessOutcome::Failed(err);
            }
        };

        self.render(frame, name.to_string(), kind).await
    }

    async fn render(
        &self,
        frame: image::DynamicImage,
        name: String,
        kind: MediaKind,
    ) -> ProcessOutcome {
        let renderer = self.renderer.clone();
        let report = match tokio::task::spawn_blocking(move || renderer.render(&frame, &name)).await
        {
            Ok(report) => report,
            Err(err) => {
                return ProcessOutcome::Failed(ThumbgenError::Internal(format!(
                    "render task failed: {err}"
                )));
            }
        };

        debug!(
            kind = %kind,
            written = report.written.len(),
            failed = report.failed.len(),
            "render finished"
        );
        ProcessOutcome::Rendered {
            written: report.written.len(),
            failed: report.failed.len(),
        }
    }
}

/// Clears the in-flight entry if a worker is cancelled mid-cycle.
struct InFlightGuard {
    map: Arc<InFlight>,
    key: String,
    armed: bool,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        if self.armed {
            self.map.remove(&self.key);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::PreviewSize;
    use image::{Rgb, RgbImage};

    fn config(root: &Path) -> PipelineConfig {
        PipelineConfig {
            sizes: vec![PreviewSize::new(320, 200), PreviewSize::new(800, 600)],
            settle_delay: Duration::from_millis(20),
            ..PipelineConfig::with_root(root)
        }
    }

    fn write_png(path: &Path, w: u32, h: u32) {
        RgbImage::from_fn(w, h, |x, y| Rgb([(x % 251) as u8, (y % 241) as u8, 128]))
            .save(path)
            .unwrap();
    }

    #[tokio::test]
    async fn hidden_and_unsupported_are_skipped_without_waiting() {
        let dir = tempfile::tempdir().unwrap();
        let processor = FileProcessor::new(&config(dir.path()));

        let hidden = processor.handle(&dir.path().join(".photo.png")).await;
        assert!(matches!(hidden, ProcessOutcome::Skipped(SkipReason::Hidden)));

        let text = processor.handle(&dir.path().join("notes.txt")).await;
        assert!(matches!(text, ProcessOutcome::Skipped(SkipReason::Unsupported)));
        assert_eq!(processor.in_flight(), 0);
    }

    #[tokio::test]
    async fn vanished_file_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let processor = FileProcessor::new(&config(dir.path()));
        let outcome = processor.handle(&dir.path().join("gone.png")).await;
        assert!(matches!(outcome, ProcessOutcome::Skipped(SkipReason::Missing)));
        assert_eq!(processor.in_flight(), 0);
    }

    #[tokio::test]
    async fn concurrent_events_for_one_name_coalesce() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = config(dir.path());
        cfg.layout().ensure_size_dirs().unwrap();
        let path = dir.path().join("burst.png");
        write_png(&path, 400, 300);

        let processor = Arc::new(FileProcessor::new(&cfg));
        let first = {
            let processor = Arc::clone(&processor);
            let path = path.clone();
            tokio::spawn(async move { processor.handle(&path).await })
        };
        tokio::task::yield_now().await;
        while processor.in_flight() == 0 {
            tokio::task::yield_now().await;
        }

        let second = processor.handle(&path).await;
        assert!(matches!(second, ProcessOutcome::Coalesced));

        let first = first.await.unwrap();
        assert!(first.is_rendered(), "{first:?}");
        assert_eq!(processor.in_flight(), 0);
        assert!(dir.path().join("320x200/burst.jpg").exists());
        assert!(dir.path().join("800x600/burst.jpg").exists());
    }
}
