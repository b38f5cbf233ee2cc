//! Upload directory watcher and control loop.
//!
//! `notify` delivers raw events on its own thread; they are forwarded into a
//! bounded channel and consumed by a single loop that routes each event to
//! the processor, preview deletion, or one of the sentinel-driven passes.
//! Per-file work runs on spawned tasks, so events for different files are
//! handled concurrently. Two events for the same base name may still race
//! (e.g. a write immediately followed by a rename); the outcome is
//! last-writer-wins on the preview files, never a partial file.

pub mod dispatch;

use std::env;
use std::fmt;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use futures::StreamExt;
use notify::{Config as NotifyConfig, Event, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, warn};

use crate::config::PipelineConfig;
use crate::error::{Result, ThumbgenError};
use crate::gc::{GarbageCollector, GcReport, STALE_TEMP_AGE, delete_previews};
use crate::layout::PreviewLayout;
use crate::media::{base_name, classify, file_name};
use crate::processor::{FileProcessor, ProcessOutcome};

pub use dispatch::{WatchAction, route_event};

const CHANNEL_CAPACITY: usize = 1024;

/// Observer hook for surfacing what the control loop did.
#[cfg_attr(test, mockall::automock)]
pub trait WatchObserver: Send + Sync {
    fn on_gc(&self, report: &GcReport);
    fn on_regenerated(&self, processed: usize);
    fn on_processed(&self, path: &Path, outcome: &ProcessOutcome);
    fn on_error(&self, error: &str);
}

/// No-op observer used when nothing needs to listen in.
pub struct NoopWatchObserver;

impl WatchObserver for NoopWatchObserver {
    fn on_gc(&self, _report: &GcReport) {}
    fn on_regenerated(&self, _processed: usize) {}
    fn on_processed(&self, _path: &Path, _outcome: &ProcessOutcome) {}
    fn on_error(&self, _error: &str) {}
}

impl fmt::Debug for NoopWatchObserver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("NoopWatchObserver")
    }
}

/// Lifecycle of the control loop. `Running` is terminal until the process
/// (or the `run_until` shutdown future) ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatcherState {
    Starting,
    Running,
}

struct Shared<O> {
    layout: PreviewLayout,
    processor: FileProcessor,
    collector: GarbageCollector,
    observer: Arc<O>,
    sentinel_grace: Duration,
    regenerate_concurrency: usize,
    regenerating: AtomicBool,
}

pub struct PreviewWatcher<O: WatchObserver = NoopWatchObserver> {
    shared: Arc<Shared<O>>,
    state: watch::Sender<WatcherState>,
}

impl<O: WatchObserver + 'static> fmt::Debug for PreviewWatcher<O> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PreviewWatcher")
            .field("root", &self.shared.layout.root())
            .field("sizes", &self.shared.layout.sizes().len())
            .field("state", &*self.state.borrow())
            .field("observer_type", &std::any::type_name::<O>())
            .finish()
    }
}

impl PreviewWatcher<NoopWatchObserver> {
    pub fn with_config(config: PipelineConfig) -> Self {
        Self::new(config, Arc::new(NoopWatchObserver))
    }
}

impl<O: WatchObserver + 'static> PreviewWatcher<O> {
    pub fn new(mut config: PipelineConfig, observer: Arc<O>) -> Self {
        config.upload_root = resolve_root(config.upload_root);
        let layout = config.layout();
        let (state, _) = watch::channel(WatcherState::Starting);

        Self {
            shared: Arc::new(Shared {
                processor: FileProcessor::new(&config),
                collector: GarbageCollector::new(layout.clone()),
                layout,
                observer,
                sentinel_grace: config.sentinel_grace,
                regenerate_concurrency: config.regenerate_concurrency.max(1),
                regenerating: AtomicBool::new(false),
            }),
            state,
        }
    }

    pub fn layout(&self) -> &PreviewLayout {
        &self.shared.layout
    }

    pub fn processor(&self) -> &FileProcessor {
        &self.shared.processor
    }

    pub fn state(&self) -> WatcherState {
        *self.state.borrow()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<WatcherState> {
        self.state.subscribe()
    }

    /// Startup sequence: size directories, one GC pass, optional full
    /// regeneration. Errors here are fatal to the caller.
    ///
    /// Nothing renders before this pass, so it also sweeps every leftover
    /// render temp file.
    pub async fn start(&self, regenerate: bool) -> Result<()> {
        self.shared.layout.ensure_size_dirs()?;

        info!(root = %self.shared.layout.root().display(), "running garbage collector");
        let report = self.shared.collect_garbage(Duration::ZERO).await?;
        info!(
            deleted = report.deleted.len(),
            temps = report.temps_removed.len(),
            scanned = report.scanned,
            "garbage collection complete"
        );

        if regenerate {
            info!("regenerating all previews");
            let processed = self.shared.regenerate().await?;
            info!(processed, "regeneration complete");
        }

        Ok(())
    }

    pub async fn collect_garbage(&self) -> Result<GcReport> {
        self.shared.collect_garbage(STALE_TEMP_AGE).await
    }

    /// Run the processor on every non-directory entry of the root.
    pub async fn regenerate(&self) -> Result<usize> {
        self.shared.regenerate().await
    }

    /// Run startup and then watch until the process exits.
    pub async fn run(&self, regenerate: bool) -> Result<()> {
        self.run_until(regenerate, std::future::pending()).await
    }

    /// Run startup and then watch until `shutdown` resolves.
    pub async fn run_until<F>(&self, regenerate: bool, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        self.start(regenerate).await?;

        let (tx, mut rx) = mpsc::channel::<WatchMessage>(CHANNEL_CAPACITY);
        let root = self.shared.layout.root().to_path_buf();
        let _watcher = tokio::task::spawn_blocking(move || init_watcher(&root, tx))
            .await
            .map_err(|err| {
                ThumbgenError::Internal(format!("watcher initialization panicked: {err}"))
            })??;

        self.state.send_replace(WatcherState::Running);
        info!(root = %self.shared.layout.root().display(), "watching for changes");

        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("shutdown requested, stopping watcher");
                    break;
                }
                msg = rx.recv() => {
                    let Some(msg) = msg else {
                        warn!("watch channel closed");
                        break;
                    };
                    match msg {
                        WatchMessage::Event(event) => {
                            for action in route_event(&self.shared.layout, &event) {
                                Shared::dispatch(&self.shared, action).await;
                            }
                        }
                        WatchMessage::Error(message) => {
                            error!(error = %message, "watcher error");
                            self.shared.observer.on_error(&message);
                        }
                    }
                }
            }
        }

        Ok(())
    }

    /// Apply one routed action as the control loop would.
    pub async fn dispatch(&self, action: WatchAction) {
        Shared::dispatch(&self.shared, action).await;
    }
}

impl<O: WatchObserver + 'static> Shared<O> {
    async fn dispatch(this: &Arc<Self>, action: WatchAction) {
        match action {
            WatchAction::Process(path) => {
                let shared = Arc::clone(this);
                tokio::spawn(async move {
                    let outcome = shared.processor.handle(&path).await;
                    shared.observer.on_processed(&path, &outcome);
                });
            }
            WatchAction::RemovePreviews(path) => this.remove_previews(&path),
            WatchAction::CollectGarbage(sentinel) => {
                info!("garbage collection requested");
                tokio::time::sleep(this.sentinel_grace).await;
                if let Err(err) = this.collect_garbage(STALE_TEMP_AGE).await {
                    error!(error = %err, "requested garbage collection failed");
                    this.observer.on_error(&err.to_string());
                }
                remove_sentinel(&sentinel);
            }
            WatchAction::Regenerate(sentinel) => {
                if this.regenerating.swap(true, Ordering::SeqCst) {
                    info!("regeneration already running, ignoring request");
                    remove_sentinel(&sentinel);
                    return;
                }
                info!("regeneration requested");
                let shared = Arc::clone(this);
                tokio::spawn(async move {
                    tokio::time::sleep(shared.sentinel_grace).await;
                    if let Err(err) = shared.regenerate().await {
                        error!(error = %err, "requested regeneration failed");
                        shared.observer.on_error(&err.to_string());
                    }
                    remove_sentinel(&sentinel);
                    shared.regenerating.store(false, Ordering::SeqCst);
                });
            }
            WatchAction::Rescan => {
                warn!("filesystem events were dropped, reconciling from disk");
                if let Err(err) = this.collect_garbage(STALE_TEMP_AGE).await {
                    this.observer.on_error(&err.to_string());
                }
                let shared = Arc::clone(this);
                tokio::spawn(async move {
                    if let Err(err) = shared.backfill().await {
                        shared.observer.on_error(&err.to_string());
                    }
                });
            }
        }
    }

    async fn collect_garbage(&self, temp_age: Duration) -> Result<GcReport> {
        let collector = self.collector.clone();
        let report = tokio::task::spawn_blocking(move || {
            collector.collect_with_temp_age(temp_age)
        })
            .await
            .map_err(|err| ThumbgenError::Internal(format!("gc task failed: {err}")))??;
        self.observer.on_gc(&report);
        Ok(report)
    }

    async fn regenerate(&self) -> Result<usize> {
        let originals = self.root_files()?;
        let processed = self.process_all(originals).await;
        self.observer.on_regenerated(processed);
        Ok(processed)
    }

    /// Process supported originals that are missing a preview in any size.
    async fn backfill(&self) -> Result<usize> {
        let missing = self
            .root_files()?
            .into_iter()
            .filter(|path| {
                file_name(path).is_some_and(|name| {
                    classify(name).is_supported()
                        && self
                            .layout
                            .preview_paths(name)
                            .iter()
                            .any(|preview| !preview.exists())
                })
            })
            .collect::<Vec<_>>();
        debug!(count = missing.len(), "backfilling missing previews");
        Ok(self.process_all(missing).await)
    }

    async fn process_all(&self, paths: Vec<PathBuf>) -> usize {
        futures::stream::iter(paths)
            .map(|path| async move {
                let outcome = self.processor.handle(&path).await;
                self.observer.on_processed(&path, &outcome);
                outcome.is_rendered()
            })
            .buffer_unordered(self.regenerate_concurrency)
            .filter(|rendered| futures::future::ready(*rendered))
            .count()
            .await
    }

    fn root_files(&self) -> Result<Vec<PathBuf>> {
        let root = self.layout.root();
        let entries = std::fs::read_dir(root).map_err(|source| ThumbgenError::Scan {
            path: root.to_path_buf(),
            source,
        })?;
        let mut files: Vec<PathBuf> = entries
            .flatten()
            .filter(|entry| entry.file_type().map(|t| !t.is_dir()).unwrap_or(false))
            .map(|entry| entry.path())
            .collect();
        files.sort();
        Ok(files)
    }

    /// Delete previews for a removed original unless another supported
    /// original still shares its base name.
    fn remove_previews(&self, path: &Path) {
        let Some(name) = file_name(path) else { return };
        match self.collector.valid_base_names() {
            Ok(valid) if valid.contains(base_name(name)) => {
                debug!(path = %path.display(), "another original shares this base name, keeping previews");
                return;
            }
            Ok(_) => {}
            Err(err) => warn!(error = %err, "cannot scan root before deleting previews"),
        }

        let removed = delete_previews(&self.layout, name);
        info!(original = name, removed = removed.len(), "cleaned previews for removed original");
    }
}

fn remove_sentinel(path: &Path) {
    match std::fs::remove_file(path) {
        Ok(()) => {}
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
        Err(err) => warn!(path = %path.display(), error = %err, "failed to remove sentinel"),
    }
}

enum WatchMessage {
    Event(Event),
    Error(String),
}

impl fmt::Debug for WatchMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WatchMessage::Event(event) => f
                .debug_struct("WatchMessage::Event")
                .field("kind", &event.kind)
                .field("path_count", &event.paths.len())
                .finish(),
            WatchMessage::Error(message) => f
                .debug_struct("WatchMessage::Error")
                .field("message", message)
                .finish(),
        }
    }
}

fn resolve_root(root: PathBuf) -> PathBuf {
    let absolute = if root.is_absolute() {
        root
    } else {
        let cwd = env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
        cwd.join(root)
    };
    // Event paths arrive canonical; match them when the root already exists.
    std::fs::canonicalize(&absolute).unwrap_or(absolute)
}

fn init_watcher(root: &Path, tx: mpsc::Sender<WatchMessage>) -> Result<RecommendedWatcher> {
    let root_display = root.to_path_buf();
    let mut watcher = RecommendedWatcher::new(
        move |res: std::result::Result<Event, notify::Error>| {
            forward(&tx, &root_display, res);
        },
        NotifyConfig::default(),
    )?;

    watcher.watch(root, RecursiveMode::NonRecursive)?;
    Ok(watcher)
}

/// Hand one notify callback result to the control loop. Returns whether it
/// was delivered; a closed or failed channel is logged.
fn forward(
    tx: &mpsc::Sender<WatchMessage>,
    root: &Path,
    res: std::result::Result<Event, notify::Error>,
) -> bool {
    let msg = match res {
        Ok(event) => WatchMessage::Event(event),
        Err(err) => WatchMessage::Error(err.to_string()),
    };
    match tx.blocking_send(msg) {
        Ok(()) => true,
        Err(mpsc::error::SendError(dropped)) => {
            warn!(root = %root.display(), message = ?dropped, "watch channel send failed");
            false
        }
    }
}
