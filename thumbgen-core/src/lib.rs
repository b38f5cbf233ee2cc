//! Core library for thumbgen.
//!
//! Watches an upload directory and keeps a set of fixed-size JPEG previews in
//! step with the originals stored there:
//!
//! - [`media`] classifies originals by extension.
//! - [`extract`] obtains one still frame (in-process decode or `ffmpeg`).
//! - [`render`] writes one preview per configured size.
//! - [`processor`] debounces and coalesces work per base name.
//! - [`gc`] deletes previews whose original is gone.
//! - [`watch`] drives everything from filesystem notifications.
//!
//! All state lives on disk and is re-derivable from the originals.

pub mod config;
pub mod error;
pub mod extract;
pub mod gc;
pub mod layout;
pub mod media;
pub mod processor;
pub mod render;
pub mod watch;

pub use config::{PipelineConfig, TranscoderConfig};
pub use error::{Result, ThumbgenError};
pub use extract::FrameExtractor;
pub use gc::{GarbageCollector, GcReport};
pub use layout::{GC_SENTINEL, PreviewLayout, PreviewSize, REGENERATE_SENTINEL};
pub use media::{MediaKind, classify};
pub use processor::{FileProcessor, ProcessOutcome, SkipReason};
pub use render::{RenderReport, ThumbnailRenderer};
pub use watch::{NoopWatchObserver, PreviewWatcher, WatchAction, WatchObserver, WatcherState};
