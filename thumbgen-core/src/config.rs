use std::path::PathBuf;
use std::time::Duration;

use crate::layout::{PreviewLayout, PreviewSize};

/// Default JPEG quality for every preview.
pub const DEFAULT_JPEG_QUALITY: u8 = 80;

/// External transcoder settings used for video and HEIC frames.
#[derive(Debug, Clone)]
pub struct TranscoderConfig {
    /// Executable name or path of `ffmpeg`.
    pub ffmpeg_path: PathBuf,
    /// Hard limit for a single invocation; the child is killed past it.
    pub timeout: Duration,
    /// Offset of the representative video frame.
    pub video_seek_offset: Duration,
}

impl Default for TranscoderConfig {
    fn default() -> Self {
        Self {
            ffmpeg_path: PathBuf::from("ffmpeg"),
            timeout: Duration::from_secs(10),
            video_seek_offset: Duration::from_secs(1),
        }
    }
}

/// Immutable process-wide settings, built once at startup and threaded
/// through every component constructor.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub upload_root: PathBuf,
    pub sizes: Vec<PreviewSize>,
    pub jpeg_quality: u8,
    /// Wait after a create/write event before touching the file.
    pub settle_delay: Duration,
    /// Wait after a sentinel appears before acting on it.
    pub sentinel_grace: Duration,
    pub transcoder: TranscoderConfig,
    /// Files processed in parallel during a full regeneration pass.
    pub regenerate_concurrency: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            upload_root: PathBuf::from("./uploads"),
            sizes: PreviewSize::defaults(),
            jpeg_quality: DEFAULT_JPEG_QUALITY,
            settle_delay: Duration::from_millis(500),
            sentinel_grace: Duration::from_millis(100),
            transcoder: TranscoderConfig::default(),
            regenerate_concurrency: 4,
        }
    }
}

impl PipelineConfig {
    pub fn with_root(upload_root: impl Into<PathBuf>) -> Self {
        Self {
            upload_root: upload_root.into(),
            ..Self::default()
        }
    }

    pub fn layout(&self) -> PreviewLayout {
        PreviewLayout::new(self.upload_root.clone(), self.sizes.clone())
    }
}
