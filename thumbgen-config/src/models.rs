use std::path::PathBuf;
use std::time::Duration;

use thumbgen_core::{PipelineConfig, PreviewSize, TranscoderConfig};

use crate::sources::{FileConfig, FileFfmpegConfig, FileSizeConfig};

/// Effective configuration after every source has been merged.
#[derive(Debug, Clone)]
pub struct Config {
    pub upload_root: PathBuf,
    pub sizes: Vec<PreviewSize>,
    pub jpeg_quality: u8,
    pub settle_delay: Duration,
    pub sentinel_grace: Duration,
    pub ffmpeg: FfmpegConfig,
    pub regenerate_concurrency: usize,
    pub metadata: ConfigMetadata,
}

#[derive(Debug, Clone)]
pub struct FfmpegConfig {
    pub path: PathBuf,
    pub timeout: Duration,
    pub video_seek_offset: Duration,
}

/// Where the configuration came from.
#[derive(Debug, Clone, Default)]
pub struct ConfigMetadata {
    pub config_path: Option<PathBuf>,
    pub env_file_loaded: bool,
}

impl Config {
    /// Create the upload root if it does not exist yet.
    pub fn ensure_directories(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.upload_root)
    }

    pub fn normalize_paths(&mut self) -> std::io::Result<()> {
        self.upload_root = std::fs::canonicalize(&self.upload_root)?;
        Ok(())
    }

    /// Freeze into the value the core pipeline is built from.
    pub fn pipeline(&self) -> PipelineConfig {
        PipelineConfig {
            upload_root: self.upload_root.clone(),
            sizes: self.sizes.clone(),
            jpeg_quality: self.jpeg_quality,
            settle_delay: self.settle_delay,
            sentinel_grace: self.sentinel_grace,
            transcoder: TranscoderConfig {
                ffmpeg_path: self.ffmpeg.path.clone(),
                timeout: self.ffmpeg.timeout,
                video_seek_offset: self.ffmpeg.video_seek_offset,
            },
            regenerate_concurrency: self.regenerate_concurrency,
        }
    }

    /// Render the effective values back into the file format.
    pub fn to_file_config(&self) -> FileConfig {
        FileConfig {
            upload_dir: Some(self.upload_root.clone()),
            jpeg_quality: Some(self.jpeg_quality),
            settle_delay_ms: Some(millis(self.settle_delay)),
            sentinel_grace_ms: Some(millis(self.sentinel_grace)),
            regenerate_concurrency: Some(self.regenerate_concurrency),
            ffmpeg: FileFfmpegConfig {
                path: Some(self.ffmpeg.path.clone()),
                timeout_ms: Some(millis(self.ffmpeg.timeout)),
                video_seek_ms: Some(millis(self.ffmpeg.video_seek_offset)),
            },
            sizes: Some(self.sizes.iter().map(FileSizeConfig::from).collect()),
        }
    }

    pub fn to_toml(&self) -> Result<String, toml::ser::Error> {
        toml::to_string(&self.to_file_config())
    }
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
