//! Representative still frame for an original.
//!
//! Images are decoded in-process. Videos and HEIC containers go through an
//! external `ffmpeg` invocation that writes one MJPEG frame to stdout.

mod ffmpeg;

use std::path::Path;

use image::DynamicImage;
use tracing::{debug, warn};

use crate::config::TranscoderConfig;
use crate::error::{Result, ThumbgenError};
use crate::media::MediaKind;

/// Brightest luma value a frame may have and still count as blank.
const BLANK_LUMA_CEILING: u8 = 16;

/// Obtains one decoded frame per original.
#[derive(Debug, Clone)]
pub struct FrameExtractor {
    transcoder: TranscoderConfig,
}

impl FrameExtractor {
    pub fn new(transcoder: TranscoderConfig) -> Self {
        Self { transcoder }
    }

    pub async fn extract(&self, path: &Path, kind: MediaKind) -> Result<DynamicImage> {
        match kind {
            MediaKind::Image => decode_image(path).await,
            MediaKind::Video => self.extract_video(path).await,
            // HEIC containers are stills; there is nothing to seek into.
            MediaKind::Heic => ffmpeg::grab_frame(&self.transcoder, path, None).await,
            MediaKind::Unsupported => Err(ThumbgenError::Internal(format!(
                "no frame source for unsupported file {}",
                path.display()
            ))),
        }
    }

    /// Frame at the configured offset, falling back to the first frame once
    /// when the seek fails or lands on a blank frame.
    async fn extract_video(&self, path: &Path) -> Result<DynamicImage> {
        let offset = self.transcoder.video_seek_offset;

        let seeked = match ffmpeg::grab_frame(&self.transcoder, path, Some(offset)).await {
            Ok(frame) if !is_blank(&frame) => return Ok(frame),
            Ok(frame) => {
                debug!(path = %path.display(), "seeked frame is blank, trying first frame");
                Some(frame)
            }
            Err(err) => {
                warn!(
                    path = %path.display(),
                    error = %err,
                    "frame grab at {:?} failed, retrying at start",
                    offset
                );
                None
            }
        };

        match (ffmpeg::grab_frame(&self.transcoder, path, None).await, seeked) {
            (Ok(first), Some(seeked)) if is_blank(&first) => Ok(seeked),
            (Ok(first), _) => Ok(first),
            (Err(err), Some(seeked)) => {
                debug!(
                    path = %path.display(),
                    error = %err,
                    "first-frame fallback failed, keeping blank seeked frame"
                );
                Ok(seeked)
            }
            (Err(err), None) => Err(err),
        }
    }
}

async fn decode_image(path: &Path) -> Result<DynamicImage> {
    let path = path.to_path_buf();
    tokio::task::spawn_blocking(move || {
        image::open(&path).map_err(|source| ThumbgenError::Decode { path, source })
    })
    .await
    .map_err(|err| ThumbgenError::Internal(format!("image decode task failed: {err}")))?
}

/// True when every sampled pixel is near black.
pub fn is_blank(frame: &DynamicImage) -> bool {
    let sample = frame.thumbnail(32, 32).to_luma8();
    sample.pixels().all(|px| px.0[0] <= BLANK_LUMA_CEILING)
}
