use std::fs::File;
use std::io::{Cursor, Write};
use std::path::{Path, PathBuf};

use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{ColorType, DynamicImage};
use tracing::{debug, warn};

use crate::error::{Result, ThumbgenError};
use crate::layout::{PreviewLayout, PreviewSize};

/// Outcome of rendering one frame into every configured size.
#[derive(Debug, Default)]
pub struct RenderReport {
    pub written: Vec<PathBuf>,
    pub failed: Vec<(String, ThumbgenError)>,
}

impl RenderReport {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Writes one JPEG per configured size for a decoded frame.
#[derive(Debug, Clone)]
pub struct ThumbnailRenderer {
    layout: PreviewLayout,
    quality: u8,
}

impl ThumbnailRenderer {
    pub fn new(layout: PreviewLayout, quality: u8) -> Self {
        Self {
            layout,
            quality: quality.clamp(1, 100),
        }
    }

    /// Render every size. Sizes are independent: one failing does not stop
    /// the others, and a failed size never leaves a partial file behind.
    pub fn render(&self, frame: &DynamicImage, original_name: &str) -> RenderReport {
        let mut report = RenderReport::default();

        for size in self.layout.sizes() {
            let target = self.layout.preview_path(size, original_name);
            match self.render_size(frame, size, &target) {
                Ok(()) => {
                    debug!(path = %target.display(), size = %size.name, "preview written");
                    report.written.push(target);
                }
                Err(err) => {
                    warn!(
                        path = %target.display(),
                        size = %size.name,
                        error = %err,
                        "failed to write preview"
                    );
                    report.failed.push((size.name.clone(), err));
                }
            }
        }

        report
    }

    fn render_size(&self, frame: &DynamicImage, size: &PreviewSize, target: &Path) -> Result<()> {
        let bytes = encode_preview(frame, size, self.quality).map_err(|source| {
            ThumbgenError::Encode {
                path: target.to_path_buf(),
                source,
            }
        })?;
        atomic_write(target, &bytes).map_err(|source| ThumbgenError::Write {
            path: target.to_path_buf(),
            source,
        })
    }
}

/// Largest `(w, h)` that fits inside `max_w`x`max_h` with the source aspect
/// ratio. Sources already inside the box keep their size.
pub fn fit_dimensions(src_w: u32, src_h: u32, max_w: u32, max_h: u32) -> (u32, u32) {
    if src_w == 0 || src_h == 0 {
        return (0, 0);
    }
    if src_w <= max_w && src_h <= max_h {
        return (src_w, src_h);
    }

    let scale = f64::min(
        max_w as f64 / src_w as f64,
        max_h as f64 / src_h as f64,
    );
    let w = ((src_w as f64 * scale).round() as u32).clamp(1, max_w.max(1));
    let h = ((src_h as f64 * scale).round() as u32).clamp(1, max_h.max(1));
    (w, h)
}

/// Resize into the bounding box and encode as RGB JPEG in memory.
pub fn encode_preview(
    frame: &DynamicImage,
    size: &PreviewSize,
    quality: u8,
) -> std::result::Result<Vec<u8>, image::ImageError> {
    let (w, h) = fit_dimensions(frame.width(), frame.height(), size.width, size.height);
    let rgb = if (w, h) == (frame.width(), frame.height()) {
        frame.to_rgb8()
    } else {
        frame.resize_exact(w, h, FilterType::Lanczos3).to_rgb8()
    };

    let mut out = Cursor::new(Vec::new());
    let mut encoder = JpegEncoder::new_with_quality(&mut out, quality);
    encoder.encode(rgb.as_raw(), rgb.width(), rgb.height(), ColorType::Rgb8.into())?;
    Ok(out.into_inner())
}

/// Write `bytes` to a hidden sibling temp file, then rename it over `target`.
fn atomic_write(target: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let parent = target.parent().ok_or_else(|| {
        std::io::Error::new(std::io::ErrorKind::InvalidInput, "preview path has no parent")
    })?;
    let file_name = target
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or("preview.jpg");
    let tmp_path = parent.join(format!(".{file_name}.{}.tmp", uuid::Uuid::new_v4().simple()));

    let written = (|| {
        let mut file = File::create(&tmp_path)?;
        file.write_all(bytes)?;
        file.flush()?;
        file.sync_all()?;
        std::fs::rename(&tmp_path, target)
    })();

    if written.is_err() {
        let _ = std::fs::remove_file(&tmp_path);
    }
    written
}
