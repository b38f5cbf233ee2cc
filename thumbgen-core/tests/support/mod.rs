#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use image::{Rgb, RgbImage};
use thumbgen_core::{PipelineConfig, PreviewSize, TranscoderConfig};

/// Pipeline settings with short delays so tests stay fast.
pub fn fast_config(root: &Path) -> PipelineConfig {
    PipelineConfig {
        sizes: vec![PreviewSize::new(320, 200), PreviewSize::new(800, 600)],
        settle_delay: Duration::from_millis(30),
        sentinel_grace: Duration::from_millis(10),
        regenerate_concurrency: 2,
        ..PipelineConfig::with_root(root)
    }
}

/// Non-blank test card of the given size.
pub fn test_card(w: u32, h: u32) -> RgbImage {
    RgbImage::from_fn(w, h, |x, y| {
        Rgb([
            (x * 255 / w.max(1)) as u8,
            (y * 255 / h.max(1)) as u8,
            if (x / 16 + y / 16) % 2 == 0 { 220 } else { 40 },
        ])
    })
}

pub fn write_image(path: &Path, w: u32, h: u32) {
    test_card(w, h).save(path).expect("write test image");
}

/// Poll `check` until it holds or `limit` elapses.
pub async fn wait_for(limit: Duration, mut check: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + limit;
    while Instant::now() < deadline {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
    check()
}

/// Behaviour of the stand-in `ffmpeg` script.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FakeFfmpeg {
    /// Always prints the prepared frame.
    Ok,
    /// Fails whenever asked to seek, succeeds on the first frame.
    FailSeek,
    /// Exits 0 without output when asked to seek (short clip).
    EmptySeek,
    /// Prints an all-black frame when asked to seek, the prepared frame
    /// otherwise.
    BlackSeek,
    /// Prints an all-black frame when asked to seek, fails otherwise.
    BlackSeekFailFirst,
    /// Fails every invocation.
    FailAll,
    /// Never finishes within any reasonable timeout.
    Hang,
}

/// A shell script standing in for ffmpeg, plus its invocation log.
#[cfg(unix)]
pub struct FakeTranscoder {
    pub binary: PathBuf,
    pub log: PathBuf,
}

#[cfg(unix)]
impl FakeTranscoder {
    pub fn install(dir: &Path, mode: FakeFfmpeg) -> Self {
        use std::os::unix::fs::PermissionsExt;

        let frame = dir.join("frame.jpg");
        test_card(640, 360).save(&frame).expect("write fake frame");
        let black = dir.join("black.jpg");
        RgbImage::from_pixel(640, 360, Rgb([0, 0, 0]))
            .save(&black)
            .expect("write black frame");
        let log = dir.join("ffmpeg.log");
        let binary = dir.join("fake-ffmpeg");

        let on_seek = match mode {
            FakeFfmpeg::FailSeek => "echo 'seek failed' >&2; exit 1".to_string(),
            FakeFfmpeg::EmptySeek => "exit 0".to_string(),
            FakeFfmpeg::BlackSeek | FakeFfmpeg::BlackSeekFailFirst => {
                format!("cat '{}'; exit 0", black.display())
            }
            _ => ":".to_string(),
        };
        let body = match mode {
            FakeFfmpeg::FailAll | FakeFfmpeg::BlackSeekFailFirst => {
                "echo 'invalid data found' >&2; exit 1".to_string()
            }
            FakeFfmpeg::Hang => "exec sleep 30".to_string(),
            _ => format!("cat '{}'", frame.display()),
        };
        let script = format!(
            "#!/bin/sh\n\
             echo \"$*\" >> '{log}'\n\
             for arg in \"$@\"; do\n\
             \tif [ \"$arg\" = \"-ss\" ]; then {on_seek}; fi\n\
             done\n\
             {body}\n",
            log = log.display(),
        );

        std::fs::write(&binary, script).expect("write fake ffmpeg");
        std::fs::set_permissions(&binary, std::fs::Permissions::from_mode(0o755))
            .expect("chmod fake ffmpeg");

        Self { binary, log }
    }

    pub fn transcoder(&self, timeout: Duration) -> TranscoderConfig {
        TranscoderConfig {
            ffmpeg_path: self.binary.clone(),
            timeout,
            video_seek_offset: Duration::from_secs(1),
        }
    }

    /// Argument lines of every invocation so far.
    pub fn invocations(&self) -> Vec<String> {
        std::fs::read_to_string(&self.log)
            .map(|raw| raw.lines().map(str::to_string).collect())
            .unwrap_or_default()
    }
}
