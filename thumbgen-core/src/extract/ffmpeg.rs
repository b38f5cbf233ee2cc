use std::ffi::OsString;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use image::DynamicImage;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::debug;

use crate::config::TranscoderConfig;
use crate::error::{Result, ThumbgenError};

/// Upper bound on stderr carried into an error message.
const MAX_STDERR_BYTES: usize = 2048;

/// Arguments for grabbing a single MJPEG frame on stdout.
///
/// `-ss` goes before `-i` so ffmpeg seeks on the container instead of
/// decoding everything up to the offset.
pub(crate) fn frame_args(input: &Path, offset: Option<Duration>) -> Vec<OsString> {
    let mut args: Vec<OsString> = vec![
        "-hide_banner".into(),
        "-loglevel".into(),
        "error".into(),
        "-nostdin".into(),
    ];
    if let Some(offset) = offset {
        args.push("-ss".into());
        args.push(format!("{:.3}", offset.as_secs_f64()).into());
    }
    args.push("-i".into());
    args.push(input.as_os_str().to_owned());
    args.extend(
        ["-frames:v", "1", "-f", "image2pipe", "-vcodec", "mjpeg", "pipe:1"]
            .into_iter()
            .map(OsString::from),
    );
    args
}

/// Run ffmpeg once and decode the frame it writes to stdout.
///
/// The child is killed if it outlives `config.timeout`. A successful exit
/// with empty stdout counts as a failure; ffmpeg does that when asked to
/// seek past the end of a short clip.
pub(crate) async fn grab_frame(
    config: &TranscoderConfig,
    input: &Path,
    offset: Option<Duration>,
) -> Result<DynamicImage> {
    let mut cmd = Command::new(&config.ffmpeg_path);
    cmd.args(frame_args(input, offset))
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    debug!(
        path = %input.display(),
        offset_ms = offset.map(|o| o.as_millis() as u64),
        "spawning ffmpeg frame grab"
    );

    let output = match timeout(config.timeout, cmd.output()).await {
        Ok(Ok(output)) => output,
        Ok(Err(err)) => {
            return Err(ThumbgenError::Transcoder {
                path: input.to_path_buf(),
                status: format!("failed to spawn {}", config.ffmpeg_path.display()),
                stderr: err.to_string(),
            });
        }
        Err(_) => {
            return Err(ThumbgenError::TranscoderTimeout {
                path: input.to_path_buf(),
                timeout: config.timeout,
            });
        }
    };

    if !output.status.success() || output.stdout.is_empty() {
        let status = if output.status.success() {
            "no frame produced".to_string()
        } else {
            output.status.to_string()
        };
        return Err(ThumbgenError::Transcoder {
            path: input.to_path_buf(),
            status,
            stderr: truncate_stderr(&output.stderr),
        });
    }

    let path = input.to_path_buf();
    tokio::task::spawn_blocking(move || {
        image::load_from_memory(&output.stdout)
            .map_err(|source| ThumbgenError::Decode { path, source })
    })
    .await
    .map_err(|err| ThumbgenError::Internal(format!("frame decode task failed: {err}")))?
}

fn truncate_stderr(raw: &[u8]) -> String {
    let text = String::from_utf8_lossy(raw);
    let text = text.trim();
    if text.len() <= MAX_STDERR_BYTES {
        return text.to_string();
    }
    let mut cut = MAX_STDERR_BYTES;
    while !text.is_char_boundary(cut) {
        cut -= 1;
    }
    format!("{}...", &text[..cut])
}
