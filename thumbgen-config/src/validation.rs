use std::collections::HashSet;
use std::time::Duration;

use thiserror::Error;

use super::models::Config;

const MIN_SANE_SETTLE_DELAY: Duration = Duration::from_millis(100);

#[derive(Debug, Error)]
pub enum ConfigGuardRailError {
    #[error("at least one preview size must be configured")]
    NoSizes,
    #[error("preview size `{name}` has a zero dimension ({width}x{height})")]
    ZeroDimension { name: String, width: u32, height: u32 },
    #[error("preview size name `{name}` is used more than once")]
    DuplicateSize { name: String },
    #[error("preview size name `{name}` {reason}")]
    InvalidSizeName { name: String, reason: &'static str },
    #[error("JPEG quality {quality} is outside 1..=100")]
    JpegQuality { quality: u8 },
    #[error("ffmpeg timeout must be greater than zero")]
    ZeroTimeout,
    #[error("regeneration concurrency must be at least 1")]
    ZeroConcurrency,
}

#[derive(Debug, Clone)]
pub struct ConfigWarning {
    pub message: String,
    pub hint: Option<String>,
}

#[derive(Debug, Default, Clone)]
pub struct ConfigWarnings {
    pub items: Vec<ConfigWarning>,
}

impl ConfigWarnings {
    pub fn push<S: Into<String>>(&mut self, message: S) {
        self.items.push(ConfigWarning {
            message: message.into(),
            hint: None,
        });
    }

    pub fn push_with_hint<S: Into<String>, H: Into<String>>(&mut self, message: S, hint: H) {
        self.items.push(ConfigWarning {
            message: message.into(),
            hint: Some(hint.into()),
        });
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn extend(&mut self, other: ConfigWarnings) {
        self.items.extend(other.items);
    }
}

pub fn apply_guard_rails(config: &Config) -> Result<ConfigWarnings, ConfigGuardRailError> {
    let mut warnings = ConfigWarnings::default();

    validate_sizes(config)?;

    if !(1..=100).contains(&config.jpeg_quality) {
        return Err(ConfigGuardRailError::JpegQuality {
            quality: config.jpeg_quality,
        });
    }
    if config.ffmpeg.timeout.is_zero() {
        return Err(ConfigGuardRailError::ZeroTimeout);
    }
    if config.regenerate_concurrency == 0 {
        return Err(ConfigGuardRailError::ZeroConcurrency);
    }

    if config.settle_delay < MIN_SANE_SETTLE_DELAY {
        warnings.push_with_hint(
            format!(
                "settle delay of {}ms may read uploads before they are fully written",
                config.settle_delay.as_millis()
            ),
            "Raise THUMBGEN_SETTLE_DELAY_MS to at least 100",
        );
    }

    Ok(warnings)
}

fn validate_sizes(config: &Config) -> Result<(), ConfigGuardRailError> {
    if config.sizes.is_empty() {
        return Err(ConfigGuardRailError::NoSizes);
    }

    let mut seen = HashSet::new();
    for size in &config.sizes {
        if size.width == 0 || size.height == 0 {
            return Err(ConfigGuardRailError::ZeroDimension {
                name: size.name.clone(),
                width: size.width,
                height: size.height,
            });
        }
        check_size_name(&size.name)?;
        if !seen.insert(size.name.as_str()) {
            return Err(ConfigGuardRailError::DuplicateSize {
                name: size.name.clone(),
            });
        }
    }

    Ok(())
}

/// Size names become directory names directly under the upload root.
fn check_size_name(name: &str) -> Result<(), ConfigGuardRailError> {
    let reason = if name.trim().is_empty() {
        Some("is empty")
    } else if name.starts_with('.') {
        Some("must not start with a dot")
    } else if name.contains(['/', '\\']) {
        Some("must not contain path separators")
    } else {
        None
    };

    match reason {
        Some(reason) => Err(ConfigGuardRailError::InvalidSizeName {
            name: name.to_string(),
            reason,
        }),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ConfigMetadata, FfmpegConfig};
    use std::path::PathBuf;
    use thumbgen_core::PreviewSize;

    fn config() -> Config {
        Config {
            upload_root: PathBuf::from("/srv/uploads"),
            sizes: PreviewSize::defaults(),
            jpeg_quality: 80,
            settle_delay: Duration::from_millis(500),
            sentinel_grace: Duration::from_millis(100),
            ffmpeg: FfmpegConfig {
                path: PathBuf::from("ffmpeg"),
                timeout: Duration::from_secs(10),
                video_seek_offset: Duration::from_secs(1),
            },
            regenerate_concurrency: 4,
            metadata: ConfigMetadata::default(),
        }
    }

    #[test]
    fn defaults_pass_cleanly() {
        let warnings = apply_guard_rails(&config()).unwrap();
        assert!(warnings.is_empty());
    }

    #[test]
    fn rejects_bad_sizes() {
        let mut cfg = config();
        cfg.sizes.clear();
        assert!(matches!(apply_guard_rails(&cfg), Err(ConfigGuardRailError::NoSizes)));

        let mut cfg = config();
        cfg.sizes.push(PreviewSize::new(0, 200));
        assert!(matches!(
            apply_guard_rails(&cfg),
            Err(ConfigGuardRailError::ZeroDimension { .. })
        ));

        let mut cfg = config();
        cfg.sizes.push(PreviewSize::named("320x200", 300, 300));
        assert!(matches!(
            apply_guard_rails(&cfg),
            Err(ConfigGuardRailError::DuplicateSize { .. })
        ));
    }

    #[test]
    fn size_names_must_be_plain_directory_names() {
        for name in ["", ".hidden", "..", "a/b", "a\\b"] {
            let mut cfg = config();
            cfg.sizes = vec![PreviewSize::named(name, 10, 10)];
            assert!(
                matches!(
                    apply_guard_rails(&cfg),
                    Err(ConfigGuardRailError::InvalidSizeName { .. })
                ),
                "{name:?}"
            );
        }
    }

    #[test]
    fn rejects_out_of_range_scalars() {
        let mut cfg = config();
        cfg.jpeg_quality = 0;
        assert!(matches!(
            apply_guard_rails(&cfg),
            Err(ConfigGuardRailError::JpegQuality { quality: 0 })
        ));

        let mut cfg = config();
        cfg.jpeg_quality = 101;
        assert!(apply_guard_rails(&cfg).is_err());

        let mut cfg = config();
        cfg.ffmpeg.timeout = Duration::ZERO;
        assert!(matches!(apply_guard_rails(&cfg), Err(ConfigGuardRailError::ZeroTimeout)));

        let mut cfg = config();
        cfg.regenerate_concurrency = 0;
        assert!(matches!(
            apply_guard_rails(&cfg),
            Err(ConfigGuardRailError::ZeroConcurrency)
        ));
    }

    #[test]
    fn tiny_settle_delay_only_warns() {
        let mut cfg = config();
        cfg.settle_delay = Duration::from_millis(20);
        let warnings = apply_guard_rails(&cfg).unwrap();
        assert_eq!(warnings.items.len(), 1);
        assert!(warnings.items[0].hint.is_some());
    }
}
