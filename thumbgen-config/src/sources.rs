use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;
use thumbgen_core::PreviewSize;

/// Raw configuration as defined in a TOML file.
#[derive(Debug, Default, Clone, Deserialize, Serialize)]
#[serde(rename_all = "snake_case", deny_unknown_fields)]
pub struct FileConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub upload_dir: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub jpeg_quality: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub settle_delay_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sentinel_grace_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub regenerate_concurrency: Option<usize>,
    #[serde(default)]
    pub ffmpeg: FileFfmpegConfig,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sizes: Option<Vec<FileSizeConfig>>,
}

#[derive(Debug, Default, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct FileFfmpegConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub video_seek_ms: Option<u64>,
}

/// One `[[sizes]]` table. `name` defaults to `WIDTHxHEIGHT`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct FileSizeConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub width: u32,
    pub height: u32,
}

impl FileSizeConfig {
    pub fn into_size(self) -> PreviewSize {
        match self.name {
            Some(name) => PreviewSize::named(name, self.width, self.height),
            None => PreviewSize::new(self.width, self.height),
        }
    }
}

impl From<&PreviewSize> for FileSizeConfig {
    fn from(size: &PreviewSize) -> Self {
        Self {
            name: Some(size.name.clone()),
            width: size.width,
            height: size.height,
        }
    }
}

/// An environment variable was set to something unusable.
#[derive(Debug, Error)]
#[error("invalid value {value:?} for {name}: {reason}")]
pub struct EnvVarError {
    pub name: &'static str,
    pub value: String,
    pub reason: String,
}

/// Environment-derived configuration values.
#[derive(Debug, Default, Clone)]
pub struct EnvConfig {
    pub config_path: Option<PathBuf>,
    pub upload_dir: Option<PathBuf>,
    pub sizes: Option<Vec<PreviewSize>>,
    pub jpeg_quality: Option<u8>,
    pub settle_delay_ms: Option<u64>,
    pub sentinel_grace_ms: Option<u64>,
    pub ffmpeg_path: Option<PathBuf>,
    pub ffmpeg_timeout_ms: Option<u64>,
    pub video_seek_ms: Option<u64>,
    pub regenerate_concurrency: Option<usize>,
}

impl EnvConfig {
    /// Read the process environment.
    pub fn gather() -> Result<Self, EnvVarError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build from an arbitrary variable source. Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, EnvVarError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(name).filter(|raw| !raw.trim().is_empty());

        let mut env_config = Self {
            config_path: var("THUMBGEN_CONFIG").map(PathBuf::from),
            upload_dir: var("UPLOAD_DIR").map(PathBuf::from),
            ffmpeg_path: var("FFMPEG_PATH").map(PathBuf::from),
            ..Self::default()
        };

        env_config.jpeg_quality = parse_number(&var, "THUMBGEN_JPEG_QUALITY")?;
        env_config.settle_delay_ms = parse_number(&var, "THUMBGEN_SETTLE_DELAY_MS")?;
        env_config.sentinel_grace_ms = parse_number(&var, "THUMBGEN_SENTINEL_GRACE_MS")?;
        env_config.ffmpeg_timeout_ms = parse_number(&var, "THUMBGEN_FFMPEG_TIMEOUT_MS")?;
        env_config.video_seek_ms = parse_number(&var, "THUMBGEN_VIDEO_SEEK_MS")?;
        env_config.regenerate_concurrency =
            parse_number(&var, "THUMBGEN_REGENERATE_CONCURRENCY")?;

        // The JSON form wins because it is the only one that can rename sizes.
        env_config.sizes = match var("THUMBGEN_SIZES_JSON") {
            Some(raw) => Some(parse_sizes_json("THUMBGEN_SIZES_JSON", &raw)?),
            None => var("THUMBGEN_SIZES")
                .map(|raw| parse_sizes_csv("THUMBGEN_SIZES", &raw))
                .transpose()?,
        };

        Ok(env_config)
    }
}

fn parse_number<T, F>(var: &F, name: &'static str) -> Result<Option<T>, EnvVarError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    var(name)
        .map(|raw| {
            raw.trim().parse::<T>().map_err(|err| EnvVarError {
                name,
                value: raw.clone(),
                reason: err.to_string(),
            })
        })
        .transpose()
}

fn parse_sizes_csv(name: &'static str, raw: &str) -> Result<Vec<PreviewSize>, EnvVarError> {
    raw.split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(|part| {
            PreviewSize::parse(part).ok_or_else(|| EnvVarError {
                name,
                value: raw.to_string(),
                reason: format!("`{part}` is not WIDTHxHEIGHT"),
            })
        })
        .collect()
}

fn parse_sizes_json(name: &'static str, raw: &str) -> Result<Vec<PreviewSize>, EnvVarError> {
    let sizes: Vec<FileSizeConfig> = serde_json::from_str(raw).map_err(|err| EnvVarError {
        name,
        value: raw.to_string(),
        reason: err.to_string(),
    })?;
    Ok(sizes.into_iter().map(FileSizeConfig::into_size).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> Result<EnvConfig, EnvVarError> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        EnvConfig::from_lookup(|name| vars.get(name).cloned())
    }

    #[test]
    fn empty_environment_sets_nothing() {
        let cfg = env(&[]).unwrap();
        assert!(cfg.upload_dir.is_none());
        assert!(cfg.sizes.is_none());
        assert!(cfg.jpeg_quality.is_none());
    }

    #[test]
    fn reads_upload_dir_and_numbers() {
        let cfg = env(&[
            ("UPLOAD_DIR", "/srv/uploads"),
            ("THUMBGEN_JPEG_QUALITY", "90"),
            ("THUMBGEN_SETTLE_DELAY_MS", " 250 "),
            ("THUMBGEN_REGENERATE_CONCURRENCY", "8"),
            ("FFMPEG_PATH", "/opt/ffmpeg/bin/ffmpeg"),
        ])
        .unwrap();
        assert_eq!(cfg.upload_dir, Some(PathBuf::from("/srv/uploads")));
        assert_eq!(cfg.jpeg_quality, Some(90));
        assert_eq!(cfg.settle_delay_ms, Some(250));
        assert_eq!(cfg.regenerate_concurrency, Some(8));
        assert_eq!(cfg.ffmpeg_path, Some(PathBuf::from("/opt/ffmpeg/bin/ffmpeg")));
    }

    #[test]
    fn blank_values_count_as_unset() {
        let cfg = env(&[("UPLOAD_DIR", "  "), ("THUMBGEN_JPEG_QUALITY", "")]).unwrap();
        assert!(cfg.upload_dir.is_none());
        assert!(cfg.jpeg_quality.is_none());
    }

    #[test]
    fn bad_numbers_name_the_variable() {
        let err = env(&[("THUMBGEN_JPEG_QUALITY", "high")]).unwrap_err();
        assert_eq!(err.name, "THUMBGEN_JPEG_QUALITY");
        assert_eq!(err.value, "high");

        let err = env(&[("THUMBGEN_JPEG_QUALITY", "300")]).unwrap_err();
        assert_eq!(err.name, "THUMBGEN_JPEG_QUALITY");
    }

    #[test]
    fn sizes_from_shorthand_list() {
        let cfg = env(&[("THUMBGEN_SIZES", "320x200, 1280X720,")]).unwrap();
        assert_eq!(
            cfg.sizes,
            Some(vec![PreviewSize::new(320, 200), PreviewSize::new(1280, 720)])
        );

        let err = env(&[("THUMBGEN_SIZES", "320x200,large")]).unwrap_err();
        assert!(err.reason.contains("large"), "{err}");
    }

    #[test]
    fn sizes_json_takes_precedence_and_allows_names() {
        let cfg = env(&[
            ("THUMBGEN_SIZES", "320x200"),
            (
                "THUMBGEN_SIZES_JSON",
                r#"[{"name":"small","width":160,"height":100},{"width":640,"height":400}]"#,
            ),
        ])
        .unwrap();
        assert_eq!(
            cfg.sizes,
            Some(vec![
                PreviewSize::named("small", 160, 100),
                PreviewSize::new(640, 400),
            ])
        );

        assert!(env(&[("THUMBGEN_SIZES_JSON", "{not json")]).is_err());
    }
}
