use once_cell::sync::Lazy;
use std::{
    fs,
    path::{Path, PathBuf},
    time::Duration,
};
use thiserror::Error;
use thumbgen_core::{PreviewSize, config::DEFAULT_JPEG_QUALITY};
use tracing::debug;

use super::{
    models::{Config, ConfigMetadata, FfmpegConfig},
    sources::{EnvConfig, EnvVarError, FileConfig, FileSizeConfig},
    validation::{self, ConfigGuardRailError, ConfigWarnings},
};

static DEFAULT_CONFIG_LOCATIONS: Lazy<Vec<PathBuf>> = Lazy::new(|| {
    vec![
        PathBuf::from("thumbgen.toml"),
        PathBuf::from("config/thumbgen.toml"),
    ]
});

const DEFAULT_UPLOAD_DIR: &str = "./uploads";
const DEFAULT_SETTLE_DELAY_MS: u64 = 500;
const DEFAULT_SENTINEL_GRACE_MS: u64 = 100;
const DEFAULT_FFMPEG_TIMEOUT_MS: u64 = 10_000;
const DEFAULT_VIDEO_SEEK_MS: u64 = 1_000;

#[derive(Debug, Default, Clone)]
pub struct ConfigLoaderOptions {
    pub config_path: Option<PathBuf>,
    pub env_file: Option<PathBuf>,
    /// Command-line override; beats every other source.
    pub upload_dir: Option<PathBuf>,
}

#[derive(Debug, Default)]
pub struct ConfigLoader {
    options: ConfigLoaderOptions,
}

impl ConfigLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_options(options: ConfigLoaderOptions) -> Self {
        Self { options }
    }

    pub fn with_config_path<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.options.config_path = Some(path.into());
        self
    }

    pub fn with_upload_dir<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.options.upload_dir = Some(path.into());
        self
    }

    /// Load `.env`, read the process environment, and merge everything.
    pub fn load(&self) -> Result<ConfigLoad, ConfigLoadError> {
        let env_file_loaded = match &self.options.env_file {
            Some(path) => dotenvy::from_path(path).map(|_| true).or_else(
                |err| match err {
                    dotenvy::Error::Io(_) => Ok(false),
                    _ => Err(err),
                },
            )?,
            None => dotenvy::dotenv().map(|_| true).or_else(|err| match err {
                dotenvy::Error::Io(_) => Ok(false),
                _ => Err(err),
            })?,
        };

        let env_config = EnvConfig::gather()?;
        self.load_with_env(env_config, env_file_loaded)
    }

    /// Merge an already gathered environment with the file and defaults.
    pub fn load_with_env(
        &self,
        env_config: EnvConfig,
        env_file_loaded: bool,
    ) -> Result<ConfigLoad, ConfigLoadError> {
        let (file_config, config_path, config_present) = self.load_file_config(&env_config)?;

        let (config, warnings) = self.compose_config(
            file_config,
            env_config,
            config_path,
            env_file_loaded,
            config_present,
        )?;

        Ok(ConfigLoad { config, warnings })
    }

    fn load_file_config(
        &self,
        env_config: &EnvConfig,
    ) -> Result<(Option<FileConfig>, Option<PathBuf>, bool), ConfigLoadError> {
        let mut source = ConfigPathSource::default();

        if let Some(explicit) = &self.options.config_path {
            source.explicit = Some(explicit.clone());
        } else if let Some(from_env) = &env_config.config_path {
            source.env = Some(from_env.clone());
        }

        if source.is_empty() {
            source.default = DEFAULT_CONFIG_LOCATIONS
                .iter()
                .find(|candidate| candidate.exists())
                .cloned();
        }

        let Some((path, provenance)) = source.resolved_path() else {
            return Ok((None, None, false));
        };

        if !path.exists() {
            if provenance.is_explicit() {
                return Err(ConfigLoadError::MissingConfig { path });
            }
            return Ok((None, None, false));
        }

        debug!(path = %path.display(), ?provenance, "reading configuration file");
        let contents = fs::read_to_string(&path).map_err(|err| ConfigLoadError::Io {
            path: path.clone(),
            source: err,
        })?;
        let file_config: FileConfig =
            toml::from_str(&contents).map_err(|err| ConfigLoadError::Parse {
                path: path.clone(),
                source: err,
            })?;

        Ok((Some(file_config), Some(path), true))
    }

    fn compose_config(
        &self,
        file_config: Option<FileConfig>,
        env: EnvConfig,
        config_path: Option<PathBuf>,
        env_file_loaded: bool,
        config_present: bool,
    ) -> Result<(Config, ConfigWarnings), ConfigLoadError> {
        let mut warnings = ConfigWarnings::default();

        if !config_present {
            warnings.push_with_hint(
                "No thumbgen.toml detected; using environment variables and defaults",
                "Create thumbgen.toml or pass --config to pin sizes and timeouts",
            );
        }

        let FileConfig {
            upload_dir: file_upload_dir,
            jpeg_quality: file_jpeg_quality,
            settle_delay_ms: file_settle_delay_ms,
            sentinel_grace_ms: file_sentinel_grace_ms,
            regenerate_concurrency: file_regenerate_concurrency,
            ffmpeg: file_ffmpeg,
            sizes: file_sizes,
        } = file_config.unwrap_or_default();

        let upload_root = self
            .options
            .upload_dir
            .clone()
            .or(env.upload_dir)
            .or(file_upload_dir.map(|dir| relative_to(config_path.as_deref(), dir)))
            .unwrap_or_else(|| PathBuf::from(DEFAULT_UPLOAD_DIR));

        let sizes = env
            .sizes
            .or_else(|| {
                file_sizes.map(|sizes| sizes.into_iter().map(FileSizeConfig::into_size).collect())
            })
            .unwrap_or_else(PreviewSize::defaults);

        let ffmpeg = FfmpegConfig {
            path: env
                .ffmpeg_path
                .or(file_ffmpeg.path)
                .unwrap_or_else(|| PathBuf::from("ffmpeg")),
            timeout: Duration::from_millis(
                env.ffmpeg_timeout_ms
                    .or(file_ffmpeg.timeout_ms)
                    .unwrap_or(DEFAULT_FFMPEG_TIMEOUT_MS),
            ),
            video_seek_offset: Duration::from_millis(
                env.video_seek_ms
                    .or(file_ffmpeg.video_seek_ms)
                    .unwrap_or(DEFAULT_VIDEO_SEEK_MS),
            ),
        };

        let mut config = Config {
            upload_root,
            sizes,
            jpeg_quality: env
                .jpeg_quality
                .or(file_jpeg_quality)
                .unwrap_or(DEFAULT_JPEG_QUALITY),
            settle_delay: Duration::from_millis(
                env.settle_delay_ms
                    .or(file_settle_delay_ms)
                    .unwrap_or(DEFAULT_SETTLE_DELAY_MS),
            ),
            sentinel_grace: Duration::from_millis(
                env.sentinel_grace_ms
                    .or(file_sentinel_grace_ms)
                    .unwrap_or(DEFAULT_SENTINEL_GRACE_MS),
            ),
            ffmpeg,
            regenerate_concurrency: env
                .regenerate_concurrency
                .or(file_regenerate_concurrency)
                .unwrap_or_else(num_cpus::get),
            metadata: ConfigMetadata {
                config_path,
                env_file_loaded,
            },
        };

        let guard_warnings = validation::apply_guard_rails(&config)?;
        warnings.extend(guard_warnings);

        config
            .ensure_directories()
            .map_err(|source| ConfigLoadError::Filesystem {
                path: config.upload_root.clone(),
                source,
            })?;
        config
            .normalize_paths()
            .map_err(|source| ConfigLoadError::Filesystem {
                path: config.upload_root.clone(),
                source,
            })?;

        Ok((config, warnings))
    }
}

/// Relative paths inside a config file are resolved against the file's
/// directory, not the working directory.
fn relative_to(config_path: Option<&Path>, dir: PathBuf) -> PathBuf {
    match config_path.and_then(Path::parent) {
        Some(base) if dir.is_relative() && !base.as_os_str().is_empty() => base.join(dir),
        _ => dir,
    }
}

#[derive(Debug, Error)]
pub enum ConfigLoadError {
    #[error("configuration file missing: {path}")]
    MissingConfig { path: PathBuf },
    #[error("failed to read configuration {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse configuration {path}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error(transparent)]
    Env(#[from] EnvVarError),
    #[error("cannot prepare upload directory {path}")]
    Filesystem {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error(transparent)]
    GuardRail(#[from] ConfigGuardRailError),
    #[error(transparent)]
    EnvFile(#[from] dotenvy::Error),
}

#[derive(Debug, Default)]
struct ConfigPathSource {
    explicit: Option<PathBuf>,
    env: Option<PathBuf>,
    default: Option<PathBuf>,
}

impl ConfigPathSource {
    fn is_empty(&self) -> bool {
        self.explicit.is_none() && self.env.is_none() && self.default.is_none()
    }

    fn resolved_path(&self) -> Option<(PathBuf, ConfigPathProvenance)> {
        if let Some(path) = &self.explicit {
            return Some((path.clone(), ConfigPathProvenance::Explicit));
        }
        if let Some(path) = &self.env {
            return Some((path.clone(), ConfigPathProvenance::Env));
        }
        if let Some(path) = &self.default {
            return Some((path.clone(), ConfigPathProvenance::Default));
        }
        None
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ConfigPathProvenance {
    Explicit,
    Env,
    Default,
}

impl ConfigPathProvenance {
    fn is_explicit(self) -> bool {
        matches!(
            self,
            ConfigPathProvenance::Explicit | ConfigPathProvenance::Env
        )
    }
}

#[derive(Debug)]
pub struct ConfigLoad {
    pub config: Config,
    pub warnings: ConfigWarnings,
}
