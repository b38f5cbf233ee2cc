//! Configuration loading for thumbgen.
//!
//! Settings are layered from a TOML file, a `.env` file and the process
//! environment, checked against guard rails, and finally frozen into the
//! core crate's [`thumbgen_core::PipelineConfig`].

pub mod loader;
pub mod models;
pub mod sources;
pub mod validation;

pub use loader::{ConfigLoad, ConfigLoadError, ConfigLoader, ConfigLoaderOptions};
pub use models::{Config, ConfigMetadata, FfmpegConfig};
pub use sources::{EnvConfig, EnvVarError, FileConfig};
pub use validation::{ConfigGuardRailError, ConfigWarning, ConfigWarnings};
