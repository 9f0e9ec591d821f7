//! Evalframe Configuration
//!
//! Resolves the tunables of the evaluation frame engine:
//! - Frame stack depth limit
//! - Size of the call-local storage reuse pool
//! - Step tracing
//! - Collector behavior when it meets variadic frames
//!
//! # Configuration Hierarchy
//!
//! Configuration is loaded and merged in the following order (later overrides earlier):
//! 1. User config (~/.evalframe/config.toml)
//! 2. Project config (./evalframe.toml, found by walking up from a directory)
//! 3. Environment variables (EVALFRAME_*)
//!
//! # Example
//!
//! ```no_run
//! use evalframe_config::ConfigLoader;
//! use std::path::Path;
//!
//! let mut loader = ConfigLoader::new();
//! let config = loader.load_from_directory(Path::new(".")).unwrap();
//! let settings = config.settings();
//! assert!(settings.max_depth > 0);
//! ```

pub mod engine;
pub mod loader;

use std::path::PathBuf;
use thiserror::Error;

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Configuration file not found: {0}")]
    NotFound(PathBuf),

    #[error("Failed to read configuration file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Invalid TOML syntax in {file}: {error}")]
    TomlParseError {
        file: PathBuf,
        error: toml::de::Error,
    },

    #[error("Invalid value for '{field}': {reason}")]
    InvalidValue { field: String, reason: String },

    #[error("Home directory not found")]
    HomeNotFound,
}

/// Result type for configuration operations
pub type ConfigResult<T> = Result<T, ConfigError>;

// Re-export main types
pub use engine::{EngineConfig, EngineSettings};
pub use loader::{Config, ConfigLoader};
