//! Configuration Loader
//!
//! Handles loading and merging configuration from multiple sources with proper precedence.

use crate::engine::{EngineConfig, EngineSettings};
use crate::{ConfigError, ConfigResult};
use std::env;
use std::path::{Path, PathBuf};

/// Name of the project-level configuration file
pub const CONFIG_FILE_NAME: &str = "evalframe.toml";

/// Configuration loader
///
/// Loads configuration from multiple sources and merges them with proper precedence:
/// 1. User config (~/.evalframe/config.toml) - lowest priority
/// 2. Project config (./evalframe.toml) - overrides user
/// 3. Environment variables (EVALFRAME_*) - overrides project
pub struct ConfigLoader {
    /// Cached user config path
    user_config_path: Option<PathBuf>,
}

/// Merged configuration result
#[derive(Debug, Clone)]
pub struct Config {
    /// Effective configuration after merging every layer
    pub engine: EngineConfig,

    /// Directory where evalframe.toml was found
    pub project_root: Option<PathBuf>,
}

impl ConfigLoader {
    /// Create a new configuration loader
    pub fn new() -> Self {
        Self {
            user_config_path: None,
        }
    }

    /// Create a loader that reads the user layer from an explicit path
    pub fn with_user_config(path: PathBuf) -> Self {
        Self {
            user_config_path: Some(path),
        }
    }

    /// Load configuration starting from the given directory
    ///
    /// Walks up the directory tree to find evalframe.toml, layers it over the
    /// user config if one exists, then applies environment overrides.
    pub fn load_from_directory(&mut self, start_dir: &Path) -> ConfigResult<Config> {
        let (project_root, project_config) = self.find_project_config(start_dir)?;

        let mut engine = self.load_user_config().unwrap_or_default();
        engine.merge(&project_config);
        let engine = self.apply_env_overrides(engine)?;

        Ok(Config {
            engine,
            project_root,
        })
    }

    /// Load configuration from a specific file
    pub fn load_from_file(&mut self, config_path: &Path) -> ConfigResult<Config> {
        let project_config = EngineConfig::load_from_file(config_path)?;

        let mut engine = self.load_user_config().unwrap_or_default();
        engine.merge(&project_config);
        let engine = self.apply_env_overrides(engine)?;

        Ok(Config {
            engine,
            project_root: config_path.parent().map(|p| p.to_path_buf()),
        })
    }

    /// Find project configuration by walking up directory tree
    fn find_project_config(
        &self,
        start_dir: &Path,
    ) -> ConfigResult<(Option<PathBuf>, EngineConfig)> {
        let mut current = start_dir.to_path_buf();

        loop {
            let config_path = current.join(CONFIG_FILE_NAME);

            if config_path.exists() {
                let config = EngineConfig::load_from_file(&config_path)?;
                return Ok((Some(current), config));
            }

            match current.parent() {
                Some(parent) => current = parent.to_path_buf(),
                None => return Ok((None, EngineConfig::default())),
            }
        }
    }

    /// Load user configuration from ~/.evalframe/config.toml
    fn load_user_config(&mut self) -> ConfigResult<EngineConfig> {
        let path = match &self.user_config_path {
            Some(path) => path.clone(),
            None => {
                let path = Self::user_config_dir()?.join("config.toml");
                self.user_config_path = Some(path.clone());
                path
            }
        };

        // User config is optional
        if !path.exists() {
            return Ok(EngineConfig::default());
        }

        EngineConfig::load_from_file(&path)
    }

    /// Apply environment variable overrides
    ///
    /// Recognized: EVALFRAME_MAX_DEPTH, EVALFRAME_POOL_LIMIT, EVALFRAME_TRACE_STEPS
    fn apply_env_overrides(&self, mut config: EngineConfig) -> ConfigResult<EngineConfig> {
        if let Ok(depth) = env::var("EVALFRAME_MAX_DEPTH") {
            let depth = parse_usize("EVALFRAME_MAX_DEPTH", &depth)?;
            config.stack.get_or_insert_with(Default::default).max_depth = Some(depth);
        }

        if let Ok(limit) = env::var("EVALFRAME_POOL_LIMIT") {
            let limit = parse_usize("EVALFRAME_POOL_LIMIT", &limit)?;
            config.pool.get_or_insert_with(Default::default).max_pooled = Some(limit);
        }

        if let Ok(steps) = env::var("EVALFRAME_TRACE_STEPS") {
            let steps = matches!(steps.to_lowercase().as_str(), "true" | "1" | "yes");
            config.trace.get_or_insert_with(Default::default).steps = Some(steps);
        }

        config.validate()?;
        Ok(config)
    }

    /// Get the user configuration directory (~/.evalframe)
    pub fn user_config_dir() -> ConfigResult<PathBuf> {
        let home = dirs::home_dir().ok_or(ConfigError::HomeNotFound)?;
        Ok(home.join(".evalframe"))
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl Config {
    /// Resolved settings for constructing an engine
    pub fn settings(&self) -> EngineSettings {
        self.engine.settings()
    }

    /// Get the project root directory
    pub fn project_root(&self) -> Option<&Path> {
        self.project_root.as_deref()
    }
}

fn parse_usize(var: &str, raw: &str) -> ConfigResult<usize> {
    raw.trim().parse().map_err(|_| ConfigError::InvalidValue {
        field: var.to_string(),
        reason: format!("expected a non-negative integer, got '{}'", raw),
    })
}
