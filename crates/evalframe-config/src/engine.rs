//! Engine Configuration (evalframe.toml)
//!
//! The same schema is used for the project file and the user-level file;
//! every field is optional so that files can be layered.

use crate::{ConfigError, ConfigResult};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Default frame stack depth before a push fails with a stack overflow
pub const DEFAULT_MAX_DEPTH: usize = 512;

/// Default number of varlists kept ready in the reuse pool
pub const DEFAULT_MAX_POOLED: usize = 64;

/// Upper bound accepted for `stack.max_depth`
const MAX_DEPTH_LIMIT: usize = 100_000;

/// Engine configuration as written in evalframe.toml
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(deny_unknown_fields)]
pub struct EngineConfig {
    /// Frame stack settings
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stack: Option<StackConfig>,

    /// Varlist reuse pool settings
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pool: Option<PoolConfig>,

    /// Step tracing settings
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trace: Option<TraceConfig>,

    /// Collector cooperation settings
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gc: Option<GcConfig>,
}

/// Frame stack settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(deny_unknown_fields)]
pub struct StackConfig {
    /// Maximum number of frames on the stack (default: 512)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_depth: Option<usize>,
}

/// Varlist reuse pool settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(deny_unknown_fields)]
pub struct PoolConfig {
    /// Maximum number of released varlists kept for reuse (default: 64)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_pooled: Option<usize>,
}

/// Step tracing settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(deny_unknown_fields)]
pub struct TraceConfig {
    /// Log every step through the tracing evaluator (default: false)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub steps: Option<bool>,
}

/// Collector cooperation settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(deny_unknown_fields)]
pub struct GcConfig {
    /// Mark reified variadic arrays as truncated (default: true)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reify_truncated: Option<bool>,
}

/// Fully resolved settings handed to the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineSettings {
    pub max_depth: usize,
    pub max_pooled: usize,
    pub trace_steps: bool,
    pub reify_truncated: bool,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            max_depth: DEFAULT_MAX_DEPTH,
            max_pooled: DEFAULT_MAX_POOLED,
            trace_steps: false,
            reify_truncated: true,
        }
    }
}

impl EngineConfig {
    /// Load engine configuration from a file
    pub fn load_from_file(path: &Path) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ConfigError::NotFound(path.to_path_buf())
            } else {
                ConfigError::IoError(e)
            }
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::TomlParseError {
            file: path.to_path_buf(),
            error: e,
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> ConfigResult<()> {
        if let Some(depth) = self.max_depth() {
            if depth == 0 || depth > MAX_DEPTH_LIMIT {
                return Err(ConfigError::InvalidValue {
                    field: "stack.max_depth".to_string(),
                    reason: format!("must be between 1 and {}, got {}", MAX_DEPTH_LIMIT, depth),
                });
            }
        }

        Ok(())
    }

    pub fn max_depth(&self) -> Option<usize> {
        self.stack.as_ref().and_then(|s| s.max_depth)
    }

    pub fn max_pooled(&self) -> Option<usize> {
        self.pool.as_ref().and_then(|p| p.max_pooled)
    }

    pub fn trace_steps(&self) -> Option<bool> {
        self.trace.as_ref().and_then(|t| t.steps)
    }

    pub fn reify_truncated(&self) -> Option<bool> {
        self.gc.as_ref().and_then(|g| g.reify_truncated)
    }

    /// Merge another configuration into this one
    /// Other config takes precedence field by field
    pub fn merge(&mut self, other: &EngineConfig) {
        if let Some(depth) = other.max_depth() {
            self.stack.get_or_insert_with(Default::default).max_depth = Some(depth);
        }
        if let Some(pooled) = other.max_pooled() {
            self.pool.get_or_insert_with(Default::default).max_pooled = Some(pooled);
        }
        if let Some(steps) = other.trace_steps() {
            self.trace.get_or_insert_with(Default::default).steps = Some(steps);
        }
        if let Some(truncated) = other.reify_truncated() {
            self.gc.get_or_insert_with(Default::default).reify_truncated = Some(truncated);
        }
    }

    /// Resolve every field against the built-in defaults
    pub fn settings(&self) -> EngineSettings {
        let defaults = EngineSettings::default();
        EngineSettings {
            max_depth: self.max_depth().unwrap_or(defaults.max_depth),
            max_pooled: self.max_pooled().unwrap_or(defaults.max_pooled),
            trace_steps: self.trace_steps().unwrap_or(defaults.trace_steps),
            reify_truncated: self.reify_truncated().unwrap_or(defaults.reify_truncated),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_minimal_config() {
        let toml = r#"
[stack]
max_depth = 64
"#;

        let config: EngineConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.max_depth(), Some(64));
        assert_eq!(config.max_pooled(), None);
    }

    #[test]
    fn test_parse_full_config() {
        let toml = r#"
[stack]
max_depth = 2048

[pool]
max_pooled = 8

[trace]
steps = true

[gc]
reify_truncated = false
"#;

        let config: EngineConfig = toml::from_str(toml).unwrap();
        assert!(config.validate().is_ok());
        assert_eq!(
            config.settings(),
            EngineSettings {
                max_depth: 2048,
                max_pooled: 8,
                trace_steps: true,
                reify_truncated: false,
            }
        );
    }

    #[test]
    fn test_unknown_field_rejected() {
        let toml = r#"
[stack]
depth = 10
"#;

        assert!(toml::from_str::<EngineConfig>(toml).is_err());
    }

    #[test]
    fn test_zero_depth_invalid() {
        let config = EngineConfig {
            stack: Some(StackConfig { max_depth: Some(0) }),
            ..Default::default()
        };

        assert!(config.validate().is_err());
    }

    #[test]
    fn test_merge_configs() {
        let mut base = EngineConfig {
            stack: Some(StackConfig {
                max_depth: Some(100),
            }),
            pool: Some(PoolConfig {
                max_pooled: Some(4),
            }),
            ..Default::default()
        };
        let override_config = EngineConfig {
            stack: Some(StackConfig {
                max_depth: Some(200),
            }),
            ..Default::default()
        };

        base.merge(&override_config);
        assert_eq!(base.max_depth(), Some(200));
        assert_eq!(base.max_pooled(), Some(4));
    }

    #[test]
    fn test_empty_config_uses_defaults() {
        assert_eq!(EngineConfig::default().settings(), EngineSettings::default());
    }
}
