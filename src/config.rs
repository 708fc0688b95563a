//! TOML configuration for the query layer and its CLI.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::views::ViewOptions;

/// Environment variable naming the configuration file.
pub const CONFIG_ENV: &str = "CRM_QUERY_CONFIG";

/// Effective configuration.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueryConfig {
    /// Page size used when a request carries no pagination.
    pub default_limit: i64,
    /// Largest accepted page size; larger requests are rejected.
    pub max_limit: Option<i64>,
    /// `tracing` directive used when `RUST_LOG` is unset.
    pub log_filter: String,
    /// Whether string filters and sorts are case-sensitive unless requested otherwise.
    pub case_sensitive_default: bool,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            default_limit: crate::assembler::DEFAULT_PAGE_LIMIT,
            max_limit: None,
            log_filter: "crm_query=info".to_string(),
            case_sensitive_default: false,
        }
    }
}

impl QueryConfig {
    /// Loads from `explicit`, else `$CRM_QUERY_CONFIG`, else the user config
    /// directory. A missing file yields the defaults.
    pub fn load(explicit: Option<PathBuf>) -> Result<Self, ConfigError> {
        let path = explicit
            .or_else(|| env::var_os(CONFIG_ENV).map(PathBuf::from))
            .or_else(default_config_path);
        let config = match path {
            Some(path) if path.exists() => read_file(&path)?,
            _ => QueryConfig::default(),
        };
        config.validate()?;
        Ok(config)
    }

    /// Parses a TOML document.
    pub fn from_toml(raw: &str) -> Result<Self, ConfigError> {
        let config: QueryConfig =
            toml::from_str(raw).map_err(|source| ConfigError::Parse { path: None, source })?;
        config.validate()?;
        Ok(config)
    }

    /// Renders the configuration as TOML.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(|source| ConfigError::Serialize { source })
    }

    /// Rejects limits that could never produce a valid page.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.default_limit <= 0 {
            return Err(ConfigError::Invalid {
                field: "default_limit",
                reason: format!("must be positive, got {}", self.default_limit),
            });
        }
        if let Some(max) = self.max_limit {
            if max < self.default_limit {
                return Err(ConfigError::Invalid {
                    field: "max_limit",
                    reason: format!("{max} is below default_limit {}", self.default_limit),
                });
            }
        }
        Ok(())
    }

    /// Options handed to list views.
    pub fn view_options(&self) -> ViewOptions {
        ViewOptions {
            default_limit: self.default_limit,
            max_limit: self.max_limit,
            case_sensitive_default: self.case_sensitive_default,
        }
    }
}

fn read_file(path: &Path) -> Result<QueryConfig, ConfigError> {
    let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    toml::from_str(&contents).map_err(|source| ConfigError::Parse {
        path: Some(path.to_path_buf()),
        source,
    })
}

/// Problems loading the configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file exists but cannot be read.
    #[error("failed to read config {path}: {source}")]
    Read {
        /// Config file.
        path: PathBuf,
        /// I/O failure.
        source: std::io::Error,
    },
    /// The file is not valid TOML for [`QueryConfig`].
    #[error("failed to parse config{}: {source}", path.as_ref().map(|p| format!(" {}", p.display())).unwrap_or_default())]
    Parse {
        /// Config file, when parsed from disk.
        path: Option<PathBuf>,
        /// TOML failure.
        source: toml::de::Error,
    },
    /// The configuration cannot be rendered.
    #[error("failed to serialize config: {source}")]
    Serialize {
        /// TOML failure.
        source: toml::ser::Error,
    },
    /// A value is out of range.
    #[error("invalid config value for {field}: {reason}")]
    Invalid {
        /// Offending key.
        field: &'static str,
        /// Explanation.
        reason: String,
    },
}

/// `<config dir>/crm-query/config.toml`, when the platform has a config directory.
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|base| base.join("crm-query").join("config.toml"))
}
