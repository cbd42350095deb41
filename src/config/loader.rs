//! Configuration loading from disk and process overrides.

use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::config::schema::{LogFormat, ServiceConfig};
use crate::config::validation::{validate_config, ValidationError};

/// Error type for configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error reading {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation failed: {}", join_errors(.0))]
    Validation(Vec<ValidationError>),
}

fn join_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Values supplied by the process (CLI flags or environment) that win over
/// the file and the defaults.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub config_file: Option<PathBuf>,
    pub listen_address: Option<String>,
    pub log_level: Option<String>,
    pub log_format: Option<LogFormat>,
    pub tool_path: Option<PathBuf>,
    pub tool_timeout_secs: Option<u64>,
    pub shutdown_grace_secs: Option<u64>,
    pub metrics_address: Option<String>,
}

/// Parse a TOML file. Missing sections and keys fall back to defaults.
fn read_config_file(path: &Path) -> Result<ServiceConfig, ConfigError> {
    let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(toml::from_str(&content)?)
}

/// Build the effective configuration: defaults, then the optional file,
/// then overrides. Validation runs once on the merged result.
pub fn load_config(overrides: &ConfigOverrides) -> Result<ServiceConfig, ConfigError> {
    let mut config = match &overrides.config_file {
        Some(path) => read_config_file(path)?,
        None => ServiceConfig::default(),
    };

    apply_overrides(&mut config, overrides);
    if let Some(addr) = config.listener.bind_address.take() {
        config.listener.bind_address = Some(expand_listen_address(addr));
    }

    validate_config(&config).map_err(ConfigError::Validation)?;

    Ok(config)
}

/// `:8080` listens on every interface.
fn expand_listen_address(addr: String) -> String {
    if addr.starts_with(':') {
        format!("0.0.0.0{}", addr)
    } else {
        addr
    }
}

fn apply_overrides(config: &mut ServiceConfig, overrides: &ConfigOverrides) {
    // Empty strings count as unset, the way an exported-but-blank variable reads.
    if let Some(addr) = overrides.listen_address.as_ref().filter(|a| !a.is_empty()) {
        config.listener.bind_address = Some(addr.clone());
    }
    if let Some(level) = overrides.log_level.as_ref().filter(|l| !l.is_empty()) {
        config.observability.log_level = level.clone();
    }
    if let Some(format) = overrides.log_format {
        config.observability.log_format = format;
    }
    if let Some(path) = &overrides.tool_path {
        config.pipeline.tool_path = path.clone();
    }
    if let Some(secs) = overrides.tool_timeout_secs {
        config.pipeline.timeout_secs = secs;
    }
    if let Some(secs) = overrides.shutdown_grace_secs {
        config.shutdown.grace_period_secs = secs;
    }
    if let Some(addr) = overrides.metrics_address.as_ref().filter(|a| !a.is_empty()) {
        config.observability.metrics_address = Some(addr.clone());
    }
}
