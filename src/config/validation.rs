//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (grace period > 0, body limit > 0)
//! - Check the tool path is absolute so no `PATH` lookup happens
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ServiceConfig → Result<(), Vec<ValidationError>>
//! - A missing bind address is not a validation error; the lifecycle reports
//!   it as a listener startup failure
//! - Bind addresses are only checked for shape; hostnames resolve at bind time

use std::net::SocketAddr;

use thiserror::Error;

use crate::config::schema::ServiceConfig;

/// A single semantic problem in the configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{field}: {message}")]
pub struct ValidationError {
    pub field: &'static str,
    pub message: String,
}

impl ValidationError {
    fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

/// Validate a fully merged configuration.
pub fn validate_config(config: &ServiceConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if let Some(addr) = &config.listener.bind_address {
        if !has_valid_port(addr) {
            errors.push(ValidationError::new(
                "listener.bind_address",
                format!("'{}' is not a valid host:port address", addr),
            ));
        }
    }

    if config.listener.max_body_size == 0 {
        errors.push(ValidationError::new("listener.max_body_size", "must be greater than 0"));
    }

    if !config.pipeline.tool_path.is_absolute() {
        errors.push(ValidationError::new(
            "pipeline.tool_path",
            format!("'{}' must be an absolute path", config.pipeline.tool_path.display()),
        ));
    }

    if config.shutdown.grace_period_secs == 0 {
        errors.push(ValidationError::new("shutdown.grace_period_secs", "must be greater than 0"));
    }

    if let Some(addr) = &config.observability.metrics_address {
        if addr.parse::<SocketAddr>().is_err() {
            errors.push(ValidationError::new(
                "observability.metrics_address",
                format!("'{}' is not a valid host:port socket address", addr),
            ));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// `host:port` with a numeric port. The host may be a name, it is resolved
/// when the listener binds.
fn has_valid_port(addr: &str) -> bool {
    match addr.rsplit_once(':') {
        Some((host, port)) => !host.is_empty() && port.parse::<u16>().is_ok(),
        None => false,
    }
}
