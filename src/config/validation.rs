//! Configuration validation.
//!
//! Semantic checks serde cannot express. Returns all failures, not just the
//! first, so an operator can fix a config file in one pass.

use std::net::IpAddr;

use crate::config::schema::HealthgateConfig;

/// A single semantic validation failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl ValidationError {
    fn new(field: &str, message: impl Into<String>) -> Self {
        Self {
            field: field.to_string(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Validate semantic constraints on a loaded configuration.
pub fn validate_config(config: &HealthgateConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.ports.is_empty() {
        errors.push(ValidationError::new(
            "listener.ports",
            "at least one listen port is required",
        ));
    }
    if config.listener.bind_address.parse::<IpAddr>().is_err() {
        errors.push(ValidationError::new(
            "listener.bind_address",
            format!("not an IP address: {}", config.listener.bind_address),
        ));
    }
    if !config.cache.ttl_secs.is_finite() || config.cache.ttl_secs <= 0.0 {
        errors.push(ValidationError::new(
            "cache.ttl_secs",
            "must be a positive number of seconds",
        ));
    }
    if config.checks.timeout_secs == 0 {
        errors.push(ValidationError::new(
            "checks.timeout_secs",
            "must be at least one second",
        ));
    }
    if config.checks.mysql_username.is_some() != config.checks.mysql_password.is_some() {
        errors.push(ValidationError::new(
            "checks",
            "mysql_username and mysql_password must be configured together",
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
