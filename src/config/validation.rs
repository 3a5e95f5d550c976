//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (timeouts > 0, addresses parse)
//! - Check handler entries (non-empty names and kinds, unique names)
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ProxyConfig → Result<(), Vec<ValidationError>>
//! - Kind-specific settings are checked later by each handler's `initialize`

use std::collections::HashSet;
use std::net::SocketAddr;

use crate::config::schema::ProxyConfig;
use crate::handler::HandlerConfig;

/// A single semantic problem, with the offending field path.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{field}: {message}")]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl ValidationError {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

pub fn validate_config(config: &ProxyConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(
            "listener.bind_address",
            format!("'{}' is not a socket address", config.listener.bind_address),
        ));
    }

    if config.timeouts.request_secs == 0 {
        errors.push(ValidationError::new("timeouts.request_secs", "must be greater than 0"));
    }

    if config.limits.max_request_body_bytes == 0 {
        errors.push(ValidationError::new(
            "limits.max_request_body_bytes",
            "must be greater than 0",
        ));
    }

    let observability = &config.observability;
    if !LOG_LEVELS.contains(&observability.log_level.to_ascii_lowercase().as_str()) {
        errors.push(ValidationError::new(
            "observability.log_level",
            format!(
                "'{}' is not one of {}",
                observability.log_level,
                LOG_LEVELS.join(", ")
            ),
        ));
    }
    if observability.metrics_enabled
        && observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::new(
            "observability.metrics_address",
            format!("'{}' is not a socket address", observability.metrics_address),
        ));
    }

    let mut names = HashSet::new();
    check_handler("producer", &config.producer.0, &mut names, &mut errors);
    for (i, filter) in config.filters.iter().enumerate() {
        check_handler(&format!("filters[{i}]"), filter, &mut names, &mut errors);
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn check_handler<'a>(
    field: &str,
    handler: &'a HandlerConfig,
    names: &mut HashSet<&'a str>,
    errors: &mut Vec<ValidationError>,
) {
    if handler.name.trim().is_empty() {
        errors.push(ValidationError::new(format!("{field}.name"), "must not be empty"));
    } else if !names.insert(handler.name.as_str()) {
        errors.push(ValidationError::new(
            format!("{field}.name"),
            format!("'{}' is already used", handler.name),
        ));
    }
    if handler.kind.trim().is_empty() {
        errors.push(ValidationError::new(format!("{field}.kind"), "must not be empty"));
    }
}
