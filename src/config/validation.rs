//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (timeouts > 0, limits > 0)
//! - Validate bind addresses
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ServerConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::fmt;

use crate::config::schema::ServerConfig;
use crate::net::listener::parse_bind_address;

/// Upper bound for `session.deadline_ms` (one day).
pub const MAX_DEADLINE_MS: u64 = 86_400_000;

/// Upper bound for `admission.sweep_interval_secs` (one day).
pub const MAX_SWEEP_INTERVAL_SECS: u64 = 86_400;

/// A single semantic problem with the configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Dotted path of the offending field.
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

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

impl std::error::Error for ValidationError {}

/// Check the whole config and report every problem found.
pub fn validate_config(config: &ServerConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if let Err(e) = parse_bind_address(&config.listener.bind_address) {
        errors.push(ValidationError::new("listener.bind_address", e.to_string()));
    }
    if config.listener.max_connections == 0 {
        errors.push(ValidationError::new("listener.max_connections", "must be greater than 0"));
    }

    if config.session.deadline_ms == 0 {
        errors.push(ValidationError::new("session.deadline_ms", "must be greater than 0"));
    } else if config.session.deadline_ms > MAX_DEADLINE_MS {
        errors.push(ValidationError::new(
            "session.deadline_ms",
            format!("must be at most {}", MAX_DEADLINE_MS),
        ));
    }
    if config.session.max_frame_bytes == 0 {
        errors.push(ValidationError::new("session.max_frame_bytes", "must be greater than 0"));
    }

    if config.admission.enabled {
        if config.admission.limit == 0 {
            errors.push(ValidationError::new("admission.limit", "must be greater than 0"));
        }
        if config.admission.window_secs == 0 {
            errors.push(ValidationError::new("admission.window_secs", "must be greater than 0"));
        }
        if config.admission.sweep_interval_secs == 0 {
            errors.push(ValidationError::new(
                "admission.sweep_interval_secs",
                "must be greater than 0",
            ));
        } else if config.admission.sweep_interval_secs > MAX_SWEEP_INTERVAL_SECS {
            errors.push(ValidationError::new(
                "admission.sweep_interval_secs",
                format!("must be at most {}", MAX_SWEEP_INTERVAL_SECS),
            ));
        }
    }

    if config.http.enabled {
        if let Err(e) = parse_bind_address(&config.http.bind_address) {
            errors.push(ValidationError::new("http.bind_address", e.to_string()));
        }
        if config.http.request_timeout_secs == 0 {
            errors.push(ValidationError::new("http.request_timeout_secs", "must be greater than 0"));
        }
    }

    if config.observability.metrics_enabled {
        if let Err(e) = parse_bind_address(&config.observability.metrics_address) {
            errors.push(ValidationError::new("observability.metrics_address", e.to_string()));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
