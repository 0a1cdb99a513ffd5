//! Environment variable overrides.
//!
//! Applied after the config file so deployments can tune the server
//! without editing it. Blank values are ignored; values that fail to
//! parse are reported instead of silently dropped.

use std::str::FromStr;

use crate::config::schema::ServerConfig;

pub const BIND_ADDRESS: &str = "ROUTE_SERVER_BIND_ADDRESS";
pub const MAX_CONNECTIONS: &str = "ROUTE_SERVER_MAX_CONNECTIONS";
pub const SESSION_DEADLINE_MS: &str = "ROUTE_SERVER_SESSION_DEADLINE_MS";
pub const MAX_FRAME_BYTES: &str = "ROUTE_SERVER_MAX_FRAME_BYTES";
pub const ADMISSION_ENABLED: &str = "ROUTE_SERVER_ADMISSION_ENABLED";
pub const ADMISSION_LIMIT: &str = "ROUTE_SERVER_ADMISSION_LIMIT";
pub const ADMISSION_WINDOW_SECS: &str = "ROUTE_SERVER_ADMISSION_WINDOW_SECS";
pub const HTTP_ENABLED: &str = "ROUTE_SERVER_HTTP_ENABLED";
pub const HTTP_BIND_ADDRESS: &str = "ROUTE_SERVER_HTTP_BIND_ADDRESS";
pub const LOG_LEVEL: &str = "ROUTE_SERVER_LOG_LEVEL";

/// An override variable holding a value of the wrong type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvError {
    pub var: &'static str,
    pub value: String,
    pub reason: String,
}

impl std::fmt::Display for EnvError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "invalid {}={:?}: {}", self.var, self.value, self.reason)
    }
}

impl std::error::Error for EnvError {}

/// Apply overrides from the process environment.
pub fn apply_env_overrides(config: &mut ServerConfig) -> Result<(), EnvError> {
    apply_overrides(config, |var| std::env::var(var).ok())
}

/// Apply overrides from an arbitrary lookup (the process environment in production).
pub fn apply_overrides<F>(config: &mut ServerConfig, lookup: F) -> Result<(), EnvError>
where
    F: Fn(&str) -> Option<String>,
{
    let get = |var: &'static str| {
        lookup(var)
            .map(|raw| raw.trim().to_string())
            .filter(|v| !v.is_empty())
    };

    if let Some(v) = get(BIND_ADDRESS) {
        config.listener.bind_address = v;
    }
    if let Some(v) = get(MAX_CONNECTIONS) {
        config.listener.max_connections = parse(MAX_CONNECTIONS, v)?;
    }
    if let Some(v) = get(SESSION_DEADLINE_MS) {
        config.session.deadline_ms = parse(SESSION_DEADLINE_MS, v)?;
    }
    if let Some(v) = get(MAX_FRAME_BYTES) {
        config.session.max_frame_bytes = parse(MAX_FRAME_BYTES, v)?;
    }
    if let Some(v) = get(ADMISSION_ENABLED) {
        config.admission.enabled = parse_bool(ADMISSION_ENABLED, v)?;
    }
    if let Some(v) = get(ADMISSION_LIMIT) {
        config.admission.limit = parse(ADMISSION_LIMIT, v)?;
    }
    if let Some(v) = get(ADMISSION_WINDOW_SECS) {
        config.admission.window_secs = parse(ADMISSION_WINDOW_SECS, v)?;
    }
    if let Some(v) = get(HTTP_ENABLED) {
        config.http.enabled = parse_bool(HTTP_ENABLED, v)?;
    }
    if let Some(v) = get(HTTP_BIND_ADDRESS) {
        config.http.bind_address = v;
    }
    if let Some(v) = get(LOG_LEVEL) {
        config.observability.log_level = v;
    }

    Ok(())
}

fn parse<T>(var: &'static str, value: String) -> Result<T, EnvError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    value.parse::<T>().map_err(|e| EnvError {
        var,
        reason: e.to_string(),
        value,
    })
}

fn parse_bool(var: &'static str, value: String) -> Result<bool, EnvError> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(EnvError {
            var,
            value,
            reason: "expected true/false".to_string(),
        }),
    }
}
