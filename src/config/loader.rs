//! Configuration loading from disk and environment.

use std::fs;
use std::path::Path;

use crate::config::env::{apply_env_overrides, EnvError};
use crate::config::schema::ServerConfig;
use crate::config::validation::{validate_config, ValidationError};

/// Error type for configuration loading.
#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    Parse(toml::de::Error),
    Env(EnvError),
    Validation(Vec<ValidationError>),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(e) => write!(f, "IO error: {}", e),
            ConfigError::Parse(e) => write!(f, "Parse error: {}", e),
            ConfigError::Env(e) => write!(f, "Environment error: {}", e),
            ConfigError::Validation(errors) => {
                write!(f, "Validation failed: ")?;
                for (i, err) in errors.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", err)?;
                }
                Ok(())
            }
        }
    }
}

impl std::error::Error for ConfigError {}

/// Parse a TOML file without overrides or validation.
pub fn read_config_file(path: &Path) -> Result<ServerConfig, ConfigError> {
    let content = fs::read_to_string(path).map_err(ConfigError::Io)?;
    toml::from_str(&content).map_err(ConfigError::Parse)
}

/// Defaults → optional TOML file → environment overrides → validation.
pub fn load_config(path: Option<&Path>) -> Result<ServerConfig, ConfigError> {
    let mut config = match path {
        Some(path) => read_config_file(path)?,
        None => ServerConfig::default(),
    };

    apply_env_overrides(&mut config).map_err(ConfigError::Env)?;
    validate_config(&config).map_err(ConfigError::Validation)?;

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_toml_file() {
        let path = std::env::temp_dir().join(format!("route-server-{}.toml", std::process::id()));
        fs::write(
            &path,
            "[session]\ndeadline_ms = 750\n\n[admission]\nlimit = 4\nwindow_secs = 10\n",
        )
        .unwrap();

        let config = read_config_file(&path).unwrap();
        assert_eq!(config.session.deadline_ms, 750);
        assert_eq!(config.admission.limit, 4);
        assert_eq!(config.admission.window_secs, 10);

        fs::remove_file(&path).unwrap_or_default();
    }

    #[test]
    fn missing_file_is_io_error() {
        let err = read_config_file(Path::new("/definitely/not/here.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io(_)));
    }

    #[test]
    fn bad_toml_is_parse_error() {
        let path = std::env::temp_dir().join(format!("route-server-bad-{}.toml", std::process::id()));
        fs::write(&path, "[session\ndeadline_ms = ").unwrap();
        let err = read_config_file(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
        fs::remove_file(&path).unwrap_or_default();
    }

    #[test]
    fn validation_errors_are_joined() {
        let err = ConfigError::Validation(vec![
            ValidationError {
                field: "session.deadline_ms",
                message: "must be greater than 0".into(),
            },
            ValidationError {
                field: "admission.limit",
                message: "must be greater than 0".into(),
            },
        ]);
        assert_eq!(
            err.to_string(),
            "Validation failed: session.deadline_ms: must be greater than 0, admission.limit: must be greater than 0"
        );
    }
}
