//! Loads the daemon configuration from a TOML file.
//!
//! The file is parsed and then run through semantic validation, so a bad
//! config is rejected before any listener starts.

use std::fs;
use std::path::Path;

use crate::config::schema::HealthgateConfig;
use crate::config::validation::{validate_config, ValidationError};

/// Failure to turn a file into a usable configuration.
#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    Parse(toml::de::Error),
    Validation(Vec<ValidationError>),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(e) => write!(f, "could not read config file: {e}"),
            ConfigError::Parse(e) => write!(f, "config file is not valid TOML: {e}"),
            ConfigError::Validation(errors) => {
                let details: Vec<String> = errors.iter().map(ToString::to_string).collect();
                write!(f, "config failed validation: {}", details.join("; "))
            }
        }
    }
}

impl std::error::Error for ConfigError {}

/// Read `path` and check the result against the rules in `validation`.
/// I/O and parse problems abort immediately; validation failures are
/// collected and reported together.
pub fn load_config(path: &Path) -> Result<HealthgateConfig, ConfigError> {
    let content = fs::read_to_string(path).map_err(ConfigError::Io)?;
    let config: HealthgateConfig = toml::from_str(&content).map_err(ConfigError::Parse)?;
    validate_config(&config).map_err(ConfigError::Validation)?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use tempfile::TempDir;

    use super::*;

    fn write_config(contents: &str) -> (TempDir, PathBuf) {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("healthgate.toml");
        fs::write(&path, contents).unwrap();
        (dir, path)
    }

    #[test]
    fn loads_a_partial_file_with_defaults() {
        let (_dir, path) = write_config("[listener]\nports = [4000]\n");
        let config = load_config(&path).unwrap();
        assert_eq!(config.listener.ports, vec![4000]);
        assert_eq!(config.cache.ttl_secs, 10.0);
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let (_dir, path) = write_config("");
        let missing = path.with_file_name("nope.toml");
        assert!(matches!(load_config(&missing), Err(ConfigError::Io(_))));
    }

    #[test]
    fn bad_toml_is_a_parse_error() {
        let (_dir, path) = write_config("[listener\n");
        assert!(matches!(load_config(&path), Err(ConfigError::Parse(_))));
    }

    #[test]
    fn validation_failures_name_the_field() {
        let (_dir, path) = write_config("[listener]\nports = []\n");
        let err = load_config(&path).unwrap_err();
        assert!(err.to_string().contains("listener.ports"));
    }
}
