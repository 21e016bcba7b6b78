//! Configuration loading from disk.

use std::fs;
use std::path::Path;

use thiserror::Error;

use crate::config::schema::RouterConfig;
use crate::config::validation::{validate_config, ValidationError};

/// Error type for configuration loading. Always fatal at boot.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation failed: {}", join_errors(.0))]
    Validation(Vec<ValidationError>),

    #[error("Invalid pattern `{pattern}`: {reason}")]
    Pattern { pattern: String, reason: String },
}

fn join_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Parse and validate configuration from TOML text.
pub fn parse_config(content: &str) -> Result<RouterConfig, ConfigError> {
    let config: RouterConfig = toml::from_str(content)?;
    validate_config(&config).map_err(ConfigError::Validation)?;
    Ok(config)
}

/// Load and validate configuration from a TOML file.
pub fn load_config(path: &Path) -> Result<RouterConfig, ConfigError> {
    let content = fs::read_to_string(path)?;
    parse_config(&content)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[revalidation]\nshard_count = 4").unwrap();

        let config = load_config(file.path()).unwrap();
        assert_eq!(config.revalidation.shard_count, 4);
    }

    #[test]
    fn test_invalid_config_fails() {
        let err = parse_config("[revalidation]\nshard_count = 0").unwrap_err();
        assert!(matches!(err, ConfigError::Validation(_)));
        assert!(err.to_string().contains("shard_count"));
    }

    #[test]
    fn test_missing_file() {
        let err = load_config(Path::new("/definitely/not/here.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io(_)));
    }
}
