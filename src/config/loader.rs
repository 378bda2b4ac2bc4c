//! Configuration loading from disk and environment.

use std::fs;
use std::path::Path;

use thiserror::Error;

use crate::config::schema::SpeedtestConfig;
use crate::config::validation::{validate_config, ValidationError};

/// Config file looked up in the working directory when none is given.
pub const DEFAULT_CONFIG_FILE: &str = "settings.toml";

/// Prefix of environment variables that override file values.
pub const ENV_PREFIX: &str = "SPEEDTEST_";

/// Error type for configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error reading {path}: {source}")]
    Io {
        path: String,
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

/// Load, overlay and validate the configuration.
///
/// An explicit `path` must exist. Without one, `settings.toml` is used when
/// present and defaults otherwise. `SPEEDTEST_*` variables win over the file.
pub fn load_config(path: Option<&Path>) -> Result<SpeedtestConfig, ConfigError> {
    let content = match path {
        Some(path) => Some(read(path)?),
        None => {
            let fallback = Path::new(DEFAULT_CONFIG_FILE);
            if fallback.exists() {
                Some(read(fallback)?)
            } else {
                tracing::info!("No config found, using defaults");
                None
            }
        }
    };

    let config = parse_with_env(content.as_deref().unwrap_or(""), std::env::vars())?;
    validate_config(&config).map_err(ConfigError::Validation)?;

    Ok(config)
}

fn read(path: &Path) -> Result<String, ConfigError> {
    fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.display().to_string(),
        source,
    })
}

/// Parse TOML text and apply `SPEEDTEST_*` overrides from `vars`.
pub fn parse_with_env<I>(content: &str, vars: I) -> Result<SpeedtestConfig, ConfigError>
where
    I: IntoIterator<Item = (String, String)>,
{
    let mut table: toml::Table = toml::from_str(content)?;
    let defaults = default_table();

    for (key, value) in vars {
        let Some(name) = key.strip_prefix(ENV_PREFIX) else {
            continue;
        };
        let name = name.to_lowercase();
        let value = match defaults.get(&name) {
            Some(toml::Value::String(_)) => toml::Value::String(value),
            _ => env_value(&value),
        };
        tracing::debug!(key = %name, "Config value overridden from environment");
        table.insert(name, value);
    }

    Ok(toml::Value::Table(table).try_into()?)
}

/// Default configuration as a TOML table, used to type environment values.
fn default_table() -> toml::Table {
    match toml::Value::try_from(SpeedtestConfig::default()) {
        Ok(toml::Value::Table(table)) => table,
        _ => toml::Table::new(),
    }
}

/// Interpret an environment value as a TOML scalar, falling back to a string.
fn env_value(raw: &str) -> toml::Value {
    let snippet = format!("v = {raw}");
    match toml::from_str::<toml::Table>(&snippet) {
        Ok(mut t) => t.remove("v").unwrap_or_else(|| toml::Value::String(raw.to_string())),
        Err(_) => toml::Value::String(raw.to_string()),
    }
}
