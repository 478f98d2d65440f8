//! Configuration loading from disk and environment.

use std::fs;
use std::path::Path;

use serde::de::DeserializeOwned;
use thiserror::Error;

use crate::config::schema::{GatewayConfig, RegistryConfig};
use crate::config::validation::{validate_gateway, validate_registry, ValidationError};

/// Environment variable overriding `discovery.url`.
pub const SERVICE_DISCOVERY_URL: &str = "SERVICE_DISCOVERY_URL";

/// Error type for configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

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

/// Load the gateway configuration.
///
/// With no path the defaults are used. Environment overrides are applied
/// before validation.
pub fn load_gateway_config(path: Option<&Path>) -> Result<GatewayConfig, ConfigError> {
    let mut config: GatewayConfig = read_or_default(path)?;
    apply_env_overrides(&mut config, |key| std::env::var(key).ok());
    validate_gateway(&config).map_err(ConfigError::Validation)?;
    Ok(config)
}

/// Load the registry configuration.
pub fn load_registry_config(path: Option<&Path>) -> Result<RegistryConfig, ConfigError> {
    let config: RegistryConfig = read_or_default(path)?;
    validate_registry(&config).map_err(ConfigError::Validation)?;
    Ok(config)
}

/// Apply environment overrides using `lookup` to read variables.
pub fn apply_env_overrides<F>(config: &mut GatewayConfig, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(url) = lookup(SERVICE_DISCOVERY_URL).filter(|v| !v.trim().is_empty()) {
        tracing::debug!(url = %url, "Using {} override", SERVICE_DISCOVERY_URL);
        config.discovery.url = url.trim_end_matches('/').to_string();
    }
}

fn read_or_default<T>(path: Option<&Path>) -> Result<T, ConfigError>
where
    T: DeserializeOwned + Default,
{
    match path {
        Some(path) => {
            let content = fs::read_to_string(path)?;
            Ok(toml::from_str(&content)?)
        }
        None => Ok(T::default()),
    }
}
