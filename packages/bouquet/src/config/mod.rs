pub mod db;
pub mod mailjet;
pub mod mssql;
pub mod web;

use std::env;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Required environment variable '{name}' is not set")]
    MissingVar { name: String },
    #[error("Environment variable '{name}' has an invalid value: {detail}")]
    InvalidVar { name: String, detail: String },
}

/// Get required environment variable or return error
pub(crate) fn must_var(name: &str) -> Result<String, ConfigError> {
    env::var(name).map_err(|_| ConfigError::MissingVar {
        name: name.to_string(),
    })
}

/// Get an optional environment variable, treating an empty value as unset
pub(crate) fn opt_var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.is_empty())
}

/// Parse an optional numeric environment variable, falling back to `default`
pub(crate) fn parse_var<T>(name: &str, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match opt_var(name) {
        None => Ok(default),
        Some(raw) => raw.parse::<T>().map_err(|e| ConfigError::InvalidVar {
            name: name.to_string(),
            detail: format!("'{raw}': {e}"),
        }),
    }
}
