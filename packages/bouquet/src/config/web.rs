use super::{opt_var, parse_var, ConfigError};

/// Settings for the HTTP layer.
#[derive(Debug, Clone, PartialEq)]
pub struct WebConfig {
    pub host: String,
    pub port: u16,
    /// Enables CSRF and TRACE protection. On in production or when static files are served.
    pub with_protection: bool,
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 5000,
            with_protection: false,
        }
    }
}

impl WebConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let production = opt_var("APP_ENV").is_some_and(|v| v == "production");
        let with_static = opt_var("WITH_STATIC").is_some();

        Ok(Self {
            host: opt_var("HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
            port: parse_var("PORT", 5000)?,
            with_protection: production || with_static,
        })
    }

    pub fn is_development(&self) -> bool {
        !self.with_protection
    }
}
