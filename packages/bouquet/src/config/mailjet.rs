use std::fmt;
use std::time::Duration;

use super::{must_var, opt_var, parse_var, ConfigError};

pub const DEFAULT_API_URL: &str = "https://api.mailjet.com";
pub const DEFAULT_VERSION: &str = "v3.1";

/// Mailjet credentials and endpoint.
#[derive(Clone, PartialEq)]
pub struct MailjetConfig {
    pub api_key_public: String,
    pub api_key_private: String,
    pub version: String,
    pub api_url: String,
    pub timeout: Duration,
}

impl MailjetConfig {
    pub fn new(api_key_public: impl Into<String>, api_key_private: impl Into<String>) -> Self {
        Self {
            api_key_public: api_key_public.into(),
            api_key_private: api_key_private.into(),
            version: DEFAULT_VERSION.to_string(),
            api_url: DEFAULT_API_URL.to_string(),
            timeout: Duration::from_secs(30),
        }
    }

    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::new(
            must_var("MJ_APIKEY_PUBLIC")?,
            must_var("MJ_APIKEY_PRIVATE")?,
        );
        if let Some(version) = opt_var("MJ_VERSION") {
            config.version = version;
        }
        if let Some(url) = opt_var("MJ_API_URL") {
            config.api_url = url;
        }
        config.timeout = Duration::from_millis(parse_var("MJ_TIMEOUT_MS", 30_000)?);
        Ok(config)
    }

    /// `{api_url}/{version}/send`
    pub fn send_url(&self) -> String {
        format!("{}/{}/send", self.api_url.trim_end_matches('/'), self.version)
    }
}

// Keeps the private key out of logs.
impl fmt::Debug for MailjetConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MailjetConfig")
            .field("api_key_public", &self.api_key_public)
            .field("api_key_private", &"***")
            .field("version", &self.version)
            .field("api_url", &self.api_url)
            .field("timeout", &self.timeout)
            .finish()
    }
}
