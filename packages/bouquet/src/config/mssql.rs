use std::fmt;
use std::time::Duration;

use super::{must_var, opt_var, parse_var, ConfigError};

/// SQL Server connection settings for the web or the admin login.
#[derive(Clone, PartialEq)]
pub struct MssqlConfig {
    pub server: String,
    pub port: u16,
    pub database: String,
    pub user: String,
    pub password: String,
    pub as_admin: bool,
    pub trust_cert: bool,
    pub max_connections: u32,
    pub connect_timeout: Duration,
}

impl MssqlConfig {
    /// Reads `MSSQL_*` variables; `as_admin` selects the admin credentials.
    pub fn from_env(as_admin: bool) -> Result<Self, ConfigError> {
        let (user_var, password_var) = if as_admin {
            ("MSSQL_ADMIN_USER", "MSSQL_ADMIN_PASSWORD")
        } else {
            ("MSSQL_WEB_USER", "MSSQL_WEB_PASSWORD")
        };

        Ok(Self {
            server: must_var("MSSQL_SERVER")?,
            port: parse_var("MSSQL_PORT", 1433)?,
            database: must_var("MSSQL_DATABASE")?,
            user: must_var(user_var)?,
            password: must_var(password_var)?,
            as_admin,
            trust_cert: opt_var("MSSQL_TRUST_CERT").is_some_and(|v| v == "true" || v == "1"),
            max_connections: parse_var("MSSQL_POOL_MAX", 10)?,
            connect_timeout: Duration::from_millis(parse_var("MSSQL_CONNECT_TIMEOUT_MS", 15_000)?),
        })
    }
}

impl fmt::Debug for MssqlConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MssqlConfig")
            .field("server", &self.server)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("user", &self.user)
            .field("password", &"***")
            .field("as_admin", &self.as_admin)
            .field("trust_cert", &self.trust_cert)
            .field("max_connections", &self.max_connections)
            .field("connect_timeout", &self.connect_timeout)
            .finish()
    }
}
