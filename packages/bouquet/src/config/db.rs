use std::time::Duration;

use percent_encoding::{utf8_percent_encode, AsciiSet, CONTROLS};

use super::{must_var, opt_var, parse_var, ConfigError};

/// Characters that must be escaped in the userinfo part of a connection URL.
const USERINFO: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'/')
    .add(b':')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'@')
    .add(b'[')
    .add(b'\\')
    .add(b']')
    .add(b'^')
    .add(b'`')
    .add(b'{')
    .add(b'|')
    .add(b'}');

/// Threshold after which a checked-out connection is reported as held too long.
pub const DEFAULT_CHECKOUT_WARN: Duration = Duration::from_millis(5000);

/// Postgres connection settings.
#[derive(Debug, Clone, PartialEq)]
pub struct PgConfig {
    /// Full URL; when set, the individual fields below are ignored.
    pub url: Option<String>,
    pub host: String,
    pub port: u16,
    pub user: Option<String>,
    pub password: Option<String>,
    pub database: String,
    pub ssl_mode: Option<String>,
    pub max_connections: u32,
    pub acquire_timeout: Duration,
    pub checkout_warn_after: Duration,
}

impl PgConfig {
    pub fn new(database: impl Into<String>) -> Self {
        Self {
            url: None,
            host: "localhost".to_string(),
            port: 5432,
            user: None,
            password: None,
            database: database.into(),
            ssl_mode: None,
            max_connections: 10,
            acquire_timeout: Duration::from_millis(5000),
            checkout_warn_after: DEFAULT_CHECKOUT_WARN,
        }
    }

    /// Read connection settings from the environment.
    ///
    /// `DATABASE_URL` takes precedence; otherwise the libpq variables
    /// (`PGHOST`, `PGPORT`, `PGUSER`, `PGPASSWORD`, `PGDATABASE`, `PGSSLMODE`) are used.
    pub fn from_env() -> Result<Self, ConfigError> {
        let url = opt_var("DATABASE_URL");
        let database = match &url {
            Some(_) => opt_var("PGDATABASE").unwrap_or_default(),
            None => must_var("PGDATABASE")?,
        };

        Ok(Self {
            url,
            host: opt_var("PGHOST").unwrap_or_else(|| "localhost".to_string()),
            port: parse_var("PGPORT", 5432)?,
            user: opt_var("PGUSER"),
            password: opt_var("PGPASSWORD"),
            database,
            ssl_mode: opt_var("PGSSLMODE"),
            max_connections: parse_var("PG_POOL_MAX", 10)?,
            acquire_timeout: Duration::from_millis(parse_var("PG_ACQUIRE_TIMEOUT_MS", 5000)?),
            checkout_warn_after: Duration::from_millis(parse_var(
                "PG_CHECKOUT_WARN_MS",
                DEFAULT_CHECKOUT_WARN.as_millis() as u64,
            )?),
        })
    }

    /// Builds the connection URL handed to the driver.
    pub fn connection_string(&self) -> String {
        if let Some(url) = &self.url {
            return url.clone();
        }

        let userinfo = match (&self.user, &self.password) {
            (Some(user), Some(password)) => format!(
                "{}:{}@",
                utf8_percent_encode(user, USERINFO),
                utf8_percent_encode(password, USERINFO)
            ),
            (Some(user), None) => format!("{}@", utf8_percent_encode(user, USERINFO)),
            _ => String::new(),
        };

        let mut url = format!(
            "postgresql://{userinfo}{}:{}/{}",
            self.host, self.port, self.database
        );
        if let Some(mode) = &self.ssl_mode {
            url.push_str("?sslmode=");
            url.push_str(mode);
        }
        url
    }

    /// Connection URL with the password masked, for logging.
    pub fn sanitized_connection_string(&self) -> String {
        sanitize_url(&self.connection_string())
    }
}

fn sanitize_url(url: &str) -> String {
    let Some((auth_part, host_part)) = url.rsplit_once('@') else {
        return url.to_string();
    };
    let Some(scheme_end) = auth_part.find("://") else {
        return url.to_string();
    };
    match auth_part[scheme_end + 3..].find(':') {
        Some(colon) => format!(
            "{}:***@{}",
            &auth_part[..scheme_end + 3 + colon],
            host_part
        ),
        None => url.to_string(),
    }
}
