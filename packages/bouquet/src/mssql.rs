//! A single SQL Server pool with numbered, logged queries.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, LazyLock};

use bb8::Pool;
use bb8_tiberius::ConnectionManager;
use regex::Regex;
use thiserror::Error;
use tiberius::{AuthMethod, Config, Row};
use tracing::{error, info};

use crate::config::mssql::MssqlConfig;
use crate::config::ConfigError;

const SUMMARY_MAX_CHARS: usize = 70;

#[allow(clippy::unwrap_used)]
static WHITESPACE_RUN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s{2,}").unwrap());

#[derive(Debug, Error)]
pub enum MssqlError {
    #[error("missing sql statement to query")]
    MissingStatement,
    #[error("SQL Server connection failed: {0}")]
    Connect(#[source] bb8_tiberius::Error),
    #[error("SQL Server pool error: {0}")]
    Pool(#[from] bb8::RunError<bb8_tiberius::Error>),
    #[error("SQL Server query failed: {0}")]
    Query(#[from] tiberius::error::Error),
    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Every result set a batch produced, in order.
#[derive(Debug, Default)]
pub struct QueryResult {
    pub recordsets: Vec<Vec<Row>>,
}

impl QueryResult {
    /// The first result set, empty when the batch returned none.
    pub fn into_recordset(self) -> Vec<Row> {
        self.recordsets.into_iter().next().unwrap_or_default()
    }
}

#[derive(Clone)]
pub struct MssqlPool {
    pool: Pool<ConnectionManager>,
    counter: Arc<AtomicU64>,
}

impl std::fmt::Debug for MssqlPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MssqlPool")
            .field("state", &self.pool.state())
            .field("queries", &self.counter.load(Ordering::Relaxed))
            .finish()
    }
}

fn tiberius_config(config: &MssqlConfig) -> Config {
    let mut tds = Config::new();
    tds.host(&config.server);
    tds.port(config.port);
    tds.database(&config.database);
    tds.authentication(AuthMethod::sql_server(&config.user, &config.password));
    if config.trust_cert {
        tds.trust_cert();
    }
    tds
}

impl MssqlPool {
    pub async fn connect(config: &MssqlConfig) -> Result<Self, MssqlError> {
        info!(
            user = %config.user,
            server = %config.server,
            database = %config.database,
            as_admin = config.as_admin,
            "connecting to mssql"
        );

        let pool = Pool::builder()
            .max_size(config.max_connections)
            .connection_timeout(config.connect_timeout)
            .build(ConnectionManager::new(tiberius_config(config)))
            .await
            .map_err(|e| {
                error!(error = %e, "mssql connection failed, check the configuration");
                MssqlError::Connect(e)
            })?;

        info!("mssql connected");
        Ok(Self::from_pool(pool))
    }

    pub async fn from_env(as_admin: bool) -> Result<Self, MssqlError> {
        Self::connect(&MssqlConfig::from_env(as_admin)?).await
    }

    /// Builds the pool without opening a connection.
    pub fn connect_lazy(config: &MssqlConfig) -> Self {
        let pool = Pool::builder()
            .max_size(config.max_connections)
            .connection_timeout(config.connect_timeout)
            .build_unchecked(ConnectionManager::new(tiberius_config(config)));
        Self::from_pool(pool)
    }

    fn from_pool(pool: Pool<ConnectionManager>) -> Self {
        Self {
            pool,
            counter: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Runs a batch and collects every result set.
    ///
    /// Each call gets the next number from the pool's counter; it tags the
    /// start, failure and completion log lines.
    pub async fn query(&self, sql: &str, title: Option<&str>) -> Result<QueryResult, MssqlError> {
        let no = self.counter.fetch_add(1, Ordering::Relaxed) + 1;

        if sql.trim().is_empty() {
            error!(no, "missing sql statement to query");
            return Err(MssqlError::MissingStatement);
        }

        info!(no, title, sql = %summarize_sql(sql), "executing mssql query");

        let recordsets = match self.run(sql).await {
            Ok(sets) => sets,
            Err(e) => {
                error!(no, title, error = %e, "mssql query error");
                return Err(e);
            }
        };

        info!(
            no,
            title,
            recordsets = recordsets.len(),
            records = ?recordsets.iter().map(Vec::len).collect::<Vec<_>>(),
            "mssql query completed"
        );
        Ok(QueryResult { recordsets })
    }

    async fn run(&self, sql: &str) -> Result<Vec<Vec<Row>>, MssqlError> {
        let mut conn = self.pool.get().await?;
        let stream = conn.simple_query(sql).await?;
        Ok(stream.into_results().await?)
    }

    /// Rows of the first result set.
    pub async fn all(&self, sql: &str) -> Result<Vec<Row>, MssqlError> {
        Ok(self.query(sql, None).await?.into_recordset())
    }

    /// First row of the first result set.
    pub async fn one(&self, sql: &str) -> Result<Option<Row>, MssqlError> {
        Ok(self.all(sql).await?.into_iter().next())
    }

    /// Drops this handle's connections; clones keep the pool alive until they go too.
    pub fn close(self) {
        drop(self.pool);
        info!("mssql pool closed");
    }
}

/// One-line form of `sql` for logs: leading whitespace removed, line breaks
/// and whitespace runs collapsed to a space, cut at 70 characters.
pub fn summarize_sql(sql: &str) -> String {
    let single_line = sql.trim_start().replace(['\n', '\r'], " ");
    let collapsed = WHITESPACE_RUN.replace_all(&single_line, " ");

    // Only cut when at least two characters would be dropped.
    if collapsed.chars().count() > SUMMARY_MAX_CHARS + 1 {
        let mut cut: String = collapsed.chars().take(SUMMARY_MAX_CHARS).collect();
        cut.push('…');
        cut
    } else {
        collapsed.into_owned()
    }
}
