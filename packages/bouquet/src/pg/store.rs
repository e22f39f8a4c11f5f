use std::time::{Duration, Instant};

use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use tracing::{debug, error, info};
use uuid::Uuid;

use super::client::TrackedClient;
use super::context::{ContextPart, RequestContext, RoleSource};
use super::error::{PgError, Stage};
use super::scalar::SettingsMap;
use super::settings::{extract_settings, split_for_transaction, TransactionSettings};
use super::statement::Statement;
use super::txn;
use crate::config::db::PgConfig;

/// Parts read by default when propagating a web request into the database.
pub const DEFAULT_CONTEXT_PARTS: &[ContextPart] = &[
    ContextPart::Headers,
    ContextPart::User,
    ContextPart::Query,
    ContextPart::Session,
];

/// Owner of the process-wide Postgres pool.
///
/// Build one at startup, share it (it is cheap to clone), and call
/// [`PgStore::close`] on shutdown.
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
    checkout_warn_after: Duration,
}

impl PgStore {
    pub async fn connect(config: &PgConfig) -> Result<Self, PgError> {
        info!(
            url = %config.sanitized_connection_string(),
            max_connections = config.max_connections,
            "connecting to postgres"
        );

        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(config.acquire_timeout)
            .connect(&config.connection_string())
            .await
            .map_err(|e| {
                error!(error = %e, "failed to connect to postgres");
                PgError::Acquire(e)
            })?;

        Ok(Self::from_pool(pool, config.checkout_warn_after))
    }

    pub async fn from_env() -> Result<Self, PgError> {
        let config = PgConfig::from_env()?;
        Self::connect(&config).await
    }

    pub fn from_pool(pool: PgPool, checkout_warn_after: Duration) -> Self {
        Self {
            pool,
            checkout_warn_after,
        }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub async fn close(&self) {
        self.pool.close().await;
        info!("postgres pool closed");
    }

    /// Checks out a tracked connection. The caller must [`TrackedClient::release`] it.
    pub async fn get_client(&self) -> Result<TrackedClient, PgError> {
        let conn = self.pool.acquire().await.map_err(|e| {
            error!(error = %e, "failed to acquire a postgres connection");
            PgError::Acquire(e)
        })?;
        Ok(TrackedClient::new(conn, self.checkout_warn_after))
    }

    /// Runs a statement outside any transaction, as the pool's login role.
    pub async fn query(&self, statement: impl Into<Statement>) -> Result<Vec<PgRow>, PgError> {
        let statement = statement.into();
        let statement_id = Uuid::new_v4();
        let start = Instant::now();

        let mut conn = self.pool.acquire().await.map_err(|e| {
            error!(error = %e, "failed to acquire a postgres connection");
            PgError::Acquire(e)
        })?;
        let rows = statement
            .to_query()
            .fetch_all(&mut *conn)
            .await
            .map_err(|e| PgError::statement(Stage::Execute, e))?;

        info!(
            %statement_id,
            text = statement.text(),
            duration_ms = start.elapsed().as_millis() as u64,
            rows = rows.len(),
            "executed query"
        );
        Ok(rows)
    }

    /// Runs a statement in a transaction under `role`, without request settings.
    pub async fn query_as_role(
        &self,
        role: &str,
        statement: impl Into<Statement>,
    ) -> Result<Vec<PgRow>, PgError> {
        self.run_in_transaction(TransactionSettings::role_only(role), statement.into())
            .await
    }

    /// Runs a statement in a transaction carrying the request's role and settings.
    pub async fn query_with_context(
        &self,
        ctx: &RequestContext,
        parts: &[ContextPart],
        role: &RoleSource,
        defaults: &SettingsMap,
        statement: impl Into<Statement>,
    ) -> Result<Vec<PgRow>, PgError> {
        let settings = split_for_transaction(extract_settings(ctx, parts, role, defaults));
        debug!(
            request_id = ctx.header("x-request-id").unwrap_or("unknown"),
            role = ?settings.role,
            settings = settings.local_settings.len(),
            "running statement with request context"
        );
        self.run_in_transaction(settings, statement.into()).await
    }

    /// Acquire, run the scoped transaction, release. The connection is released
    /// on every path, with the error attached when there is one.
    pub async fn run_in_transaction(
        &self,
        settings: TransactionSettings,
        statement: Statement,
    ) -> Result<Vec<PgRow>, PgError> {
        let mut client = self.get_client().await?;
        let result = txn::run_scoped(&mut client, &settings, &statement).await;
        client.release(result.as_ref().err()).await;
        result
    }

    /// Builds the pool without opening a connection; the first checkout connects.
    pub fn connect_lazy(config: &PgConfig) -> Result<Self, PgError> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(config.acquire_timeout)
            .connect_lazy(&config.connection_string())
            .map_err(PgError::Acquire)?;
        Ok(Self::from_pool(pool, config.checkout_warn_after))
    }
}
