use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use parking_lot::Mutex;
use sqlx::pool::PoolConnection;
use sqlx::postgres::PgRow;
use sqlx::{PgConnection, Postgres};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::error::PgError;
use super::statement::Statement;

/// The statement operations the transaction runner needs from a connection.
#[async_trait]
pub trait SessionConnection: Send {
    type Rows: Send;

    /// Runs a statement for its side effects; returns the affected row count.
    async fn execute(&mut self, statement: &Statement) -> Result<u64, sqlx::Error>;

    async fn fetch_all(&mut self, statement: &Statement) -> Result<Self::Rows, sqlx::Error>;
}

#[derive(Debug, Clone, Default)]
struct LastStatement {
    id: Option<Uuid>,
    text: Option<String>,
}

/// Warns once if still alive after the threshold. Aborted when dropped.
struct Watchdog(JoinHandle<()>);

impl Watchdog {
    fn spawn(client_id: Uuid, warn_after: Duration, last: Arc<Mutex<LastStatement>>) -> Self {
        Self(tokio::spawn(async move {
            tokio::time::sleep(warn_after).await;
            let last = last.lock().clone();
            warn!(
                %client_id,
                threshold_ms = warn_after.as_millis() as u64,
                last_statement_id = ?last.id,
                last_statement = last.text.as_deref().unwrap_or("<none>"),
                "client has been checked out longer than the threshold"
            );
        }))
    }
}

impl Drop for Watchdog {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// An exclusively held pooled connection that remembers the last statement it ran.
///
/// A watchdog task logs a warning if the client is still checked out after the
/// configured threshold. It only reports; the connection is left alone.
///
/// A client dropped without [`release`](Self::release), e.g. because the
/// future driving it was cancelled mid-transaction, closes its connection
/// instead of handing it back with the role and settings still applied.
pub struct TrackedClient {
    conn: PoolConnection<Postgres>,
    id: Uuid,
    last: Arc<Mutex<LastStatement>>,
    checked_out_at: Instant,
    released: bool,
    _watchdog: Watchdog,
}

impl TrackedClient {
    pub(crate) fn new(conn: PoolConnection<Postgres>, warn_after: Duration) -> Self {
        let id = Uuid::new_v4();
        let last = Arc::new(Mutex::new(LastStatement::default()));

        let watchdog = Watchdog::spawn(id, warn_after, Arc::clone(&last));

        debug!(client_id = %id, "client checked out");

        Self {
            conn,
            id,
            last,
            checked_out_at: Instant::now(),
            released: false,
            _watchdog: watchdog,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn last_statement(&self) -> Option<String> {
        self.last.lock().text.clone()
    }

    pub fn last_statement_id(&self) -> Option<Uuid> {
        self.last.lock().id
    }

    /// Raw access for typed sqlx queries. Statements run this way are not tracked.
    pub fn connection(&mut self) -> &mut PgConnection {
        &mut self.conn
    }

    fn record(&self, statement: &Statement) -> Uuid {
        let statement_id = Uuid::new_v4();
        *self.last.lock() = LastStatement {
            id: Some(statement_id),
            text: Some(statement.text().to_string()),
        };
        statement_id
    }

    /// Hands the connection back.
    ///
    /// Without an error the connection returns to the pool. With an error it is
    /// closed so a connection in an unknown state never reaches the next borrower;
    /// the pool opens a replacement when needed.
    pub async fn release(mut self, error: Option<&PgError>) {
        self.released = true;

        let held_ms = self.checked_out_at.elapsed().as_millis() as u64;
        match error {
            None => debug!(client_id = %self.id, held_ms, "client released"),
            Some(err) => {
                self.conn.close_on_drop();
                debug!(client_id = %self.id, held_ms, error = %err, "client released with error");
            }
        }
    }
}

impl Drop for TrackedClient {
    fn drop(&mut self) {
        if !self.released {
            self.conn.close_on_drop();
            warn!(
                client_id = %self.id,
                last_statement = self.last.lock().text.as_deref().unwrap_or("<none>"),
                "client dropped without release, closing its connection"
            );
        }
    }
}

#[async_trait]
impl SessionConnection for TrackedClient {
    type Rows = Vec<PgRow>;

    async fn execute(&mut self, statement: &Statement) -> Result<u64, sqlx::Error> {
        let statement_id = self.record(statement);
        let start = Instant::now();

        let result = statement.to_query().execute(&mut *self.conn).await;
        let duration_ms = start.elapsed().as_millis() as u64;

        match result {
            Ok(done) => {
                info!(
                    client_id = %self.id,
                    %statement_id,
                    text = statement.text(),
                    params = statement.params().len(),
                    duration_ms,
                    rows = done.rows_affected(),
                    "executed statement"
                );
                Ok(done.rows_affected())
            }
            Err(e) => {
                warn!(client_id = %self.id, %statement_id, text = statement.text(), duration_ms, error = %e, "statement failed");
                Err(e)
            }
        }
    }

    async fn fetch_all(&mut self, statement: &Statement) -> Result<Vec<PgRow>, sqlx::Error> {
        let statement_id = self.record(statement);
        let start = Instant::now();

        let result = statement.to_query().fetch_all(&mut *self.conn).await;
        let duration_ms = start.elapsed().as_millis() as u64;

        match result {
            Ok(rows) => {
                info!(
                    client_id = %self.id,
                    %statement_id,
                    text = statement.text(),
                    params = statement.params().len(),
                    duration_ms,
                    rows = rows.len(),
                    "executed statement"
                );
                Ok(rows)
            }
            Err(e) => {
                warn!(client_id = %self.id, %statement_id, text = statement.text(), duration_ms, error = %e, "statement failed");
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use bouquet_test_support::logging::capture_logs;

    use super::*;

    const THRESHOLD: &str = "checked out longer than the threshold";

    fn last_statement(text: &str) -> Arc<Mutex<LastStatement>> {
        Arc::new(Mutex::new(LastStatement {
            id: Some(Uuid::new_v4()),
            text: Some(text.to_string()),
        }))
    }

    #[tokio::test(start_paused = true)]
    async fn test_watchdog_warns_after_threshold() {
        let logs = capture_logs();
        let _watchdog = Watchdog::spawn(
            Uuid::new_v4(),
            Duration::from_millis(50),
            last_statement("select pg_sleep(10)"),
        );

        tokio::time::sleep(Duration::from_millis(100)).await;
        tokio::task::yield_now().await;

        let output = logs.contents();
        assert!(output.contains(THRESHOLD), "no warning in: {output}");
        assert!(output.contains("select pg_sleep(10)"));
        assert_eq!(output.matches(THRESHOLD).count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_watchdog_silent_when_dropped_in_time() {
        let logs = capture_logs();
        let watchdog = Watchdog::spawn(
            Uuid::new_v4(),
            Duration::from_millis(50),
            last_statement("select 1"),
        );

        tokio::time::sleep(Duration::from_millis(10)).await;
        drop(watchdog);
        tokio::time::sleep(Duration::from_millis(100)).await;
        tokio::task::yield_now().await;

        assert!(!logs.contents().contains(THRESHOLD));
    }
}
