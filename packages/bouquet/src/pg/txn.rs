use tracing::warn;

use super::client::SessionConnection;
use super::error::{PgError, Stage};
use super::settings::{build_settings_statement, TransactionSettings};
use super::statement::{escape_identifier, has_nul, Statement};

/// `set local role "<role>"`. The role is structural, so it is escaped as an
/// identifier rather than bound as a value. A role holding a NUL byte is
/// refused rather than rewritten into some other role's name.
pub fn set_local_role_statement(role: &str) -> Result<Statement, PgError> {
    if has_nul(role) {
        return Err(PgError::InvalidRole {
            role: role.to_string(),
        });
    }
    Ok(Statement::new(format!("set local role {}", escape_identifier(role))))
}

/// Runs `statement` in its own transaction with the role and local settings applied first.
///
/// `begin` → role → settings → statement → `commit`. A failure after `begin`
/// rolls the transaction back and is returned unchanged; a failed rollback is
/// only logged. Releasing the connection is the caller's job.
pub async fn run_scoped<C>(
    conn: &mut C,
    settings: &TransactionSettings,
    statement: &Statement,
) -> Result<C::Rows, PgError>
where
    C: SessionConnection,
{
    conn.execute(&Statement::new("begin"))
        .await
        .map_err(|e| PgError::statement(Stage::Begin, e))?;

    match apply_and_execute(conn, settings, statement).await {
        Ok(rows) => {
            conn.execute(&Statement::new("commit"))
                .await
                .map_err(PgError::Commit)?;
            Ok(rows)
        }
        Err(err) => {
            if let Err(rollback_err) = conn.execute(&Statement::new("rollback")).await {
                warn!(error = %rollback_err, original_error = %err, "rollback failed");
            }
            Err(err)
        }
    }
}

async fn apply_and_execute<C>(
    conn: &mut C,
    settings: &TransactionSettings,
    statement: &Statement,
) -> Result<C::Rows, PgError>
where
    C: SessionConnection,
{
    if let Some(role) = &settings.role {
        conn.execute(&set_local_role_statement(role)?)
            .await
            .map_err(|e| PgError::statement(Stage::SetRole, e))?;
    }

    if let Some(compiled) = build_settings_statement(&settings.local_settings) {
        conn.execute(&compiled.to_statement())
            .await
            .map_err(|e| PgError::statement(Stage::SetLocals, e))?;
    }

    conn.fetch_all(statement)
        .await
        .map_err(|e| PgError::statement(Stage::Execute, e))
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;

    use super::*;
    use crate::pg::scalar::Scalar;

    /// Records every statement and fails the first one whose text starts with `fail_on`.
    #[derive(Default)]
    struct RecordingConnection {
        executed: Vec<String>,
        fail_on: Option<&'static str>,
    }

    impl RecordingConnection {
        fn failing_on(prefix: &'static str) -> Self {
            Self {
                executed: Vec::new(),
                fail_on: Some(prefix),
            }
        }

        fn record(&mut self, statement: &Statement) -> Result<(), sqlx::Error> {
            self.executed.push(statement.text().to_string());
            match self.fail_on {
                Some(prefix) if statement.text().starts_with(prefix) => {
                    Err(sqlx::Error::Protocol(format!("refused: {}", statement.text())))
                }
                _ => Ok(()),
            }
        }
    }

    #[async_trait]
    impl SessionConnection for RecordingConnection {
        type Rows = usize;

        async fn execute(&mut self, statement: &Statement) -> Result<u64, sqlx::Error> {
            self.record(statement).map(|_| 0)
        }

        async fn fetch_all(&mut self, statement: &Statement) -> Result<usize, sqlx::Error> {
            self.record(statement).map(|_| 1)
        }
    }

    fn settings() -> TransactionSettings {
        TransactionSettings {
            role: Some("app_anonymous".to_string()),
            local_settings: vec![
                ("request.method".to_string(), Scalar::from("GET")),
                ("request.query.zero".to_string(), Scalar::Int(0)),
            ],
        }
    }

    #[tokio::test]
    async fn test_success_path_order() {
        let mut conn = RecordingConnection::default();
        let rows = run_scoped(&mut conn, &settings(), &Statement::new("SELECT current_user"))
            .await
            .unwrap();

        assert_eq!(rows, 1);
        assert_eq!(
            conn.executed,
            vec![
                "begin",
                r#"set local role "app_anonymous""#,
                "select set_config($1, $2, true), set_config($3, $4, true)",
                "SELECT current_user",
                "commit",
            ]
        );
    }

    #[tokio::test]
    async fn test_empty_settings_skip_settings_statement() {
        let mut conn = RecordingConnection::default();
        let settings = TransactionSettings::role_only("app_anonymous");
        run_scoped(&mut conn, &settings, &Statement::new("select 1"))
            .await
            .unwrap();

        assert_eq!(
            conn.executed,
            vec!["begin", r#"set local role "app_anonymous""#, "select 1", "commit"]
        );
    }

    #[tokio::test]
    async fn test_missing_role_skips_role_statement() {
        let mut conn = RecordingConnection::default();
        let settings = TransactionSettings::default();
        run_scoped(&mut conn, &settings, &Statement::new("select 1"))
            .await
            .unwrap();

        assert_eq!(conn.executed, vec!["begin", "select 1", "commit"]);
    }

    #[tokio::test]
    async fn test_statement_failure_rolls_back() {
        let mut conn = RecordingConnection::failing_on("select 1 as");
        let err = run_scoped(&mut conn, &settings(), &Statement::new("select 1 as"))
            .await
            .unwrap_err();

        assert_eq!(err.stage(), Some(Stage::Execute));
        assert_eq!(conn.executed.last().map(String::as_str), Some("rollback"));
        assert!(!conn.executed.iter().any(|s| s == "commit"));
    }

    #[tokio::test]
    async fn test_role_failure_stops_before_statement() {
        let mut conn = RecordingConnection::failing_on("set local role");
        let err = run_scoped(&mut conn, &settings(), &Statement::new("select 1"))
            .await
            .unwrap_err();

        assert_eq!(err.stage(), Some(Stage::SetRole));
        assert_eq!(
            conn.executed,
            vec!["begin", r#"set local role "app_anonymous""#, "rollback"]
        );
    }

    #[tokio::test]
    async fn test_settings_failure_rolls_back() {
        let mut conn = RecordingConnection::failing_on("select set_config");
        let err = run_scoped(&mut conn, &settings(), &Statement::new("select 1"))
            .await
            .unwrap_err();

        assert_eq!(err.stage(), Some(Stage::SetLocals));
        assert_eq!(conn.executed.last().map(String::as_str), Some("rollback"));
    }

    #[tokio::test]
    async fn test_commit_failure_is_reported() {
        let mut conn = RecordingConnection::failing_on("commit");
        let err = run_scoped(&mut conn, &settings(), &Statement::new("select 1"))
            .await
            .unwrap_err();

        assert!(matches!(err, PgError::Commit(_)));
    }

    #[tokio::test]
    async fn test_begin_failure_issues_nothing_else() {
        let mut conn = RecordingConnection::failing_on("begin");
        let err = run_scoped(&mut conn, &settings(), &Statement::new("select 1"))
            .await
            .unwrap_err();

        assert_eq!(err.stage(), Some(Stage::Begin));
        assert_eq!(conn.executed, vec!["begin"]);
    }

    #[tokio::test]
    async fn test_nul_in_role_is_refused() {
        let mut conn = RecordingConnection::default();
        let settings = TransactionSettings::role_only("app_admin\0");
        let err = run_scoped(&mut conn, &settings, &Statement::new("select 1"))
            .await
            .unwrap_err();

        assert!(matches!(err, PgError::InvalidRole { .. }));
        assert_eq!(err.stage(), Some(Stage::SetRole));
        assert_eq!(conn.executed, vec!["begin", "rollback"]);
    }

    #[test]
    fn test_role_is_escaped_as_identifier() {
        let stmt = set_local_role_statement(r#"app_x"; reset role; --"#).unwrap();
        assert_eq!(stmt.text(), r#"set local role "app_x""; reset role; --""#);
        assert!(stmt.params().is_empty());
    }
}
