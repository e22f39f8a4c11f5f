use std::fmt;

use thiserror::Error;

use crate::config::ConfigError;

/// Step of a context-scoped transaction at which a statement failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Begin,
    SetRole,
    SetLocals,
    Execute,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Begin => "begin",
            Stage::SetRole => "set_role",
            Stage::SetLocals => "set_locals",
            Stage::Execute => "execute",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Error)]
pub enum PgError {
    /// The pool could not hand out a connection.
    #[error("failed to acquire a connection: {0}")]
    Acquire(#[source] sqlx::Error),
    /// A statement failed; the transaction (if any) was rolled back.
    #[error("{source}")]
    Statement {
        stage: Stage,
        #[source]
        source: sqlx::Error,
    },
    #[error("commit failed: {0}")]
    Commit(#[source] sqlx::Error),
    /// The resolved role contains a NUL byte, which no identifier may hold.
    #[error("invalid role name {role:?}")]
    InvalidRole { role: String },
    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl PgError {
    pub(crate) fn statement(stage: Stage, source: sqlx::Error) -> Self {
        PgError::Statement { stage, source }
    }

    fn sqlx_error(&self) -> Option<&sqlx::Error> {
        match self {
            PgError::Acquire(e) | PgError::Commit(e) => Some(e),
            PgError::Statement { source, .. } => Some(source),
            PgError::InvalidRole { .. } | PgError::Config(_) => None,
        }
    }

    /// The message reported by the database server, e.g. `syntax error at end of input`.
    pub fn db_message(&self) -> Option<&str> {
        self.sqlx_error()
            .and_then(|e| e.as_database_error())
            .map(|e| e.message())
    }

    /// SQLSTATE code reported by the server, when there is one.
    pub fn db_code(&self) -> Option<String> {
        self.sqlx_error()
            .and_then(|e| e.as_database_error())
            .and_then(|e| e.code())
            .map(|c| c.into_owned())
    }

    pub fn stage(&self) -> Option<Stage> {
        match self {
            PgError::Statement { stage, .. } => Some(*stage),
            PgError::InvalidRole { .. } => Some(Stage::SetRole),
            _ => None,
        }
    }
}
