use std::env;

/// Whether a Postgres database is configured for integration tests.
///
/// Returns the `DATABASE_URL` when set, `Some("")` when only `PGDATABASE` is
/// set (the libpq variables are then used), and `None` otherwise. Callers skip
/// database tests on `None`.
pub fn test_database_url() -> Option<String> {
    match env::var("DATABASE_URL") {
        Ok(url) if !url.is_empty() => Some(url),
        _ => env::var("PGDATABASE")
            .ok()
            .filter(|db| !db.is_empty())
            .map(|_| String::new()),
    }
}

/// Logs and returns `true` when no database is configured.
pub fn skip_without_database(test: &str) -> bool {
    if test_database_url().is_none() {
        tracing::warn!(test, "skipping: neither DATABASE_URL nor PGDATABASE is set");
        return true;
    }
    false
}
