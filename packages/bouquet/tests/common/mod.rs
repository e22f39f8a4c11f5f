#![allow(dead_code)]

use bouquet::{PgConfig, PgStore};
use bouquet_test_support::db::skip_without_database;

pub const ANONYMOUS_ROLE: &str = "app_anonymous";
pub const USER_ROLE: &str = "app_user";

pub fn init_logging() {
    bouquet_test_support::logging::init();
}

/// A connected store with the test roles in place, or `None` when no database
/// is configured.
pub async fn store(test: &str) -> Option<PgStore> {
    init_logging();
    if skip_without_database(test) {
        return None;
    }

    let store = PgStore::from_env()
        .await
        .expect("DATABASE_URL/PG* is set but the database is unreachable");
    ensure_roles(&store).await;
    Some(store)
}

/// Like [`store`] but backed by a single connection, so consecutive calls
/// are guaranteed to reuse the same pool slot.
pub async fn single_connection_store(test: &str) -> Option<PgStore> {
    let setup = store(test).await?;
    setup.close().await;

    let mut config = PgConfig::from_env().expect("database config");
    config.max_connections = 1;
    Some(
        PgStore::connect(&config)
            .await
            .expect("single-connection store"),
    )
}

async fn ensure_roles(store: &PgStore) {
    let create = format!(
        "do $$ begin
            if not exists (select from pg_roles where rolname = '{ANONYMOUS_ROLE}') then
                create role {ANONYMOUS_ROLE} nologin;
            end if;
            if not exists (select from pg_roles where rolname = '{USER_ROLE}') then
                create role {USER_ROLE} nologin;
            end if;
        end $$"
    );
    store.query(create).await.expect("create test roles");
    store
        .query(format!("grant {ANONYMOUS_ROLE}, {USER_ROLE} to current_user"))
        .await
        .expect("grant test roles");
}
