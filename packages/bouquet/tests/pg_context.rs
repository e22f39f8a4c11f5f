//! Scoped statements against a live Postgres. Skipped when none is configured.
//!
//! Setting names here are plain dotted identifiers: recent Postgres releases
//! reject custom names containing `-` or quotes.

mod common;

use std::time::Duration;

use bouquet::pg::{ContextPart, PgError, RequestContext, RoleSource, SettingsMap, Stage, Statement};
use serde_json::{json, Map, Value};
use serial_test::serial;
use sqlx::Row;

use common::{ANONYMOUS_ROLE, USER_ROLE};

fn object(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}

fn request() -> RequestContext {
    RequestContext::new("GET", "https", "example.com", "/user/42?zero=0")
        .with_header("accept", "application/json")
        .with_query(object(json!({
            "zero": 0,
            "bool": true,
            "obj": { "a": 1 },
            "nul": null,
            "quote": "it's",
        })))
}

fn role() -> RoleSource {
    RoleSource::from_user_field("app_", "roleName", "anonymous")
}

fn defaults() -> SettingsMap {
    let mut defaults = SettingsMap::new();
    defaults.insert("application_name", "bouquet-test");
    defaults
}

const PARTS: &[ContextPart] = &[
    ContextPart::Headers,
    ContextPart::User,
    ContextPart::Query,
    ContextPart::Session,
];

#[tokio::test]
#[serial]
async fn test_settings_and_role_visible_inside_transaction() {
    let Some(store) = common::store("test_settings_and_role_visible_inside_transaction").await
    else {
        return;
    };

    let ctx = request().with_user(object(json!({ "id": 42, "roleName": "user" })));
    let rows = store
        .query_with_context(
            &ctx,
            PARTS,
            &role(),
            &defaults(),
            "select current_user::text as role,
                    current_setting('request.header.accept', true) as accept,
                    current_setting('request.user.id', true) as user_id,
                    current_setting('request.query.zero', true) as zero,
                    current_setting('request.query.bool', true) as flag,
                    current_setting('request.query.obj', true) as obj,
                    current_setting('request.query.nul', true) as nul,
                    current_setting('request.query.quote', true) as quote,
                    current_setting('request.session.id', true) as session_id,
                    current_setting('application_name') as app",
        )
        .await
        .unwrap();

    assert_eq!(rows.len(), 1);
    let row = &rows[0];
    let text = |column: &str| row.try_get::<Option<String>, _>(column).unwrap();

    assert_eq!(text("role").as_deref(), Some(USER_ROLE));
    assert_eq!(text("accept").as_deref(), Some("application/json"));
    assert_eq!(text("user_id").as_deref(), Some("42"));
    assert_eq!(text("zero").as_deref(), Some("0"));
    assert_eq!(text("flag").as_deref(), Some("true"));
    assert_eq!(text("obj").as_deref(), Some(r#"{"a":1}"#));
    assert_eq!(text("nul").as_deref(), Some(""));
    assert_eq!(text("quote").as_deref(), Some("it's"));
    assert_eq!(text("session_id").as_deref(), Some(""));
    assert_eq!(text("app").as_deref(), Some("bouquet-test"));
}

#[tokio::test]
#[serial]
async fn test_anonymous_role_without_user() {
    let Some(store) = common::store("test_anonymous_role_without_user").await else {
        return;
    };

    let rows = store
        .query_with_context(
            &request(),
            PARTS,
            &role(),
            &SettingsMap::new(),
            "select current_user::text as role",
        )
        .await
        .unwrap();

    let role: String = rows[0].try_get("role").unwrap();
    assert_eq!(role, ANONYMOUS_ROLE);
}

#[tokio::test]
#[serial]
async fn test_settings_do_not_outlive_transaction() {
    let Some(store) = common::store("test_settings_do_not_outlive_transaction").await else {
        return;
    };

    store
        .query_with_context(&request(), PARTS, &role(), &SettingsMap::new(), "select 1")
        .await
        .unwrap();

    // Runs on any pooled connection, possibly the one used above.
    let rows = store
        .query(
            "select current_setting('request.header.accept', true) as accept,
                    current_user = session_user as login_role",
        )
        .await
        .unwrap();

    let leftover: Option<String> = rows[0].try_get("accept").unwrap();
    assert!(leftover.unwrap_or_default().is_empty());
    let login_role: bool = rows[0].try_get("login_role").unwrap();
    assert!(login_role);
}

#[tokio::test]
#[serial]
async fn test_statement_error_surfaces_and_pool_recovers() {
    let Some(store) = common::store("test_statement_error_surfaces_and_pool_recovers").await
    else {
        return;
    };

    let err = store
        .query_as_role(ANONYMOUS_ROLE, "select 1 as")
        .await
        .unwrap_err();
    assert!(matches!(err, PgError::Statement { .. }));
    assert_eq!(err.stage(), Some(Stage::Execute));
    assert_eq!(err.db_message(), Some("syntax error at end of input"));

    let rows = store
        .query_as_role(ANONYMOUS_ROLE, "select current_user::text as role")
        .await
        .unwrap();
    let role: String = rows[0].try_get("role").unwrap();
    assert_eq!(role, ANONYMOUS_ROLE);
}

#[tokio::test]
#[serial]
async fn test_unknown_role_fails_at_set_role() {
    let Some(store) = common::store("test_unknown_role_fails_at_set_role").await else {
        return;
    };

    let err = store
        .query_as_role("app_does_not_exist", "select 1")
        .await
        .unwrap_err();
    assert_eq!(err.stage(), Some(Stage::SetRole));
}

#[tokio::test]
#[serial]
async fn test_bound_parameters() {
    let Some(store) = common::store("test_bound_parameters").await else {
        return;
    };

    let statement = Statement::new("select $1::text as name, $2::int8 as n, $3::text as missing")
        .bind("Robert'); drop table students;--")
        .bind(7i64)
        .bind_null();
    let rows = store.query_as_role(ANONYMOUS_ROLE, statement).await.unwrap();

    let name: String = rows[0].try_get("name").unwrap();
    let n: i64 = rows[0].try_get("n").unwrap();
    let missing: Option<String> = rows[0].try_get("missing").unwrap();
    assert_eq!(name, "Robert'); drop table students;--");
    assert_eq!(n, 7);
    assert_eq!(missing, None);
}

#[tokio::test]
#[serial]
async fn test_unscoped_query_runs_as_login_role() {
    let Some(store) = common::store("test_unscoped_query_runs_as_login_role").await else {
        return;
    };

    let rows = store
        .query("select current_user = session_user as login_role, 1::int4 as one")
        .await
        .unwrap();
    let one: i32 = rows[0].try_get("one").unwrap();
    let login_role: bool = rows[0].try_get("login_role").unwrap();
    assert_eq!(one, 1);
    assert!(login_role);
}

#[tokio::test]
#[serial]
async fn test_tracked_client_records_last_statement() {
    let Some(store) = common::store("test_tracked_client_records_last_statement").await else {
        return;
    };

    let mut client = store.get_client().await.unwrap();
    assert_eq!(client.last_statement(), None);

    let result = bouquet::pg::txn::run_scoped(
        &mut client,
        &bouquet::pg::TransactionSettings::role_only(ANONYMOUS_ROLE),
        &Statement::new("select 1"),
    )
    .await;
    assert!(result.is_ok());
    assert_eq!(client.last_statement().as_deref(), Some("commit"));
    assert!(client.last_statement_id().is_some());

    client.release(None).await;
}

#[tokio::test]
#[serial]
async fn test_cancelled_call_leaves_no_role_or_settings_behind() {
    let Some(store) =
        common::single_connection_store("test_cancelled_call_leaves_no_role_or_settings_behind")
            .await
    else {
        return;
    };

    let cancelled = tokio::time::timeout(
        Duration::from_millis(200),
        store.query_with_context(
            &request(),
            &[ContextPart::Query],
            &RoleSource::Static(ANONYMOUS_ROLE.to_string()),
            &SettingsMap::new(),
            "select 1 from pg_sleep(1)",
        ),
    )
    .await;
    assert!(cancelled.is_err());

    let rows = store
        .query(
            "select current_user = session_user as login_role,
                    current_setting('request.query.zero', true) as zero",
        )
        .await
        .unwrap();
    let login_role: bool = rows[0].try_get("login_role").unwrap();
    let zero: Option<String> = rows[0].try_get("zero").unwrap();
    assert!(login_role);
    assert_eq!(zero.unwrap_or_default(), "");

    store.close().await;
}
