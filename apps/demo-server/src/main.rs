use actix_web::dev::Service;
use actix_web::{web, App, HttpMessage, HttpResponse, HttpServer};
use bouquet::pg::{ContextPart, RoleSource, SettingsMap};
use bouquet::web::middleware::new_csrf_cookie;
use bouquet::{
    configure_error_handling, ensure_authenticated, ensure_csrf_protected, ensure_trace_protected,
    AppError, AuthenticatedUser, ContextWithBody, EnsureNocache, PgStore, RequestContext, RequestTrace,
    StructuredLogger, WebConfig,
};
use serde_json::{json, Map, Value};
use sqlx::Row;
use tracing::{error, info};

// Header values are left out: recent Postgres rejects `-` in custom setting names.
const PARTS: &[ContextPart] = &[
    ContextPart::User,
    ContextPart::Query,
    ContextPart::Session,
    ContextPart::Method,
];

async fn whoami(
    store: web::Data<PgStore>,
    role: web::Data<RoleSource>,
    ctx: RequestContext,
) -> Result<HttpResponse, AppError> {
    let mut defaults = SettingsMap::new();
    defaults.insert("application_name", "demo-server");

    let rows = store
        .query_with_context(
            &ctx,
            PARTS,
            &role,
            &defaults,
            "select current_user::text as role,
                    current_setting('request.user.id', true) as user_id,
                    current_setting('request.method', true) as method",
        )
        .await?;

    let row = rows
        .first()
        .ok_or_else(|| AppError::internal("whoami returned no row".to_string()))?;
    let column = |name: &str| -> Result<Option<String>, AppError> {
        row.try_get(name)
            .map_err(|e| AppError::internal(format!("reading {name}: {e}")))
    };

    Ok(HttpResponse::Ok().json(json!({
        "role": column("role")?,
        "userId": column("user_id")?,
        "method": column("method")?,
    })))
}

/// Echoes what a `request.params.*` / `request.body.*` policy would see.
async fn preview_note(
    store: web::Data<PgStore>,
    role: web::Data<RoleSource>,
    ctx: ContextWithBody,
) -> Result<HttpResponse, AppError> {
    let rows = store
        .query_with_context(
            &ctx.into_inner(),
            &[ContextPart::User, ContextPart::Params, ContextPart::Body],
            &role,
            &SettingsMap::new(),
            "select current_setting('request.params.topic', true) as topic,
                    current_setting('request.body.title', true) as title",
        )
        .await?;

    let row = rows
        .first()
        .ok_or_else(|| AppError::internal("preview returned no row".to_string()))?;
    let column = |name: &str| -> Result<Option<String>, AppError> {
        row.try_get(name)
            .map_err(|e| AppError::internal(format!("reading {name}: {e}")))
    };

    Ok(HttpResponse::Ok().json(json!({
        "topic": column("topic")?,
        "title": column("title")?,
    })))
}

async fn profile(user: AuthenticatedUser) -> HttpResponse {
    HttpResponse::Ok().json(Value::Object(user.0))
}

async fn csrf() -> HttpResponse {
    let cookie = new_csrf_cookie();
    let token = cookie.value().to_string();
    HttpResponse::Ok()
        .cookie(cookie)
        .json(json!({ "csrfToken": token }))
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    if let Err(e) = bouquet::init_tracing() {
        eprintln!("failed to install the log subscriber: {e}");
    }

    let web_config = match WebConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!(error = %e, "invalid web configuration");
            std::process::exit(1);
        }
    };

    let store = match PgStore::from_env().await {
        Ok(store) => store,
        Err(e) => {
            error!(error = %e, "failed to connect to postgres");
            std::process::exit(1);
        }
    };

    info!(host = %web_config.host, port = web_config.port, protection = web_config.with_protection, "starting demo server");

    let store_data = web::Data::new(store.clone());
    let role = web::Data::new(RoleSource::from_user_field("app_", "role", "anonymous"));
    let bind = (web_config.host.clone(), web_config.port);

    HttpServer::new(move || {
        App::new()
            .app_data(store_data.clone())
            .app_data(role.clone())
            .route("/api/csrf", web::get().to(csrf))
            .route("/api/whoami", web::get().to(whoami))
            .route("/api/notes/{topic}/preview", web::post().to(preview_note))
            .service(
                web::scope("/api/profile")
                    .wrap(ensure_authenticated())
                    .route("", web::get().to(profile)),
            )
            .configure(configure_error_handling)
            .wrap(ensure_csrf_protected(&web_config))
            .wrap(ensure_trace_protected(&web_config))
            // Demo sign-in: `x-demo-user: <id>:<role>` stands in for a real auth layer.
            .wrap_fn(|req, srv| {
                let demo_user = req
                    .headers()
                    .get("x-demo-user")
                    .and_then(|v| v.to_str().ok())
                    .and_then(|v| v.split_once(':'))
                    .map(|(id, role)| (id.to_string(), role.to_string()));
                if let Some((id, role)) = demo_user {
                    let mut user = Map::new();
                    user.insert("id".to_string(), Value::String(id));
                    user.insert("role".to_string(), Value::String(role));
                    req.extensions_mut().insert(AuthenticatedUser(user));
                }
                srv.call(req)
            })
            .wrap(EnsureNocache)
            .wrap(RequestTrace)
            .wrap(StructuredLogger)
    })
    .bind(bind)?
    .run()
    .await?;

    store.close().await;
    Ok(())
}
