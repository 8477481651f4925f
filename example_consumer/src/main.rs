//! Example consumer: an axum service acting as the request pipeline around
//! tenancy-sdk. Each request builds its own tenancy scope, identifies the
//! tenant, handles the request against tenant-scoped subsystems, and tears
//! the scope down.
//!
//! Run from repo root: `cargo run -p example-consumer`

use axum::{
    extract::State,
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};
use std::sync::Arc;
use tenancy_sdk::{
    CallerIdentity, EventSink, PgTenantRepository, RequestView, TenancyConfig, TenancyError,
    Tenancy, TenantRepository, TracingSink,
};
use tokio::net::TcpListener;

#[derive(Clone)]
struct AppState {
    config: Arc<TenancyConfig>,
    repository: Arc<dyn TenantRepository>,
    events: Arc<dyn EventSink>,
}

impl AppState {
    fn tenancy(&self) -> Result<Tenancy, TenancyError> {
        Tenancy::new(
            self.config.clone(),
            self.repository.clone(),
            self.events.clone(),
        )
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("tenancy_sdk=info")),
        )
        .init();

    let database_url =
        std::env::var("DATABASE_URL").unwrap_or_else(|_| "postgres://localhost/tenancy".into());
    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(5)
        .connect(&database_url)
        .await?;

    let config: TenancyConfig = match std::env::var("TENANCY_CONFIG") {
        Ok(path) => serde_json::from_str(&std::fs::read_to_string(path)?)?,
        Err(_) => TenancyConfig::default(),
    };

    let state = AppState {
        config: Arc::new(config),
        repository: Arc::new(PgTenantRepository::new(pool)),
        events: Arc::new(TracingSink),
    };

    let app = Router::new()
        .route("/whoami", get(whoami))
        .route("/invoices", post(create_invoice))
        .with_state(state);

    let listener = TcpListener::bind("127.0.0.1:3000").await?;
    tracing::info!("example consumer listening on http://{}", listener.local_addr()?);
    axum::serve(listener, app).await?;
    Ok(())
}

/// Shows what the current request resolves to: tenant, table names, cache
/// key prefix, merged settings.
async fn whoami(
    State(state): State<AppState>,
    view: RequestView,
) -> Result<Json<Value>, TenancyError> {
    let mut tenancy = state.tenancy()?;
    let resolved = tenancy.handle_request(&view).await?;

    let body = json!({
        "tenant": resolved.as_ref().map(|t| json!({"id": t.id, "name": t.name})),
        "invoices_table": resolved
            .as_ref()
            .map(|_| tenancy.tables().resolve("invoices"))
            .transpose()?,
        "cache_key": tenancy.cache_prefix().apply("dashboard"),
        "settings_keys": tenancy.settings().keys(),
    });

    tenancy.finish();
    Ok(Json(body))
}

/// Demonstrates the tamper guard: a body carrying a foreign tenant_id has
/// the field stripped before the handler's own logic sees it.
async fn create_invoice(
    State(state): State<AppState>,
    view: RequestView,
    Json(mut body): Json<Value>,
) -> Result<Json<Value>, TenancyError> {
    let mut tenancy = state.tenancy()?;
    let resolved = tenancy.handle_request(&view).await?;
    let tenant = resolved
        .ok_or_else(|| TenancyError::TenantNotFound(view.host.clone().unwrap_or_default()))?;

    let mut scrubbed = 0;
    if let Some(map) = body.as_object_mut() {
        scrubbed = tenancy.scrub_body(map, &CallerIdentity::guest(), &view.path);
    }
    let table = tenancy.tables().resolve("invoices")?;
    tracing::info!(tenant_id = tenant.id, table = %table, scrubbed, "would insert invoice");

    tenancy.finish();
    Ok(Json(json!({"data": body, "meta": {"table": table, "scrubbed": scrubbed}})))
}
