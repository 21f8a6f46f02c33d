mod analysis;
mod auth;
mod config;
mod db;
mod error;
mod health;
mod profile;

use std::sync::Arc;

use anyhow::Result;
use axum::{
    Router,
    extract::DefaultBodyLimit,
    routing::{get, post},
};
use mongodb::Database;
use tokio::net::TcpListener;
use tower_http::{
    cors::{AllowHeaders, AllowMethods, AllowOrigin, CorsLayer},
    trace::TraceLayer,
};
use tracing_subscriber::EnvFilter;

use crate::auth::SessionAuth;
use crate::config::Config;
use crate::health::health_check;

/// Inline base64 study payloads ride in JSON bodies, so the default axum
/// limit is far too small.
const MAX_BODY_BYTES: usize = 20 * 1024 * 1024;

#[derive(Clone)]
pub struct AppState {
    pub db: Database,
    pub sessions: Arc<SessionAuth>,
}

fn router(state: AppState) -> Router {
    // Credentialed CORS: reflect whatever origin calls us, as the
    // deployment fronts this with its own origin policy.
    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::mirror_request())
        .allow_methods(AllowMethods::mirror_request())
        .allow_headers(AllowHeaders::mirror_request())
        .allow_credentials(true);

    Router::new()
        .route("/health", get(health_check))
        .route("/api/auth/register", post(auth::register))
        .route("/api/auth/login", post(auth::login))
        .route("/api/auth/me", get(auth::me))
        .route("/api/auth/logout", post(auth::logout))
        .route(
            "/api/profile",
            get(profile::get_profile).put(profile::update_profile),
        )
        .route("/api/analysis/history", get(analysis::history))
        .route(
            "/api/analysis/category-counts",
            get(analysis::category_counts),
        )
        .route("/api/analysis/upload", post(analysis::upload))
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Config::from_env()?;

    let client = db::create_client(&config.mongo_uri).await?;
    let database = db::get_database(&client, config.db_name.as_deref());
    tracing::info!("using database: {}", database.name());
    db::ensure_indexes(&database).await?;

    let sessions = SessionAuth::from_secret(config.jwt_secret.as_deref());
    let state = AppState {
        db: database,
        sessions: Arc::new(sessions),
    };

    let listener = TcpListener::bind(("0.0.0.0", config.port)).await?;
    tracing::info!("listening on {}", listener.local_addr()?);
    axum::serve(listener, router(state)).await?;

    Ok(())
}
