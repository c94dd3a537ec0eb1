use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use axum::{
    Router, middleware,
    routing::{get, post},
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use whisp_api::auth::{self, AppState, AppStateInner, RetentionPolicy};
use whisp_api::middleware::require_auth;
use whisp_api::storage::StorageClient;
use whisp_api::{friends, health, messages, notifications, sweep, waitlist};

/// Placeholder secrets that MUST NOT be used.
const PLACEHOLDER_SECRETS: &[&str] = &["change-me-to-a-random-string", "dev-secret-change-me"];

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "whisp=debug,tower_http=debug".into()),
        )
        .init();

    // Config
    let jwt_secret = std::env::var("WHISP_JWT_SECRET").unwrap_or_default();
    if jwt_secret.is_empty() || PLACEHOLDER_SECRETS.contains(&jwt_secret.as_str()) {
        eprintln!("FATAL: WHISP_JWT_SECRET is unset or still a placeholder.");
        eprintln!("       Set it in your .env file and restart.");
        std::process::exit(1);
    }
    let cron_secret = std::env::var("WHISP_CRON_SECRET").unwrap_or_default();
    if cron_secret.is_empty() || PLACEHOLDER_SECRETS.contains(&cron_secret.as_str()) {
        eprintln!("FATAL: WHISP_CRON_SECRET is unset or still a placeholder.");
        eprintln!("       The cleanup sweep authenticates with it.");
        std::process::exit(1);
    }

    let host = std::env::var("WHISP_HOST").unwrap_or_else(|_| "0.0.0.0".into());
    let port: u16 = std::env::var("WHISP_PORT")
        .unwrap_or_else(|_| "3000".into())
        .parse()?;
    let db_path = std::env::var("WHISP_DB_PATH").unwrap_or_else(|_| "whisp.db".into());

    let storage = match (
        std::env::var("WHISP_STORAGE_API_URL").ok(),
        std::env::var("WHISP_STORAGE_API_KEY").ok(),
    ) {
        (Some(url), Some(key)) if !url.is_empty() && !key.is_empty() => {
            info!("Storage deletion API configured at {}", url);
            StorageClient::new(url, key)
        }
        _ => {
            info!("No storage API configured; remote files will not be deleted");
            StorageClient::disabled()
        }
    };

    let retention = RetentionPolicy {
        soft_deleted_days: env_days("WHISP_SOFT_DELETED_RETENTION_DAYS", 30),
        unread_days: env_days("WHISP_UNREAD_RETENTION_DAYS", 90),
    };
    info!(
        "Retention: {} days soft-deleted, {} days unread",
        retention.soft_deleted_days, retention.unread_days
    );

    // Init database
    let db = whisp_db::Database::open(&PathBuf::from(&db_path))?;

    // Shared state
    let state: AppState = Arc::new(AppStateInner {
        db,
        jwt_secret,
        cron_secret,
        storage,
        retention,
    });

    // Routes
    let public_routes = Router::new()
        .route("/health", get(health::health))
        .route("/auth/register", post(auth::register))
        .route("/auth/login", post(auth::login))
        .with_state(state.clone());

    let protected_routes = Router::new()
        .route("/friends", get(friends::list_friends))
        .route("/friends/search", get(friends::search_users))
        .route("/friends/requests", post(friends::send_request))
        .route("/friends/requests/incoming", get(friends::incoming_requests))
        .route("/friends/requests/{request_id}/accept", post(friends::accept_request))
        .route("/friends/requests/{request_id}/decline", post(friends::decline_request))
        .route("/friends/requests/{request_id}/cancel", post(friends::cancel_request))
        .route("/messages", post(messages::send_message))
        .route("/messages/inbox", get(messages::inbox))
        .route("/messages/outbox", get(messages::outbox))
        .route("/messages/deliveries/{delivery_id}/read", post(messages::mark_read))
        .route("/messages/{message_id}/cleanup", post(messages::cleanup))
        .route(
            "/notifications/tokens",
            post(notifications::register_token).delete(notifications::remove_token),
        )
        .route(
            "/notifications/preferences",
            get(notifications::get_preferences).put(notifications::update_preferences),
        )
        .route("/waitlist", post(waitlist::join))
        .layer(middleware::from_fn_with_state(state.clone(), require_auth))
        .with_state(state.clone());

    let internal_routes = Router::new()
        .route("/internal/sweep", post(sweep::run_sweep))
        .with_state(state);

    let app = Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .merge(internal_routes)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    let addr: SocketAddr = format!("{}:{}", host, port).parse()?;
    info!("whisp server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

fn env_days(var: &str, default: i64) -> i64 {
    std::env::var(var)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();
    #[cfg(unix)]
    {
        let mut sigterm =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
                .expect("failed to install SIGTERM handler");
        tokio::select! {
            _ = ctrl_c => info!("Received Ctrl+C, shutting down..."),
            _ = sigterm.recv() => info!("Received SIGTERM, shutting down..."),
        }
    }
    #[cfg(not(unix))]
    {
        ctrl_c.await.ok();
        info!("Received Ctrl+C, shutting down...");
    }
}
