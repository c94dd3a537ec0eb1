pub mod auth;
pub mod friends;
pub mod health;
pub mod messages;
pub mod middleware;
pub mod notifications;
pub mod storage;
pub mod sweep;
pub mod waitlist;

use axum::http::StatusCode;
use chrono::{DateTime, Utc};
use tracing::{error, warn};
use uuid::Uuid;

pub(crate) fn internal(e: anyhow::Error) -> StatusCode {
    error!("DB error: {}", e);
    StatusCode::INTERNAL_SERVER_ERROR
}

/// Row ids come back from SQLite as text; a corrupt id is logged and
/// replaced with the nil UUID rather than failing the whole response.
pub(crate) fn parse_uuid(s: &str, context: &str) -> Uuid {
    s.parse().unwrap_or_else(|e| {
        warn!("Corrupt {} '{}': {}", context, s, e);
        Uuid::default()
    })
}

pub(crate) fn parse_time(s: &str, context: &str) -> DateTime<Utc> {
    whisp_db::parse_timestamp(s).unwrap_or_else(|| {
        warn!("Corrupt {} '{}'", context, s);
        DateTime::default()
    })
}
