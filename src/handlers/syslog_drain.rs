//! Syslog drain ingestion

use crate::error::AppError;
use crate::ingest::syslog::parse_line;
use crate::metrics;
use crate::server::AppState;
use axum::extract::State;
use axum::http::StatusCode;
use chrono::Utc;

/// POST /drain - Queue one RFC5424 line for the next batch write
pub async fn drain(State(state): State<AppState>, body: String) -> Result<StatusCode, AppError> {
    let log = parse_line(&body, Utc::now()).map_err(|e| {
        tracing::warn!(error = %e, "Rejected syslog line");
        e
    })?;

    state.buffer.enqueue(log).await?;
    metrics::record_ingested("syslog", 1);

    Ok(StatusCode::OK)
}
