//! OTLP/HTTP log ingestion

use crate::error::AppError;
use crate::ingest::otlp::{decode_request, from_request, PayloadFormat};
use crate::metrics;
use crate::server::AppState;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::{header, HeaderMap, StatusCode};
use chrono::Utc;

/// POST /v1/logs - Store an OTLP `ExportLogsServiceRequest`
///
/// Records are written directly, bypassing the drain buffer.
pub async fn ingest_logs(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<StatusCode, AppError> {
    let format = PayloadFormat::from_content_type(
        headers
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok()),
    );
    let gzip = headers
        .get(header::CONTENT_ENCODING)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.trim().eq_ignore_ascii_case("gzip"));

    let request = decode_request(&body, format, gzip, state.config.server.body_limit_bytes)?;
    let logs = from_request(&request, Utc::now());

    state.db.add_all(&logs).await?;
    metrics::record_ingested("otlp", logs.len());
    tracing::debug!(count = logs.len(), ?format, gzip, "Ingested OTLP logs");

    Ok(StatusCode::OK)
}
