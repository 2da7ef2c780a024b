//! Log query HTTP API handlers
//!
//! Every endpoint accepts the same search parameters: free-text `query`,
//! structured `filter`, and RFC3339 `from`/`to` bounds on the observed
//! timestamp. Empty parameters are ignored.

use crate::error::AppError;
use crate::logs::filter::parse_filter;
use crate::logs::{Cursor, Log, PageRequest, SearchRequest, Volume};
use crate::server::AppState;
use axum::body::Body;
use axum::extract::{Query, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Json, Response};
use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;
use std::time::Duration;
use tokio_util::io::ReaderStream;

const DEFAULT_INTERVAL: Duration = Duration::from_secs(600);

/// `PnDTnHnMnS` with every component optional; seconds may be fractional
static ISO_DURATION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^P(?:(\d+)D)?(?:T(?:(\d+)H)?(?:(\d+)M)?(?:(\d+(?:\.\d+)?)S)?)?$").unwrap()
});

/// Query parameters shared by the logs API
#[derive(Debug, Default, Deserialize)]
pub struct LogQueryParams {
    /// Free-text search over log bodies
    pub query: Option<String>,

    /// Structured filter, e.g. `serviceName == 'blog' AND attributes['status'] >= 500`
    pub filter: Option<String>,

    pub from: Option<String>,
    pub to: Option<String>,

    /// `<timestamp>,<observedTimestamp>` of the last record of the previous page
    pub cursor: Option<String>,

    /// Page size, 0 for unlimited
    pub size: Option<u32>,

    /// ISO-8601 bucket width for volumes, e.g. `PT10M`
    pub interval: Option<String>,
}

impl LogQueryParams {
    /// Criteria without pagination
    fn search_request(&self) -> Result<SearchRequest, AppError> {
        Ok(SearchRequest {
            query: non_empty(&self.query).map(str::to_string),
            filter: non_empty(&self.filter).map(parse_filter).transpose()?,
            from: non_empty(&self.from).map(parse_instant).transpose()?,
            to: non_empty(&self.to).map(parse_instant).transpose()?,
            page_request: None,
        })
    }

    fn page_request(&self, default_size: u32) -> Result<PageRequest, AppError> {
        let cursor = non_empty(&self.cursor)
            .map(|c| c.parse::<Cursor>())
            .transpose()
            .map_err(|e| AppError::BadRequest(e.to_string()))?;
        Ok(PageRequest {
            cursor,
            size: self.size.unwrap_or(default_size),
        })
    }

    fn interval(&self) -> Result<Duration, AppError> {
        match non_empty(&self.interval) {
            None => Ok(DEFAULT_INTERVAL),
            Some(text) => parse_iso8601_duration(text).ok_or_else(|| {
                AppError::BadRequest(format!("Invalid ISO-8601 duration '{}'", text))
            }),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct LogsResponse {
    pub logs: Vec<Log>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CountResponse {
    pub total_count: i64,
}

#[derive(Debug, Serialize)]
pub struct VolumesResponse {
    pub volumes: Vec<Volume>,
}

/// GET /api/logs - Latest matching logs, newest first
///
/// Example: GET /api/logs?query=error&filter=serviceName%20%3D%3D%20'blog'&size=50
pub async fn list_logs(
    State(state): State<AppState>,
    Query(params): Query<LogQueryParams>,
) -> Result<Json<LogsResponse>, AppError> {
    let mut request = params.search_request()?;
    request.page_request = Some(params.page_request(state.config.query.default_page_size)?);

    let logs = state.db.find_latest_logs(&request).await?;
    Ok(Json(LogsResponse { logs }))
}

/// GET /api/logs/count - Number of matching logs
pub async fn count_logs(
    State(state): State<AppState>,
    Query(params): Query<LogQueryParams>,
) -> Result<Json<CountResponse>, AppError> {
    let request = params.search_request()?;
    let total_count = state.db.count(&request).await?;
    Ok(Json(CountResponse { total_count }))
}

/// GET /api/logs/volumes - Matching logs counted per time bucket
///
/// Example: GET /api/logs/volumes?interval=PT5M&from=2024-08-09T00:00:00Z
pub async fn log_volumes(
    State(state): State<AppState>,
    Query(params): Query<LogQueryParams>,
) -> Result<Json<VolumesResponse>, AppError> {
    let request = params.search_request()?;
    let volumes = state.db.find_volumes(&request, params.interval()?).await?;
    Ok(Json(VolumesResponse { volumes }))
}

/// DELETE /api/logs - Delete matching logs, or everything without criteria
pub async fn delete_logs(
    State(state): State<AppState>,
    Query(params): Query<LogQueryParams>,
) -> Result<StatusCode, AppError> {
    let request = params.search_request()?;
    state.db.delete(&request).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// GET /api/logs/download - Stream the database file
pub async fn download(State(state): State<AppState>) -> Result<Response, AppError> {
    let path = state
        .db
        .path()
        .ok_or_else(|| AppError::NotFound("Database has no backing file".to_string()))?
        .to_path_buf();

    state.db.checkpoint().await?;

    let file = tokio::fs::File::open(&path).await.map_err(|e| {
        AppError::InternalError(format!("Failed to open {}: {}", path.display(), e))
    })?;
    let filename = path
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or("logvault.db");

    let headers = [
        (header::CONTENT_TYPE, "application/octet-stream".to_string()),
        (
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{}\"", filename),
        ),
    ];
    Ok((headers, Body::from_stream(ReaderStream::new(file))).into_response())
}

/// POST /api/logs/vacuum - Reclaim free pages in the database file
pub async fn vacuum(State(state): State<AppState>) -> Result<StatusCode, AppError> {
    state.db.vacuum().await?;
    Ok(StatusCode::NO_CONTENT)
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

fn parse_instant(text: &str) -> Result<DateTime<Utc>, AppError> {
    DateTime::parse_from_rfc3339(text)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| AppError::BadRequest(format!("Invalid instant '{}': {}", text, e)))
}

/// Parse the day/time subset of ISO-8601 durations (`P1D`, `PT10M`, `PT1H30M`, `PT0.5S`)
pub fn parse_iso8601_duration(text: &str) -> Option<Duration> {
    let caps = ISO_DURATION_RE.captures(text)?;
    if (1..=4).all(|i| caps.get(i).is_none()) {
        return None;
    }

    let whole = |i: usize| -> Option<u64> {
        caps.get(i).map_or(Some(0), |m| m.as_str().parse().ok())
    };
    let seconds = caps
        .get(4)
        .map_or(Some(0.0), |m| m.as_str().parse::<f64>().ok())?;

    let total = whole(1)?
        .checked_mul(86_400)?
        .checked_add(whole(2)?.checked_mul(3_600)?)?
        .checked_add(whole(3)?.checked_mul(60)?)?;
    Duration::from_secs(total).checked_add(Duration::try_from_secs_f64(seconds).ok()?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_iso8601_duration() {
        assert_eq!(parse_iso8601_duration("PT10M"), Some(Duration::from_secs(600)));
        assert_eq!(parse_iso8601_duration("PT1H"), Some(Duration::from_secs(3600)));
        assert_eq!(parse_iso8601_duration("pt1h30m"), Some(Duration::from_secs(5400)));
        assert_eq!(parse_iso8601_duration("P1D"), Some(Duration::from_secs(86_400)));
        assert_eq!(parse_iso8601_duration("PT0.5S"), Some(Duration::from_millis(500)));
        assert_eq!(parse_iso8601_duration("P"), None);
        assert_eq!(parse_iso8601_duration("PT"), None);
        assert_eq!(parse_iso8601_duration("10m"), None);
        assert_eq!(parse_iso8601_duration("PT-5M"), None);
    }

    #[test]
    fn test_empty_params_are_ignored() {
        let params = LogQueryParams {
            query: Some("  ".to_string()),
            filter: Some(String::new()),
            ..Default::default()
        };
        let request = params.search_request().unwrap();
        assert!(request.is_unrestricted());
        assert_eq!(params.interval().unwrap(), DEFAULT_INTERVAL);
    }

    #[test]
    fn test_invalid_params_are_bad_requests() {
        let params = LogQueryParams {
            from: Some("yesterday".to_string()),
            ..Default::default()
        };
        assert!(matches!(params.search_request(), Err(AppError::BadRequest(_))));

        let params = LogQueryParams {
            filter: Some("serviceName ==".to_string()),
            ..Default::default()
        };
        assert!(matches!(params.search_request(), Err(AppError::InvalidQuery(_))));

        let params = LogQueryParams {
            cursor: Some("nope".to_string()),
            ..Default::default()
        };
        assert!(matches!(params.page_request(30), Err(AppError::BadRequest(_))));

        let params = LogQueryParams {
            interval: Some("ten minutes".to_string()),
            ..Default::default()
        };
        assert!(matches!(params.interval(), Err(AppError::BadRequest(_))));
    }

    #[test]
    fn test_page_request_defaults() {
        let params = LogQueryParams {
            cursor: Some("2024-08-09T01:01:11Z,2024-08-09T01:01:12Z".to_string()),
            ..Default::default()
        };
        let page = params.page_request(30).unwrap();
        assert_eq!(page.size, 30);
        assert!(page.cursor.is_some());
    }
}
