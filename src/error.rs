use crate::ingest::{DecodeError, SyslogParseError};
use crate::logs::filter::FilterParseError;
use crate::logs::search::QueryParseError;
use crate::logs::LogError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use std::fmt;

/// Application error types
#[derive(Debug)]
pub enum AppError {
    /// Malformed request parameters (cursor, instants, interval, size)
    BadRequest(String),
    /// Filter or free-text query rejected by a parser, compiler or the backend
    InvalidQuery(String),
    /// Ingestion payload that could not be decoded
    DecodeError(String),
    /// Authentication error
    Unauthorized(String),
    NotFound(String),
    /// Internal server error
    InternalError(String),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BadRequest(msg) => write!(f, "Bad request: {}", msg),
            Self::InvalidQuery(msg) => write!(f, "Invalid query: {}", msg),
            Self::DecodeError(msg) => write!(f, "Decode error: {}", msg),
            Self::Unauthorized(msg) => write!(f, "Unauthorized: {}", msg),
            Self::NotFound(msg) => write!(f, "Not found: {}", msg),
            Self::InternalError(msg) => write!(f, "Internal error: {}", msg),
        }
    }
}

impl std::error::Error for AppError {}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) | Self::InvalidQuery(_) | Self::DecodeError(_) => {
                StatusCode::BAD_REQUEST
            }
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::InternalError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let error_message = match &self {
            Self::BadRequest(msg)
            | Self::InvalidQuery(msg)
            | Self::DecodeError(msg)
            | Self::Unauthorized(msg)
            | Self::NotFound(msg) => msg.clone(),
            Self::InternalError(msg) => {
                tracing::error!(error = %msg, "Request failed");
                msg.clone()
            }
        };

        let body = Json(json!({
            "error": {
                "message": error_message,
                "type": error_type_name(&self),
            }
        }));

        (status, body).into_response()
    }
}

fn error_type_name(error: &AppError) -> &'static str {
    match error {
        AppError::BadRequest(_) => "bad_request",
        AppError::InvalidQuery(_) => "invalid_query",
        AppError::DecodeError(_) => "decode_error",
        AppError::Unauthorized(_) => "unauthorized",
        AppError::NotFound(_) => "not_found",
        AppError::InternalError(_) => "internal_error",
    }
}

impl From<LogError> for AppError {
    fn from(err: LogError) -> Self {
        match err {
            LogError::InvalidQuery(msg) => Self::InvalidQuery(msg),
            LogError::QueryParse(e) => Self::InvalidQuery(e.to_string()),
            LogError::Compile(e) if e.is_client_error() => Self::InvalidQuery(e.to_string()),
            LogError::InvalidRequest(msg) => Self::BadRequest(msg),
            other => Self::InternalError(other.to_string()),
        }
    }
}

impl From<FilterParseError> for AppError {
    fn from(err: FilterParseError) -> Self {
        Self::InvalidQuery(format!("filter: {}", err))
    }
}

impl From<QueryParseError> for AppError {
    fn from(err: QueryParseError) -> Self {
        Self::InvalidQuery(format!("query: {}", err))
    }
}

impl From<DecodeError> for AppError {
    fn from(err: DecodeError) -> Self {
        Self::DecodeError(err.to_string())
    }
}

impl From<SyslogParseError> for AppError {
    fn from(err: SyslogParseError) -> Self {
        Self::DecodeError(format!("syslog: {}", err))
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        Self::InternalError(err.to_string())
    }
}
