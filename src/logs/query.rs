//! Read path: filtered, keyset-paginated queries over the log store
//!
//! All operations share one predicate builder. The full-text join is only
//! added when a free-text query is present.

use super::database::{from_nanos, to_nanos, LogDb};
use super::filter::{Expression, FilterCompiler, Sqlite3FilterCompiler};
use super::model::Log;
use super::search::{parse_query, Fts5QueryCompiler, QueryCompiler};
use super::LogError;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use sqlx::sqlite::SqliteRow;
use sqlx::{QueryBuilder, Row, Sqlite};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

const LOG_COLUMNS: &str = "SELECT log.log_id AS log_id,
       log.timestamp AS timestamp,
       log.observed_timestamp AS observed_timestamp,
       log.severity_text AS severity_text,
       log.severity_number AS severity_number,
       log.service_name AS service_name,
       log.scope AS scope,
       log.body AS body,
       log.trace_id AS trace_id,
       log.span_id AS span_id,
       log.trace_flags AS trace_flags,
       log.attributes AS attributes,
       resource_attributes.resource_attributes AS resource_attributes";

/// Seek key into the `observed_timestamp DESC, timestamp DESC` ordering
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cursor {
    pub timestamp: DateTime<Utc>,
    pub observed_timestamp: DateTime<Utc>,
}

impl Cursor {
    /// Cursor continuing after `log`
    pub fn of(log: &Log) -> Self {
        Self {
            timestamp: log.timestamp,
            observed_timestamp: log.observed_timestamp,
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("invalid cursor '{0}', expected '<timestamp>,<observedTimestamp>'")]
pub struct InvalidCursor(pub String);

impl FromStr for Cursor {
    type Err = InvalidCursor;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || InvalidCursor(s.to_string());
        let (timestamp, observed) = s.split_once(',').ok_or_else(invalid)?;
        let parse = |value: &str| {
            DateTime::parse_from_rfc3339(value.trim())
                .map(|dt| dt.with_timezone(&Utc))
                .map_err(|_| invalid())
        };
        Ok(Self {
            timestamp: parse(timestamp)?,
            observed_timestamp: parse(observed)?,
        })
    }
}

impl fmt::Display for Cursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{},{}",
            self.timestamp.to_rfc3339_opts(SecondsFormat::AutoSi, true),
            self.observed_timestamp
                .to_rfc3339_opts(SecondsFormat::AutoSi, true)
        )
    }
}

/// Page size plus optional continuation cursor; a size of 0 means unlimited
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub cursor: Option<Cursor>,
    pub size: u32,
}

/// Search criteria shared by every read operation
#[derive(Debug, Clone, Default)]
pub struct SearchRequest {
    /// Free-text query over log bodies
    pub query: Option<String>,
    pub filter: Option<Expression>,
    /// Inclusive lower bound on the observed timestamp
    pub from: Option<DateTime<Utc>>,
    /// Inclusive upper bound on the observed timestamp
    pub to: Option<DateTime<Utc>>,
    pub page_request: Option<PageRequest>,
}

impl SearchRequest {
    fn query_text(&self) -> Option<&str> {
        self.query.as_deref().map(str::trim).filter(|q| !q.is_empty())
    }

    /// True when no criterion restricts the matched set
    pub fn is_unrestricted(&self) -> bool {
        self.query_text().is_none()
            && self.filter.is_none()
            && self.from.is_none()
            && self.to.is_none()
    }
}

/// Record count for one time bucket
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Volume {
    pub date: DateTime<Utc>,
    pub count: i64,
}

/// Compiled user-supplied fragments of a request
struct Predicate {
    match_expression: Option<String>,
    filter: Option<String>,
}

impl Predicate {
    fn compile(request: &SearchRequest) -> Result<Self, LogError> {
        let match_expression = match request.query_text() {
            Some(text) => {
                let compiled = Fts5QueryCompiler.compile(&parse_query(text)?);
                Some(compiled).filter(|c| !c.is_empty())
            }
            None => None,
        };
        let filter = request
            .filter
            .as_ref()
            .map(|expression| Sqlite3FilterCompiler.compile(expression))
            .transpose()?;

        Ok(Self {
            match_expression,
            filter,
        })
    }

    fn push_from_where(&self, builder: &mut QueryBuilder<'_, Sqlite>, request: &SearchRequest) {
        if self.match_expression.is_some() {
            builder.push(
                " FROM log_fts
                  JOIN log ON log_fts.rowid = log.log_id
                  JOIN resource_attributes ON log.resource_attributes_digest = resource_attributes.digest",
            );
        } else {
            builder.push(
                " FROM log
                  JOIN resource_attributes ON log.resource_attributes_digest = resource_attributes.digest",
            );
        }
        builder.push(" WHERE 1 = 1");

        if let Some(cursor) = request.page_request.and_then(|page| page.cursor) {
            builder
                .push(" AND log.observed_timestamp <= ")
                .push_bind(to_nanos(&cursor.observed_timestamp))
                .push(" AND log.timestamp < ")
                .push_bind(to_nanos(&cursor.timestamp));
        }
        if let Some(from) = &request.from {
            builder
                .push(" AND log.observed_timestamp >= ")
                .push_bind(to_nanos(from));
        }
        if let Some(to) = &request.to {
            builder
                .push(" AND log.observed_timestamp <= ")
                .push_bind(to_nanos(to));
        }
        if let Some(match_expression) = &self.match_expression {
            builder
                .push(" AND log_fts MATCH ")
                .push_bind(match_expression.clone());
        }
        if let Some(filter) = &self.filter {
            builder.push(" AND (").push(filter).push(")");
        }
    }

    /// Backend rejections are the caller's fault when they supplied query text
    /// and SQLite reported a generic `SQLITE_ERROR` (bad syntax, unknown
    /// column, malformed fts5 expression). Locking and I/O failures are not.
    fn classify(&self, err: sqlx::Error) -> LogError {
        match err {
            sqlx::Error::Database(db)
                if (self.match_expression.is_some() || self.filter.is_some())
                    && is_generic_error(db.code().as_deref()) =>
            {
                LogError::InvalidQuery(db.message().to_string())
            }
            other => LogError::Database(other),
        }
    }
}

/// Primary result code of a (possibly extended) SQLite error code is `SQLITE_ERROR`
fn is_generic_error(code: Option<&str>) -> bool {
    const SQLITE_ERROR: i64 = 1;
    code.and_then(|code| code.parse::<i64>().ok())
        .is_some_and(|code| code & 0xff == SQLITE_ERROR)
}

impl LogDb {
    /// Newest records first, limited to the requested page
    pub async fn find_latest_logs(&self, request: &SearchRequest) -> Result<Vec<Log>, LogError> {
        let predicate = Predicate::compile(request)?;

        let mut builder = QueryBuilder::new(LOG_COLUMNS);
        predicate.push_from_where(&mut builder, request);
        builder.push(" ORDER BY log.observed_timestamp DESC, log.timestamp DESC");
        if let Some(size) = request
            .page_request
            .map(|page| page.size)
            .filter(|size| *size > 0)
        {
            builder.push(" LIMIT ").push_bind(i64::from(size));
        }

        let _guard = self.shared().await;
        let rows = builder
            .build()
            .fetch_all(&self.pool)
            .await
            .map_err(|e| predicate.classify(e))?;

        rows.iter().map(row_to_log).collect()
    }

    /// Number of matching records; pagination is ignored
    pub async fn count(&self, request: &SearchRequest) -> Result<i64, LogError> {
        let predicate = Predicate::compile(request)?;
        let unpaged = SearchRequest {
            page_request: None,
            ..request.clone()
        };

        let mut builder = QueryBuilder::new("SELECT COUNT(log.log_id) AS total");
        predicate.push_from_where(&mut builder, &unpaged);

        let _guard = self.shared().await;
        let row = builder
            .build()
            .fetch_one(&self.pool)
            .await
            .map_err(|e| predicate.classify(e))?;

        Ok(row.try_get("total")?)
    }

    /// Matching records counted per fixed-width bucket of the observed timestamp
    ///
    /// Buckets floor the minute-of-hour to a multiple of `interval`, so
    /// intervals of an hour or more collapse to hourly buckets.
    pub async fn find_volumes(
        &self,
        request: &SearchRequest,
        interval: Duration,
    ) -> Result<Vec<Volume>, LogError> {
        let minutes = i64::try_from(interval.as_secs() / 60).unwrap_or(i64::MAX);
        if minutes < 1 {
            return Err(LogError::InvalidRequest(
                "interval must be at least one minute".to_string(),
            ));
        }

        let predicate = Predicate::compile(request)?;
        let unpaged = SearchRequest {
            page_request: None,
            ..request.clone()
        };

        let mut builder = QueryBuilder::new(
            "SELECT strftime('%Y-%m-%dT%H', log.observed_timestamp / 1000000000, 'unixepoch') || ':' ||
                    printf('%02d', (CAST(strftime('%M', log.observed_timestamp / 1000000000, 'unixepoch') AS INTEGER) / ",
        );
        builder
            .push_bind(minutes)
            .push(") * ")
            .push_bind(minutes)
            .push(") || ':00Z' AS date, COUNT(log.log_id) AS count");
        predicate.push_from_where(&mut builder, &unpaged);
        builder.push(" GROUP BY date ORDER BY date ASC");

        let _guard = self.shared().await;
        let rows = builder
            .build()
            .fetch_all(&self.pool)
            .await
            .map_err(|e| predicate.classify(e))?;

        rows.iter()
            .map(|row| {
                let date: String = row.try_get("date")?;
                let date = DateTime::parse_from_rfc3339(&date)
                    .map_err(|e| LogError::InvalidRequest(format!("bad bucket '{}': {}", date, e)))?
                    .with_timezone(&Utc);
                Ok(Volume {
                    date,
                    count: row.try_get("count")?,
                })
            })
            .collect()
    }

    /// Delete matching records
    ///
    /// An unrestricted request clears the whole store. Otherwise matching log
    /// rows go, along with resource-attribute rows nothing references anymore.
    pub async fn delete(&self, request: &SearchRequest) -> Result<u64, LogError> {
        if request.is_unrestricted() {
            return self.clear().await;
        }

        let predicate = Predicate::compile(request)?;
        let unpaged = SearchRequest {
            page_request: None,
            ..request.clone()
        };

        let mut builder = QueryBuilder::new("DELETE FROM log WHERE log_id IN (SELECT log.log_id");
        predicate.push_from_where(&mut builder, &unpaged);
        builder.push(")");

        let _guard = self.shared().await;
        let mut tx = self.pool.begin().await?;
        let deleted = builder
            .build()
            .execute(&mut *tx)
            .await
            .map_err(|e| predicate.classify(e))?
            .rows_affected();
        sqlx::query(
            "DELETE FROM resource_attributes
             WHERE digest NOT IN (SELECT resource_attributes_digest FROM log)",
        )
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;

        tracing::info!(deleted, "Deleted logs");
        Ok(deleted)
    }
}

fn row_to_log(row: &SqliteRow) -> Result<Log, LogError> {
    let attributes: String = row.try_get("attributes")?;
    let resource_attributes: String = row.try_get("resource_attributes")?;

    Ok(Log {
        log_id: Some(row.try_get("log_id")?),
        timestamp: from_nanos(row.try_get("timestamp")?),
        observed_timestamp: from_nanos(row.try_get("observed_timestamp")?),
        severity_text: row.try_get("severity_text")?,
        severity_number: row.try_get("severity_number")?,
        service_name: row.try_get("service_name")?,
        scope: row.try_get("scope")?,
        body: row.try_get("body")?,
        trace_id: row.try_get("trace_id")?,
        span_id: row.try_get("span_id")?,
        trace_flags: row.try_get("trace_flags")?,
        attributes: serde_json::from_str(&attributes)?,
        resource_attributes: serde_json::from_str(&resource_attributes)?,
    })
}
