//! SQLite storage for log records
//!
//! This module provides:
//! - Connection pooling with WAL mode
//! - Automatic migrations
//! - Transactional batch inserts with resource-attribute deduplication
//! - Maintenance (clear, vacuum, WAL checkpoint)

use super::model::Log;
use super::LogError;
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use sqlx::Row;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::{Duration, Instant};
use tokio::sync::{RwLock, RwLockReadGuard};

const INSERT_LOG_SQL: &str = "INSERT INTO log (log_id, timestamp, observed_timestamp, severity_text, severity_number, service_name, scope, body, trace_id, span_id, trace_flags, attributes, resource_attributes_digest)
     VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)";

const BUSY_TIMEOUT: Duration = Duration::from_secs(30);

/// Database statistics
#[derive(Debug, Clone, Serialize)]
pub struct DbStats {
    pub log_count: i64,
    pub resource_attributes_count: i64,
    pub oldest: Option<DateTime<Utc>>,
    pub newest: Option<DateTime<Utc>>,
}

/// Log database handle
///
/// Owns the SQLite pool. Every operation holds a shared guard on `gate`;
/// `vacuum` takes it exclusively.
pub struct LogDb {
    pub(crate) pool: SqlitePool,
    path: Option<PathBuf>,
    gate: RwLock<()>,
}

impl LogDb {
    /// Open (and create if missing) the database file at `path`
    pub async fn open(path: impl AsRef<Path>, max_connections: u32) -> Result<Self, LogError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        let url = format!("sqlite:{}", path.display());
        let mut db = Self::new(&url, max_connections).await?;
        db.path = Some(path.to_path_buf());
        Ok(db)
    }

    /// Connect using a SQLite URL (e.g. `sqlite:./data/logvault.db` or `sqlite::memory:`)
    ///
    /// In-memory databases are pinned to a single long-lived connection so
    /// every query sees the same data.
    pub async fn new(database_url: &str, max_connections: u32) -> Result<Self, LogError> {
        Self::connect(database_url, max_connections, BUSY_TIMEOUT).await
    }

    /// `busy_timeout` bounds how long a statement waits on another writer's lock
    pub(crate) async fn connect(
        database_url: &str,
        max_connections: u32,
        busy_timeout: Duration,
    ) -> Result<Self, LogError> {
        let in_memory = database_url.contains(":memory:");

        let options = SqliteConnectOptions::from_str(database_url)?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(busy_timeout)
            .pragma("cache_size", "-64000")
            .pragma("temp_store", "memory")
            .pragma("synchronous", "NORMAL");

        let mut pool_options = SqlitePoolOptions::new()
            .max_connections(if in_memory { 1 } else { max_connections.max(1) })
            .acquire_timeout(Duration::from_secs(30));
        if in_memory {
            pool_options = pool_options
                .min_connections(1)
                .idle_timeout(None)
                .max_lifetime(None);
        }

        let pool = pool_options.connect_with(options).await?;

        sqlx::migrate!("./migrations").run(&pool).await?;
        tracing::info!(database = %database_url, "Log database migrations completed");

        Ok(Self {
            pool,
            path: None,
            gate: RwLock::new(()),
        })
    }

    /// Backing file, `None` for in-memory databases
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub(crate) async fn shared(&self) -> RwLockReadGuard<'_, ()> {
        self.gate.read().await
    }

    /// Store a batch of records atomically
    ///
    /// Records are grouped by resource-attribute digest. The first batch that
    /// sees a digest stores its attribute JSON; later ones only reference it.
    pub async fn add_all(&self, logs: &[Log]) -> Result<(), LogError> {
        if logs.is_empty() {
            return Ok(());
        }

        let start = Instant::now();
        let mut groups: BTreeMap<i64, Vec<&Log>> = BTreeMap::new();
        for log in logs {
            groups
                .entry(log.resource_attributes_digest())
                .or_default()
                .push(log);
        }

        let _guard = self.shared().await;
        let mut tx = self.pool.begin().await?;

        for (digest, group) in &groups {
            let resource_attributes = serde_json::to_string(&group[0].resource_attributes)?;
            sqlx::query(
                "INSERT OR IGNORE INTO resource_attributes (digest, resource_attributes) VALUES (?, ?)",
            )
            .bind(*digest)
            .bind(resource_attributes)
            .execute(&mut *tx)
            .await?;

            for log in group {
                sqlx::query(INSERT_LOG_SQL)
                    .bind(log.log_id)
                    .bind(to_nanos(&log.timestamp))
                    .bind(to_nanos(&log.observed_timestamp))
                    .bind(&log.severity_text)
                    .bind(log.severity_number)
                    .bind(&log.service_name)
                    .bind(&log.scope)
                    .bind(&log.body)
                    .bind(&log.trace_id)
                    .bind(&log.span_id)
                    .bind(log.trace_flags)
                    .bind(serde_json::to_string(&log.attributes)?)
                    .bind(*digest)
                    .execute(&mut *tx)
                    .await?;
            }
        }

        tx.commit().await?;

        tracing::debug!(
            count = logs.len(),
            digests = groups.len(),
            duration_ms = start.elapsed().as_millis() as u64,
            "Stored log batch"
        );
        Ok(())
    }

    /// Delete every log record and resource-attribute row
    pub async fn clear(&self) -> Result<u64, LogError> {
        let _guard = self.shared().await;
        let mut tx = self.pool.begin().await?;
        let deleted = sqlx::query("DELETE FROM log")
            .execute(&mut *tx)
            .await?
            .rows_affected();
        sqlx::query("DELETE FROM resource_attributes")
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        tracing::info!(deleted, "Cleared log store");
        Ok(deleted)
    }

    /// Rebuild the database file to reclaim free pages
    ///
    /// Waits for in-flight operations and blocks new ones until done.
    pub async fn vacuum(&self) -> Result<(), LogError> {
        let _guard = self.gate.write().await;
        let start = Instant::now();
        sqlx::query("VACUUM").execute(&self.pool).await?;
        tracing::info!(
            duration_ms = start.elapsed().as_millis() as u64,
            "Vacuumed log database"
        );
        Ok(())
    }

    /// Fold the WAL back into the main database file
    pub async fn checkpoint(&self) -> Result<(), LogError> {
        let _guard = self.shared().await;
        sqlx::query("PRAGMA wal_checkpoint(TRUNCATE)")
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn stats(&self) -> Result<DbStats, LogError> {
        let _guard = self.shared().await;
        let row = sqlx::query(
            "SELECT COUNT(*) AS log_count,
                    MIN(observed_timestamp) AS oldest,
                    MAX(observed_timestamp) AS newest,
                    (SELECT COUNT(*) FROM resource_attributes) AS resource_attributes_count
             FROM log",
        )
        .fetch_one(&self.pool)
        .await?;

        Ok(DbStats {
            log_count: row.try_get("log_count")?,
            resource_attributes_count: row.try_get("resource_attributes_count")?,
            oldest: row.try_get::<Option<i64>, _>("oldest")?.map(from_nanos),
            newest: row.try_get::<Option<i64>, _>("newest")?.map(from_nanos),
        })
    }

    /// Close all pooled connections
    pub async fn close(&self) {
        self.pool.close().await;
    }
}

pub(crate) fn to_nanos(instant: &DateTime<Utc>) -> i64 {
    instant.timestamp_nanos_opt().unwrap_or(i64::MAX)
}

pub(crate) fn from_nanos(nanos: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_nanos(nanos)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logs::model::AttributeValue;
    use std::sync::Arc;

    fn ts(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
    }

    fn log_with_resource(body: &str, host: &str) -> Log {
        let mut log = Log::new(ts("2024-08-09T01:00:00Z"), body);
        log.resource_attributes
            .insert("hostname".to_string(), AttributeValue::from(host));
        log
    }

    async fn count(db: &LogDb, table: &str) -> i64 {
        sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {}", table))
            .fetch_one(&db.pool)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_database_creation() {
        let db = LogDb::new("sqlite::memory:", 5).await.unwrap();
        assert_eq!(count(&db, "log").await, 0);
        assert!(db.path().is_none());
    }

    #[tokio::test]
    async fn test_add_all_empty_is_noop() {
        let db = LogDb::new("sqlite::memory:", 1).await.unwrap();
        db.add_all(&[]).await.unwrap();
        assert_eq!(count(&db, "log").await, 0);
    }

    #[tokio::test]
    async fn test_add_all_deduplicates_resource_attributes() {
        let db = LogDb::new("sqlite::memory:", 1).await.unwrap();

        let batch = vec![
            log_with_resource("a", "web-1"),
            log_with_resource("b", "web-1"),
            log_with_resource("c", "web-2"),
        ];
        db.add_all(&batch).await.unwrap();
        db.add_all(&[log_with_resource("d", "web-1")]).await.unwrap();

        assert_eq!(count(&db, "log").await, 4);
        assert_eq!(count(&db, "resource_attributes").await, 2);
        assert_eq!(count(&db, "log_fts").await, 4);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_concurrent_batches_share_new_digest() {
        let dir = tempfile::tempdir().unwrap();
        let db = Arc::new(LogDb::open(dir.path().join("race.db"), 2).await.unwrap());

        let first: Vec<_> = (0..50)
            .map(|i| log_with_resource(&format!("first-{}", i), "web-new"))
            .collect();
        let second: Vec<_> = (0..50)
            .map(|i| log_with_resource(&format!("second-{}", i), "web-new"))
            .collect();

        let a = tokio::spawn({
            let db = Arc::clone(&db);
            async move { db.add_all(&first).await }
        });
        let b = tokio::spawn({
            let db = Arc::clone(&db);
            async move { db.add_all(&second).await }
        });
        a.await.unwrap().unwrap();
        b.await.unwrap().unwrap();

        assert_eq!(count(&db, "log").await, 100);
        assert_eq!(count(&db, "resource_attributes").await, 1);

        let orphaned: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM log
             WHERE resource_attributes_digest NOT IN (SELECT digest FROM resource_attributes)",
        )
        .fetch_one(&db.pool)
        .await
        .unwrap();
        assert_eq!(orphaned, 0);
    }

    #[tokio::test]
    async fn test_add_all_is_atomic() {
        let db = LogDb::new("sqlite::memory:", 1).await.unwrap();
        let mut first = log_with_resource("first", "web-1");
        first.log_id = Some(1);
        db.add_all(&[first.clone()]).await.unwrap();

        // duplicate primary key in a later digest group
        let batch = vec![log_with_resource("fresh", "web-9"), first];
        assert!(db.add_all(&batch).await.is_err());

        assert_eq!(count(&db, "log").await, 1);
        assert_eq!(count(&db, "resource_attributes").await, 1);
    }

    #[tokio::test]
    async fn test_clear_and_stats() {
        let db = LogDb::new("sqlite::memory:", 1).await.unwrap();
        let mut late = log_with_resource("late", "web-1");
        late.observed_timestamp = ts("2024-08-09T02:00:00Z");
        db.add_all(&[log_with_resource("early", "web-1"), late])
            .await
            .unwrap();

        let stats = db.stats().await.unwrap();
        assert_eq!(stats.log_count, 2);
        assert_eq!(stats.resource_attributes_count, 1);
        assert_eq!(stats.oldest, Some(ts("2024-08-09T01:00:00Z")));
        assert_eq!(stats.newest, Some(ts("2024-08-09T02:00:00Z")));

        assert_eq!(db.clear().await.unwrap(), 2);
        assert_eq!(count(&db, "log").await, 0);
        assert_eq!(count(&db, "resource_attributes").await, 0);
        assert_eq!(count(&db, "log_fts").await, 0);
    }

    #[tokio::test]
    async fn test_vacuum_on_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("logs.db");
        let db = LogDb::open(&path, 2).await.unwrap();

        let logs: Vec<Log> = (0..20)
            .map(|i| log_with_resource(&format!("line {}", i), "web-1"))
            .collect();
        db.add_all(&logs).await.unwrap();
        db.clear().await.unwrap();
        db.vacuum().await.unwrap();
        db.checkpoint().await.unwrap();

        assert!(path.exists());
        assert_eq!(db.path(), Some(path.as_path()));
        db.close().await;
    }

    #[test]
    fn test_nanos_round_trip() {
        let instant = ts("2024-08-09T01:01:11.364983123Z");
        assert_eq!(from_nanos(to_nanos(&instant)), instant);
    }
}
