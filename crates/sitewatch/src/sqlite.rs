//! SQLite-backed audit store.

use crate::store::AuditStore;
use crate::types::{Audit, NewAudit, ResourceId};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{Error, Result};
use rusqlite::{Connection, OptionalExtension, Row, params};
use std::path::Path;
use std::sync::Mutex;
use tracing::info;

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS audits (
        id                  INTEGER PRIMARY KEY AUTOINCREMENT,
        resource_id         INTEGER NOT NULL,
        created_at_ms       INTEGER NOT NULL,
        status_code         INTEGER NOT NULL,
        https_valid         INTEGER NOT NULL,
        ssl_expires_at_ms   INTEGER,
        performance_mobile  REAL,
        performance_desktop REAL,
        seo                 REAL,
        accessibility       REAL,
        best_practices      REAL,
        ttfb_ms             REAL,
        raw_payload         TEXT NOT NULL DEFAULT 'null',
        screenshot          TEXT
    );

    CREATE INDEX IF NOT EXISTS idx_audits_resource_time
        ON audits(resource_id, created_at_ms DESC, id DESC);

    CREATE TABLE IF NOT EXISTS reachability (
        resource_id INTEGER PRIMARY KEY,
        reachable   INTEGER NOT NULL,
        updated_ms  INTEGER NOT NULL
    );
";

const AUDIT_COLUMNS: &str = "id, resource_id, created_at_ms, status_code, https_valid, \
     ssl_expires_at_ms, performance_mobile, performance_desktop, seo, accessibility, \
     best_practices, ttfb_ms, raw_payload, screenshot";

fn to_storage_err(e: rusqlite::Error) -> Error {
    Error::storage(e)
}

fn from_millis(ms: i64) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::from_timestamp_millis(ms).ok_or(rusqlite::Error::IntegralValueOutOfRange(0, ms))
}

fn row_to_audit(row: &Row<'_>) -> rusqlite::Result<Audit> {
    let raw_payload: String = row.get(12)?;
    let ssl_expires_at = row
        .get::<_, Option<i64>>(5)?
        .map(from_millis)
        .transpose()?;

    Ok(Audit {
        id: row.get(0)?,
        resource_id: row.get(1)?,
        created_at: from_millis(row.get(2)?)?,
        status_code: row.get(3)?,
        https_valid: row.get(4)?,
        ssl_expires_at,
        performance_mobile: row.get(6)?,
        performance_desktop: row.get(7)?,
        seo: row.get(8)?,
        accessibility: row.get(9)?,
        best_practices: row.get(10)?,
        ttfb_ms: row.get(11)?,
        raw_payload: serde_json::from_str(&raw_payload).map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(12, rusqlite::types::Type::Text, Box::new(e))
        })?,
        screenshot: row.get(13)?,
    })
}

/// Audit store on a single SQLite connection
pub struct SqliteAuditStore {
    conn: Mutex<Connection>,
}

impl SqliteAuditStore {
    /// Open (or create) a database file and apply the schema. Missing parent
    /// directories are created.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        if let Some(parent) = path.as_ref().parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path.as_ref()).map_err(to_storage_err)?;
        conn.execute_batch("PRAGMA journal_mode = WAL; PRAGMA synchronous = NORMAL;")
            .map_err(to_storage_err)?;
        info!(path = %path.as_ref().display(), "Opened audit database");
        Self::from_connection(conn)
    }

    /// In-memory database
    pub fn open_in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory().map_err(to_storage_err)?)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        conn.execute_batch(SCHEMA).map_err(to_storage_err)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn with_conn<T>(&self, f: impl FnOnce(&Connection) -> rusqlite::Result<T>) -> Result<T> {
        let conn = self
            .conn
            .lock()
            .map_err(|_| Error::storage("connection mutex poisoned"))?;
        f(&conn).map_err(to_storage_err)
    }
}

#[async_trait]
impl AuditStore for SqliteAuditStore {
    async fn insert(&self, audit: NewAudit) -> Result<Audit> {
        let raw_payload = serde_json::to_string(&audit.raw_payload)?;

        let id = self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO audits (resource_id, created_at_ms, status_code, https_valid, \
                 ssl_expires_at_ms, performance_mobile, performance_desktop, seo, accessibility, \
                 best_practices, ttfb_ms, raw_payload, screenshot) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
                params![
                    audit.resource_id,
                    audit.created_at.timestamp_millis(),
                    audit.status_code,
                    audit.https_valid,
                    audit.ssl_expires_at.map(|at| at.timestamp_millis()),
                    audit.performance_mobile,
                    audit.performance_desktop,
                    audit.seo,
                    audit.accessibility,
                    audit.best_practices,
                    audit.ttfb_ms,
                    raw_payload,
                    audit.screenshot,
                ],
            )?;
            Ok(conn.last_insert_rowid())
        })?;

        Ok(audit.into_audit(id))
    }

    async fn latest(&self, resource_id: ResourceId) -> Result<Option<Audit>> {
        let sql = format!(
            "SELECT {} FROM audits WHERE resource_id = ?1 \
             ORDER BY created_at_ms DESC, id DESC LIMIT 1",
            AUDIT_COLUMNS
        );
        self.with_conn(|conn| {
            conn.query_row(&sql, params![resource_id], row_to_audit)
                .optional()
        })
    }

    async fn history(
        &self,
        resource_id: ResourceId,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<Audit>> {
        let sql = format!(
            "SELECT {} FROM audits WHERE resource_id = ?1 AND created_at_ms >= ?2 \
             ORDER BY created_at_ms DESC, id DESC",
            AUDIT_COLUMNS
        );
        let since_ms = since.map_or(i64::MIN, |at| at.timestamp_millis());

        self.with_conn(|conn| {
            let mut stmt = conn.prepare_cached(&sql)?;
            let rows = stmt.query_map(params![resource_id, since_ms], row_to_audit)?;
            rows.collect()
        })
    }

    async fn set_reachable(&self, resource_id: ResourceId, reachable: bool) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO reachability (resource_id, reachable, updated_ms) VALUES (?1, ?2, ?3) \
                 ON CONFLICT(resource_id) DO UPDATE SET reachable = ?2, updated_ms = ?3",
                params![resource_id, reachable, Utc::now().timestamp_millis()],
            )?;
            Ok(())
        })
    }

    async fn reachable(&self, resource_id: ResourceId) -> Result<Option<bool>> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT reachable FROM reachability WHERE resource_id = ?1",
                params![resource_id],
                |row| row.get(0),
            )
            .optional()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn sample(resource_id: ResourceId, day: u32, status: u16) -> NewAudit {
        let mut audit = NewAudit::liveness_only(
            resource_id,
            status,
            Utc.with_ymd_and_hms(2026, 10, day, 6, 30, 0).unwrap(),
        );
        audit.performance_mobile = Some(88.0);
        audit.seo = Some(100.0);
        audit.https_valid = true;
        audit.ssl_expires_at = Some(Utc.with_ymd_and_hms(2027, 3, 1, 0, 0, 0).unwrap());
        audit.raw_payload = json!({"mobile": {"timings": {"speed-index": 1200.5}}});
        audit
    }

    #[tokio::test]
    async fn test_insert_and_latest() {
        let store = SqliteAuditStore::open_in_memory().unwrap();
        store.insert(sample(1, 2, 200)).await.unwrap();
        let newest = store.insert(sample(1, 9, 503)).await.unwrap();
        store.insert(sample(1, 4, 200)).await.unwrap();
        store.insert(sample(2, 10, 200)).await.unwrap();

        let latest = store.latest(1).await.unwrap().unwrap();
        assert_eq!(latest, newest);
        assert_eq!(latest.performance_mobile, Some(88.0));
        assert_eq!(latest.performance_desktop, None);
        assert_eq!(latest.raw_payload["mobile"]["timings"]["speed-index"], 1200.5);
    }

    #[tokio::test]
    async fn test_history_order_and_since() {
        let store = SqliteAuditStore::open_in_memory().unwrap();
        for day in [3, 1, 2] {
            store.insert(sample(5, day, 200)).await.unwrap();
        }

        let history = store.history(5, None).await.unwrap();
        let days: Vec<_> = history.iter().map(|a| a.created_at.format("%d").to_string()).collect();
        assert_eq!(days, vec!["03", "02", "01"]);

        let since = Utc.with_ymd_and_hms(2026, 10, 2, 0, 0, 0).unwrap();
        assert_eq!(store.history(5, Some(since)).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_reachability_upsert() {
        let store = SqliteAuditStore::open_in_memory().unwrap();
        assert_eq!(store.reachable(1).await.unwrap(), None);
        store.set_reachable(1, true).await.unwrap();
        store.set_reachable(1, false).await.unwrap();
        assert_eq!(store.reachable(1).await.unwrap(), Some(false));
    }

    #[tokio::test]
    async fn test_file_database_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("audits.db");

        {
            let store = SqliteAuditStore::open(&path).unwrap();
            store.insert(sample(1, 1, 200)).await.unwrap();
        }

        let store = SqliteAuditStore::open(&path).unwrap();
        let latest = store.latest(1).await.unwrap().unwrap();
        assert_eq!(latest.status_code, 200);
        assert!(latest.https_valid);
    }

    #[tokio::test]
    async fn test_open_creates_missing_directories() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("var/lib/sitewatch/audits.db");

        let store = SqliteAuditStore::open(&path).unwrap();
        store.insert(sample(1, 2, 200)).await.unwrap();
        assert!(path.exists());
    }

    #[test]
    fn test_open_under_a_file_is_io_error() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let result = SqliteAuditStore::open(file.path().join("audits.db"));
        assert!(matches!(result, Err(Error::Io(_))));
    }
}
