//! Record Store - rusqlite 기반 수집 레코드 저장소
//!
//! 품질/중복 게이트를 통과한 레코드를 URL 단위로 저장합니다.
//! 저장 위치: `<data_dir>/records.db`

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OpenFlags, Row};
use serde::Serialize;
use serde_json::{json, Value};

use crate::extractor::ExtractedRecord;
use crate::filter::content_hash;

// ============================================================================
// RecordSink Trait
// ============================================================================

/// 레코드 저장 대상
///
/// 실패는 로그로 남기고 `false`를 반환합니다.
pub trait RecordSink: Send + Sync {
    /// `metadata`에는 최소한 `url` 문자열이 있어야 합니다.
    fn upsert(&self, id: &str, text: &str, metadata: &Value) -> bool;
}

/// 추출 레코드를 저장 대상에 기록 (새 UUID 발급)
pub fn store_record(
    sink: &dyn RecordSink,
    record: &ExtractedRecord,
    summary: Option<&str>,
) -> bool {
    let id = uuid::Uuid::new_v4().to_string();
    let mut metadata = json!({
        "url": record.url,
        "title": record.title,
        "author": record.author,
        "publish_date": record.publish_date,
        "meta": record.metadata,
    });
    if let Some(summary) = summary {
        metadata["summary"] = Value::String(summary.to_string());
    }

    sink.upsert(&id, &record.content, &metadata)
}

// ============================================================================
// Types
// ============================================================================

/// 저장된 레코드
#[derive(Debug, Clone, Serialize)]
pub struct StoredRecord {
    pub id: String,
    pub url: String,
    pub title: Option<String>,
    pub content: String,
    pub author: Option<String>,
    pub publish_date: Option<String>,
    /// 요약, og/twitter 메타데이터 등
    pub metadata: Value,
    pub content_hash: String,
    pub created_at: DateTime<Utc>,
}

/// 저장소 통계
#[derive(Debug, Clone, Serialize)]
pub struct StoreStats {
    pub record_count: usize,
    pub total_content_bytes: usize,
    pub db_path: PathBuf,
}

const SELECT_COLUMNS: &str =
    "SELECT id, url, title, content, author, publish_date, metadata, content_hash, created_at
     FROM records";

// ============================================================================
// RecordStore
// ============================================================================

/// SQLite 레코드 저장소
pub struct RecordStore {
    conn: Arc<Mutex<Connection>>,
    db_path: PathBuf,
}

impl RecordStore {
    /// 저장소 열기 (없으면 생성)
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent)
                    .context("Failed to create database directory")?;
            }
        }

        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .context("Failed to open SQLite database")?;

        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
            db_path: path.to_path_buf(),
        };

        store.initialize()?;
        Ok(store)
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    /// 스키마 초기화
    fn initialize(&self) -> Result<()> {
        let conn = self.conn.lock().map_err(|e| anyhow::anyhow!("Lock error: {}", e))?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS records (
                id TEXT PRIMARY KEY,
                url TEXT NOT NULL UNIQUE,
                title TEXT,
                content TEXT NOT NULL,
                author TEXT,
                publish_date TEXT,
                metadata TEXT NOT NULL DEFAULT '{}',
                content_hash TEXT NOT NULL,
                created_at TEXT NOT NULL
            )",
            [],
        )
        .context("Failed to create records table")?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_records_created ON records(created_at)",
            [],
        )
        .context("Failed to create created_at index")?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_records_hash ON records(content_hash)",
            [],
        )
        .context("Failed to create content hash index")?;

        tracing::debug!("Record store initialized at {:?}", self.db_path);
        Ok(())
    }

    /// 레코드 저장 (URL이 같으면 교체)
    pub fn insert(&self, id: &str, text: &str, metadata: &Value) -> Result<()> {
        let url = metadata
            .get("url")
            .and_then(Value::as_str)
            .filter(|u| !u.is_empty())
            .context("metadata.url is required")?;

        let text_field = |key: &str| {
            metadata
                .get(key)
                .and_then(Value::as_str)
                .filter(|v| !v.is_empty())
                .map(str::to_string)
        };
        let title = text_field("title");
        let author = text_field("author");
        let publish_date = text_field("publish_date");

        // 컬럼으로 빠진 키를 제외한 나머지
        let mut extra = metadata.clone();
        if let Some(map) = extra.as_object_mut() {
            for key in ["url", "title", "author", "publish_date"] {
                map.remove(key);
            }
        }
        let extra = serde_json::to_string(&extra).context("Failed to encode metadata")?;

        let conn = self.conn.lock().map_err(|e| anyhow::anyhow!("Lock error: {}", e))?;
        let now = Utc::now().to_rfc3339();

        conn.execute(
            "INSERT OR REPLACE INTO records
                (id, url, title, content, author, publish_date, metadata, content_hash, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                id,
                url,
                title,
                text,
                author,
                publish_date,
                extra,
                content_hash(text),
                now
            ],
        )
        .context("Failed to insert record")?;

        tracing::info!("Stored record: {} (id={})", url, id);
        Ok(())
    }

    /// URL로 조회
    pub fn get_by_url(&self, url: &str) -> Result<Option<StoredRecord>> {
        let conn = self.conn.lock().map_err(|e| anyhow::anyhow!("Lock error: {}", e))?;

        let mut stmt = conn.prepare(&format!("{} WHERE url = ?1", SELECT_COLUMNS))?;
        match stmt.query_row(params![url], map_row) {
            Ok(record) => Ok(Some(record)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e).context("Failed to load record"),
        }
    }

    /// 최근 저장 순 목록
    pub fn list_records(&self, limit: usize) -> Result<Vec<StoredRecord>> {
        let conn = self.conn.lock().map_err(|e| anyhow::anyhow!("Lock error: {}", e))?;

        let mut stmt = conn.prepare(&format!(
            "{} ORDER BY created_at DESC LIMIT ?1",
            SELECT_COLUMNS
        ))?;

        let records = stmt
            .query_map(params![limit as i64], map_row)?
            .filter_map(|r| r.ok())
            .collect();

        Ok(records)
    }

    /// 저장소 통계
    pub fn stats(&self) -> Result<StoreStats> {
        let conn = self.conn.lock().map_err(|e| anyhow::anyhow!("Lock error: {}", e))?;

        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM records", [], |row| row.get(0))
            .unwrap_or(0);

        let total_size: i64 = conn
            .query_row(
                "SELECT COALESCE(SUM(LENGTH(content)), 0) FROM records",
                [],
                |row| row.get(0),
            )
            .unwrap_or(0);

        Ok(StoreStats {
            record_count: count as usize,
            total_content_bytes: total_size as usize,
            db_path: self.db_path.clone(),
        })
    }
}

impl RecordSink for RecordStore {
    fn upsert(&self, id: &str, text: &str, metadata: &Value) -> bool {
        match self.insert(id, text, metadata) {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!("Failed to store record {}: {:#}", id, e);
                false
            }
        }
    }
}

// ============================================================================
// Helper Functions
// ============================================================================

fn map_row(row: &Row) -> rusqlite::Result<StoredRecord> {
    let metadata: String = row.get(6)?;
    Ok(StoredRecord {
        id: row.get(0)?,
        url: row.get(1)?,
        title: row.get(2)?,
        content: row.get(3)?,
        author: row.get(4)?,
        publish_date: row.get(5)?,
        metadata: serde_json::from_str(&metadata).unwrap_or(Value::Null),
        content_hash: row.get(7)?,
        created_at: parse_datetime(row.get::<_, String>(8)?),
    })
}

/// RFC3339 문자열을 DateTime<Utc>로 파싱
fn parse_datetime(s: String) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(&s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use tempfile::TempDir;

    use crate::extractor::RecordStatus;

    fn create_test_store() -> (TempDir, RecordStore) {
        let dir = TempDir::new().unwrap();
        let db_path = dir.path().join("nested").join("test.db");
        let store = RecordStore::open(&db_path).unwrap();
        (dir, store)
    }

    fn record(url: &str, content: &str) -> ExtractedRecord {
        let mut metadata = BTreeMap::new();
        metadata.insert("site_name".to_string(), "Wire".to_string());
        ExtractedRecord {
            url: url.to_string(),
            title: "Headline".to_string(),
            content: content.to_string(),
            author: Some("Desk".to_string()),
            publish_date: None,
            metadata,
            status: RecordStatus::Success,
            error: None,
        }
    }

    #[test]
    fn test_store_and_get_by_url() {
        let (_dir, store) = create_test_store();

        assert!(store_record(&store, &record("https://a.test/1", "Body text"), Some("Short.")));

        let stored = store.get_by_url("https://a.test/1").unwrap().unwrap();
        assert_eq!(stored.title.as_deref(), Some("Headline"));
        assert_eq!(stored.author.as_deref(), Some("Desk"));
        assert!(stored.publish_date.is_none());
        assert_eq!(stored.content_hash, content_hash("Body text"));
        assert_eq!(stored.metadata["summary"], "Short.");
        assert_eq!(stored.metadata["meta"]["site_name"], "Wire");
        assert!(stored.metadata.get("url").is_none());

        assert!(store.get_by_url("https://missing.test").unwrap().is_none());
    }

    #[test]
    fn test_get_by_url_reports_unreadable_row() {
        let (_dir, store) = create_test_store();
        assert!(store_record(&store, &record("https://a.test/1", "Body"), None));

        // BLOB은 TEXT 컬럼에서도 그대로 남음
        store
            .conn
            .lock()
            .unwrap()
            .execute("UPDATE records SET created_at = X'00FF'", [])
            .unwrap();

        assert!(store.get_by_url("https://a.test/1").is_err());
        assert!(store.get_by_url("https://missing.test").unwrap().is_none());
    }

    #[test]
    fn test_same_url_replaced() {
        let (_dir, store) = create_test_store();

        assert!(store_record(&store, &record("https://a.test/1", "old"), None));
        assert!(store_record(&store, &record("https://a.test/1", "new"), None));

        let stats = store.stats().unwrap();
        assert_eq!(stats.record_count, 1);
        assert_eq!(store.get_by_url("https://a.test/1").unwrap().unwrap().content, "new");
    }

    #[test]
    fn test_list_and_stats() {
        let (_dir, store) = create_test_store();

        for i in 0..5 {
            store_record(&store, &record(&format!("https://a.test/{}", i), "12345"), None);
        }

        assert_eq!(store.list_records(3).unwrap().len(), 3);
        assert_eq!(store.list_records(10).unwrap().len(), 5);

        let stats = store.stats().unwrap();
        assert_eq!(stats.record_count, 5);
        assert_eq!(stats.total_content_bytes, 25);
    }

    #[test]
    fn test_upsert_without_url_fails_softly() {
        let (_dir, store) = create_test_store();

        assert!(!store.upsert("id-1", "text", &json!({"title": "no url"})));
        assert!(!store.upsert("id-2", "text", &json!("not an object")));
        assert_eq!(store.stats().unwrap().record_count, 0);
    }
}
