//! SQLite database implementation for clipboard history

use std::collections::BTreeMap;
use std::path::Path;

use chrono::{DateTime, Duration, Local, Utc};
use rusqlite::types::{Type, Value};
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row, TransactionBehavior};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::{
    hash, ClipboardRecord, ContentType, SaveOutcome, SearchQuery, Statistics, StoreError,
    StoreResult,
};

pub(super) const SCHEMA_VERSION: u32 = 3;

/// Columns of a full record read, in `row_to_record` order
const RECORD_COLUMNS: &str = "id, content, content_type, content_hash, image_data, file_paths, \
     file_info, timestamp, source, char_count, word_count, is_favorite, ocr_text";

/// Same shape as [`RECORD_COLUMNS`] but never loads image bytes
const LIST_COLUMNS: &str = "id, content, content_type, content_hash, NULL AS image_data, \
     file_paths, file_info, timestamp, source, char_count, word_count, is_favorite, ocr_text";

/// SQLite database wrapper for clipboard history storage
pub struct HistoryDatabase {
    pub(super) conn: Mutex<Connection>,
}

impl HistoryDatabase {
    /// Open the database, creating or migrating the schema as needed
    pub async fn new(path: &Path) -> StoreResult<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(path)?;

        // WAL lets UI reads proceed while the monitor writes
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;
             PRAGMA busy_timeout = 5000;",
        )?;

        let db = Self {
            conn: Mutex::new(conn),
        };

        db.initialize().await?;
        Ok(db)
    }

    async fn initialize(&self) -> StoreResult<()> {
        let mut conn = self.conn.lock().await;

        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS schema_version (
                version INTEGER PRIMARY KEY,
                applied_at INTEGER DEFAULT (strftime('%s', 'now'))
            );",
        )?;

        let version = get_schema_version(&conn)?;
        for step in (version + 1)..=SCHEMA_VERSION {
            let tx = conn.transaction()?;
            apply_migration(&tx, step)?;
            tx.execute("INSERT INTO schema_version (version) VALUES (?1)", params![step])?;
            tx.commit()?;
            info!("Applied history schema migration v{}", step);
        }

        Ok(())
    }

    /// Touch an existing row with the same content or insert a new one
    pub async fn save_record(&self, record: &mut ClipboardRecord) -> StoreResult<SaveOutcome> {
        let mut conn = self.conn.lock().await;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        if !record.content_hash.is_empty() {
            let existing: Option<(String, bool, String)> = tx
                .query_row(
                    "SELECT id, COALESCE(is_favorite, 0), COALESCE(ocr_text, '')
                     FROM clipboard_items
                     WHERE content_hash = ?1 AND content_type = ?2
                     ORDER BY timestamp DESC
                     LIMIT 1",
                    params![record.content_hash, record.content_type.as_str()],
                    |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
                )
                .optional()?;

            if let Some((id, is_favorite, ocr_text)) = existing {
                tx.execute(
                    "UPDATE clipboard_items SET timestamp = ?1, source = ?2 WHERE id = ?3",
                    params![record.timestamp.timestamp_millis(), record.source, id],
                )?;
                tx.commit()?;

                record.id = id;
                record.is_favorite = is_favorite;
                record.ocr_text = ocr_text;
                return Ok(SaveOutcome::Touched);
            }
        }

        tx.execute(
            "INSERT INTO clipboard_items
             (id, content, content_type, content_hash, image_data, file_paths, file_info,
              timestamp, source, char_count, word_count, is_favorite, ocr_text)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
            params![
                record.id,
                record.content,
                record.content_type.as_str(),
                record.content_hash,
                record.image_data,
                record.file_paths,
                record.file_info,
                record.timestamp.timestamp_millis(),
                record.source,
                record.char_count,
                record.word_count,
                record.is_favorite,
                record.ocr_text,
            ],
        )?;
        tx.commit()?;

        Ok(SaveOutcome::Inserted)
    }

    /// Get recent records, newest first, without image bytes
    pub async fn get_records(&self, limit: usize) -> StoreResult<Vec<ClipboardRecord>> {
        let conn = self.conn.lock().await;

        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM clipboard_items ORDER BY timestamp DESC, rowid DESC LIMIT ?1",
            LIST_COLUMNS
        ))?;

        let records = stmt
            .query_map(params![limit as i64], row_to_record)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(records)
    }

    /// Get a single record with its full payload
    pub async fn get_record(&self, id: &str) -> StoreResult<ClipboardRecord> {
        let conn = self.conn.lock().await;

        conn.query_row(
            &format!("SELECT {} FROM clipboard_items WHERE id = ?1", RECORD_COLUMNS),
            params![id],
            row_to_record,
        )
        .optional()?
        .ok_or_else(|| StoreError::NotFound(format!("clipboard record {}", id)))
    }

    pub async fn delete_record(&self, id: &str) -> StoreResult<()> {
        let conn = self.conn.lock().await;

        let deleted = conn.execute("DELETE FROM clipboard_items WHERE id = ?1", params![id])?;
        if deleted == 0 {
            return Err(StoreError::NotFound(format!("clipboard record {}", id)));
        }

        Ok(())
    }

    /// Search records by keyword, type and favorite flag
    pub async fn search(&self, query: &SearchQuery) -> StoreResult<Vec<ClipboardRecord>> {
        let conn = self.conn.lock().await;

        let mut sql = format!("SELECT {} FROM clipboard_items WHERE 1=1", LIST_COLUMNS);
        let mut args: Vec<Value> = Vec::new();

        if !query.keyword.is_empty() {
            let pattern = format!("%{}%", escape_like(&query.keyword));
            sql.push_str(
                r" AND (content LIKE ? ESCAPE '\' OR COALESCE(ocr_text, '') LIKE ? ESCAPE '\')",
            );
            args.push(Value::Text(pattern.clone()));
            args.push(Value::Text(pattern));
        }

        if let Some(content_type) = query.content_type {
            sql.push_str(" AND content_type = ?");
            args.push(Value::Text(content_type.as_str().to_string()));
        }

        if query.favorites_only {
            sql.push_str(" AND is_favorite = 1");
        }

        sql.push_str(" ORDER BY timestamp DESC, rowid DESC LIMIT ?");
        args.push(Value::Integer(query.limit as i64));

        let mut stmt = conn.prepare(&sql)?;
        let records = stmt
            .query_map(params_from_iter(args), row_to_record)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(records)
    }

    /// Flip the favorite flag and return the new value
    pub async fn toggle_favorite(&self, id: &str) -> StoreResult<bool> {
        let mut conn = self.conn.lock().await;
        let tx = conn.transaction()?;

        let updated = tx.execute(
            "UPDATE clipboard_items
             SET is_favorite = CASE WHEN is_favorite = 1 THEN 0 ELSE 1 END
             WHERE id = ?1",
            params![id],
        )?;
        if updated == 0 {
            return Err(StoreError::NotFound(format!("clipboard record {}", id)));
        }

        let favorite: bool = tx.query_row(
            "SELECT is_favorite FROM clipboard_items WHERE id = ?1",
            params![id],
            |row| row.get(0),
        )?;
        tx.commit()?;

        Ok(favorite)
    }

    pub async fn clear_older_than(&self, days: u32) -> StoreResult<usize> {
        let cutoff = (Utc::now() - Duration::days(i64::from(days))).timestamp_millis();
        let conn = self.conn.lock().await;

        let deleted = conn.execute(
            "DELETE FROM clipboard_items WHERE is_favorite = 0 AND timestamp < ?1",
            params![cutoff],
        )?;

        Ok(deleted)
    }

    pub async fn trim_to(&self, keep: usize) -> StoreResult<usize> {
        let conn = self.conn.lock().await;

        let deleted = conn.execute(
            "DELETE FROM clipboard_items
             WHERE is_favorite = 0 AND id NOT IN (
                 SELECT id FROM clipboard_items
                 WHERE is_favorite = 0
                 ORDER BY timestamp DESC
                 LIMIT ?1
             )",
            params![keep as i64],
        )?;

        Ok(deleted)
    }

    pub async fn clear_all(&self) -> StoreResult<usize> {
        let conn = self.conn.lock().await;
        let deleted = conn.execute("DELETE FROM clipboard_items WHERE is_favorite = 0", [])?;
        Ok(deleted)
    }

    pub async fn statistics(&self) -> StoreResult<Statistics> {
        let conn = self.conn.lock().await;

        let total_count: i64 =
            conn.query_row("SELECT COUNT(*) FROM clipboard_items", [], |row| row.get(0))?;

        let today_count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM clipboard_items WHERE timestamp >= ?1",
            params![start_of_today_millis()],
            |row| row.get(0),
        )?;

        let mut stmt = conn
            .prepare("SELECT content_type, COUNT(*) FROM clipboard_items GROUP BY content_type")?;
        let type_counts = stmt
            .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)))?
            .collect::<Result<BTreeMap<_, _>, _>>()?;

        Ok(Statistics {
            total_count,
            today_count,
            type_counts,
        })
    }

    pub async fn find_ocr_text(&self, content_hash: &str) -> StoreResult<Option<String>> {
        let conn = self.conn.lock().await;

        let text = conn
            .query_row(
                "SELECT ocr_text FROM clipboard_items
                 WHERE content_hash = ?1 AND content_type = 'Image'
                   AND ocr_text IS NOT NULL AND ocr_text != ''
                 LIMIT 1",
                params![content_hash],
                |row| row.get(0),
            )
            .optional()?;

        Ok(text)
    }

    pub async fn update_ocr_text(&self, id: &str, text: &str) -> StoreResult<()> {
        let conn = self.conn.lock().await;

        let updated = conn.execute(
            "UPDATE clipboard_items SET ocr_text = ?1 WHERE id = ?2",
            params![text, id],
        )?;
        if updated == 0 {
            return Err(StoreError::NotFound(format!("clipboard record {}", id)));
        }

        Ok(())
    }

    pub async fn get_setting(&self, key: &str) -> StoreResult<Option<String>> {
        let conn = self.conn.lock().await;

        let value = conn
            .query_row(
                "SELECT value FROM app_settings WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()?;

        Ok(value)
    }

    pub async fn set_setting(&self, key: &str, value: &str) -> StoreResult<()> {
        let conn = self.conn.lock().await;

        conn.execute(
            "INSERT INTO app_settings (key, value, updated_at)
             VALUES (?1, ?2, datetime('now'))
             ON CONFLICT(key) DO UPDATE SET
                 value = excluded.value,
                 updated_at = datetime('now')",
            params![key, value],
        )?;

        Ok(())
    }

    pub async fn settings(&self) -> StoreResult<BTreeMap<String, String>> {
        let conn = self.conn.lock().await;

        let mut stmt = conn.prepare("SELECT key, value FROM app_settings")?;
        let settings = stmt
            .query_map([], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
            })?
            .collect::<Result<BTreeMap<_, _>, _>>()?;

        Ok(settings)
    }

    /// Close the connection, flushing the WAL
    pub async fn close(self) -> StoreResult<()> {
        self.conn
            .into_inner()
            .close()
            .map_err(|(_, e)| StoreError::Sqlite(e))
    }
}

fn get_schema_version(conn: &Connection) -> StoreResult<u32> {
    let version: Option<u32> = conn
        .query_row("SELECT MAX(version) FROM schema_version", [], |row| {
            row.get::<_, Option<u32>>(0)
        })
        .optional()?
        .flatten();

    Ok(version.unwrap_or(0))
}

/// Additive schema steps; each one is safe to run against legacy databases
fn apply_migration(conn: &Connection, version: u32) -> StoreResult<()> {
    match version {
        1 => {
            conn.execute_batch(
                "CREATE TABLE IF NOT EXISTS clipboard_items (
                    id TEXT PRIMARY KEY,
                    content TEXT NOT NULL,
                    content_type TEXT NOT NULL,
                    image_data BLOB,
                    file_paths TEXT,
                    file_info TEXT,
                    timestamp INTEGER NOT NULL,
                    source TEXT,
                    char_count INTEGER,
                    word_count INTEGER,
                    created_at INTEGER DEFAULT (strftime('%s', 'now'))
                );

                CREATE INDEX IF NOT EXISTS idx_timestamp ON clipboard_items(timestamp DESC);
                CREATE INDEX IF NOT EXISTS idx_content_type ON clipboard_items(content_type);

                CREATE TABLE IF NOT EXISTS app_settings (
                    key TEXT PRIMARY KEY,
                    value TEXT NOT NULL,
                    updated_at DATETIME DEFAULT CURRENT_TIMESTAMP
                );",
            )?;
        }
        2 => {
            ensure_column(conn, "clipboard_items", "content_hash", "TEXT DEFAULT ''")?;
            ensure_column(conn, "clipboard_items", "is_favorite", "INTEGER NOT NULL DEFAULT 0")?;
            conn.execute_batch(
                "CREATE INDEX IF NOT EXISTS idx_content_hash
                     ON clipboard_items(content_hash, content_type);
                 CREATE INDEX IF NOT EXISTS idx_is_favorite ON clipboard_items(is_favorite);",
            )?;
            backfill_content_hashes(conn)?;
        }
        3 => {
            ensure_column(conn, "clipboard_items", "ocr_text", "TEXT DEFAULT ''")?;
            conn.execute_batch(
                "CREATE TABLE IF NOT EXISTS user_scripts (
                    id TEXT PRIMARY KEY,
                    name TEXT NOT NULL,
                    enabled INTEGER DEFAULT 1,
                    trigger TEXT NOT NULL,
                    content_types TEXT,
                    keywords TEXT,
                    script TEXT NOT NULL,
                    description TEXT,
                    sort_order INTEGER DEFAULT 0,
                    created_at DATETIME DEFAULT CURRENT_TIMESTAMP,
                    updated_at DATETIME DEFAULT CURRENT_TIMESTAMP
                );

                CREATE INDEX IF NOT EXISTS idx_script_trigger ON user_scripts(trigger);
                CREATE INDEX IF NOT EXISTS idx_script_enabled ON user_scripts(enabled);
                CREATE INDEX IF NOT EXISTS idx_script_sort_order ON user_scripts(sort_order);",
            )?;
            ensure_column(conn, "user_scripts", "plugin_id", "TEXT")?;
            conn.execute_batch(
                "CREATE INDEX IF NOT EXISTS idx_script_plugin_id ON user_scripts(plugin_id);",
            )?;
        }
        other => {
            warn!("No migration defined for schema v{}", other);
        }
    }

    Ok(())
}

/// Add a column if an older database does not have it yet
fn ensure_column(conn: &Connection, table: &str, column: &str, decl: &str) -> StoreResult<()> {
    let exists: bool = conn.query_row(
        "SELECT COUNT(*) > 0 FROM pragma_table_info(?1) WHERE name = ?2",
        params![table, column],
        |row| row.get(0),
    )?;

    if !exists {
        conn.execute_batch(&format!("ALTER TABLE {} ADD COLUMN {} {}", table, column, decl))?;
        debug!("Added column {}.{}", table, column);
    }

    Ok(())
}

/// Compute hashes for rows written before deduplication existed
fn backfill_content_hashes(conn: &Connection) -> StoreResult<()> {
    let mut stmt = conn.prepare(
        "SELECT id, content, content_type, image_data, file_paths
         FROM clipboard_items
         WHERE content_hash IS NULL OR content_hash = ''",
    )?;

    let rows = stmt
        .query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, Option<Vec<u8>>>(3)?,
                row.get::<_, Option<String>>(4)?,
            ))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    let mut backfilled = 0;
    for (id, content, content_type, image_data, file_paths) in rows {
        let Ok(content_type) = content_type.parse::<ContentType>() else {
            warn!("Skipping hash backfill for {} with unknown type {}", id, content_type);
            continue;
        };

        let content_hash = hash::content_hash(
            content_type,
            &content,
            image_data.as_deref(),
            file_paths.as_deref(),
        );
        conn.execute(
            "UPDATE clipboard_items SET content_hash = ?1 WHERE id = ?2",
            params![content_hash, id],
        )?;
        backfilled += 1;
    }

    if backfilled > 0 {
        info!("Backfilled content hashes for {} legacy records", backfilled);
    }

    Ok(())
}

fn row_to_record(row: &Row) -> rusqlite::Result<ClipboardRecord> {
    let content_type: String = row.get(2)?;
    let content_type = content_type
        .parse::<ContentType>()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(2, Type::Text, Box::new(e)))?;

    let timestamp: i64 = row.get(7)?;

    Ok(ClipboardRecord {
        id: row.get(0)?,
        content: row.get(1)?,
        content_type,
        content_hash: row.get::<_, Option<String>>(3)?.unwrap_or_default(),
        image_data: row.get(4)?,
        file_paths: row.get(5)?,
        file_info: row.get(6)?,
        timestamp: DateTime::from_timestamp_millis(timestamp).unwrap_or_else(Utc::now),
        source: row.get::<_, Option<String>>(8)?.unwrap_or_default(),
        char_count: row.get::<_, Option<i64>>(9)?.unwrap_or_default(),
        word_count: row.get::<_, Option<i64>>(10)?.unwrap_or_default(),
        is_favorite: row.get::<_, Option<bool>>(11)?.unwrap_or_default(),
        ocr_text: row.get::<_, Option<String>>(12)?.unwrap_or_default(),
    })
}

fn escape_like(keyword: &str) -> String {
    let mut escaped = String::with_capacity(keyword.len());
    for c in keyword.chars() {
        if matches!(c, '\\' | '%' | '_') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

/// Local midnight as UTC milliseconds
fn start_of_today_millis() -> i64 {
    Local::now()
        .date_naive()
        .and_hms_opt(0, 0, 0)
        .and_then(|midnight| midnight.and_local_timezone(Local).earliest())
        .map(|midnight| midnight.timestamp_millis())
        .unwrap_or_else(|| (Utc::now() - Duration::days(1)).timestamp_millis())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history::FileInfo;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    async fn setup_test_db() -> (HistoryDatabase, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("test.db");
        let db = HistoryDatabase::new(&db_path).await.unwrap();
        (db, temp_dir)
    }

    fn aged_text(content: &str, days: i64) -> ClipboardRecord {
        let mut record = ClipboardRecord::text(content, "Terminal");
        record.timestamp = Utc::now() - Duration::days(days);
        record
    }

    #[tokio::test]
    async fn test_insert_and_retrieve() {
        let (db, _temp_dir) = setup_test_db().await;

        let mut record = ClipboardRecord::text("Test content", "Terminal");
        let outcome = db.save_record(&mut record).await.unwrap();
        assert_eq!(outcome, SaveOutcome::Inserted);

        let stored = db.get_record(&record.id).await.unwrap();
        assert_eq!(stored.content, "Test content");
        assert_eq!(stored.content_type, ContentType::Text);
        assert_eq!(stored.content_hash, record.content_hash);
        assert_eq!(stored.source, "Terminal");
        assert_eq!(stored.timestamp.timestamp_millis(), record.timestamp.timestamp_millis());
    }

    #[tokio::test]
    async fn test_duplicate_save_touches_existing_row() {
        let (db, _temp_dir) = setup_test_db().await;

        let mut first = aged_text("same content", 2);
        db.save_record(&mut first).await.unwrap();

        let mut second = ClipboardRecord::text("same content", "Editor");
        let second_id = second.id.clone();
        let outcome = db.save_record(&mut second).await.unwrap();

        assert_eq!(outcome, SaveOutcome::Touched);
        assert_eq!(second.id, first.id);
        assert_ne!(second.id, second_id);

        let records = db.get_records(10).await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].source, "Editor");
        assert_eq!(
            records[0].timestamp.timestamp_millis(),
            second.timestamp.timestamp_millis()
        );
    }

    #[tokio::test]
    async fn test_same_hash_different_type_is_not_deduplicated() {
        let (db, _temp_dir) = setup_test_db().await;

        let mut text = ClipboardRecord::text("payload", "A");
        db.save_record(&mut text).await.unwrap();

        let mut other = ClipboardRecord::text("payload", "A");
        other.id = crate::history::new_record_id();
        other.content_type = ContentType::Json;
        assert_eq!(db.save_record(&mut other).await.unwrap(), SaveOutcome::Inserted);
        assert_eq!(db.get_records(10).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_empty_hash_always_inserts() {
        let (db, _temp_dir) = setup_test_db().await;

        for _ in 0..2 {
            let mut record = ClipboardRecord::text("unhashed", "A");
            record.content_hash.clear();
            assert_eq!(db.save_record(&mut record).await.unwrap(), SaveOutcome::Inserted);
        }
        assert_eq!(db.get_records(10).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_list_reads_omit_image_bytes() {
        let (db, _temp_dir) = setup_test_db().await;

        let mut image = ClipboardRecord::image(vec![1, 2, 3, 4], "Image 2x2 (png)", "Preview");
        db.save_record(&mut image).await.unwrap();

        let listed = db.get_records(10).await.unwrap();
        assert_eq!(listed[0].image_data, None);

        let searched = db.search(&SearchQuery::default()).await.unwrap();
        assert_eq!(searched[0].image_data, None);

        let full = db.get_record(&image.id).await.unwrap();
        assert_eq!(full.image_data, Some(vec![1, 2, 3, 4]));
    }

    #[tokio::test]
    async fn test_favorite_survives_clear() {
        let (db, _temp_dir) = setup_test_db().await;

        let mut keep = aged_text("keep me", 5);
        let mut drop = aged_text("drop me", 5);
        db.save_record(&mut keep).await.unwrap();
        db.save_record(&mut drop).await.unwrap();

        assert!(db.toggle_favorite(&keep.id).await.unwrap());

        assert_eq!(db.clear_older_than(0).await.unwrap(), 1);
        assert_eq!(db.clear_all().await.unwrap(), 0);

        let records = db.get_records(10).await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].id, keep.id);
        assert!(records[0].is_favorite);
    }

    #[tokio::test]
    async fn test_clear_older_than_respects_age() {
        let (db, _temp_dir) = setup_test_db().await;

        for (content, days) in [("one day", 1), ("ten days", 10), ("forty days", 40)] {
            let mut record = aged_text(content, days);
            db.save_record(&mut record).await.unwrap();
        }

        assert_eq!(db.clear_older_than(30).await.unwrap(), 1);

        let remaining: Vec<String> = db
            .get_records(10)
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.content)
            .collect();
        assert_eq!(remaining, vec!["one day".to_string(), "ten days".to_string()]);
    }

    #[tokio::test]
    async fn test_trim_to_keeps_newest_and_favorites() {
        let (db, _temp_dir) = setup_test_db().await;

        let mut ids = Vec::new();
        for i in 0..5 {
            let mut record = aged_text(&format!("item {}", i), 5 - i);
            db.save_record(&mut record).await.unwrap();
            ids.push(record.id);
        }
        db.toggle_favorite(&ids[0]).await.unwrap();

        assert_eq!(db.trim_to(2).await.unwrap(), 2);

        let contents: Vec<String> = db
            .get_records(10)
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.content)
            .collect();
        assert_eq!(contents, vec!["item 4", "item 3", "item 0"]);
    }

    #[tokio::test]
    async fn test_toggle_and_delete_missing_rows() {
        let (db, _temp_dir) = setup_test_db().await;

        assert!(matches!(
            db.toggle_favorite("nope").await,
            Err(StoreError::NotFound(_))
        ));
        assert!(matches!(
            db.delete_record("nope").await,
            Err(StoreError::NotFound(_))
        ));

        let mut record = ClipboardRecord::text("x", "A");
        db.save_record(&mut record).await.unwrap();
        assert!(db.toggle_favorite(&record.id).await.unwrap());
        assert!(!db.toggle_favorite(&record.id).await.unwrap());
        db.delete_record(&record.id).await.unwrap();
        assert!(matches!(
            db.get_record(&record.id).await,
            Err(StoreError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_search_filters() {
        let (db, _temp_dir) = setup_test_db().await;

        let mut hello = aged_text("Hello world", 3);
        let mut url = aged_text("https://hello.example", 2);
        let mut other = aged_text("Goodbye", 1);
        let mut percent = aged_text("100% done", 1);
        for record in [&mut hello, &mut url, &mut other, &mut percent] {
            db.save_record(record).await.unwrap();
        }
        db.toggle_favorite(&hello.id).await.unwrap();

        let all_hello = db.search(&SearchQuery::keyword("HELLO")).await.unwrap();
        assert_eq!(all_hello.len(), 2);
        assert_eq!(all_hello[0].id, url.id);

        let urls = db
            .search(&SearchQuery::keyword("hello").with_type(ContentType::Url))
            .await
            .unwrap();
        assert_eq!(urls.len(), 1);
        assert_eq!(urls[0].id, url.id);

        let favorites = db
            .search(&SearchQuery::default().favorites_only())
            .await
            .unwrap();
        assert_eq!(favorites.len(), 1);
        assert_eq!(favorites[0].id, hello.id);

        let limited = db.search(&SearchQuery::default().limit(2)).await.unwrap();
        assert_eq!(limited.len(), 2);

        let literal = db.search(&SearchQuery::keyword("0%")).await.unwrap();
        assert_eq!(literal.len(), 1);
        assert_eq!(literal[0].id, percent.id);
    }

    #[tokio::test]
    async fn test_search_matches_ocr_text() {
        let (db, _temp_dir) = setup_test_db().await;

        let mut image = ClipboardRecord::image(vec![7; 8], "Image 1x1 (png)", "Preview");
        db.save_record(&mut image).await.unwrap();
        db.update_ocr_text(&image.id, "Invoice total").await.unwrap();

        let found = db.search(&SearchQuery::keyword("invoice")).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].ocr_text, "Invoice total");
    }

    #[tokio::test]
    async fn test_statistics() {
        let (db, _temp_dir) = setup_test_db().await;

        let mut today = ClipboardRecord::text("today", "A");
        let mut old = aged_text("https://old.example", 3);
        let mut color = aged_text("#fff", 3);
        for record in [&mut today, &mut old, &mut color] {
            db.save_record(record).await.unwrap();
        }

        let stats = db.statistics().await.unwrap();
        assert_eq!(stats.total_count, 3);
        assert_eq!(stats.today_count, 1);
        assert_eq!(stats.type_counts.get("Text"), Some(&1));
        assert_eq!(stats.type_counts.get("URL"), Some(&1));
        assert_eq!(stats.type_counts.get("Color"), Some(&1));
    }

    #[tokio::test]
    async fn test_ocr_lookup_by_hash() {
        let (db, _temp_dir) = setup_test_db().await;

        let mut image = ClipboardRecord::image(vec![5; 16], "Image 2x2 (png)", "Preview");
        db.save_record(&mut image).await.unwrap();

        assert_eq!(db.find_ocr_text(&image.content_hash).await.unwrap(), None);
        db.update_ocr_text(&image.id, "recognized").await.unwrap();
        assert_eq!(
            db.find_ocr_text(&image.content_hash).await.unwrap(),
            Some("recognized".to_string())
        );
        assert!(matches!(
            db.update_ocr_text("missing", "x").await,
            Err(StoreError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_file_record_round_trip() {
        let (db, _temp_dir) = setup_test_db().await;

        let info = vec![FileInfo {
            name: "notes".into(),
            path: "/tmp/notes".into(),
            size: 0,
            is_dir: true,
            exists: true,
            extension: String::new(),
        }];
        let mut record =
            ClipboardRecord::files(r#"["/tmp/notes"]"#, &info, "Folder: notes", "Finder").unwrap();
        db.save_record(&mut record).await.unwrap();

        let stored = db.get_record(&record.id).await.unwrap();
        assert_eq!(stored.file_infos().unwrap(), info);
        assert_eq!(stored.paths().unwrap(), vec!["/tmp/notes".to_string()]);
    }

    #[tokio::test]
    async fn test_settings() {
        let (db, _temp_dir) = setup_test_db().await;

        assert_eq!(db.get_setting("theme").await.unwrap(), None);
        db.set_setting("theme", "dark").await.unwrap();
        db.set_setting("theme", "light").await.unwrap();
        db.set_setting("lang", "en").await.unwrap();

        assert_eq!(db.get_setting("theme").await.unwrap(), Some("light".into()));
        let all = db.settings().await.unwrap();
        assert_eq!(all.len(), 2);
    }

    #[tokio::test]
    async fn test_migrates_legacy_schema_additively() {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("legacy.db");

        {
            let conn = Connection::open(&db_path).unwrap();
            conn.execute_batch(
                "CREATE TABLE clipboard_items (
                    id TEXT PRIMARY KEY,
                    content TEXT NOT NULL,
                    content_type TEXT NOT NULL,
                    image_data BLOB,
                    file_paths TEXT,
                    file_info TEXT,
                    timestamp INTEGER NOT NULL,
                    source TEXT,
                    char_count INTEGER,
                    word_count INTEGER
                );",
            )
            .unwrap();
            conn.execute(
                "INSERT INTO clipboard_items (id, content, content_type, timestamp, source)
                 VALUES ('1', 'legacy text', 'Text', ?1, 'Old')",
                params![Utc::now().timestamp_millis()],
            )
            .unwrap();
        }

        let db = HistoryDatabase::new(&db_path).await.unwrap();

        let legacy = db.get_record("1").await.unwrap();
        assert_eq!(legacy.content, "legacy text");
        assert_eq!(legacy.content_hash, hash::text_hash("legacy text"));
        assert!(!legacy.is_favorite);
        assert_eq!(legacy.ocr_text, "");

        // The backfilled hash participates in deduplication
        let mut again = ClipboardRecord::text("legacy text", "New");
        assert_eq!(db.save_record(&mut again).await.unwrap(), SaveOutcome::Touched);
        assert_eq!(again.id, "1");

        // Reopening does not re-run migrations
        db.close().await.unwrap();
        let reopened = HistoryDatabase::new(&db_path).await.unwrap();
        let conn = reopened.conn.lock().await;
        assert_eq!(get_schema_version(&conn).unwrap(), SCHEMA_VERSION);
    }
}
