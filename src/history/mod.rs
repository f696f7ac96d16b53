//! Clipboard history management and persistence

pub mod database;
pub mod hash;
pub mod retention;
mod script_store;

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::sync::atomic::{AtomicI64, Ordering};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::classifier;
use crate::scripts::{ScriptFilter, ScriptTrigger};

pub use database::HistoryDatabase;

/// Persistence errors surfaced to the caller
#[derive(Debug, Error)]
pub enum StoreError {
    /// SQLite error
    #[error("Database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Requested row does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// IO error while preparing the database location
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Stored JSON column could not be (de)serialized
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Stored value is not valid for its column
    #[error("Invalid stored value: {0}")]
    InvalidValue(String),
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Semantic type of a clipboard record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ContentType {
    Text,
    #[serde(rename = "URL")]
    Url,
    Color,
    #[serde(rename = "JSON")]
    Json,
    Image,
    File,
}

impl ContentType {
    pub const ALL: [ContentType; 6] = [
        ContentType::Text,
        ContentType::Url,
        ContentType::Color,
        ContentType::Json,
        ContentType::Image,
        ContentType::File,
    ];

    /// Name as stored in the database
    pub fn as_str(&self) -> &'static str {
        match self {
            ContentType::Text => "Text",
            ContentType::Url => "URL",
            ContentType::Color => "Color",
            ContentType::Json => "JSON",
            ContentType::Image => "Image",
            ContentType::File => "File",
        }
    }
}

impl fmt::Display for ContentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ContentType {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ContentType::ALL
            .into_iter()
            .find(|t| t.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| StoreError::InvalidValue(format!("unknown content type: {}", s)))
    }
}

/// Generate a time-derived record id
///
/// Ids are nanosecond timestamps, forced strictly increasing within the
/// process so two captures in the same instant never collide.
pub fn new_record_id() -> String {
    static LAST: AtomicI64 = AtomicI64::new(0);

    let now = Utc::now()
        .timestamp_nanos_opt()
        .unwrap_or_else(|| Utc::now().timestamp_micros() * 1_000);

    let mut last = LAST.load(Ordering::Relaxed);
    loop {
        let next = now.max(last + 1);
        match LAST.compare_exchange_weak(last, next, Ordering::Relaxed, Ordering::Relaxed) {
            Ok(_) => return next.to_string(),
            Err(actual) => last = actual,
        }
    }
}

/// One logical clipboard event kept in history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClipboardRecord {
    pub id: String,
    /// Full text, or a generated description for images and files
    pub content: String,
    pub content_type: ContentType,
    pub content_hash: String,
    /// Normalized PNG bytes, only populated on image records fetched by id
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_data: Option<Vec<u8>>,
    /// JSON array of paths as reported by the clipboard
    pub file_paths: Option<String>,
    /// JSON array of [`FileInfo`]
    pub file_info: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub source: String,
    pub char_count: i64,
    pub word_count: i64,
    pub is_favorite: bool,
    pub ocr_text: String,
}

impl ClipboardRecord {
    fn blank(content: String, content_type: ContentType, source: &str) -> Self {
        Self {
            id: new_record_id(),
            content,
            content_type,
            content_hash: String::new(),
            image_data: None,
            file_paths: None,
            file_info: None,
            timestamp: Utc::now(),
            source: source.to_string(),
            char_count: 0,
            word_count: 0,
            is_favorite: false,
            ocr_text: String::new(),
        }
    }

    /// Build a classified text record
    pub fn text(content: impl Into<String>, source: &str) -> Self {
        let content = content.into();
        let classification = classifier::classify(&content);
        let mut record = Self::blank(content, classification.content_type, source);
        record.char_count = classification.char_count;
        record.word_count = classification.word_count;
        record.content_hash = hash::text_hash(&record.content);
        record
    }

    /// Build an image record from normalized PNG bytes
    pub fn image(png: Vec<u8>, description: impl Into<String>, source: &str) -> Self {
        let mut record = Self::blank(description.into(), ContentType::Image, source);
        record.char_count = png.len() as i64;
        record.content_hash = hash::image_hash(&png);
        record.image_data = Some(png);
        record
    }

    /// Build a file record from the reported path list and collected metadata
    pub fn files(
        paths_json: impl Into<String>,
        file_info: &[FileInfo],
        description: impl Into<String>,
        source: &str,
    ) -> StoreResult<Self> {
        let mut record = Self::blank(description.into(), ContentType::File, source);
        let paths_json = paths_json.into();
        record.char_count = classifier::count_chars(&record.content);
        record.word_count = file_info.len() as i64;
        record.content_hash = hash::file_list_hash(&paths_json);
        record.file_paths = Some(paths_json);
        record.file_info = Some(serde_json::to_string(file_info)?);
        Ok(record)
    }

    /// Parsed per-path metadata of a file record
    pub fn file_infos(&self) -> StoreResult<Vec<FileInfo>> {
        match self.file_info.as_deref() {
            Some(json) if !json.is_empty() => Ok(serde_json::from_str(json)?),
            _ => Ok(Vec::new()),
        }
    }

    /// Paths of a file record in reported order
    pub fn paths(&self) -> StoreResult<Vec<String>> {
        match self.file_paths.as_deref() {
            Some(json) if !json.is_empty() => Ok(serde_json::from_str(json)?),
            _ => Ok(Vec::new()),
        }
    }
}

/// Record view handed to listeners and script executors; never carries image bytes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordSummary {
    pub id: String,
    pub content: String,
    pub content_type: ContentType,
    pub content_hash: String,
    pub file_paths: Option<String>,
    pub file_info: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub source: String,
    pub char_count: i64,
    pub word_count: i64,
    pub is_favorite: bool,
}

impl From<&ClipboardRecord> for RecordSummary {
    fn from(record: &ClipboardRecord) -> Self {
        Self {
            id: record.id.clone(),
            content: record.content.clone(),
            content_type: record.content_type,
            content_hash: record.content_hash.clone(),
            file_paths: record.file_paths.clone(),
            file_info: record.file_info.clone(),
            timestamp: record.timestamp,
            source: record.source.clone(),
            char_count: record.char_count,
            word_count: record.word_count,
            is_favorite: record.is_favorite,
        }
    }
}

/// Metadata collected for one copied path
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileInfo {
    pub name: String,
    pub path: String,
    pub size: u64,
    pub is_dir: bool,
    pub exists: bool,
    pub extension: String,
}

/// What a save did to the history
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SaveOutcome {
    /// A new row was inserted
    Inserted,
    /// An existing row with the same content had its recency updated
    Touched,
}

/// Filter for history searches
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchQuery {
    /// Case-insensitive substring; empty matches everything
    pub keyword: String,
    pub content_type: Option<ContentType>,
    pub favorites_only: bool,
    pub limit: usize,
}

impl Default for SearchQuery {
    fn default() -> Self {
        Self {
            keyword: String::new(),
            content_type: None,
            favorites_only: false,
            limit: 100,
        }
    }
}

impl SearchQuery {
    pub fn keyword(keyword: impl Into<String>) -> Self {
        Self {
            keyword: keyword.into(),
            ..Self::default()
        }
    }

    pub fn with_type(mut self, content_type: ContentType) -> Self {
        self.content_type = Some(content_type);
        self
    }

    pub fn favorites_only(mut self) -> Self {
        self.favorites_only = true;
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }
}

/// History counters
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Statistics {
    pub total_count: i64,
    pub today_count: i64,
    pub type_counts: BTreeMap<String, i64>,
}

/// Main interface for clipboard history management
pub struct ClipboardHistory {
    db: HistoryDatabase,
}

impl ClipboardHistory {
    /// Open (or create) the history database at `db_path`
    pub async fn new(db_path: &Path) -> StoreResult<Self> {
        let db = HistoryDatabase::new(db_path).await?;
        info!("Opened clipboard history at {:?}", db_path);
        Ok(Self { db })
    }

    /// Save a record, touching an existing row with identical content
    ///
    /// On a touch `record.id` is re-pointed to the existing row.
    pub async fn save_record(&self, record: &mut ClipboardRecord) -> StoreResult<SaveOutcome> {
        let outcome = self.db.save_record(record).await?;
        match outcome {
            SaveOutcome::Inserted => {
                debug!("Saved clipboard record {} ({})", record.id, record.content_type)
            }
            SaveOutcome::Touched => {
                debug!("Touched existing record {} ({})", record.id, record.content_type)
            }
        }
        Ok(outcome)
    }

    /// Newest records first, without image payloads
    pub async fn get_records(&self, limit: usize) -> StoreResult<Vec<ClipboardRecord>> {
        self.db.get_records(limit).await
    }

    /// Full record including image payload
    pub async fn get_record(&self, id: &str) -> StoreResult<ClipboardRecord> {
        self.db.get_record(id).await
    }

    /// Per-path metadata of a stored file record
    pub async fn file_info(&self, id: &str) -> StoreResult<Vec<FileInfo>> {
        let record = self.db.get_record(id).await?;
        if record.content_type != ContentType::File {
            return Err(StoreError::InvalidValue(format!(
                "record {} is {}, not File",
                id, record.content_type
            )));
        }
        record.file_infos()
    }

    pub async fn delete_record(&self, id: &str) -> StoreResult<()> {
        self.db.delete_record(id).await?;
        info!("Deleted clipboard record {}", id);
        Ok(())
    }

    pub async fn search(&self, query: &SearchQuery) -> StoreResult<Vec<ClipboardRecord>> {
        self.db.search(query).await
    }

    /// Flip the favorite flag, returning the new state
    pub async fn toggle_favorite(&self, id: &str) -> StoreResult<bool> {
        self.db.toggle_favorite(id).await
    }

    /// Delete non-favorite records older than `days`
    pub async fn clear_older_than(&self, days: u32) -> StoreResult<usize> {
        let removed = self.db.clear_older_than(days).await?;
        if removed > 0 {
            info!("Cleared {} records older than {} days", removed, days);
        }
        Ok(removed)
    }

    /// Keep only the newest `keep` non-favorite records
    pub async fn trim_to(&self, keep: usize) -> StoreResult<usize> {
        let removed = self.db.trim_to(keep).await?;
        if removed > 0 {
            info!("Trimmed {} records beyond the newest {}", removed, keep);
        }
        Ok(removed)
    }

    /// Delete every non-favorite record
    pub async fn clear_all(&self) -> StoreResult<usize> {
        let removed = self.db.clear_all().await?;
        info!("Cleared {} records", removed);
        Ok(removed)
    }

    pub async fn statistics(&self) -> StoreResult<Statistics> {
        self.db.statistics().await
    }

    /// OCR text already recognized for an image with this hash, if any
    pub async fn find_ocr_text(&self, content_hash: &str) -> StoreResult<Option<String>> {
        if content_hash.is_empty() {
            return Ok(None);
        }
        self.db.find_ocr_text(content_hash).await
    }

    /// Store recognized text on a row; empty text is ignored
    pub async fn update_ocr_text(&self, id: &str, text: &str) -> StoreResult<()> {
        if text.trim().is_empty() {
            warn!("Refusing to store empty OCR text for {}", id);
            return Ok(());
        }
        self.db.update_ocr_text(id, text).await
    }

    pub async fn get_setting(&self, key: &str) -> StoreResult<Option<String>> {
        self.db.get_setting(key).await
    }

    pub async fn set_setting(&self, key: &str, value: &str) -> StoreResult<()> {
        self.db.set_setting(key, value).await?;
        debug!("Saved setting {}", key);
        Ok(())
    }

    pub async fn settings(&self) -> StoreResult<BTreeMap<String, String>> {
        self.db.settings().await
    }

    /// Insert or update a script; new scripts get an id and the top sort order
    pub async fn save_script(&self, script: &mut ScriptFilter) -> StoreResult<()> {
        self.db.save_script(script).await?;
        info!("Saved script {} ({})", script.name, script.id);
        Ok(())
    }

    pub async fn get_script(&self, id: &str) -> StoreResult<ScriptFilter> {
        self.db.get_script(id).await
    }

    pub async fn scripts(&self) -> StoreResult<Vec<ScriptFilter>> {
        self.db.scripts().await
    }

    pub async fn scripts_by_ids(&self, ids: &[String]) -> StoreResult<Vec<ScriptFilter>> {
        self.db.scripts_by_ids(ids).await
    }

    /// Enabled scripts for a trigger stage, highest sort order first
    pub async fn enabled_scripts(&self, trigger: ScriptTrigger) -> StoreResult<Vec<ScriptFilter>> {
        self.db.enabled_scripts(trigger).await
    }

    pub async fn delete_script(&self, id: &str) -> StoreResult<()> {
        self.db.delete_script(id).await?;
        info!("Deleted script {}", id);
        Ok(())
    }

    pub async fn update_script_order(&self, id: &str, sort_order: i64) -> StoreResult<()> {
        self.db.update_script_order(id, sort_order).await
    }

    /// Close the underlying connection
    pub async fn close(self) -> StoreResult<()> {
        self.db.close().await
    }
}
