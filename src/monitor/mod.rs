//! Clipboard capture loop
//!
//! Polls the platform adapter, decides whether the clipboard really changed,
//! and turns each new event into a saved history record. Saving is followed
//! by OCR submission, listener notification and script matching.

pub mod payload;

use std::sync::Arc;

use thiserror::Error;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use crate::clipboard::{ClipboardAdapter, ClipboardError, FileList};
use crate::config::MonitorConfig;
use crate::history::{
    hash, ClipboardHistory, ClipboardRecord, ContentType, SaveOutcome, StoreError,
};
use crate::notify::{FanOut, RecordEvent};
use crate::ocr::OcrPipeline;
use crate::scripts::{matching_script_ids, ScriptExecuteRequest, ScriptTrigger};
use crate::workers::WorkerPool;

/// Failures of a single capture tick; the loop logs these and keeps going
#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("Clipboard error: {0}")]
    Clipboard(#[from] ClipboardError),

    #[error("Failed to decode image: {0}")]
    Decode(#[from] image::ImageError),

    #[error("Failed to persist record: {0}")]
    Store(#[from] StoreError),

    #[error("{kind} payload of {size} bytes exceeds limit of {max} bytes")]
    TooLarge {
        kind: Category,
        size: usize,
        max: usize,
    },

    #[error("Invalid file list: {0}")]
    InvalidFileList(#[from] serde_json::Error),

    #[error("Record {0} has no payload to copy")]
    MissingPayload(String),
}

/// Capture category, each with its own last-seen slot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Category {
    Text,
    Image,
    File,
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Category::Text => "text",
            Category::Image => "image",
            Category::File => "file",
        })
    }
}

/// Hash of the last payload seen per category
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LastSeen {
    text: Option<String>,
    image: Option<String>,
    file: Option<String>,
}

impl LastSeen {
    /// Record `hash` for `category`
    ///
    /// Returns `false` when it equals the slot's current hash. Otherwise the
    /// other two slots are cleared so copying A, then B, then A again still
    /// registers the second A.
    pub fn observe(&mut self, category: Category, hash: &str) -> bool {
        let slot = match category {
            Category::Text => &self.text,
            Category::Image => &self.image,
            Category::File => &self.file,
        };
        if slot.as_deref() == Some(hash) {
            return false;
        }

        *self = LastSeen::default();
        let slot = match category {
            Category::Text => &mut self.text,
            Category::Image => &mut self.image,
            Category::File => &mut self.file,
        };
        *slot = Some(hash.to_string());
        true
    }

    pub fn get(&self, category: Category) -> Option<&str> {
        match category {
            Category::Text => self.text.as_deref(),
            Category::Image => self.image.as_deref(),
            Category::File => self.file.as_deref(),
        }
    }
}

/// State owned by the capture loop
#[derive(Debug, Clone, Default)]
pub struct CaptureState {
    /// `None` until the first tick, so the initial clipboard is captured
    pub last_change_count: Option<i64>,
    pub last_seen: LastSeen,
}

/// Result of one tick
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    /// Change counter did not move
    Unchanged,
    /// Counter moved but nothing capturable was on the clipboard
    Empty,
    /// Same payload as last time for its category
    Repeated(Category),
    /// Record saved
    Captured {
        id: String,
        content_type: ContentType,
        outcome: SaveOutcome,
    },
}

pub struct ClipboardMonitor {
    adapter: Arc<dyn ClipboardAdapter>,
    history: Arc<ClipboardHistory>,
    events: Arc<FanOut<RecordEvent>>,
    script_requests: Arc<FanOut<ScriptExecuteRequest>>,
    ocr: Option<OcrPipeline>,
    script_pool: WorkerPool,
    config: MonitorConfig,
    state: CaptureState,
}

impl ClipboardMonitor {
    pub fn new(
        adapter: Arc<dyn ClipboardAdapter>,
        history: Arc<ClipboardHistory>,
        events: Arc<FanOut<RecordEvent>>,
        script_requests: Arc<FanOut<ScriptExecuteRequest>>,
        script_pool: WorkerPool,
        config: MonitorConfig,
    ) -> Self {
        Self {
            adapter,
            history,
            events,
            script_requests,
            ocr: None,
            script_pool,
            config,
            state: CaptureState::default(),
        }
    }

    /// Enable OCR submission for captured images
    pub fn with_ocr(mut self, ocr: OcrPipeline) -> Self {
        self.ocr = Some(ocr);
        self
    }

    pub fn state(&self) -> &CaptureState {
        &self.state
    }

    /// Poll until `shutdown` is cancelled
    pub async fn run(&mut self, shutdown: CancellationToken) {
        let mut ticker = interval(self.config.poll_interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        info!(
            "Clipboard monitor started ({}, every {:?})",
            self.adapter.name(),
            self.config.poll_interval()
        );

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {}
            }

            match self.tick().await {
                Ok(TickOutcome::Captured {
                    id,
                    content_type,
                    outcome,
                }) => debug!("Captured {} record {} ({:?})", content_type, id, outcome),
                Ok(outcome) => trace!("Tick: {:?}", outcome),
                Err(CaptureError::Clipboard(e)) => debug!("Clipboard read skipped: {}", e),
                Err(CaptureError::Store(e)) => error!("Failed to save clipboard record: {}", e),
                Err(e) => warn!("Dropped clipboard capture: {}", e),
            }
        }

        info!("Clipboard monitor stopped");
    }

    /// Run one capture step
    pub async fn tick(&mut self) -> Result<TickOutcome, CaptureError> {
        let count = self.adapter.change_count().await?;
        if self.state.last_change_count == Some(count) {
            return Ok(TickOutcome::Unchanged);
        }
        self.state.last_change_count = Some(count);

        let source = self
            .adapter
            .frontmost_application()
            .await
            .filter(|name| !name.trim().is_empty())
            .unwrap_or_else(|| self.config.fallback_source.clone());

        if self.config.capture_images {
            if let Some(raw) = self.adapter.read_image().await? {
                if !raw.is_empty() {
                    return self.capture_image(&raw, &source).await;
                }
            }
        }

        if self.config.capture_files {
            if let Some(list) = self.adapter.read_file_list().await? {
                if list.count > 0 && !list.json.is_empty() {
                    return self.capture_files(list, &source).await;
                }
            }
        }

        if let Some(text) = self.adapter.read_text().await? {
            if !text.is_empty() {
                return self.capture_text(text, &source).await;
            }
        }

        Ok(TickOutcome::Empty)
    }

    async fn capture_image(&mut self, raw: &[u8], source: &str) -> Result<TickOutcome, CaptureError> {
        self.check_size(Category::Image, raw.len())?;

        let normalized = payload::normalize_image(raw)?;
        let content_hash = hash::image_hash(&normalized.png);
        if !self.state.last_seen.observe(Category::Image, &content_hash) {
            return Ok(TickOutcome::Repeated(Category::Image));
        }

        let description = normalized.description();
        let record = ClipboardRecord::image(normalized.png, description, source);
        self.persist(record).await
    }

    async fn capture_files(&mut self, list: FileList, source: &str) -> Result<TickOutcome, CaptureError> {
        let content_hash = hash::file_list_hash(&list.json);
        if !self.state.last_seen.observe(Category::File, &content_hash) {
            return Ok(TickOutcome::Repeated(Category::File));
        }

        let paths: Vec<String> = serde_json::from_str(&list.json)?;
        if paths.is_empty() {
            return Ok(TickOutcome::Empty);
        }

        let infos = payload::collect_file_info(&paths);
        let description = payload::describe_files(&infos);
        let record = ClipboardRecord::files(list.json, &infos, description, source)?;
        self.persist(record).await
    }

    async fn capture_text(&mut self, text: String, source: &str) -> Result<TickOutcome, CaptureError> {
        self.check_size(Category::Text, text.len())?;

        let content_hash = hash::text_hash(&text);
        if !self.state.last_seen.observe(Category::Text, &content_hash) {
            return Ok(TickOutcome::Repeated(Category::Text));
        }

        self.persist(ClipboardRecord::text(text, source)).await
    }

    fn check_size(&self, kind: Category, size: usize) -> Result<(), CaptureError> {
        if size > self.config.max_size {
            return Err(CaptureError::TooLarge {
                kind,
                size,
                max: self.config.max_size,
            });
        }
        Ok(())
    }

    /// Save, then hand the record to OCR, listeners and script matching
    async fn persist(&self, mut record: ClipboardRecord) -> Result<TickOutcome, CaptureError> {
        let outcome = self.history.save_record(&mut record).await?;
        let image = record.image_data.take();

        if let (Some(ocr), Some(png)) = (&self.ocr, image) {
            if record.ocr_text.is_empty() {
                ocr.submit(record.id.clone(), record.content_hash.clone(), png);
            }
        }

        let delivered = self.events.publish(RecordEvent::new(&record, outcome)).await;
        trace!("Record {} delivered to {} listeners", record.id, delivered);

        self.dispatch_scripts(record.clone());

        Ok(TickOutcome::Captured {
            id: record.id,
            content_type: record.content_type,
            outcome,
        })
    }

    fn dispatch_scripts(&self, record: ClipboardRecord) {
        let history = Arc::clone(&self.history);
        let requests = Arc::clone(&self.script_requests);

        self.script_pool.spawn("scripts", async move {
            let scripts = match history.enabled_scripts(ScriptTrigger::AfterSave).await {
                Ok(scripts) => scripts,
                Err(e) => {
                    warn!("Failed to load scripts for {}: {}", record.id, e);
                    return;
                }
            };

            let ids = matching_script_ids(&scripts, &record);
            if let Some(request) = ScriptExecuteRequest::after_save(&record, ids) {
                debug!(
                    "Record {} matched {} scripts",
                    record.id,
                    request.script_ids.len()
                );
                requests.publish(request).await;
            }
        });
    }
}

/// Put a stored record back on the clipboard
pub async fn copy_to_clipboard(
    history: &ClipboardHistory,
    adapter: &dyn ClipboardAdapter,
    id: &str,
) -> Result<ContentType, CaptureError> {
    let record = history.get_record(id).await?;

    match record.content_type {
        ContentType::Image => {
            let png = record
                .image_data
                .as_deref()
                .filter(|png| !png.is_empty())
                .ok_or_else(|| CaptureError::MissingPayload(id.to_string()))?;
            adapter.write_image(png).await?;
        }
        ContentType::File => {
            let paths = record.paths()?;
            if paths.is_empty() {
                return Err(CaptureError::MissingPayload(id.to_string()));
            }
            adapter.write_file_urls(&paths).await?;
        }
        ContentType::Text | ContentType::Url | ContentType::Color | ContentType::Json => {
            adapter.write_text(&record.content).await?;
        }
    }

    info!("Copied record {} back to the clipboard", id);
    Ok(record.content_type)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_observe_skips_repeats() {
        let mut seen = LastSeen::default();
        assert!(seen.observe(Category::Text, "a"));
        assert!(!seen.observe(Category::Text, "a"));
        assert!(seen.observe(Category::Text, "b"));
        assert_eq!(seen.get(Category::Text), Some("b"));
    }

    #[test]
    fn test_observe_clears_other_slots() {
        let mut seen = LastSeen::default();
        assert!(seen.observe(Category::Text, "a"));
        assert!(seen.observe(Category::Image, "img"));
        assert_eq!(seen.get(Category::Text), None);

        // Copying the same text again after an image is a new event
        assert!(seen.observe(Category::Text, "a"));
        assert_eq!(seen.get(Category::Image), None);
        assert_eq!(seen.get(Category::File), None);
    }

    #[test]
    fn test_too_large_message() {
        let err = CaptureError::TooLarge {
            kind: Category::Image,
            size: 10,
            max: 5,
        };
        assert_eq!(
            err.to_string(),
            "image payload of 10 bytes exceeds limit of 5 bytes"
        );
    }
}
