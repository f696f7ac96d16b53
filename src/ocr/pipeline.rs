//! Asynchronous OCR backfill with content-addressed reuse

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::{OcrAdapter, OcrError};
use crate::history::{ClipboardHistory, StoreError};
use crate::workers::WorkerPool;

/// What an enrichment run did to the row
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OcrOutcome {
    /// Text copied from another image row with the same hash
    Reused,
    /// Text recognized and stored
    Recognized,
    /// Recognizer found nothing; row left untouched
    Empty,
}

#[derive(Debug, thiserror::Error)]
pub enum EnrichError {
    #[error(transparent)]
    Ocr(#[from] OcrError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

pub struct OcrPipeline {
    history: Arc<ClipboardHistory>,
    recognizer: Arc<dyn OcrAdapter>,
    pool: WorkerPool,
    in_flight: Arc<Mutex<HashSet<String>>>,
}

/// Releases a content hash from the in-flight set when the job ends or is cancelled
struct InFlight {
    hashes: Arc<Mutex<HashSet<String>>>,
    hash: String,
}

impl InFlight {
    /// `None` when the hash is already being recognized
    fn claim(hashes: &Arc<Mutex<HashSet<String>>>, hash: &str) -> Option<Self> {
        let mut pending = hashes.lock().unwrap_or_else(|e| e.into_inner());
        if !pending.insert(hash.to_string()) {
            return None;
        }
        Some(Self {
            hashes: Arc::clone(hashes),
            hash: hash.to_string(),
        })
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        let mut pending = self.hashes.lock().unwrap_or_else(|e| e.into_inner());
        pending.remove(&self.hash);
    }
}

impl OcrPipeline {
    pub fn new(
        history: Arc<ClipboardHistory>,
        recognizer: Arc<dyn OcrAdapter>,
        pool: WorkerPool,
    ) -> Self {
        Self {
            history,
            recognizer,
            pool,
            in_flight: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    /// Queue enrichment for a saved image row without waiting for it
    ///
    /// Returns `None` when an image with the same hash is still being
    /// recognized. Deduplication maps that hash to the row the running job
    /// is already filling.
    pub fn submit(
        &self,
        id: String,
        content_hash: String,
        png: Vec<u8>,
    ) -> Option<JoinHandle<()>> {
        let claim = if content_hash.is_empty() {
            None
        } else {
            match InFlight::claim(&self.in_flight, &content_hash) {
                Some(claim) => Some(claim),
                None => {
                    debug!("OCR already running for {}, skipping {}", content_hash, id);
                    return None;
                }
            }
        };

        let history = Arc::clone(&self.history);
        let recognizer = Arc::clone(&self.recognizer);

        Some(self.pool.spawn("ocr", async move {
            let _claim = claim;
            match enrich(&history, recognizer.as_ref(), &id, &content_hash, &png).await {
                Ok(outcome) => debug!("OCR for {}: {:?}", id, outcome),
                Err(EnrichError::Store(StoreError::NotFound(_))) => {
                    debug!("Record {} deleted before OCR finished", id)
                }
                Err(e) => warn!("OCR for {} failed: {}", id, e),
            }
        }))
    }
}

/// Reuse text from an identical image if one exists, otherwise recognize
pub async fn enrich(
    history: &ClipboardHistory,
    recognizer: &dyn OcrAdapter,
    id: &str,
    content_hash: &str,
    png: &[u8],
) -> Result<OcrOutcome, EnrichError> {
    if let Some(text) = history.find_ocr_text(content_hash).await? {
        history.update_ocr_text(id, &text).await?;
        return Ok(OcrOutcome::Reused);
    }

    let text = recognizer.recognize(png).await?;
    let text = text.trim();
    if text.is_empty() {
        return Ok(OcrOutcome::Empty);
    }

    history.update_ocr_text(id, text).await?;
    Ok(OcrOutcome::Recognized)
}
