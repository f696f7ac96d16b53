//! Text recognition for image records

mod command;
pub mod pipeline;
#[cfg(target_os = "macos")]
mod vision;

use async_trait::async_trait;
use thiserror::Error;
use tracing::info;

use crate::config::OcrConfig;

pub use command::CommandRecognizer;
pub use pipeline::{OcrOutcome, OcrPipeline};
#[cfg(target_os = "macos")]
pub use vision::VisionRecognizer;

/// Recognition errors; none of these ever reach the capture loop
#[derive(Debug, Error)]
pub enum OcrError {
    #[error("Failed to run recognizer: {0}")]
    Io(#[from] std::io::Error),

    #[error("Recognizer exited with {status}: {stderr}")]
    Failed { status: String, stderr: String },

    #[error("Recognizer produced invalid UTF-8")]
    InvalidOutput(#[from] std::string::FromUtf8Error),

    #[error("Platform recognizer failed: {0}")]
    Platform(String),
}

/// Platform text recognizer
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait OcrAdapter: Send + Sync {
    /// Recognize text in PNG bytes; empty when nothing was found or unsupported
    async fn recognize(&self, image: &[u8]) -> Result<String, OcrError>;

    fn name(&self) -> &str;
}

/// Recognizer for platforms without OCR support
#[derive(Debug, Default)]
pub struct UnsupportedRecognizer;

#[async_trait]
impl OcrAdapter for UnsupportedRecognizer {
    async fn recognize(&self, _image: &[u8]) -> Result<String, OcrError> {
        Ok(String::new())
    }

    fn name(&self) -> &str {
        "unsupported"
    }
}

/// Pick the recognizer for this configuration
///
/// A configured command wins over the platform recognizer.
pub fn create_recognizer(config: &OcrConfig) -> Box<dyn OcrAdapter> {
    if !config.enabled {
        info!("OCR disabled");
        return Box::new(UnsupportedRecognizer);
    }

    match config.command.as_deref() {
        Some(command) if !command.trim().is_empty() => {
            info!("Using OCR command {}", command);
            Box::new(CommandRecognizer::new(command, &config.languages))
        }
        _ => platform_recognizer(),
    }
}

#[cfg(target_os = "macos")]
fn platform_recognizer() -> Box<dyn OcrAdapter> {
    info!("Using Vision text recognition");
    Box::new(VisionRecognizer)
}

#[cfg(not(target_os = "macos"))]
fn platform_recognizer() -> Box<dyn OcrAdapter> {
    info!("OCR recognizer unavailable, image text will not be extracted");
    Box::new(UnsupportedRecognizer)
}
