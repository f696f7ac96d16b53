//! # ClipTrail
//!
//! Clipboard history service for macOS and Linux.
//!
//! ClipTrail watches the system clipboard, classifies and deduplicates what
//! gets copied, and keeps a searchable SQLite history of text, images and
//! files. Images are enriched with recognized text in the background.

pub mod app;
pub mod classifier;
pub mod cli;
pub mod clipboard;
pub mod config;
#[cfg(unix)]
pub mod daemon;
pub mod history;
pub mod monitor;
pub mod notify;
pub mod ocr;
pub mod scripts;
pub mod workers;

pub use app::App;
pub use config::Config;

/// Result type alias for ClipTrail operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for ClipTrail operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    /// Clipboard operation error
    #[error("Clipboard error: {0}")]
    Clipboard(#[from] clipboard::ClipboardError),

    /// History store error
    #[error("Storage error: {0}")]
    Store(#[from] history::StoreError),

    /// Capture pipeline error
    #[error("Capture error: {0}")]
    Capture(#[from] monitor::CaptureError),

    /// Text recognition error
    #[error("OCR error: {0}")]
    Ocr(#[from] ocr::OcrError),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

/// Library version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Maximum clipboard payload size (20MB default)
pub const MAX_PAYLOAD_SIZE: usize = 20 * 1024 * 1024;
