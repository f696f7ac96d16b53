//! Clipboard abstraction layer for cross-platform clipboard access
//!
//! The capture loop only talks to [`ClipboardAdapter`]. macOS uses
//! NSPasteboard directly for its change counter, file URLs and the frontmost
//! application; every other platform goes through clipboard-rs.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[cfg(target_os = "macos")]
pub mod macos;

#[cfg(not(target_os = "macos"))]
pub mod system;

/// Paths currently on the clipboard
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileList {
    /// JSON array of paths in the order the OS reported them
    pub json: String,
    pub count: usize,
}

impl FileList {
    pub fn from_paths(paths: &[String]) -> Result<Self, ClipboardError> {
        let json = serde_json::to_string(paths)
            .map_err(|e| ClipboardError::Platform(format!("Failed to encode path list: {}", e)))?;
        Ok(Self {
            json,
            count: paths.len(),
        })
    }
}

/// Platform clipboard adapter
#[async_trait]
pub trait ClipboardAdapter: Send + Sync {
    /// Counter that increases on every clipboard change
    async fn change_count(&self) -> Result<i64, ClipboardError>;

    async fn read_text(&self) -> Result<Option<String>, ClipboardError>;

    /// Raw image bytes in whatever encoding the clipboard offers
    ///
    /// Several representations are tried in turn; the first non-empty one wins.
    async fn read_image(&self) -> Result<Option<Vec<u8>>, ClipboardError>;

    async fn read_file_list(&self) -> Result<Option<FileList>, ClipboardError>;

    async fn write_text(&self, text: &str) -> Result<(), ClipboardError>;

    /// Replace the clipboard with PNG bytes
    async fn write_image(&self, png: &[u8]) -> Result<(), ClipboardError>;

    async fn write_file_urls(&self, paths: &[String]) -> Result<(), ClipboardError>;

    /// Name of the application in front, best effort
    async fn frontmost_application(&self) -> Option<String>;

    fn name(&self) -> &str;
}

/// Clipboard errors
#[derive(Debug, Error)]
pub enum ClipboardError {
    /// Clipboard could not be reached this time
    #[error("Clipboard unavailable: {0}")]
    Unavailable(String),

    /// Platform-specific error
    #[error("Platform error: {0}")]
    Platform(String),

    /// Operation not supported on this platform
    #[error("Unsupported clipboard operation: {0}")]
    Unsupported(String),

    /// Image could not be converted
    #[error("Image conversion failed: {0}")]
    Image(#[from] image::ImageError),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Create the clipboard adapter for the current platform
pub fn create_adapter() -> Result<Box<dyn ClipboardAdapter>, ClipboardError> {
    #[cfg(target_os = "macos")]
    {
        Ok(Box::new(macos::MacOSClipboard::new()?))
    }

    #[cfg(not(target_os = "macos"))]
    {
        Ok(Box::new(system::SystemClipboard::new()))
    }
}
