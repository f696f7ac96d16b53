//! Clipboard access through clipboard-rs for platforms without NSPasteboard
//!
//! The change counter is driven by the OS change notification (XFixes on X11,
//! the clipboard format listener on Windows) through a background watcher.
//! When no watcher can be started the counter falls back to a fingerprint of
//! the cheap formats.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;

use async_trait::async_trait;
use clipboard_rs::common::RustImage;
use clipboard_rs::{
    Clipboard, ClipboardContext, ClipboardHandler, ClipboardWatcher, ClipboardWatcherContext,
    ContentFormat, RustImageData, WatcherShutdown,
};
use tokio::task::spawn_blocking;
use tracing::{debug, info, warn};

use super::{ClipboardAdapter, ClipboardError, FileList};
use crate::history::hash;

const FILE_URI_PREFIX: &str = "file://";

fn platform_error(e: impl std::fmt::Display) -> ClipboardError {
    ClipboardError::Platform(e.to_string())
}

/// Bumps the shared counter on every OS change notification
struct ChangeCounter {
    changes: Arc<AtomicI64>,
}

impl ClipboardHandler for ChangeCounter {
    fn on_clipboard_change(&mut self) {
        let count = self.changes.fetch_add(1, Ordering::SeqCst) + 1;
        debug!("Clipboard change notification {}", count);
    }
}

#[derive(Default)]
struct Inner {
    context: Option<ClipboardContext>,
    last_fingerprint: Option<String>,
    polled_count: i64,
}

impl Inner {
    /// Connect lazily so a missing display only fails the current call
    fn context(&mut self) -> Result<&mut ClipboardContext, ClipboardError> {
        if self.context.is_none() {
            let context =
                ClipboardContext::new().map_err(|e| ClipboardError::Unavailable(e.to_string()))?;
            self.context = Some(context);
        }
        self.context
            .as_mut()
            .ok_or_else(|| ClipboardError::Unavailable("clipboard not connected".to_string()))
    }

    fn text(&mut self) -> Result<Option<String>, ClipboardError> {
        let context = self.context()?;
        if !context.has(ContentFormat::Text) {
            return Ok(None);
        }
        let text = context.get_text().map_err(platform_error)?;
        Ok((!text.is_empty()).then_some(text))
    }

    fn files(&mut self) -> Result<Option<Vec<String>>, ClipboardError> {
        let context = self.context()?;
        if !context.has(ContentFormat::Files) {
            return Ok(None);
        }
        let paths: Vec<String> = context
            .get_files()
            .map_err(platform_error)?
            .iter()
            .map(|entry| uri_to_path(entry))
            .filter(|path| !path.is_empty())
            .collect();
        Ok((!paths.is_empty()).then_some(paths))
    }

    /// Counter derived from text, file names and image presence
    ///
    /// Pixel data is never read here, so replacing one image with another
    /// goes unnoticed until some other format changes too.
    fn poll(&mut self) -> Result<i64, ClipboardError> {
        let text = self.text()?;
        let files = self.files()?;
        let has_image = self.context()?.has(ContentFormat::Image);

        let mut material = Vec::new();
        if let Some(text) = &text {
            material.extend_from_slice(b"text:");
            material.extend_from_slice(text.as_bytes());
        }
        if let Some(files) = &files {
            material.extend_from_slice(b"files:");
            material.extend_from_slice(files.join("\n").as_bytes());
        }
        if has_image {
            material.extend_from_slice(b"image");
        }
        let fingerprint = hash::digest(&material);

        if self.last_fingerprint.as_deref() != Some(fingerprint.as_str()) {
            self.last_fingerprint = Some(fingerprint);
            self.polled_count += 1;
        }
        Ok(self.polled_count)
    }
}

/// clipboard-rs backed adapter
pub struct SystemClipboard {
    inner: Arc<Mutex<Inner>>,
    changes: Arc<AtomicI64>,
    watching: bool,
    watcher: Mutex<Option<WatcherShutdown>>,
}

impl SystemClipboard {
    /// Connect and start listening for change notifications
    pub fn new() -> Self {
        let mut clipboard = Self::polling();
        match start_watcher(Arc::clone(&clipboard.changes)) {
            Ok(shutdown) => {
                clipboard.watching = true;
                clipboard.watcher = Mutex::new(Some(shutdown));
            }
            Err(e) => warn!(
                "Clipboard change notifications unavailable, polling contents instead: {}",
                e
            ),
        }
        clipboard
    }

    /// Adapter that derives its counter from the clipboard contents
    pub fn polling() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner::default())),
            changes: Arc::new(AtomicI64::new(0)),
            watching: false,
            watcher: Mutex::new(None),
        }
    }

    async fn with_inner<T, F>(&self, f: F) -> Result<T, ClipboardError>
    where
        T: Send + 'static,
        F: FnOnce(&mut Inner) -> Result<T, ClipboardError> + Send + 'static,
    {
        let inner = Arc::clone(&self.inner);
        spawn_blocking(move || {
            let mut guard = inner
                .lock()
                .map_err(|_| ClipboardError::Platform("clipboard lock poisoned".to_string()))?;
            f(&mut guard)
        })
        .await
        .map_err(|e| ClipboardError::Platform(format!("clipboard task failed: {}", e)))?
    }
}

impl Default for SystemClipboard {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for SystemClipboard {
    fn drop(&mut self) {
        let watcher = self.watcher.get_mut().unwrap_or_else(|e| e.into_inner());
        if let Some(watcher) = watcher.take() {
            watcher.stop();
        }
    }
}

fn start_watcher(changes: Arc<AtomicI64>) -> Result<WatcherShutdown, ClipboardError> {
    let mut watcher = ClipboardWatcherContext::new()
        .map_err(|e| ClipboardError::Unavailable(format!("Failed to create watcher: {}", e)))?;
    let shutdown = watcher
        .add_handler(ChangeCounter { changes })
        .get_shutdown_channel();

    thread::Builder::new()
        .name("clipboard-watcher".to_string())
        .spawn(move || {
            info!("Clipboard watcher started");
            watcher.start_watch();
            info!("Clipboard watcher stopped");
        })?;

    Ok(shutdown)
}

/// Local path for a `text/uri-list` entry; plain paths pass through
fn uri_to_path(entry: &str) -> String {
    let entry = entry.trim();
    match entry.strip_prefix(FILE_URI_PREFIX) {
        // Drop an optional host part such as `localhost`
        Some(rest) => {
            let path = rest.find('/').map_or(rest, |start| &rest[start..]);
            percent_decode(path)
        }
        None => entry.to_string(),
    }
}

/// `file://` URI for a local path, as X11 file managers expect
fn path_to_uri(path: &str) -> String {
    if cfg!(windows) || path.starts_with(FILE_URI_PREFIX) {
        return path.to_string();
    }

    let mut uri = String::from(FILE_URI_PREFIX);
    for byte in path.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'/' | b'-' | b'_' | b'.' | b'~' => {
                uri.push(byte as char)
            }
            _ => uri.push_str(&format!("%{:02X}", byte)),
        }
    }
    uri
}

fn percent_decode(value: &str) -> String {
    let bytes = value.as_bytes();
    let mut decoded = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' && i + 2 < bytes.len() {
            let hex = std::str::from_utf8(&bytes[i + 1..i + 3]).ok();
            if let Some(byte) = hex.and_then(|h| u8::from_str_radix(h, 16).ok()) {
                decoded.push(byte);
                i += 3;
                continue;
            }
        }
        decoded.push(bytes[i]);
        i += 1;
    }
    String::from_utf8_lossy(&decoded).into_owned()
}

#[async_trait]
impl ClipboardAdapter for SystemClipboard {
    async fn change_count(&self) -> Result<i64, ClipboardError> {
        if self.watching {
            return Ok(self.changes.load(Ordering::SeqCst));
        }
        self.with_inner(|inner| inner.poll()).await
    }

    async fn read_text(&self) -> Result<Option<String>, ClipboardError> {
        self.with_inner(|inner| inner.text()).await
    }

    async fn read_image(&self) -> Result<Option<Vec<u8>>, ClipboardError> {
        self.with_inner(|inner| {
            let context = inner.context()?;
            if !context.has(ContentFormat::Image) {
                return Ok(None);
            }

            let image = context.get_image().map_err(platform_error)?;
            let png = image.to_png().map_err(platform_error)?;
            let bytes = png.get_bytes().to_vec();
            Ok((!bytes.is_empty()).then_some(bytes))
        })
        .await
    }

    async fn read_file_list(&self) -> Result<Option<FileList>, ClipboardError> {
        self.with_inner(|inner| match inner.files()? {
            Some(paths) => FileList::from_paths(&paths).map(Some),
            None => Ok(None),
        })
        .await
    }

    async fn write_text(&self, text: &str) -> Result<(), ClipboardError> {
        let text = text.to_string();
        self.with_inner(move |inner| inner.context()?.set_text(text).map_err(platform_error))
            .await
    }

    async fn write_image(&self, png: &[u8]) -> Result<(), ClipboardError> {
        // Reject undecodable payloads before touching the clipboard
        image::guess_format(png)?;
        let image = RustImageData::from_bytes(png).map_err(platform_error)?;

        self.with_inner(move |inner| inner.context()?.set_image(image).map_err(platform_error))
            .await
    }

    async fn write_file_urls(&self, paths: &[String]) -> Result<(), ClipboardError> {
        if paths.is_empty() {
            return Err(ClipboardError::Platform("no files to place".to_string()));
        }
        let uris: Vec<String> = paths.iter().map(|path| path_to_uri(path)).collect();
        debug!("Placing {} file URLs on the clipboard", uris.len());

        self.with_inner(move |inner| inner.context()?.set_files(uris).map_err(platform_error))
            .await
    }

    async fn frontmost_application(&self) -> Option<String> {
        None
    }

    fn name(&self) -> &str {
        "clipboard-rs"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_uri_list_entries_become_paths() {
        assert_eq!(uri_to_path("file:///tmp/notes.txt"), "/tmp/notes.txt");
        assert_eq!(uri_to_path("file://localhost/tmp/a%20b.txt"), "/tmp/a b.txt");
        assert_eq!(uri_to_path("file:///tmp/%E2%9C%93.md\r"), "/tmp/\u{2713}.md");
        assert_eq!(uri_to_path("/already/a/path"), "/already/a/path");
        assert_eq!(uri_to_path("file:///tmp/100%"), "/tmp/100%");
    }

    #[cfg(not(windows))]
    #[test]
    fn test_paths_become_file_uris() {
        assert_eq!(path_to_uri("/tmp/a b.txt"), "file:///tmp/a%20b.txt");
        assert_eq!(path_to_uri("file:///tmp/x"), "file:///tmp/x");

        let path = "/home/user/r\u{e9}sum\u{e9} #1.pdf";
        assert_eq!(uri_to_path(&path_to_uri(path)), path);
    }

    #[tokio::test]
    async fn test_write_image_rejects_garbage() {
        let clipboard = SystemClipboard::polling();
        assert!(matches!(
            clipboard.write_image(b"not an image").await,
            Err(ClipboardError::Image(_))
        ));
    }

    #[tokio::test]
    async fn test_empty_file_list_is_rejected() {
        let clipboard = SystemClipboard::polling();
        assert!(clipboard.write_file_urls(&[]).await.is_err());
        assert!(clipboard.frontmost_application().await.is_none());
    }
}
