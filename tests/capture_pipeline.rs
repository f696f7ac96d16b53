//! Integration tests for the capture loop against a scripted clipboard

use std::io::Cursor;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use image::{DynamicImage, ImageFormat, Rgba, RgbaImage};
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

use cliptrail::clipboard::{ClipboardAdapter, ClipboardError, FileList};
use cliptrail::config::{Config, MonitorConfig};
use cliptrail::history::{ClipboardHistory, ClipboardRecord, ContentType, SaveOutcome};
use cliptrail::monitor::{CaptureError, Category, ClipboardMonitor, TickOutcome};
use cliptrail::notify::{FanOut, RecordEvent};
use cliptrail::ocr::{OcrAdapter, OcrError, OcrPipeline};
use cliptrail::scripts::{ScriptExecuteRequest, ScriptFilter, ScriptTrigger};
use cliptrail::workers::WorkerPool;
use cliptrail::App;

#[derive(Default)]
struct FakeState {
    count: i64,
    text: Option<String>,
    image: Option<Vec<u8>>,
    files: Option<Vec<String>>,
}

/// Clipboard whose contents the test sets directly
#[derive(Default)]
struct FakeAdapter {
    state: Mutex<FakeState>,
}

impl FakeAdapter {
    fn set(&self, count: i64, text: Option<&str>, image: Option<Vec<u8>>, files: Option<Vec<String>>) {
        let mut state = self.state.lock().unwrap();
        state.count = count;
        state.text = text.map(str::to_string);
        state.image = image;
        state.files = files;
    }

    fn copy_text(&self, text: &str) {
        let count = self.state.lock().unwrap().count + 1;
        self.set(count, Some(text), None, None);
    }
}

#[async_trait]
impl ClipboardAdapter for FakeAdapter {
    async fn change_count(&self) -> Result<i64, ClipboardError> {
        Ok(self.state.lock().unwrap().count)
    }

    async fn read_text(&self) -> Result<Option<String>, ClipboardError> {
        Ok(self.state.lock().unwrap().text.clone())
    }

    async fn read_image(&self) -> Result<Option<Vec<u8>>, ClipboardError> {
        Ok(self.state.lock().unwrap().image.clone())
    }

    async fn read_file_list(&self) -> Result<Option<FileList>, ClipboardError> {
        match &self.state.lock().unwrap().files {
            Some(paths) => FileList::from_paths(paths).map(Some),
            None => Ok(None),
        }
    }

    async fn write_text(&self, text: &str) -> Result<(), ClipboardError> {
        self.copy_text(text);
        Ok(())
    }

    async fn write_image(&self, png: &[u8]) -> Result<(), ClipboardError> {
        let count = self.state.lock().unwrap().count + 1;
        self.set(count, None, Some(png.to_vec()), None);
        Ok(())
    }

    async fn write_file_urls(&self, paths: &[String]) -> Result<(), ClipboardError> {
        let count = self.state.lock().unwrap().count + 1;
        self.set(count, None, None, Some(paths.to_vec()));
        Ok(())
    }

    async fn frontmost_application(&self) -> Option<String> {
        Some("Terminal".to_string())
    }

    fn name(&self) -> &str {
        "fake"
    }
}

/// Recognizer that always reads the same text
struct FixedRecognizer(&'static str);

#[async_trait]
impl OcrAdapter for FixedRecognizer {
    async fn recognize(&self, _image: &[u8]) -> Result<String, OcrError> {
        Ok(self.0.to_string())
    }

    fn name(&self) -> &str {
        "fixed"
    }
}

/// Recognizer that takes `delay` per image and counts its calls
struct SlowRecognizer {
    delay: Duration,
    calls: AtomicUsize,
}

impl SlowRecognizer {
    fn new(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            delay,
            calls: AtomicUsize::new(0),
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl OcrAdapter for SlowRecognizer {
    async fn recognize(&self, _image: &[u8]) -> Result<String, OcrError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        Ok("slow text".to_string())
    }

    fn name(&self) -> &str {
        "slow"
    }
}

struct Harness {
    adapter: Arc<FakeAdapter>,
    history: Arc<ClipboardHistory>,
    events: Arc<FanOut<RecordEvent>>,
    script_requests: Arc<FanOut<ScriptExecuteRequest>>,
    ocr_pool: WorkerPool,
    script_pool: WorkerPool,
    monitor: ClipboardMonitor,
    _temp_dir: TempDir,
}

async fn harness(config: MonitorConfig) -> Harness {
    let temp_dir = TempDir::new().unwrap();
    let history = Arc::new(
        ClipboardHistory::new(&temp_dir.path().join("capture.db"))
            .await
            .unwrap(),
    );
    let adapter = Arc::new(FakeAdapter::default());
    let events = Arc::new(FanOut::new());
    let script_requests = Arc::new(FanOut::new());
    let ocr_pool = WorkerPool::new(1);
    let script_pool = WorkerPool::new(2);

    let monitor = ClipboardMonitor::new(
        adapter.clone(),
        Arc::clone(&history),
        Arc::clone(&events),
        Arc::clone(&script_requests),
        script_pool.clone(),
        config,
    );

    Harness {
        adapter,
        history,
        events,
        script_requests,
        ocr_pool,
        script_pool,
        monitor,
        _temp_dir: temp_dir,
    }
}

fn png_bytes(format: ImageFormat) -> Vec<u8> {
    let image = RgbaImage::from_pixel(2, 2, Rgba([0, 128, 255, 255]));
    let mut bytes = Vec::new();
    DynamicImage::ImageRgba8(image)
        .write_to(&mut Cursor::new(&mut bytes), format)
        .unwrap();
    bytes
}

#[tokio::test]
async fn test_end_to_end_text_capture() {
    let mut h = harness(MonitorConfig::default()).await;

    h.adapter.set(1, Some("old"), None, None);
    h.monitor.tick().await.unwrap();

    let mut listener = h.events.subscribe(1).await;

    h.adapter.set(2, Some("new clip"), None, None);
    let TickOutcome::Captured {
        id,
        content_type,
        outcome,
    } = h.monitor.tick().await.unwrap()
    else {
        panic!("expected a capture");
    };
    assert_eq!(content_type, ContentType::Text);
    assert_eq!(outcome, SaveOutcome::Inserted);

    let records = h.history.get_records(10).await.unwrap();
    assert_eq!(records.len(), 2);
    assert_eq!(records[0].id, id);
    assert_eq!(records[0].content, "new clip");
    assert_eq!(records[0].source, "Terminal");
    assert_eq!(records[0].word_count, 2);

    let event = listener.try_recv().unwrap();
    assert_eq!(event.id, id);
    assert!(listener.try_recv().is_err());
}

#[tokio::test]
async fn test_unchanged_and_repeated_ticks() {
    let mut h = harness(MonitorConfig::default()).await;

    h.adapter.set(7, Some("same"), None, None);
    assert!(matches!(h.monitor.tick().await.unwrap(), TickOutcome::Captured { .. }));
    assert_eq!(h.monitor.tick().await.unwrap(), TickOutcome::Unchanged);

    // Counter moved but the payload did not
    h.adapter.set(8, Some("same"), None, None);
    assert_eq!(
        h.monitor.tick().await.unwrap(),
        TickOutcome::Repeated(Category::Text)
    );

    h.adapter.set(9, None, None, None);
    assert_eq!(h.monitor.tick().await.unwrap(), TickOutcome::Empty);

    assert_eq!(h.history.get_records(10).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_recopy_touches_existing_record() {
    let mut h = harness(MonitorConfig::default()).await;

    h.adapter.copy_text("alpha");
    let TickOutcome::Captured { id: first, .. } = h.monitor.tick().await.unwrap() else {
        panic!("expected a capture");
    };
    h.history.toggle_favorite(&first).await.unwrap();

    h.adapter.copy_text("beta");
    h.monitor.tick().await.unwrap();

    h.adapter.copy_text("alpha");
    let TickOutcome::Captured { id, outcome, .. } = h.monitor.tick().await.unwrap() else {
        panic!("expected a capture");
    };
    assert_eq!(outcome, SaveOutcome::Touched);
    assert_eq!(id, first);

    assert_eq!(h.history.get_records(10).await.unwrap().len(), 2);
    let record = h.history.get_record(&id).await.unwrap();
    assert_eq!(record.content, "alpha");
    assert!(record.is_favorite);
}

#[tokio::test]
async fn test_image_wins_over_text_and_gets_ocr() {
    let mut h = harness(MonitorConfig::default()).await;
    let ocr = OcrPipeline::new(
        Arc::clone(&h.history),
        Arc::new(FixedRecognizer("invoice 42")),
        h.ocr_pool.clone(),
    );
    h.monitor = h.monitor.with_ocr(ocr);

    h.adapter
        .set(1, Some("alt text"), Some(png_bytes(ImageFormat::Tiff)), None);
    let TickOutcome::Captured { id, content_type, .. } = h.monitor.tick().await.unwrap() else {
        panic!("expected a capture");
    };
    assert_eq!(content_type, ContentType::Image);

    assert!(h.ocr_pool.shutdown(Duration::from_secs(5)).await);

    let record = h.history.get_record(&id).await.unwrap();
    assert_eq!(record.content, "Image 2x2 (tiff)");
    assert!(record.image_data.unwrap().starts_with(b"\x89PNG"));
    assert_eq!(record.ocr_text, "invoice 42");
}

#[tokio::test]
async fn test_undecodable_image_aborts_tick() {
    let mut h = harness(MonitorConfig::default()).await;

    h.adapter
        .set(1, Some("fallback"), Some(b"not an image".to_vec()), None);
    assert!(matches!(
        h.monitor.tick().await,
        Err(CaptureError::Decode(_))
    ));
    assert!(h.history.get_records(10).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_file_capture() {
    let mut h = harness(MonitorConfig::default()).await;
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("notes.txt");
    std::fs::write(&path, "hello").unwrap();
    let path = path.to_string_lossy().into_owned();

    h.adapter
        .set(1, Some(path.as_str()), None, Some(vec![path.clone()]));
    let TickOutcome::Captured { id, content_type, .. } = h.monitor.tick().await.unwrap() else {
        panic!("expected a capture");
    };
    assert_eq!(content_type, ContentType::File);

    let record = h.history.get_record(&id).await.unwrap();
    assert_eq!(record.content, "File: notes.txt (5 B)");
    assert_eq!(record.paths().unwrap(), vec![path.clone()]);

    let infos = h.history.file_info(&id).await.unwrap();
    assert_eq!(infos.len(), 1);
    assert!(infos[0].exists);
    assert_eq!(infos[0].extension, ".txt");
}

#[tokio::test]
async fn test_files_ignored_when_disabled() {
    let config = MonitorConfig {
        capture_files: false,
        ..MonitorConfig::default()
    };
    let mut h = harness(config).await;

    h.adapter
        .set(1, Some("/tmp/a.txt"), None, Some(vec!["/tmp/a.txt".to_string()]));
    let TickOutcome::Captured { content_type, .. } = h.monitor.tick().await.unwrap() else {
        panic!("expected a capture");
    };
    assert_eq!(content_type, ContentType::Text);
}

#[tokio::test]
async fn test_oversized_text_is_dropped() {
    let config = MonitorConfig {
        max_size: 4,
        ..MonitorConfig::default()
    };
    let mut h = harness(config).await;

    h.adapter.copy_text("hello world");
    assert!(matches!(
        h.monitor.tick().await,
        Err(CaptureError::TooLarge {
            kind: Category::Text,
            ..
        })
    ));
    assert!(h.history.get_records(10).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_matching_scripts_are_requested() {
    let mut h = harness(MonitorConfig::default()).await;

    let mut script = ScriptFilter::new("shorten", ScriptTrigger::AfterSave, "shorten-url")
        .with_content_types(vec![ContentType::Url])
        .with_keywords(["/^https?:/"]);
    h.history.save_script(&mut script).await.unwrap();

    let mut requests = h.script_requests.subscribe(4).await;

    h.adapter.copy_text("https://example.com/page");
    let TickOutcome::Captured { id, .. } = h.monitor.tick().await.unwrap() else {
        panic!("expected a capture");
    };

    let request = tokio::time::timeout(Duration::from_secs(5), requests.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(request.item_id, id);
    assert_eq!(request.trigger, ScriptTrigger::AfterSave);
    assert_eq!(request.script_ids, vec![script.id.clone()]);
    assert_eq!(request.item.content, "https://example.com/page");

    h.adapter.copy_text("plain words");
    h.monitor.tick().await.unwrap();
    assert!(h.script_pool.shutdown(Duration::from_secs(5)).await);
    assert!(requests.try_recv().is_err());
}

fn image_rows(records: &[ClipboardRecord]) -> usize {
    records
        .iter()
        .filter(|r| r.content_type == ContentType::Image)
        .count()
}

#[tokio::test]
async fn test_recopied_image_reuses_finished_ocr() {
    let mut h = harness(MonitorConfig::default()).await;
    let recognizer = SlowRecognizer::new(Duration::from_millis(10));
    let ocr = OcrPipeline::new(
        Arc::clone(&h.history),
        recognizer.clone(),
        h.ocr_pool.clone(),
    );
    h.monitor = h.monitor.with_ocr(ocr);

    let png = png_bytes(ImageFormat::Png);
    h.adapter.set(1, None, Some(png.clone()), None);
    let TickOutcome::Captured { id, .. } = h.monitor.tick().await.unwrap() else {
        panic!("expected a capture");
    };

    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while h.history.get_record(&id).await.unwrap().ocr_text.is_empty() {
        assert!(tokio::time::Instant::now() < deadline, "OCR never finished");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    h.adapter.set(2, Some("in between"), None, None);
    h.monitor.tick().await.unwrap();

    h.adapter.set(3, None, Some(png), None);
    let TickOutcome::Captured { id: touched, outcome, .. } = h.monitor.tick().await.unwrap() else {
        panic!("expected a capture");
    };
    assert_eq!(outcome, SaveOutcome::Touched);
    assert_eq!(touched, id);

    assert!(h.ocr_pool.shutdown(Duration::from_secs(5)).await);
    assert_eq!(recognizer.calls(), 1);
    assert_eq!(h.history.get_record(&id).await.unwrap().ocr_text, "slow text");
}

#[tokio::test]
async fn test_recopied_image_during_ocr_is_recognized_once() {
    let mut h = harness(MonitorConfig::default()).await;
    let recognizer = SlowRecognizer::new(Duration::from_millis(200));
    let ocr = OcrPipeline::new(
        Arc::clone(&h.history),
        recognizer.clone(),
        h.ocr_pool.clone(),
    );
    h.monitor = h.monitor.with_ocr(ocr);

    let png = png_bytes(ImageFormat::Png);
    h.adapter.set(1, None, Some(png.clone()), None);
    let TickOutcome::Captured { id, .. } = h.monitor.tick().await.unwrap() else {
        panic!("expected a capture");
    };

    h.adapter.set(2, Some("in between"), None, None);
    h.monitor.tick().await.unwrap();

    // Still recognizing the first copy
    h.adapter.set(3, None, Some(png), None);
    let TickOutcome::Captured { id: touched, outcome, .. } = h.monitor.tick().await.unwrap() else {
        panic!("expected a capture");
    };
    assert_eq!(outcome, SaveOutcome::Touched);
    assert_eq!(touched, id);

    assert!(h.ocr_pool.shutdown(Duration::from_secs(5)).await);
    assert_eq!(recognizer.calls(), 1);

    let records = h.history.get_records(10).await.unwrap();
    assert_eq!(image_rows(&records), 1);
    assert_eq!(h.history.get_record(&id).await.unwrap().ocr_text, "slow text");
}

#[tokio::test]
async fn test_scripts_are_not_queued_behind_ocr() {
    let mut h = harness(MonitorConfig::default()).await;
    let recognizer = SlowRecognizer::new(Duration::from_secs(30));
    let ocr = OcrPipeline::new(
        Arc::clone(&h.history),
        recognizer.clone(),
        h.ocr_pool.clone(),
    );
    h.monitor = h.monitor.with_ocr(ocr);

    let mut script = ScriptFilter::new("open", ScriptTrigger::AfterSave, "open-url")
        .with_content_types(vec![ContentType::Url]);
    h.history.save_script(&mut script).await.unwrap();
    let mut requests = h.script_requests.subscribe(4).await;

    // Occupies every OCR worker
    h.adapter.set(1, None, Some(png_bytes(ImageFormat::Png)), None);
    h.monitor.tick().await.unwrap();

    h.adapter.set(2, Some("https://example.com"), None, None);
    let TickOutcome::Captured { id, .. } = h.monitor.tick().await.unwrap() else {
        panic!("expected a capture");
    };

    let request = tokio::time::timeout(Duration::from_secs(2), requests.recv())
        .await
        .expect("script request waited for OCR")
        .unwrap();
    assert_eq!(request.item_id, id);
    assert_eq!(recognizer.calls(), 1);

    assert!(h.script_pool.shutdown(Duration::from_secs(5)).await);
    assert!(!h.ocr_pool.shutdown(Duration::from_millis(10)).await);
}

#[tokio::test]
async fn test_copy_back_to_clipboard() {
    let mut h = harness(MonitorConfig::default()).await;

    h.adapter.copy_text("restore me");
    let TickOutcome::Captured { id, .. } = h.monitor.tick().await.unwrap() else {
        panic!("expected a capture");
    };
    h.adapter.copy_text("something else");
    h.monitor.tick().await.unwrap();

    let content_type =
        cliptrail::monitor::copy_to_clipboard(&h.history, h.adapter.as_ref(), &id)
            .await
            .unwrap();
    assert_eq!(content_type, ContentType::Text);
    assert_eq!(
        h.adapter.read_text().await.unwrap().as_deref(),
        Some("restore me")
    );

    // The restored clip is seen again and touches its original row
    let TickOutcome::Captured { id: touched, outcome, .. } = h.monitor.tick().await.unwrap() else {
        panic!("expected a capture");
    };
    assert_eq!(touched, id);
    assert_eq!(outcome, SaveOutcome::Touched);
}

#[tokio::test]
async fn test_app_runs_until_cancelled() {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("app.db");

    let mut config = Config::default();
    config.storage.database = db_path.clone();
    config.monitor.poll_interval_ms = 10;
    config.ocr.enabled = false;

    let adapter = Arc::new(FakeAdapter::default());
    adapter.copy_text("from the app");

    let app = App::new(config, adapter.clone(), Arc::new(FixedRecognizer("")))
        .await
        .unwrap();
    let mut listener = app.subscribe().await;

    let shutdown = CancellationToken::new();
    let handle = tokio::spawn(app.run(shutdown.clone()));

    let event = tokio::time::timeout(Duration::from_secs(5), listener.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(event.content_type, ContentType::Text);

    shutdown.cancel();
    handle.await.unwrap().unwrap();

    let history = ClipboardHistory::new(&db_path).await.unwrap();
    let records = history.get_records(10).await.unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].id, event.id);
    assert_eq!(records[0].content, "from the app");
}
