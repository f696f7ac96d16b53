//! Service wiring and shutdown ordering

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::clipboard::ClipboardAdapter;
use crate::config::Config;
use crate::history::{retention, ClipboardHistory};
use crate::monitor::ClipboardMonitor;
use crate::notify::{FanOut, RecordEvent};
use crate::ocr::{OcrAdapter, OcrPipeline};
use crate::scripts::ScriptExecuteRequest;
use crate::workers::WorkerPool;
use crate::Result;

/// Concurrent script matching jobs, independent of the OCR workers
const SCRIPT_WORKERS: usize = 4;

/// A running ClipTrail instance: store, capture loop and background work
pub struct App {
    config: Config,
    adapter: Arc<dyn ClipboardAdapter>,
    recognizer: Arc<dyn OcrAdapter>,
    history: Arc<ClipboardHistory>,
    events: Arc<FanOut<RecordEvent>>,
    script_requests: Arc<FanOut<ScriptExecuteRequest>>,
    ocr_pool: WorkerPool,
    script_pool: WorkerPool,
}

impl App {
    /// Open the history database and prepare the pipeline
    pub async fn new(
        config: Config,
        adapter: Arc<dyn ClipboardAdapter>,
        recognizer: Arc<dyn OcrAdapter>,
    ) -> Result<Self> {
        let history = Arc::new(ClipboardHistory::new(&config.storage.database).await?);
        let ocr_pool = WorkerPool::new(config.ocr.workers);

        Ok(Self {
            config,
            adapter,
            recognizer,
            history,
            events: Arc::new(FanOut::new()),
            script_requests: Arc::new(FanOut::new()),
            ocr_pool,
            script_pool: WorkerPool::new(SCRIPT_WORKERS),
        })
    }

    pub fn history(&self) -> Arc<ClipboardHistory> {
        Arc::clone(&self.history)
    }

    /// Listen for saved and touched records
    pub async fn subscribe(&self) -> mpsc::Receiver<RecordEvent> {
        self.events.subscribe(self.config.notify.queue_capacity).await
    }

    /// Listen for script execution requests
    pub async fn subscribe_scripts(&self) -> mpsc::Receiver<ScriptExecuteRequest> {
        self.script_requests
            .subscribe(self.config.notify.queue_capacity)
            .await
    }

    /// Build the capture loop bound to this instance
    pub fn monitor(&self) -> ClipboardMonitor {
        let monitor = ClipboardMonitor::new(
            Arc::clone(&self.adapter),
            Arc::clone(&self.history),
            Arc::clone(&self.events),
            Arc::clone(&self.script_requests),
            self.script_pool.clone(),
            self.config.monitor.clone(),
        );

        if self.config.ocr.enabled {
            monitor.with_ocr(OcrPipeline::new(
                Arc::clone(&self.history),
                Arc::clone(&self.recognizer),
                self.ocr_pool.clone(),
            ))
        } else {
            monitor
        }
    }

    /// Capture until `shutdown` fires, then drain background work and close the store
    pub async fn run(self, shutdown: CancellationToken) -> Result<()> {
        let sweeper = tokio::spawn(retention::run_sweeper(
            Arc::clone(&self.history),
            self.config.storage.clone(),
            shutdown.clone(),
        ));

        let mut monitor = self.monitor();
        monitor.run(shutdown.clone()).await;
        drop(monitor);

        if let Err(e) = sweeper.await {
            warn!("Retention sweeper ended abnormally: {}", e);
        }

        let grace = self.config.monitor.shutdown_grace();
        tokio::join!(self.script_pool.shutdown(grace), self.ocr_pool.shutdown(grace));

        let Self { history, .. } = self;
        match Arc::try_unwrap(history) {
            Ok(history) => {
                history.close().await?;
                info!("History database closed");
            }
            Err(_) => warn!("History still in use, leaving the connection to drop"),
        }

        Ok(())
    }
}

/// Resolve on Ctrl-C, or SIGTERM on unix
pub async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => info!("Received Ctrl-C, shutting down"),
                    _ = sigterm.recv() => info!("Received SIGTERM, shutting down"),
                }
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                if tokio::signal::ctrl_c().await.is_ok() {
                    info!("Received Ctrl-C, shutting down");
                }
            }
        }
    }

    #[cfg(not(unix))]
    {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Received Ctrl-C, shutting down");
        }
    }
}
