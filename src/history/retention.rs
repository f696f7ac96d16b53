//! Periodic time- and count-based history cleanup

use std::sync::Arc;

use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::{ClipboardHistory, StoreResult};
use crate::config::StorageConfig;

/// Apply the configured retention once, returning how many rows were removed
pub async fn sweep(history: &ClipboardHistory, config: &StorageConfig) -> StoreResult<usize> {
    let mut removed = 0;

    if config.auto_clean {
        removed += history.clear_older_than(config.retention_days).await?;
    }

    if config.max_items > 0 {
        removed += history.trim_to(config.max_items).await?;
    }

    Ok(removed)
}

/// Sweep immediately, then every `sweep_interval` until cancelled
pub async fn run_sweeper(
    history: Arc<ClipboardHistory>,
    config: StorageConfig,
    shutdown: CancellationToken,
) {
    if !config.auto_clean && config.max_items == 0 {
        debug!("Retention disabled");
        return;
    }

    let mut ticker = interval(config.sweep_interval());
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = ticker.tick() => {}
        }

        match sweep(&history, &config).await {
            Ok(0) => debug!("Retention sweep removed nothing"),
            Ok(removed) => info!("Retention sweep removed {} records", removed),
            Err(e) => warn!("Retention sweep failed: {}", e),
        }
    }
}
