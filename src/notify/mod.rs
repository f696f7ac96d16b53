//! Bounded, lossy broadcast of history events to listeners

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::sync::RwLock;
use tracing::{debug, trace};

use crate::history::{ClipboardRecord, ContentType, SaveOutcome};

/// Emitted after every successful save
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordEvent {
    pub id: String,
    pub content_type: ContentType,
    pub outcome: SaveOutcome,
}

impl RecordEvent {
    pub fn new(record: &ClipboardRecord, outcome: SaveOutcome) -> Self {
        Self {
            id: record.id.clone(),
            content_type: record.content_type,
            outcome,
        }
    }
}

/// Fan-out with one bounded queue per listener
///
/// Publishing never waits: a full queue drops the event for that listener
/// only, and listeners whose receiver was dropped are unregistered.
pub struct FanOut<T> {
    listeners: RwLock<Vec<mpsc::Sender<T>>>,
}

impl<T: Clone> FanOut<T> {
    pub fn new() -> Self {
        Self {
            listeners: RwLock::new(Vec::new()),
        }
    }

    /// Register a listener with its own queue of `capacity` events
    pub async fn subscribe(&self, capacity: usize) -> mpsc::Receiver<T> {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        self.listeners.write().await.push(tx);
        rx
    }

    /// Offer `event` to every listener, returning how many accepted it
    pub async fn publish(&self, event: T) -> usize {
        let mut delivered = 0;
        let mut closed = false;

        {
            let listeners = self.listeners.read().await;
            for listener in listeners.iter() {
                match listener.try_send(event.clone()) {
                    Ok(()) => delivered += 1,
                    Err(TrySendError::Full(_)) => {
                        trace!("Listener queue full, dropping event");
                    }
                    Err(TrySendError::Closed(_)) => closed = true,
                }
            }
        }

        if closed {
            let mut listeners = self.listeners.write().await;
            let before = listeners.len();
            listeners.retain(|listener| !listener.is_closed());
            debug!("Unregistered {} closed listeners", before - listeners.len());
        }

        delivered
    }

    pub async fn listener_count(&self) -> usize {
        self.listeners.read().await.len()
    }
}

impl<T: Clone> Default for FanOut<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_every_listener_receives() {
        let fan_out = FanOut::new();
        let mut a = fan_out.subscribe(4).await;
        let mut b = fan_out.subscribe(4).await;

        assert_eq!(fan_out.publish(7u32).await, 2);
        assert_eq!(a.recv().await, Some(7));
        assert_eq!(b.recv().await, Some(7));
    }

    #[tokio::test]
    async fn test_full_queue_drops_without_blocking() {
        let fan_out = FanOut::new();
        let mut slow = fan_out.subscribe(1).await;
        let mut fast = fan_out.subscribe(8).await;

        assert_eq!(fan_out.publish(1u32).await, 2);
        assert_eq!(fan_out.publish(2u32).await, 1);

        assert_eq!(slow.recv().await, Some(1));
        assert!(slow.try_recv().is_err());
        assert_eq!(fast.recv().await, Some(1));
        assert_eq!(fast.recv().await, Some(2));

        // The slow listener stays registered and gets later events
        assert_eq!(fan_out.listener_count().await, 2);
        assert_eq!(fan_out.publish(3u32).await, 2);
        assert_eq!(slow.recv().await, Some(3));
    }

    #[tokio::test]
    async fn test_closed_listener_is_unregistered() {
        let fan_out = FanOut::new();
        let gone = fan_out.subscribe(4).await;
        let mut kept = fan_out.subscribe(4).await;
        drop(gone);

        assert_eq!(fan_out.publish("event").await, 1);
        assert_eq!(fan_out.listener_count().await, 1);
        assert_eq!(kept.recv().await, Some("event"));
    }

    #[tokio::test]
    async fn test_publish_without_listeners() {
        let fan_out: FanOut<u8> = FanOut::default();
        assert_eq!(fan_out.publish(1).await, 0);
    }

    #[test]
    fn test_record_event_from_record() {
        let record = ClipboardRecord::text("#fff", "A");
        let event = RecordEvent::new(&record, SaveOutcome::Touched);
        assert_eq!(event.id, record.id);
        assert_eq!(event.content_type, ContentType::Color);
        assert_eq!(event.outcome, SaveOutcome::Touched);
    }
}
