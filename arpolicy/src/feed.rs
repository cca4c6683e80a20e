//! Recognition feed boundary.
//!
//! The recognizer publishes snapshots of what it currently sees. Only the
//! latest snapshot matters, so the feed is a [`tokio::sync::watch`] channel:
//! slow readers skip intermediate snapshots instead of queueing them.

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::watch;

/// One recognized object.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Detection {
    pub identifier: String,
    /// Recognizer confidence, 0.0..=1.0.
    pub confidence: f32,
}

impl Detection {
    pub fn new(identifier: impl Into<String>, confidence: f32) -> Self {
        Self {
            identifier: identifier.into(),
            confidence,
        }
    }
}

/// Detections in recognizer insertion order.
pub type DetectionSnapshot = Arc<[Detection]>;

/// Highest-confidence detection; the earliest one wins ties.
///
/// Entries with a NaN confidence are ignored.
pub fn top_detection(snapshot: &[Detection]) -> Option<&Detection> {
    snapshot
        .iter()
        .filter(|d| !d.confidence.is_nan())
        .fold(None, |best: Option<&Detection>, candidate| match best {
            Some(current) if current.confidence >= candidate.confidence => Some(current),
            _ => Some(candidate),
        })
}

/// Source of recognition snapshots.
///
/// Each call to [`subscribe`](Self::subscribe) starts a fresh reader that
/// sees the latest snapshot first.
pub trait RecognitionFeed: Send + Sync {
    fn subscribe(&self) -> watch::Receiver<DetectionSnapshot>;
}

/// Feed driven by explicit [`publish`](Self::publish) calls.
#[derive(Debug)]
pub struct WatchFeed {
    tx: watch::Sender<DetectionSnapshot>,
}

impl WatchFeed {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(DetectionSnapshot::from(Vec::new()));
        Self { tx }
    }

    /// Replace the current snapshot.
    pub fn publish(&self, detections: Vec<Detection>) {
        self.tx.send_replace(detections.into());
    }

    /// Publish an empty snapshot.
    pub fn clear(&self) {
        self.publish(Vec::new());
    }

    pub fn latest(&self) -> DetectionSnapshot {
        self.tx.borrow().clone()
    }
}

impl Default for WatchFeed {
    fn default() -> Self {
        Self::new()
    }
}

impl RecognitionFeed for WatchFeed {
    fn subscribe(&self) -> watch::Receiver<DetectionSnapshot> {
        self.tx.subscribe()
    }
}
