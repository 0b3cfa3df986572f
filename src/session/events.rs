use std::sync::Arc;
use tokio::sync::{broadcast, oneshot, watch};

use super::state::CaptureSession;
use crate::platform::Blob;

/// Notifications emitted by a capture controller
#[derive(Debug, Clone)]
pub enum CaptureEvent {
    /// The session changed; carries the new snapshot
    Change(Arc<CaptureSession>),
    /// A recorded segment (segmented mode only)
    Chunk(Blob),
    /// The recording was fully finalized (segmented mode only)
    End,
}

/// Fan-out of session notifications.
///
/// Holds the observer list (broadcast), the latest snapshot (watch), and the
/// single-shot waiters registered through `CaptureController::change`.
pub(crate) struct Notifier {
    snapshot_tx: watch::Sender<Arc<CaptureSession>>,
    events_tx: broadcast::Sender<CaptureEvent>,
    waiters: Vec<oneshot::Sender<Arc<CaptureSession>>>,
}

impl Notifier {
    pub(crate) fn new(
        snapshot_tx: watch::Sender<Arc<CaptureSession>>,
        events_tx: broadcast::Sender<CaptureEvent>,
    ) -> Self {
        Self {
            snapshot_tx,
            events_tx,
            waiters: Vec::new(),
        }
    }

    pub(crate) fn change(&mut self, session: &CaptureSession) {
        let snapshot = Arc::new(session.clone());
        self.snapshot_tx.send_replace(Arc::clone(&snapshot));
        // no subscribers is fine
        let _ = self.events_tx.send(CaptureEvent::Change(Arc::clone(&snapshot)));
        for waiter in self.waiters.drain(..) {
            let _ = waiter.send(Arc::clone(&snapshot));
        }
    }

    pub(crate) fn chunk(&self, blob: Blob) {
        let _ = self.events_tx.send(CaptureEvent::Chunk(blob));
    }

    pub(crate) fn end(&self) {
        let _ = self.events_tx.send(CaptureEvent::End);
    }

    pub(crate) fn wait_for_change(&mut self, waiter: oneshot::Sender<Arc<CaptureSession>>) {
        self.waiters.push(waiter);
    }
}
