use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tracing::warn;

use super::driver::{Command, Request, SessionDriver};
use super::events::{CaptureEvent, Notifier};
use super::state::CaptureSession;
use crate::config::CaptureOptions;
use crate::error::{CaptureError, Result};
use crate::platform::{EnvironmentSignal, Platform};

/// Capacity of the event fan-out; slow subscribers see `Lagged`
const EVENT_CAPACITY: usize = 256;

/// Handle to a capture session.
///
/// Cloning is cheap; all clones drive the same session. When the last clone
/// is dropped the session releases its device and revokes its artifacts.
///
/// Operations never fail: problems are recorded in
/// [`CaptureSession::last_error`] and reported to the log. The exception is
/// [`choose`](Self::choose), which also returns the failure.
#[derive(Clone)]
pub struct CaptureController {
    requests: mpsc::UnboundedSender<Request>,
    snapshot: watch::Receiver<Arc<CaptureSession>>,
    events: broadcast::Sender<CaptureEvent>,
}

impl CaptureController {
    /// Create a controller and spawn its driver on the current tokio runtime
    pub fn new(options: CaptureOptions, platform: Platform) -> Self {
        let (requests_tx, requests_rx) = mpsc::unbounded_channel();
        let (snapshot_tx, snapshot_rx) = watch::channel(Arc::new(CaptureSession::default()));
        let (events_tx, _) = broadcast::channel(EVENT_CAPACITY);

        let notifier = Notifier::new(snapshot_tx, events_tx.clone());
        let driver = SessionDriver::new(options, platform, requests_rx, notifier);
        tokio::spawn(driver.run());

        Self {
            requests: requests_tx,
            snapshot: snapshot_rx,
            events: events_tx,
        }
    }

    /// Begin capturing by acquiring a device. Recording waits for `start()`.
    pub async fn activate(&self) {
        self.apply(Command::Activate).await
    }

    /// Stop any recording, release the device and revoke artifacts
    pub async fn deactivate(&self) {
        self.apply(Command::Deactivate).await
    }

    /// Release the current device and acquire one again
    pub async fn reacquire(&self) {
        self.apply(Command::Reacquire).await
    }

    pub async fn start(&self) {
        self.apply(Command::Start).await
    }

    pub async fn stop(&self) {
        self.apply(Command::Stop).await
    }

    pub async fn pause(&self) {
        self.apply(Command::Pause).await
    }

    pub async fn resume(&self) {
        self.apply(Command::Resume).await
    }

    /// Capture a still image of the live video
    pub async fn snap(&self) {
        self.apply(Command::Snap).await
    }

    /// Discard captured artifacts
    pub async fn clear(&self) {
        self.apply(Command::Clear).await
    }

    /// Switch to another device, resolving once it is live
    pub async fn choose(&self, device_id: impl Into<String>) -> Result<()> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.requests
            .send(Request::Choose(device_id.into(), reply_tx))
            .map_err(|_| CaptureError::Cancelled)?;
        reply_rx.await.unwrap_or(Err(CaptureError::Cancelled))
    }

    /// Wait for the next change notification
    pub async fn change(&self) -> Result<Arc<CaptureSession>> {
        let (waiter_tx, waiter_rx) = oneshot::channel();
        self.requests
            .send(Request::NextChange(waiter_tx))
            .map_err(|_| CaptureError::Cancelled)?;
        waiter_rx.await.map_err(|_| CaptureError::Cancelled)
    }

    /// Current session snapshot
    pub fn session(&self) -> Arc<CaptureSession> {
        Arc::clone(&self.snapshot.borrow())
    }

    /// Receiver tracking the latest snapshot
    pub fn watch(&self) -> watch::Receiver<Arc<CaptureSession>> {
        self.snapshot.clone()
    }

    /// Subscribe to change, chunk and end events
    pub fn subscribe(&self) -> broadcast::Receiver<CaptureEvent> {
        self.events.subscribe()
    }

    /// Deliver an environment signal (device list, track end, orientation,
    /// resize)
    pub fn signal(&self, signal: EnvironmentSignal) {
        if self.requests.send(Request::Signal(signal)).is_err() {
            warn!("Capture driver stopped, signal dropped");
        }
    }

    async fn apply(&self, command: Command) {
        let (ack_tx, ack_rx) = oneshot::channel();
        if self.requests.send(Request::Apply(command, ack_tx)).is_err() {
            warn!("Capture driver stopped, {:?} dropped", command);
            return;
        }
        let _ = ack_rx.await;
    }
}
