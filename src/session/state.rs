use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::CaptureError;
use crate::platform::{Blob, BlobHandle, BlobStore, Device, MediaStream};

/// Status of a capture session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CaptureStatus {
    #[default]
    #[serde(rename = "none")]
    Idle,
    Acquiring,
    Initiating,
    Previewing,
    Capturing,
    Paused,
    Captured,
    Denied,
}

impl CaptureStatus {
    /// Whether the state machine permits moving from `self` to `next`.
    ///
    /// Deactivation leaves the status untouched, so reactivation may start
    /// from any resting status.
    pub fn allows(self, next: CaptureStatus) -> bool {
        use CaptureStatus::*;

        match (self, next) {
            // reactivation from wherever the last deactivation left off
            (Idle | Initiating | Previewing | Captured | Denied, Acquiring) => true,
            (Acquiring | Initiating | Previewing | Denied, Initiating) => true,
            (Initiating, Previewing) => true,
            (Acquiring | Initiating, Denied) => true,
            (Previewing, Capturing) => true,
            (Capturing, Paused) | (Paused, Capturing) => true,
            (Capturing | Paused, Captured | Previewing) => true,
            // snapshot in image-only mode
            (Previewing, Captured) => true,
            (Captured, Previewing | Idle) => true,
            // clear() on a session that never reached preview
            (Denied, Idle) => true,
            _ => false,
        }
    }

    /// States in which a newly plugged-in device may be adopted
    pub fn accepts_new_device(self) -> bool {
        matches!(
            self,
            CaptureStatus::Initiating | CaptureStatus::Previewing | CaptureStatus::Denied
        )
    }

    pub fn is_recording(self) -> bool {
        matches!(self, CaptureStatus::Capturing | CaptureStatus::Paused)
    }
}

/// Live video stream held by the session
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LiveVideo {
    pub stream: MediaStream,
    pub width: u32,
    pub height: u32,
}

/// Live audio-only stream held by the session
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LiveAudio {
    pub stream: MediaStream,
}

/// A finalized recording
#[derive(Debug, Clone, Serialize)]
pub struct CapturedMedia {
    pub handle: BlobHandle,
    pub blob: Blob,
    pub chunks: Vec<Blob>,
    pub duration_ms: u64,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub captured_at: DateTime<Utc>,
}

/// A finalized still image
#[derive(Debug, Clone, Serialize)]
pub struct CapturedImage {
    pub handle: BlobHandle,
    pub blob: Blob,
    pub width: u32,
    pub height: u32,
    pub captured_at: DateTime<Utc>,
}

/// Observable state of a capture session.
///
/// Consumers receive this as a read-only snapshot with every change
/// notification.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CaptureSession {
    pub status: CaptureStatus,
    pub active: bool,
    pub devices: Vec<Device>,
    pub chosen_device_id: Option<String>,
    pub live_video: Option<LiveVideo>,
    pub live_audio: Option<LiveAudio>,
    pub captured_video: Option<CapturedMedia>,
    pub captured_audio: Option<CapturedMedia>,
    pub captured_image: Option<CapturedImage>,
    /// Elapsed recording time in milliseconds, paused time excluded
    pub duration_ms: Option<u64>,
    /// Peak volume of the live audio, 0-100
    pub volume: Option<u8>,
    pub last_error: Option<CaptureError>,
}

impl CaptureSession {
    /// The stream currently held, video or audio-only
    pub fn live_stream(&self) -> Option<&MediaStream> {
        self.live_video
            .as_ref()
            .map(|v| &v.stream)
            .or_else(|| self.live_audio.as_ref().map(|a| &a.stream))
    }

    pub fn has_artifact(&self) -> bool {
        self.captured_video.is_some() || self.captured_audio.is_some() || self.captured_image.is_some()
    }

    /// Revoke every artifact handle and drop the artifacts
    pub(crate) fn revoke_artifacts(&mut self, blobs: &dyn BlobStore) {
        for media in [self.captured_video.take(), self.captured_audio.take()]
            .into_iter()
            .flatten()
        {
            blobs.revoke_handle(&media.handle);
        }
        if let Some(image) = self.captured_image.take() {
            blobs.revoke_handle(&image.handle);
        }
    }
}
