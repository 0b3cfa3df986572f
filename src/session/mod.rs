//! Capture session management
//!
//! This module provides the `CaptureController` abstraction that manages:
//! - Device acquisition, with device preference and hot-plug adoption
//! - Live preview, volume metering and orientation tracking
//! - Recording with pause/resume and segmented delivery
//! - Still-image snapshots
//! - Cleanup of streams, recorders and artifact handles

mod acquire;
mod controller;
mod driver;
mod events;
mod recording;
mod state;
mod watchers;

pub use acquire::choose_device;
pub use controller::CaptureController;
pub use events::CaptureEvent;
pub use state::{CaptureSession, CaptureStatus, CapturedImage, CapturedMedia, LiveAudio, LiveVideo};
pub use watchers::{first_new_device, peak_volume};
