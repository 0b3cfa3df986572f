use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Options recognised by a capture controller
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CaptureOptions {
    /// Capture video
    pub video: bool,

    /// Capture audio
    pub audio: bool,

    /// Device id, or a fragment of its label (matched case-insensitively)
    pub preferred_device: Option<String>,

    /// Switch to a newly plugged-in device automatically
    pub choose_new_device: bool,

    /// A snapshot completes the session (status becomes `captured`)
    pub capture_image_only: bool,

    /// Meter peak volume of the live audio
    pub watch_volume: bool,

    /// Deliver recorded data in segments of this length (chunked mode).
    /// Absent means a single blob at the end of the recording.
    pub segment_duration_ms: Option<u64>,

    /// Delay before the device is released after deactivation
    pub deactivation_delay_ms: u64,

    pub video_mime_type: String,
    pub audio_mime_type: String,
    pub image_mime_type: String,
    pub audio_bits_per_second: u32,
    pub video_bits_per_second: u32,

    /// Still-image quality, 0-100
    pub image_quality: u8,

    /// Keep failures out of the error log
    pub silent: bool,
}

impl Default for CaptureOptions {
    fn default() -> Self {
        Self {
            video: true,
            audio: true,
            preferred_device: Some("front".to_string()),
            choose_new_device: true,
            capture_image_only: false,
            watch_volume: false,
            segment_duration_ms: None,
            deactivation_delay_ms: 0,
            video_mime_type: "video/webm".to_string(),
            audio_mime_type: "audio/webm".to_string(),
            image_mime_type: "image/jpeg".to_string(),
            audio_bits_per_second: 128_000,
            video_bits_per_second: 2_500_000,
            image_quality: 90,
            silent: false,
        }
    }
}

impl CaptureOptions {
    /// Load options from a config file, overridden by `CAPTURE_*` environment
    /// variables. Keys missing from both fall back to the defaults.
    pub fn load(path: &str) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(path))
            .add_source(config::Environment::with_prefix("CAPTURE").try_parsing(true))
            .build()?;

        Ok(settings.try_deserialize()?)
    }

    pub fn segment_duration(&self) -> Option<Duration> {
        self.segment_duration_ms
            .filter(|ms| *ms > 0)
            .map(Duration::from_millis)
    }

    pub fn deactivation_delay(&self) -> Duration {
        Duration::from_millis(self.deactivation_delay_ms)
    }

    pub fn is_segmented(&self) -> bool {
        self.segment_duration().is_some()
    }
}
