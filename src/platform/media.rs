use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Kind of capture device to enumerate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceKind {
    VideoInput,
    AudioInput,
}

/// An enumerable input device
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Device {
    /// Platform device identifier
    pub id: String,

    /// Human-readable label; empty until the platform grants permission
    pub label: String,
}

impl Device {
    pub fn new(id: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
        }
    }
}

/// Constraint on one capability of a stream request
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum TrackConstraint {
    Disabled,
    /// Let the platform pick the device
    Any,
    /// Pin the track to a device
    Device(String),
}

impl TrackConstraint {
    pub fn is_enabled(&self) -> bool {
        !matches!(self, TrackConstraint::Disabled)
    }
}

/// Capabilities requested from the platform
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MediaConstraints {
    pub video: TrackConstraint,
    pub audio: TrackConstraint,
}

impl MediaConstraints {
    pub fn new(video: bool, audio: bool) -> Self {
        let flag = |enabled: bool| {
            if enabled {
                TrackConstraint::Any
            } else {
                TrackConstraint::Disabled
            }
        };
        Self {
            video: flag(video),
            audio: flag(audio),
        }
    }

    /// Device kind these constraints enumerate: video wins when both are on
    pub fn device_kind(&self) -> Option<DeviceKind> {
        if self.video.is_enabled() {
            Some(DeviceKind::VideoInput)
        } else if self.audio.is_enabled() {
            Some(DeviceKind::AudioInput)
        } else {
            None
        }
    }

    /// Pin the primary capability (video, else audio) to a device
    pub fn pinned_to(mut self, device_id: &str) -> Self {
        let criteria = TrackConstraint::Device(device_id.to_string());
        if self.video.is_enabled() {
            self.video = criteria;
        } else if self.audio.is_enabled() {
            self.audio = criteria;
        }
        self
    }
}

/// An open live stream from a device
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MediaStream {
    /// Stream identity; two streams never share one
    pub id: String,

    /// Identifiers of the tracks backing the stream
    pub tracks: Vec<String>,
}

impl MediaStream {
    pub fn has_track(&self, track_id: &str) -> bool {
        self.tracks.iter().any(|t| t == track_id)
    }
}

/// Video dimensions of a live stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoMeta {
    pub width: u32,
    pub height: u32,
}

/// A binary object produced by the recorder or image pipeline
#[derive(Clone, Serialize)]
pub struct Blob {
    pub mime_type: String,
    #[serde(skip)]
    data: Arc<[u8]>,
    size: usize,
}

impl Blob {
    pub fn new(mime_type: impl Into<String>, data: Vec<u8>) -> Self {
        let size = data.len();
        Self {
            mime_type: mime_type.into(),
            data: data.into(),
            size,
        }
    }

    /// Join chunks into one blob typed after the first chunk
    pub fn concat(chunks: &[Blob]) -> Self {
        let mime_type = chunks
            .first()
            .map(|c| c.mime_type.clone())
            .unwrap_or_default();
        let data: Vec<u8> = chunks.iter().flat_map(|c| c.bytes().iter().copied()).collect();
        Self::new(mime_type, data)
    }

    pub fn bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn len(&self) -> usize {
        self.size
    }

    pub fn is_empty(&self) -> bool {
        self.size == 0
    }
}

impl fmt::Debug for Blob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Blob")
            .field("mime_type", &self.mime_type)
            .field("size", &self.size)
            .finish()
    }
}

impl PartialEq for Blob {
    fn eq(&self, other: &Self) -> bool {
        self.mime_type == other.mime_type && self.data == other.data
    }
}

/// Dereferenceable handle to a blob (a URL-like string)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct BlobHandle(pub String);

impl fmt::Display for BlobHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A rendered video frame (RGBA, row-major)
#[derive(Debug, Clone)]
pub struct RasterSurface {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u8>,
}

/// Options handed to the platform recorder
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecorderOptions {
    pub mime_type: String,
    pub audio_bits_per_second: Option<u32>,
    pub video_bits_per_second: Option<u32>,
    /// Chunk cadence; `None` produces data only when stopped
    pub timeslice: Option<Duration>,
}

/// Callbacks from the platform recorder
#[derive(Debug, Clone)]
pub enum RecorderEvent {
    Start,
    Pause,
    Resume,
    Data(Blob),
    Stop,
}

/// One buffer of live audio samples, normalised to -1.0..=1.0
#[derive(Debug, Clone)]
pub struct AudioBuffer {
    pub samples: Vec<f32>,
}

/// Signals delivered by the surrounding environment
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnvironmentSignal {
    /// Devices were plugged in or removed
    DeviceListChanged,
    /// A stream track ended
    TrackEnded { track_id: String },
    /// Viewport orientation changed
    OrientationChanged,
    /// Viewport was resized
    Resized,
}
