pub mod config;
pub mod error;
pub mod platform;
pub mod session;
pub mod sim;

pub use config::CaptureOptions;
pub use error::{CaptureError, Result};
pub use platform::{
    AudioBuffer, AudioTap, Blob, BlobHandle, BlobStore, CaptureBackend, Device, DeviceKind,
    EnvironmentSignal, ImagePipeline, MediaConstraints, MediaStream, Platform, RasterSurface,
    Recorder, RecorderEvent, RecorderFactory, RecorderOptions, TrackConstraint, VideoMeta,
};
pub use session::{
    CaptureController, CaptureEvent, CaptureSession, CaptureStatus, CapturedImage, CapturedMedia,
    LiveAudio, LiveVideo,
};
