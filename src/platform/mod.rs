pub mod backend;
pub mod media;

use std::sync::Arc;

pub use backend::{AudioTap, BlobStore, CaptureBackend, ImagePipeline, Recorder, RecorderFactory};
pub use media::{
    AudioBuffer, Blob, BlobHandle, Device, DeviceKind, EnvironmentSignal, MediaConstraints,
    MediaStream, RasterSurface, RecorderEvent, RecorderOptions, TrackConstraint, VideoMeta,
};

/// The set of collaborators a controller drives
#[derive(Clone)]
pub struct Platform {
    pub backend: Arc<dyn CaptureBackend>,
    pub recorders: Arc<dyn RecorderFactory>,
    pub images: Arc<dyn ImagePipeline>,
    pub blobs: Arc<dyn BlobStore>,
}
