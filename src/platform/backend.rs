use tokio::sync::mpsc;

use super::media::{
    AudioBuffer, Blob, BlobHandle, Device, DeviceKind, MediaConstraints, MediaStream,
    RasterSurface, RecorderEvent, RecorderOptions, VideoMeta,
};
use crate::error::Result;

/// Platform capture layer
///
/// Implementations wrap whatever the host offers for device access:
/// - browser bindings (getUserMedia / enumerateDevices)
/// - native camera and microphone APIs
/// - `sim::SimBackend` for demos
#[async_trait::async_trait]
pub trait CaptureBackend: Send + Sync {
    /// List devices of one kind. Fails soft: unsupported means empty.
    async fn enumerate_devices(&self, kind: DeviceKind) -> Vec<Device>;

    /// Open a live stream for the given constraints
    async fn request_stream(&self, constraints: &MediaConstraints) -> Result<MediaStream>;

    /// Read the current video dimensions of a stream
    async fn read_video_meta(&self, stream: &MediaStream) -> Result<VideoMeta>;

    /// Stop every track of a stream. Must be idempotent.
    fn stop_stream(&self, stream: &MediaStream);

    /// Tap the audio of a stream, delivering sample buffers at the platform's
    /// processing cadence. `None` when metering is unsupported.
    fn open_audio_tap(
        &self,
        stream: &MediaStream,
        buffers: mpsc::UnboundedSender<AudioBuffer>,
    ) -> Option<Box<dyn AudioTap>>;
}

/// Live audio analysis tap
pub trait AudioTap: Send {
    /// Disconnect from the stream; no buffers are delivered afterwards
    fn close(&mut self);
}

/// Platform recorder bound to one stream
///
/// Lifecycle calls return synchronously; the matching callbacks arrive later
/// on the event channel the recorder was created with.
pub trait Recorder: Send {
    fn start(&mut self, timeslice: Option<std::time::Duration>) -> Result<()>;
    fn pause(&mut self) -> Result<()>;
    fn resume(&mut self) -> Result<()>;
    fn stop(&mut self) -> Result<()>;
}

/// Creates platform recorders
pub trait RecorderFactory: Send + Sync {
    fn create_recorder(
        &self,
        stream: &MediaStream,
        options: &RecorderOptions,
        events: mpsc::UnboundedSender<RecorderEvent>,
    ) -> Result<Box<dyn Recorder>>;
}

/// Platform image pipeline
#[async_trait::async_trait]
pub trait ImagePipeline: Send + Sync {
    /// Render the current frame of a stream at its native size
    async fn render_frame(&self, stream: &MediaStream) -> Result<RasterSurface>;

    /// Encode a surface to the given format. `quality` is 0-100.
    async fn encode_surface(
        &self,
        surface: &RasterSurface,
        mime_type: &str,
        quality: u8,
    ) -> Result<Blob>;
}

/// Lifecycle of dereferenceable blob handles
pub trait BlobStore: Send + Sync {
    fn create_handle(&self, blob: &Blob) -> BlobHandle;
    fn revoke_handle(&self, handle: &BlobHandle);
}
