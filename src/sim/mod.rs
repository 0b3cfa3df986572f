//! Software platform for demos
//!
//! Synthetic cameras and microphones, a recorder that encodes a test tone as
//! WAV, an image pipeline that renders a gradient and encodes it with the
//! `image` crate, and an in-memory blob store. Device labels stay hidden
//! until the first stream is granted, like a browser without prior
//! permission.

mod recorder;

pub use recorder::SimRecorderFactory;

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::error::{CaptureError, Result};
use crate::platform::{
    AudioBuffer, AudioTap, Blob, BlobHandle, BlobStore, CaptureBackend, Device, DeviceKind,
    ImagePipeline, MediaConstraints, MediaStream, Platform, RasterSurface, VideoMeta,
};

/// Samples per metering buffer
const TAP_BUFFER: usize = 4096;

/// Build a complete simulated platform
pub fn platform() -> Platform {
    Platform {
        backend: Arc::new(SimBackend::default()),
        recorders: Arc::new(SimRecorderFactory),
        images: Arc::new(SimImagePipeline::default()),
        blobs: Arc::new(SimBlobStore::default()),
    }
}

/// Synthetic capture devices
pub struct SimBackend {
    cameras: Vec<Device>,
    microphones: Vec<Device>,
    meta: VideoMeta,
    granted: AtomicBool,
    open_streams: Mutex<HashSet<String>>,
}

impl Default for SimBackend {
    fn default() -> Self {
        Self {
            cameras: vec![
                Device::new("sim-cam-back", "Back Camera"),
                Device::new("sim-cam-front", "Front Camera"),
            ],
            microphones: vec![Device::new("sim-mic", "Built-in Microphone")],
            meta: VideoMeta {
                width: 1280,
                height: 720,
            },
            granted: AtomicBool::new(false),
            open_streams: Mutex::new(HashSet::new()),
        }
    }
}

impl SimBackend {
    /// Number of streams opened and not yet stopped
    pub fn open_stream_count(&self) -> usize {
        self.open_streams.lock().map(|s| s.len()).unwrap_or(0)
    }
}

#[async_trait::async_trait]
impl CaptureBackend for SimBackend {
    async fn enumerate_devices(&self, kind: DeviceKind) -> Vec<Device> {
        let devices = match kind {
            DeviceKind::VideoInput => &self.cameras,
            DeviceKind::AudioInput => &self.microphones,
        };
        if self.granted.load(Ordering::SeqCst) {
            devices.clone()
        } else {
            devices.iter().map(|d| Device::new(d.id.clone(), "")).collect()
        }
    }

    async fn request_stream(&self, constraints: &MediaConstraints) -> Result<MediaStream> {
        if constraints.device_kind().is_none() {
            return Err(CaptureError::PermissionOrDevice(
                "no capability requested".to_string(),
            ));
        }

        self.granted.store(true, Ordering::SeqCst);
        let id = uuid::Uuid::new_v4().to_string();
        let mut tracks = Vec::new();
        if constraints.video.is_enabled() {
            tracks.push(format!("{}-video", id));
        }
        if constraints.audio.is_enabled() {
            tracks.push(format!("{}-audio", id));
        }

        if let Ok(mut open) = self.open_streams.lock() {
            open.insert(id.clone());
        }
        debug!("Opened simulated stream {} ({:?})", id, constraints);
        Ok(MediaStream { id, tracks })
    }

    async fn read_video_meta(&self, stream: &MediaStream) -> Result<VideoMeta> {
        // metadata arrives a little after the stream opens
        tokio::time::sleep(Duration::from_millis(20)).await;
        if stream.tracks.iter().any(|t| t.ends_with("-video")) {
            Ok(self.meta)
        } else {
            Err(CaptureError::Metadata(format!(
                "stream {} has no video track",
                stream.id
            )))
        }
    }

    fn stop_stream(&self, stream: &MediaStream) {
        if let Ok(mut open) = self.open_streams.lock() {
            if open.remove(&stream.id) {
                debug!("Stopped simulated stream {}", stream.id);
            }
        }
    }

    fn open_audio_tap(
        &self,
        _stream: &MediaStream,
        buffers: mpsc::UnboundedSender<AudioBuffer>,
    ) -> Option<Box<dyn AudioTap>> {
        let task = tokio::spawn(async move {
            // 4096 samples at 48kHz
            let mut ticker = tokio::time::interval(Duration::from_millis(85));
            let mut step = 0u32;
            loop {
                ticker.tick().await;
                step = step.wrapping_add(1);
                let level = ((step % 20) as f32 / 20.0) * 0.8;
                let samples = (0..TAP_BUFFER)
                    .map(|n| (n as f32 * 0.05).sin() * level)
                    .collect();
                if buffers.send(AudioBuffer { samples }).is_err() {
                    break;
                }
            }
        });
        Some(Box::new(SimAudioTap { task: Some(task) }))
    }
}

struct SimAudioTap {
    task: Option<JoinHandle<()>>,
}

impl AudioTap for SimAudioTap {
    fn close(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

impl Drop for SimAudioTap {
    fn drop(&mut self) {
        self.close();
    }
}

/// Renders a gradient frame and encodes it with the `image` crate
#[derive(Debug)]
pub struct SimImagePipeline {
    meta: VideoMeta,
}

impl Default for SimImagePipeline {
    fn default() -> Self {
        Self {
            meta: VideoMeta {
                width: 1280,
                height: 720,
            },
        }
    }
}

#[async_trait::async_trait]
impl ImagePipeline for SimImagePipeline {
    async fn render_frame(&self, _stream: &MediaStream) -> Result<RasterSurface> {
        let VideoMeta { width, height } = self.meta;
        let mut pixels = Vec::with_capacity((width * height * 4) as usize);
        for y in 0..height {
            for x in 0..width {
                pixels.extend_from_slice(&[
                    (x * 255 / width) as u8,
                    (y * 255 / height) as u8,
                    128,
                    255,
                ]);
            }
        }
        Ok(RasterSurface {
            width,
            height,
            pixels,
        })
    }

    async fn encode_surface(
        &self,
        surface: &RasterSurface,
        mime_type: &str,
        quality: u8,
    ) -> Result<Blob> {
        encode_surface(surface, mime_type, quality)
    }
}

/// Encode an RGBA surface as PNG, or JPEG for anything else
pub fn encode_surface(surface: &RasterSurface, mime_type: &str, quality: u8) -> Result<Blob> {
    use image::codecs::jpeg::JpegEncoder;
    use image::codecs::png::PngEncoder;
    use image::{ExtendedColorType, ImageEncoder};

    let rgba = image::RgbaImage::from_raw(surface.width, surface.height, surface.pixels.clone())
        .ok_or_else(|| CaptureError::Encode("surface size does not match pixels".to_string()))?;

    let mut bytes = Vec::new();
    let encoded_as = if mime_type == "image/png" {
        PngEncoder::new(&mut bytes)
            .write_image(
                rgba.as_raw(),
                surface.width,
                surface.height,
                ExtendedColorType::Rgba8,
            )
            .map_err(|e| CaptureError::Encode(e.to_string()))?;
        "image/png"
    } else {
        let rgb = image::DynamicImage::ImageRgba8(rgba).to_rgb8();
        JpegEncoder::new_with_quality(&mut bytes, quality.clamp(1, 100))
            .encode_image(&rgb)
            .map_err(|e| CaptureError::Encode(e.to_string()))?;
        "image/jpeg"
    };

    Ok(Blob::new(encoded_as, bytes))
}

/// In-memory handle registry
#[derive(Debug, Default)]
pub struct SimBlobStore {
    handles: Mutex<HashMap<String, usize>>,
}

impl SimBlobStore {
    pub fn live_handles(&self) -> usize {
        self.handles.lock().map(|h| h.len()).unwrap_or(0)
    }
}

impl BlobStore for SimBlobStore {
    fn create_handle(&self, blob: &Blob) -> BlobHandle {
        let url = format!("blob:sim/{}", uuid::Uuid::new_v4());
        if let Ok(mut handles) = self.handles.lock() {
            handles.insert(url.clone(), blob.len());
        }
        info!("Created handle {} ({} bytes)", url, blob.len());
        BlobHandle(url)
    }

    fn revoke_handle(&self, handle: &BlobHandle) {
        if let Ok(mut handles) = self.handles.lock() {
            handles.remove(&handle.0);
        }
    }
}
