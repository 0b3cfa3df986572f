// Fake platform collaborators for driving a capture controller in tests.
//
// Every fake shares one `FakeState` so tests can script the platform
// (devices, permission, dimensions) and inspect what the controller did
// (streams opened and stopped, handles created and revoked, recorder calls).

#![allow(dead_code)]

use anyhow::{Context, Result};
use capture_session::{
    AudioBuffer, AudioTap, Blob, BlobHandle, BlobStore, CaptureBackend, CaptureController,
    CaptureError, CaptureOptions, CaptureSession, Device, DeviceKind, ImagePipeline,
    MediaConstraints, MediaStream, Platform, RasterSurface, Recorder, RecorderEvent,
    RecorderFactory, RecorderOptions, VideoMeta,
};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::{mpsc, Notify};

#[derive(Default)]
pub struct FakeState {
    pub cameras: Vec<Device>,
    pub microphones: Vec<Device>,
    /// Labels are hidden until a stream has been granted
    pub labels_locked: bool,
    pub deny: bool,
    pub meta: Option<VideoMeta>,
    pub fail_encode: bool,
    pub fail_recorder_start: bool,
    /// Recorder `stop()` holds back its callback until `finish_stop()`
    pub defer_stop: bool,

    pub enumerations: usize,
    pub requests: Vec<MediaConstraints>,
    pub opened: Vec<MediaStream>,
    pub stopped: Vec<String>,
    pub stream_counter: usize,

    pub tap: Option<mpsc::UnboundedSender<AudioBuffer>>,
    pub taps_closed: usize,

    pub recorder_events: Option<mpsc::UnboundedSender<RecorderEvent>>,
    pub recorder_options: Vec<RecorderOptions>,
    pub recorder_calls: Vec<&'static str>,

    pub encoded: usize,

    pub handles_created: Vec<BlobHandle>,
    pub handles_revoked: Vec<BlobHandle>,
}

#[derive(Clone)]
pub struct FakePlatform {
    state: Arc<Mutex<FakeState>>,
    /// When set, enumeration waits for a permit before answering
    enumerate_gate: Arc<Mutex<Option<Arc<Notify>>>>,
    /// When set, frame rendering waits for a permit
    render_gate: Arc<Mutex<Option<Arc<Notify>>>>,
}

impl FakePlatform {
    pub fn new() -> Self {
        let state = FakeState {
            cameras: vec![
                Device::new("cam-back", "Back Camera"),
                Device::new("cam-front", "Front Camera"),
            ],
            microphones: vec![Device::new("mic-1", "Headset Microphone")],
            meta: Some(VideoMeta {
                width: 1280,
                height: 720,
            }),
            ..FakeState::default()
        };
        Self {
            state: Arc::new(Mutex::new(state)),
            enumerate_gate: Arc::new(Mutex::new(None)),
            render_gate: Arc::new(Mutex::new(None)),
        }
    }

    pub fn state(&self) -> MutexGuard<'_, FakeState> {
        self.state.lock().unwrap()
    }

    pub fn platform(&self) -> Platform {
        Platform {
            backend: Arc::new(self.clone()),
            recorders: Arc::new(self.clone()),
            images: Arc::new(self.clone()),
            blobs: Arc::new(self.clone()),
        }
    }

    pub fn controller(&self, options: CaptureOptions) -> CaptureController {
        CaptureController::new(options, self.platform())
    }

    pub fn gate_enumeration(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        *self.enumerate_gate.lock().unwrap() = Some(Arc::clone(&gate));
        gate
    }

    pub fn gate_rendering(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        *self.render_gate.lock().unwrap() = Some(Arc::clone(&gate));
        gate
    }

    /// Deliver the stop callback held back by `defer_stop`
    pub fn finish_stop(&self) {
        self.send_recorder_event(RecorderEvent::Stop);
    }

    /// Deliver a recorded chunk from the current recorder
    pub fn push_chunk(&self, bytes: &[u8]) {
        let events = self.state().recorder_events.clone();
        events
            .expect("no recorder created")
            .send(RecorderEvent::Data(Blob::new("video/webm", bytes.to_vec())))
            .unwrap();
    }

    /// Deliver audio samples through the volume tap
    pub fn push_samples(&self, samples: &[f32]) {
        let tap = self.state().tap.clone();
        tap.expect("no audio tap open")
            .send(AudioBuffer {
                samples: samples.to_vec(),
            })
            .unwrap();
    }

    fn send_recorder_event(&self, event: RecorderEvent) {
        if let Some(events) = self.state().recorder_events.as_ref() {
            let _ = events.send(event);
        }
    }
}

#[async_trait::async_trait]
impl CaptureBackend for FakePlatform {
    async fn enumerate_devices(&self, kind: DeviceKind) -> Vec<Device> {
        let gate = self.enumerate_gate.lock().unwrap().clone();
        if let Some(gate) = gate {
            gate.notified().await;
        }

        let mut state = self.state();
        state.enumerations += 1;
        let devices = match kind {
            DeviceKind::VideoInput => state.cameras.clone(),
            DeviceKind::AudioInput => state.microphones.clone(),
        };
        if state.labels_locked {
            devices.iter().map(|d| Device::new(d.id.clone(), "")).collect()
        } else {
            devices
        }
    }

    async fn request_stream(&self, constraints: &MediaConstraints) -> capture_session::Result<MediaStream> {
        let mut state = self.state();
        state.requests.push(constraints.clone());
        if state.deny {
            return Err(CaptureError::PermissionOrDevice(
                "permission denied".to_string(),
            ));
        }

        state.labels_locked = false;
        state.stream_counter += 1;
        let id = format!("stream-{}", state.stream_counter);
        let stream = MediaStream {
            tracks: vec![format!("{}-video", id), format!("{}-audio", id)],
            id,
        };
        state.opened.push(stream.clone());
        Ok(stream)
    }

    async fn read_video_meta(&self, _stream: &MediaStream) -> capture_session::Result<VideoMeta> {
        self.state()
            .meta
            .ok_or_else(|| CaptureError::Metadata("no dimensions".to_string()))
    }

    fn stop_stream(&self, stream: &MediaStream) {
        self.state().stopped.push(stream.id.clone());
    }

    fn open_audio_tap(
        &self,
        _stream: &MediaStream,
        buffers: mpsc::UnboundedSender<AudioBuffer>,
    ) -> Option<Box<dyn AudioTap>> {
        self.state().tap = Some(buffers);
        Some(Box::new(FakeTap(self.clone())))
    }
}

struct FakeTap(FakePlatform);

impl AudioTap for FakeTap {
    fn close(&mut self) {
        let mut state = self.0.state();
        state.tap = None;
        state.taps_closed += 1;
    }
}

struct FakeRecorder(FakePlatform);

impl FakeRecorder {
    fn call(&self, name: &'static str, event: RecorderEvent) -> capture_session::Result<()> {
        self.0.state().recorder_calls.push(name);
        self.0.send_recorder_event(event);
        Ok(())
    }
}

impl Recorder for FakeRecorder {
    fn start(&mut self, _timeslice: Option<Duration>) -> capture_session::Result<()> {
        if self.0.state().fail_recorder_start {
            return Err(CaptureError::RecorderState(
                "recorder refused to start".to_string(),
            ));
        }
        self.call("start", RecorderEvent::Start)
    }

    fn pause(&mut self) -> capture_session::Result<()> {
        self.call("pause", RecorderEvent::Pause)
    }

    fn resume(&mut self) -> capture_session::Result<()> {
        self.call("resume", RecorderEvent::Resume)
    }

    fn stop(&mut self) -> capture_session::Result<()> {
        if self.0.state().defer_stop {
            self.0.state().recorder_calls.push("stop");
            return Ok(());
        }
        self.call("stop", RecorderEvent::Stop)
    }
}

impl RecorderFactory for FakePlatform {
    fn create_recorder(
        &self,
        _stream: &MediaStream,
        options: &RecorderOptions,
        events: mpsc::UnboundedSender<RecorderEvent>,
    ) -> capture_session::Result<Box<dyn Recorder>> {
        let mut state = self.state();
        state.recorder_events = Some(events);
        state.recorder_options.push(options.clone());
        Ok(Box::new(FakeRecorder(self.clone())))
    }
}

#[async_trait::async_trait]
impl ImagePipeline for FakePlatform {
    async fn render_frame(&self, _stream: &MediaStream) -> capture_session::Result<RasterSurface> {
        let gate = self.render_gate.lock().unwrap().clone();
        if let Some(gate) = gate {
            gate.notified().await;
        }

        let meta = self
            .state()
            .meta
            .ok_or_else(|| CaptureError::Encode("no frame".to_string()))?;
        Ok(RasterSurface {
            width: meta.width,
            height: meta.height,
            pixels: vec![0; (meta.width * meta.height * 4) as usize],
        })
    }

    async fn encode_surface(
        &self,
        surface: &RasterSurface,
        mime_type: &str,
        quality: u8,
    ) -> capture_session::Result<Blob> {
        let mut state = self.state();
        state.encoded += 1;
        if state.fail_encode {
            return Err(CaptureError::Encode("encoder unavailable".to_string()));
        }
        drop(state);
        let header = format!("{}x{}@{}", surface.width, surface.height, quality);
        Ok(Blob::new(mime_type, header.into_bytes()))
    }
}

impl BlobStore for FakePlatform {
    fn create_handle(&self, _blob: &Blob) -> BlobHandle {
        let mut state = self.state();
        let handle = BlobHandle(format!("blob:fake/{}", state.handles_created.len() + 1));
        state.handles_created.push(handle.clone());
        handle
    }

    fn revoke_handle(&self, handle: &BlobHandle) {
        self.state().handles_revoked.push(handle.clone());
    }
}

/// Options for tests: quiet, no hot-plug adoption unless asked for
pub fn quiet_options() -> CaptureOptions {
    CaptureOptions {
        silent: true,
        watch_volume: false,
        ..CaptureOptions::default()
    }
}

/// Wait until the session satisfies the predicate
pub async fn wait_until(
    controller: &CaptureController,
    predicate: impl FnMut(&Arc<CaptureSession>) -> bool,
) -> Result<Arc<CaptureSession>> {
    let mut watch = controller.watch();
    let session = tokio::time::timeout(Duration::from_secs(5), watch.wait_for(predicate))
        .await
        .context("timed out waiting for session state")?
        .context("controller closed")?;
    Ok(Arc::clone(&session))
}

/// Activate and wait for a live preview
pub async fn previewing(controller: &CaptureController) -> Result<Arc<CaptureSession>> {
    controller.activate().await;
    wait_until(controller, |s| {
        s.status == capture_session::CaptureStatus::Previewing
    })
    .await
}
