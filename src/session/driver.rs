//! The session driver owns the capture session and is the only code that
//! mutates it. Requests from controllers, collaborator callbacks and the
//! completions of background work all arrive here and are applied one at a
//! time; anything that has to wait on the platform runs in a spawned task
//! and reports back with a [`DriverEvent`].

use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use super::acquire::{self, AcquireRequest};
use super::events::Notifier;
use super::recording::{FinishedRecording, RecordingHandle};
use super::state::{CaptureSession, CaptureStatus, CapturedImage, CapturedMedia, LiveAudio, LiveVideo};
use super::watchers::{first_new_device, peak_volume, OrientationDebounce, VolumeMeter};
use crate::config::CaptureOptions;
use crate::error::{CaptureError, Result};
use crate::platform::{
    AudioBuffer, Blob, Device, EnvironmentSignal, MediaConstraints, MediaStream, Platform,
    RecorderEvent, RecorderOptions, VideoMeta,
};

/// Duration refresh cadence while recording
const TICK: Duration = Duration::from_millis(100);

/// Operations a controller can ask for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Command {
    Activate,
    Deactivate,
    Reacquire,
    Start,
    Stop,
    Pause,
    Resume,
    Snap,
    Clear,
}

pub(crate) enum Request {
    /// Apply a command; acknowledged once applied
    Apply(Command, oneshot::Sender<()>),
    /// Switch devices; answered when the new device is live or has failed
    Choose(String, oneshot::Sender<Result<()>>),
    /// Resolve with the snapshot of the next change
    NextChange(oneshot::Sender<Arc<CaptureSession>>),
    Signal(EnvironmentSignal),
}

/// Completions of background work
#[derive(Debug)]
pub(crate) enum DriverEvent {
    StreamOpened {
        generation: u64,
        devices: Vec<Device>,
        device_id: Option<String>,
        stream: MediaStream,
    },
    StreamReady {
        generation: u64,
        stream: MediaStream,
        meta: Option<VideoMeta>,
    },
    AcquireFailed {
        generation: u64,
        error: CaptureError,
    },
    DevicesScanned(Result<Vec<Device>>),
    Remeasured {
        stream_id: String,
        meta: Result<VideoMeta>,
    },
    Snapped {
        stream_id: String,
        image: Result<SnappedImage>,
    },
    ReleaseDue {
        ticket: u64,
    },
}

#[derive(Debug)]
pub(crate) struct SnappedImage {
    blob: Blob,
    width: u32,
    height: u32,
}

/// An acquisition attempt the driver is waiting on
struct Acquisition {
    generation: u64,
    waiters: Vec<oneshot::Sender<Result<()>>>,
}

/// Deferred device release after deactivation
struct PendingRelease {
    ticket: u64,
    task: JoinHandle<()>,
}

enum Wake {
    Request(Request),
    Event(DriverEvent),
    Recorder(RecorderEvent),
    Audio(AudioBuffer),
    Tick,
}

pub(crate) struct SessionDriver {
    options: CaptureOptions,
    platform: Platform,
    session: CaptureSession,
    notifier: Notifier,

    requests: mpsc::UnboundedReceiver<Request>,
    events_tx: mpsc::UnboundedSender<DriverEvent>,
    events: mpsc::UnboundedReceiver<DriverEvent>,

    recording: Option<RecordingHandle>,
    ticker: Option<Interval>,
    meter: Option<VolumeMeter>,

    acquisition: Option<Acquisition>,
    generation: u64,

    watching_devices: bool,
    scanning_devices: bool,
    orientation: OrientationDebounce,

    pending_release: Option<PendingRelease>,
    release_ticket: u64,
}

impl SessionDriver {
    pub(crate) fn new(
        options: CaptureOptions,
        platform: Platform,
        requests: mpsc::UnboundedReceiver<Request>,
        notifier: Notifier,
    ) -> Self {
        let (events_tx, events) = mpsc::unbounded_channel();

        Self {
            options,
            platform,
            session: CaptureSession::default(),
            notifier,
            requests,
            events_tx,
            events,
            recording: None,
            ticker: None,
            meter: None,
            acquisition: None,
            generation: 0,
            watching_devices: false,
            scanning_devices: false,
            orientation: OrientationDebounce::default(),
            pending_release: None,
            release_ticket: 0,
        }
    }

    /// Process requests and callbacks until every controller is dropped
    pub(crate) async fn run(mut self) {
        debug!("Capture session driver started");

        loop {
            let wake = tokio::select! {
                request = self.requests.recv() => match request {
                    Some(request) => Wake::Request(request),
                    None => break,
                },
                Some(event) = self.events.recv() => Wake::Event(event),
                event = next_recorder_event(&mut self.recording) => Wake::Recorder(event),
                buffer = next_audio_buffer(&mut self.meter) => Wake::Audio(buffer),
                _ = next_tick(&mut self.ticker) => Wake::Tick,
            };

            match wake {
                Wake::Request(request) => self.handle_request(request),
                Wake::Event(event) => self.handle_event(event),
                Wake::Recorder(event) => self.handle_recorder_event(event),
                Wake::Audio(buffer) => self.handle_audio(buffer),
                Wake::Tick => self.handle_tick(),
            }
        }

        self.shutdown();
        debug!("Capture session driver stopped");
    }

    fn handle_request(&mut self, request: Request) {
        match request {
            Request::Apply(command, ack) => {
                self.apply(command);
                let _ = ack.send(());
            }
            Request::Choose(device_id, reply) => self.choose(device_id, reply),
            Request::NextChange(waiter) => self.notifier.wait_for_change(waiter),
            Request::Signal(signal) => self.handle_signal(signal),
        }
    }

    fn apply(&mut self, command: Command) {
        debug!("Applying {:?} in status {:?}", command, self.session.status);

        match command {
            Command::Activate => self.activate(),
            Command::Deactivate => self.deactivate(),
            Command::Reacquire => self.request_reacquire(),
            Command::Start => self.start(),
            Command::Stop => self.with_recorder(RecordingHandle::stop),
            Command::Pause => self.with_recorder(RecordingHandle::pause),
            Command::Resume => self.with_recorder(RecordingHandle::resume),
            Command::Snap => self.snap(),
            Command::Clear => self.clear(),
        }
    }

    fn activate(&mut self) {
        if self.session.active {
            return;
        }
        self.flush_pending_release();
        if self.session.has_artifact() {
            debug!("Ignoring activate: captured artifact must be cleared first");
            return;
        }

        info!("Activating capture session");
        self.set_status(CaptureStatus::Acquiring);
        self.session.active = true;
        self.watching_devices = true;
        self.begin_acquisition(Vec::new());
        self.notify();
    }

    fn deactivate(&mut self) {
        if !self.session.active {
            return;
        }

        info!("Deactivating capture session");
        self.abandon_recording();
        self.cancel_acquisition();
        self.watching_devices = false;
        self.orientation = OrientationDebounce::default();
        self.session.active = false;
        self.stop_metering();
        self.discard_artifacts();

        // only the device release may be deferred
        let delay = self.options.deactivation_delay();
        if delay.is_zero() {
            self.finish_release();
        } else {
            self.schedule_release(delay);
        }
        self.notify();
    }

    fn schedule_release(&mut self, delay: Duration) {
        self.release_ticket += 1;
        let ticket = self.release_ticket;
        let events = self.events_tx.clone();

        debug!("Releasing device in {:?}", delay);
        let task = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = events.send(DriverEvent::ReleaseDue { ticket });
        });
        self.pending_release = Some(PendingRelease { ticket, task });
    }

    /// Perform a deferred release now, if one is pending
    fn flush_pending_release(&mut self) {
        if let Some(pending) = self.pending_release.take() {
            pending.task.abort();
            self.finish_release();
        }
    }

    /// Release the device. Status is left as it was; `active == false`
    /// marks the rest condition.
    fn finish_release(&mut self) {
        self.abandon_recording();
        self.release_input();
    }

    /// Drop the recorder without producing an artifact
    fn abandon_recording(&mut self) {
        self.ticker = None;
        if let Some(recording) = self.recording.take() {
            recording.abandon();
            if self.session.status.is_recording() {
                self.set_status(CaptureStatus::Previewing);
            }
        }
    }

    fn discard_artifacts(&mut self) {
        self.session.revoke_artifacts(self.platform.blobs.as_ref());
        self.session.duration_ms = None;
    }

    fn stop_metering(&mut self) {
        if let Some(meter) = self.meter.take() {
            meter.close();
        }
        self.session.volume = None;
    }

    fn release_input(&mut self) {
        self.stop_metering();

        let video = self.session.live_video.take().map(|v| v.stream);
        let audio = self.session.live_audio.take().map(|a| a.stream);
        for stream in video.into_iter().chain(audio) {
            debug!("Stopping stream {}", stream.id);
            self.platform.backend.stop_stream(&stream);
        }
    }

    fn shutdown(&mut self) {
        self.cancel_acquisition();
        if let Some(pending) = self.pending_release.take() {
            pending.task.abort();
        }
        self.watching_devices = false;
        self.session.active = false;
        self.discard_artifacts();
        self.finish_release();
        self.notify();
    }

    fn begin_acquisition(&mut self, mut waiters: Vec<oneshot::Sender<Result<()>>>) {
        if let Some(prior) = self.acquisition.take() {
            debug!("Acquisition {} superseded", prior.generation);
            waiters.extend(prior.waiters);
        }

        self.generation += 1;
        let request = AcquireRequest {
            generation: self.generation,
            constraints: MediaConstraints::new(self.options.video, self.options.audio),
            preferred: self
                .session
                .chosen_device_id
                .clone()
                .or_else(|| self.options.preferred_device.clone()),
        };
        self.acquisition = Some(Acquisition {
            generation: self.generation,
            waiters,
        });

        tokio::spawn(acquire::run(
            Arc::clone(&self.platform.backend),
            request,
            self.events_tx.clone(),
        ));
    }

    fn cancel_acquisition(&mut self) {
        if let Some(acquisition) = self.acquisition.take() {
            for waiter in acquisition.waiters {
                let _ = waiter.send(Err(CaptureError::Cancelled));
            }
        }
    }

    fn finish_acquisition(&mut self, outcome: Result<()>) {
        if let Some(acquisition) = self.acquisition.take() {
            for waiter in acquisition.waiters {
                let _ = waiter.send(outcome.clone());
            }
        }
    }

    fn is_current(&self, generation: u64) -> bool {
        self.acquisition
            .as_ref()
            .is_some_and(|a| a.generation == generation)
    }

    fn reacquire(&mut self, waiters: Vec<oneshot::Sender<Result<()>>>) {
        self.release_input();
        self.set_status(CaptureStatus::Initiating);
        self.notify();
        self.begin_acquisition(waiters);
    }

    fn request_reacquire(&mut self) {
        if !self.session.active {
            debug!("Ignoring reacquire on inactive session");
            return;
        }
        let status = self.session.status;
        if status.is_recording() || status == CaptureStatus::Captured {
            self.report(CaptureError::RecorderState(format!(
                "cannot reacquire while {:?}",
                status
            )));
            self.notify();
            return;
        }
        self.reacquire(Vec::new());
    }

    fn choose(&mut self, device_id: String, reply: oneshot::Sender<Result<()>>) {
        if self.session.chosen_device_id.as_deref() == Some(device_id.as_str())
            && self.session.live_stream().is_some()
        {
            let _ = reply.send(Ok(()));
            return;
        }

        let status = self.session.status;
        if status.is_recording() || status == CaptureStatus::Captured {
            let error =
                CaptureError::RecorderState(format!("cannot switch devices while {:?}", status));
            self.report(error.clone());
            self.notify();
            let _ = reply.send(Err(error));
            return;
        }

        info!("Switching to device {}", device_id);
        self.session.chosen_device_id = Some(device_id);
        if !self.session.active {
            // picked up by the next activation
            self.notify();
            let _ = reply.send(Ok(()));
            return;
        }
        self.reacquire(vec![reply]);
    }

    fn stream_opened(
        &mut self,
        generation: u64,
        devices: Vec<Device>,
        device_id: Option<String>,
        stream: MediaStream,
    ) {
        if !self.is_current(generation) {
            debug!("Discarding stream {} from stale acquisition", stream.id);
            self.platform.backend.stop_stream(&stream);
            return;
        }

        self.session.devices = devices;
        self.session.chosen_device_id = device_id;
        self.set_status(CaptureStatus::Initiating);
        self.notify();
    }

    fn stream_ready(&mut self, generation: u64, stream: MediaStream, meta: Option<VideoMeta>) {
        if !self.is_current(generation) {
            debug!("Discarding stream {} from stale acquisition", stream.id);
            self.platform.backend.stop_stream(&stream);
            return;
        }
        if self.session.live_stream().is_some() {
            self.release_input();
        }

        info!("Previewing stream {}", stream.id);
        if self.options.watch_volume && self.options.audio {
            self.watch_volume(&stream);
        }
        match meta {
            Some(meta) => {
                self.session.live_video = Some(LiveVideo {
                    stream,
                    width: meta.width,
                    height: meta.height,
                });
            }
            None => self.session.live_audio = Some(LiveAudio { stream }),
        }
        self.set_status(CaptureStatus::Previewing);
        self.notify();
        self.finish_acquisition(Ok(()));
    }

    fn acquire_failed(&mut self, generation: u64, error: CaptureError) {
        if !self.is_current(generation) {
            return;
        }

        self.report(error.clone());
        self.set_status(CaptureStatus::Denied);
        self.notify();
        self.finish_acquisition(Err(error));
    }

    fn recorder_options(&self) -> RecorderOptions {
        let mut mime_type = String::new();
        let mut audio_bits_per_second = None;
        let mut video_bits_per_second = None;

        if self.options.audio {
            audio_bits_per_second = Some(self.options.audio_bits_per_second);
            mime_type = self.options.audio_mime_type.clone();
        }
        if self.options.video {
            video_bits_per_second = Some(self.options.video_bits_per_second);
            mime_type = self.options.video_mime_type.clone();
        }

        RecorderOptions {
            mime_type,
            audio_bits_per_second,
            video_bits_per_second,
            timeslice: self.options.segment_duration(),
        }
    }

    fn start(&mut self) {
        if self.recording.is_some() {
            return;
        }
        if !self.session.active {
            self.report(CaptureError::RecorderState(
                "session is not active".to_string(),
            ));
            self.notify();
            return;
        }

        let Some(stream) = self.session.live_stream().cloned() else {
            self.report(CaptureError::RecorderState(
                "no live stream to record".to_string(),
            ));
            self.notify();
            return;
        };
        if self.session.status != CaptureStatus::Previewing {
            self.report(CaptureError::RecorderState(format!(
                "cannot start recording while {:?}",
                self.session.status
            )));
            self.notify();
            return;
        }

        // frozen here so later orientation changes do not affect the artifact
        let dimensions = self.session.live_video.as_ref().map(|v| VideoMeta {
            width: v.width,
            height: v.height,
        });
        let options = self.recorder_options();

        match RecordingHandle::launch(
            self.platform.recorders.as_ref(),
            &stream,
            &options,
            dimensions,
        ) {
            Ok(handle) => {
                info!("Recording stream {} as {}", stream.id, options.mime_type);
                self.recording = Some(handle);
            }
            Err(e) => {
                self.report(e);
                self.notify();
            }
        }
    }

    fn with_recorder(&mut self, op: fn(&mut RecordingHandle) -> Result<()>) {
        let result = match self.recording.as_mut() {
            Some(handle) => op(handle),
            None => Err(CaptureError::RecorderState(
                "no active recorder".to_string(),
            )),
        };
        if let Err(e) = result {
            self.report(e);
            self.notify();
        }
    }

    fn handle_recorder_event(&mut self, event: RecorderEvent) {
        let now = Instant::now();

        match event {
            RecorderEvent::Start | RecorderEvent::Resume => {
                if let Some(handle) = self.recording.as_mut() {
                    handle.segment_started(now);
                }
                self.start_ticker();
                self.set_status(CaptureStatus::Capturing);
                self.notify();
            }
            RecorderEvent::Pause => {
                self.ticker = None;
                if let Some(handle) = self.recording.as_mut() {
                    let accumulated = handle.segment_paused(now);
                    self.session.duration_ms = Some(as_millis(accumulated));
                }
                self.set_status(CaptureStatus::Paused);
                self.notify();
            }
            RecorderEvent::Data(chunk) => {
                debug!("Recorder delivered {} bytes", chunk.len());
                if let Some(handle) = self.recording.as_mut() {
                    handle.push_chunk(chunk.clone());
                }
                if self.options.is_segmented() {
                    self.notifier.chunk(chunk);
                }
            }
            RecorderEvent::Stop => {
                if let Some(handle) = self.recording.take() {
                    self.finalize_recording(handle.finish(now));
                }
            }
        }
    }

    fn finalize_recording(&mut self, finished: FinishedRecording) {
        self.ticker = None;

        if finished.chunks.is_empty() {
            info!("Recording stopped without data");
            self.session.duration_ms = None;
            self.set_status(CaptureStatus::Previewing);
            self.notify();
            if self.session.live_stream().is_none() && self.session.active {
                self.reacquire(Vec::new());
            }
        } else {
            let FinishedRecording {
                chunks,
                duration,
                dimensions,
            } = finished;
            let blob = match chunks.as_slice() {
                [only] => only.clone(),
                _ => Blob::concat(&chunks),
            };
            let handle = self.platform.blobs.create_handle(&blob);
            let duration_ms = as_millis(duration);

            info!(
                "Recording captured: {} bytes in {} chunks, {}ms",
                blob.len(),
                chunks.len(),
                duration_ms
            );

            let media = CapturedMedia {
                handle,
                blob,
                chunks,
                duration_ms,
                width: dimensions.map(|d| d.width),
                height: dimensions.map(|d| d.height),
                captured_at: Utc::now(),
            };
            for prior in [self.session.captured_video.take(), self.session.captured_audio.take()]
                .into_iter()
                .flatten()
            {
                self.platform.blobs.revoke_handle(&prior.handle);
            }
            if dimensions.is_some() {
                self.session.captured_video = Some(media);
            } else {
                self.session.captured_audio = Some(media);
            }
            self.session.duration_ms = Some(duration_ms);
            self.set_status(CaptureStatus::Captured);
            self.notify();
        }

        if self.options.is_segmented() {
            self.notifier.end();
        }
    }

    fn start_ticker(&mut self) {
        let mut ticker = tokio::time::interval_at(Instant::now() + TICK, TICK);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        self.ticker = Some(ticker);
    }

    fn handle_tick(&mut self) {
        if let Some(handle) = self.recording.as_ref() {
            self.session.duration_ms = Some(as_millis(handle.elapsed(Instant::now())));
            self.notify();
        }
    }

    fn snap(&mut self) {
        let Some(video) = self.session.live_video.as_ref() else {
            self.report(CaptureError::Encode("no live video stream".to_string()));
            self.notify();
            return;
        };

        let stream = video.stream.clone();
        let images = Arc::clone(&self.platform.images);
        let events = self.events_tx.clone();
        let mime_type = self.options.image_mime_type.clone();
        let quality = self.options.image_quality;

        tokio::spawn(async move {
            let image: Result<SnappedImage> = async {
                let surface = images.render_frame(&stream).await?;
                let blob = images.encode_surface(&surface, &mime_type, quality).await?;
                Ok(SnappedImage {
                    blob,
                    width: surface.width,
                    height: surface.height,
                })
            }
            .await;

            let _ = events.send(DriverEvent::Snapped {
                stream_id: stream.id,
                image,
            });
        });
    }

    fn snapped(&mut self, stream_id: String, image: Result<SnappedImage>) {
        if !self.session.active {
            debug!("Discarding snapshot of {}: session inactive", stream_id);
            return;
        }
        let same_stream = self
            .session
            .live_video
            .as_ref()
            .is_some_and(|video| video.stream.id == stream_id);
        if !same_stream {
            debug!("Discarding snapshot of {}: stream no longer live", stream_id);
            return;
        }

        match image {
            Ok(image) => {
                if let Some(prior) = self.session.captured_image.take() {
                    self.platform.blobs.revoke_handle(&prior.handle);
                }
                let handle = self.platform.blobs.create_handle(&image.blob);
                info!("Captured {}x{} image", image.width, image.height);
                self.session.captured_image = Some(CapturedImage {
                    handle,
                    blob: image.blob,
                    width: image.width,
                    height: image.height,
                    captured_at: Utc::now(),
                });
                if self.options.capture_image_only
                    && self.session.status == CaptureStatus::Previewing
                {
                    self.set_status(CaptureStatus::Captured);
                }
            }
            Err(e) => self.report(e),
        }
        self.notify();
    }

    fn clear(&mut self) {
        let status = self.session.status;
        if status.is_recording() {
            self.report(CaptureError::RecorderState(
                "cannot clear while recording".to_string(),
            ));
            self.notify();
            return;
        }

        self.discard_artifacts();

        if self.session.live_stream().is_some() {
            if status == CaptureStatus::Captured {
                self.set_status(CaptureStatus::Previewing);
            }
        } else if matches!(
            status,
            CaptureStatus::Captured | CaptureStatus::Denied | CaptureStatus::Idle
        ) {
            self.set_status(CaptureStatus::Idle);
            if self.session.active {
                self.set_status(CaptureStatus::Acquiring);
                self.begin_acquisition(Vec::new());
            }
        }
        self.notify();
    }

    fn handle_signal(&mut self, signal: EnvironmentSignal) {
        if !self.watching_devices {
            debug!("Ignoring {:?}: not watching", signal);
            return;
        }

        match signal {
            EnvironmentSignal::DeviceListChanged => self.scan_devices(),
            EnvironmentSignal::TrackEnded { track_id } => self.track_ended(&track_id),
            EnvironmentSignal::OrientationChanged => self.orientation.orientation_changed(),
            EnvironmentSignal::Resized => {
                if self.orientation.take_resize() {
                    self.remeasure();
                }
            }
        }
    }

    fn scan_devices(&mut self) {
        if self.scanning_devices {
            debug!("Device scan already in flight, dropping signal");
            return;
        }
        self.scanning_devices = true;

        let backend = Arc::clone(&self.platform.backend);
        let events = self.events_tx.clone();
        let constraints = MediaConstraints::new(self.options.video, self.options.audio);

        tokio::spawn(async move {
            let devices = acquire::fetch_devices(backend.as_ref(), &constraints).await;
            let _ = events.send(DriverEvent::DevicesScanned(devices));
        });
    }

    fn devices_scanned(&mut self, devices: Result<Vec<Device>>) {
        self.scanning_devices = false;
        if !self.watching_devices {
            return;
        }

        let devices = match devices {
            Ok(devices) => devices,
            Err(e) => {
                warn!("Device rescan failed: {}", e);
                return;
            }
        };

        let adopt = self.options.choose_new_device && self.session.status.accepts_new_device();
        let new_device = if adopt {
            first_new_device(&self.session.devices, &devices).map(|d| d.id.clone())
        } else {
            None
        };
        self.session.devices = devices;

        match new_device {
            Some(device_id) => {
                info!("New device {} detected", device_id);
                let (reply, _) = oneshot::channel();
                self.choose(device_id, reply);
            }
            None => self.notify(),
        }
    }

    fn track_ended(&mut self, track_id: &str) {
        let held = self
            .session
            .live_stream()
            .is_some_and(|stream| stream.has_track(track_id));
        if !held {
            return;
        }

        warn!("Track {} ended unexpectedly", track_id);
        match self.session.status {
            CaptureStatus::Previewing => self.reacquire(Vec::new()),
            CaptureStatus::Capturing | CaptureStatus::Paused => {
                self.release_input();
                let stopping = self
                    .recording
                    .as_ref()
                    .is_some_and(RecordingHandle::is_finalizing);
                if !stopping {
                    self.with_recorder(RecordingHandle::stop);
                }
                self.notify();
            }
            _ => {}
        }
    }

    fn remeasure(&mut self) {
        let Some(video) = self.session.live_video.as_ref() else {
            return;
        };

        let stream = video.stream.clone();
        let backend = Arc::clone(&self.platform.backend);
        let events = self.events_tx.clone();

        tokio::spawn(async move {
            let meta = backend.read_video_meta(&stream).await;
            let _ = events.send(DriverEvent::Remeasured {
                stream_id: stream.id,
                meta,
            });
        });
    }

    fn remeasured(&mut self, stream_id: String, meta: Result<VideoMeta>) {
        let meta = match meta {
            Ok(meta) => meta,
            Err(e) => {
                warn!("Unable to re-measure stream {}: {}", stream_id, e);
                return;
            }
        };

        let Some(video) = self.session.live_video.as_mut() else {
            return;
        };
        if video.stream.id != stream_id {
            return;
        }
        if video.width != meta.width || video.height != meta.height {
            debug!("Live video now {}x{}", meta.width, meta.height);
            video.width = meta.width;
            video.height = meta.height;
            self.notify();
        }
    }

    fn watch_volume(&mut self, stream: &MediaStream) {
        let (buffers_tx, buffers_rx) = mpsc::unbounded_channel();
        match self.platform.backend.open_audio_tap(stream, buffers_tx) {
            Some(tap) => self.meter = Some(VolumeMeter::new(tap, buffers_rx)),
            None => debug!("Audio metering unavailable"),
        }
    }

    fn handle_audio(&mut self, buffer: AudioBuffer) {
        let volume = peak_volume(&buffer.samples);
        if self.session.volume != Some(volume) {
            self.session.volume = Some(volume);
            self.notify();
        }
    }

    fn handle_event(&mut self, event: DriverEvent) {
        match event {
            DriverEvent::StreamOpened {
                generation,
                devices,
                device_id,
                stream,
            } => self.stream_opened(generation, devices, device_id, stream),
            DriverEvent::StreamReady {
                generation,
                stream,
                meta,
            } => self.stream_ready(generation, stream, meta),
            DriverEvent::AcquireFailed { generation, error } => {
                self.acquire_failed(generation, error)
            }
            DriverEvent::DevicesScanned(devices) => self.devices_scanned(devices),
            DriverEvent::Remeasured { stream_id, meta } => self.remeasured(stream_id, meta),
            DriverEvent::Snapped { stream_id, image } => self.snapped(stream_id, image),
            DriverEvent::ReleaseDue { ticket } => {
                if self
                    .pending_release
                    .as_ref()
                    .is_some_and(|p| p.ticket == ticket)
                {
                    self.pending_release = None;
                    self.finish_release();
                    self.notify();
                }
            }
        }
    }

    fn set_status(&mut self, next: CaptureStatus) {
        let current = self.session.status;
        if current == next {
            return;
        }
        if !current.allows(next) {
            warn!("Unexpected status transition {:?} -> {:?}", current, next);
        }
        debug!("Status {:?} -> {:?}", current, next);
        self.session.status = next;
    }

    fn report(&mut self, error: CaptureError) {
        if self.options.silent {
            debug!("Capture error: {}", error);
        } else {
            error!("Capture error: {}", error);
        }
        self.session.last_error = Some(error);
    }

    fn notify(&mut self) {
        self.notifier.change(&self.session);
    }
}

fn as_millis(duration: Duration) -> u64 {
    duration.as_millis() as u64
}

async fn next_recorder_event(recording: &mut Option<RecordingHandle>) -> RecorderEvent {
    match recording {
        Some(handle) => handle.next_event().await,
        None => std::future::pending().await,
    }
}

async fn next_audio_buffer(meter: &mut Option<VolumeMeter>) -> AudioBuffer {
    match meter {
        Some(meter) => meter.next_buffer().await,
        None => std::future::pending().await,
    }
}

async fn next_tick(ticker: &mut Option<Interval>) {
    match ticker {
        Some(ticker) => {
            ticker.tick().await;
        }
        None => std::future::pending().await,
    }
}
