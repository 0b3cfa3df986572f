use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;

use crate::error::{CaptureError, Result};
use crate::platform::{
    Blob, MediaStream, Recorder, RecorderEvent, RecorderFactory, RecorderOptions, VideoMeta,
};

/// Lifecycle of the platform recorder, as far as the session knows it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum RecorderPhase {
    /// `start()` issued, start callback pending
    Starting,
    Recording,
    Paused,
    /// `stop()` issued, stop callback pending
    Finalizing,
}

/// What a finished recording leaves behind
#[derive(Debug)]
pub(crate) struct FinishedRecording {
    pub chunks: Vec<Blob>,
    pub duration: Duration,
    pub dimensions: Option<VideoMeta>,
}

/// Transient state of an in-progress recording
pub(crate) struct RecordingHandle {
    recorder: Box<dyn Recorder>,
    events: Option<mpsc::UnboundedReceiver<RecorderEvent>>,
    phase: RecorderPhase,
    /// Start of the current unpaused segment
    segment_start: Option<Instant>,
    /// Time recorded in earlier segments
    accumulated: Duration,
    chunks: Vec<Blob>,
    /// Dimensions frozen when recording began
    dimensions: Option<VideoMeta>,
}

impl RecordingHandle {
    /// Create a recorder for the stream and ask it to start
    pub(crate) fn launch(
        factory: &dyn RecorderFactory,
        stream: &MediaStream,
        options: &RecorderOptions,
        dimensions: Option<VideoMeta>,
    ) -> Result<Self> {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let mut recorder = factory.create_recorder(stream, options, events_tx)?;
        recorder.start(options.timeslice)?;

        Ok(Self {
            recorder,
            events: Some(events_rx),
            phase: RecorderPhase::Starting,
            segment_start: None,
            accumulated: Duration::ZERO,
            chunks: Vec::new(),
            dimensions,
        })
    }

    #[cfg(test)]
    pub(crate) fn phase(&self) -> RecorderPhase {
        self.phase
    }

    /// `stop()` has been issued; only the stop callback is outstanding
    pub(crate) fn is_finalizing(&self) -> bool {
        self.phase == RecorderPhase::Finalizing
    }

    pub(crate) fn pause(&mut self) -> Result<()> {
        match self.phase {
            RecorderPhase::Starting | RecorderPhase::Recording => self.recorder.pause(),
            phase => Err(CaptureError::RecorderState(format!(
                "cannot pause a recorder that is {:?}",
                phase
            ))),
        }
    }

    pub(crate) fn resume(&mut self) -> Result<()> {
        match self.phase {
            RecorderPhase::Paused => self.recorder.resume(),
            phase => Err(CaptureError::RecorderState(format!(
                "cannot resume a recorder that is {:?}",
                phase
            ))),
        }
    }

    pub(crate) fn stop(&mut self) -> Result<()> {
        if self.phase == RecorderPhase::Finalizing {
            return Err(CaptureError::RecorderState(
                "recorder is already stopping".to_string(),
            ));
        }
        self.recorder.stop()?;
        self.phase = RecorderPhase::Finalizing;
        Ok(())
    }

    /// Stop without waiting for callbacks; further events are discarded
    pub(crate) fn abandon(mut self) {
        self.events = None;
        if self.phase != RecorderPhase::Finalizing {
            let _ = self.recorder.stop();
        }
    }

    /// Start and resume callbacks open a new segment
    pub(crate) fn segment_started(&mut self, now: Instant) {
        self.segment_start = Some(now);
        if self.phase != RecorderPhase::Finalizing {
            self.phase = RecorderPhase::Recording;
        }
    }

    /// Fold the current segment into the accumulated time
    pub(crate) fn segment_paused(&mut self, now: Instant) -> Duration {
        self.accumulated = self.elapsed(now);
        self.segment_start = None;
        if self.phase != RecorderPhase::Finalizing {
            self.phase = RecorderPhase::Paused;
        }
        self.accumulated
    }

    /// Recorded time so far, paused time excluded
    pub(crate) fn elapsed(&self, now: Instant) -> Duration {
        let running = self
            .segment_start
            .map(|start| now.saturating_duration_since(start))
            .unwrap_or_default();
        self.accumulated + running
    }

    pub(crate) fn push_chunk(&mut self, chunk: Blob) {
        self.chunks.push(chunk);
    }

    pub(crate) fn finish(self, now: Instant) -> FinishedRecording {
        FinishedRecording {
            duration: self.elapsed(now),
            chunks: self.chunks,
            dimensions: self.dimensions,
        }
    }

    /// Next recorder callback; pends forever once the recorder hung up
    pub(crate) async fn next_event(&mut self) -> RecorderEvent {
        if let Some(events) = self.events.as_mut() {
            if let Some(event) = events.recv().await {
                return event;
            }
            self.events = None;
        }
        std::future::pending().await
    }
}
