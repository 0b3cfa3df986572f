use std::io::Cursor;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error};

use crate::error::{CaptureError, Result};
use crate::platform::{Blob, MediaStream, Recorder, RecorderEvent, RecorderFactory, RecorderOptions};

const SAMPLE_RATE: u32 = 16000;
const TONE_HZ: f32 = 440.0;

/// Recorder factory producing WAV-encoded test tones
#[derive(Debug, Default)]
pub struct SimRecorderFactory;

impl RecorderFactory for SimRecorderFactory {
    fn create_recorder(
        &self,
        stream: &MediaStream,
        options: &RecorderOptions,
        events: mpsc::UnboundedSender<RecorderEvent>,
    ) -> Result<Box<dyn Recorder>> {
        debug!("Creating simulated recorder for stream {}", stream.id);
        Ok(Box::new(SimRecorder {
            tape: Arc::new(Mutex::new(Tape::default())),
            mime_type: options.mime_type.clone(),
            events,
            segmenter: None,
        }))
    }
}

/// Recorded-but-not-yet-delivered time
#[derive(Debug, Default)]
struct Tape {
    state: TapeState,
    running_since: Option<Instant>,
    pending: Duration,
    samples_written: u64,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
enum TapeState {
    #[default]
    Inactive,
    Recording,
    Paused,
}

impl Tape {
    fn fold(&mut self) {
        if let Some(since) = self.running_since.take() {
            self.pending += since.elapsed();
        }
        if self.state == TapeState::Recording {
            self.running_since = Some(Instant::now());
        }
    }

    /// Encode everything recorded since the last flush
    fn flush(&mut self, mime_type: &str) -> Option<Blob> {
        self.fold();
        let sample_count = (self.pending.as_secs_f64() * SAMPLE_RATE as f64) as u64;
        self.pending = Duration::ZERO;
        if sample_count == 0 {
            return None;
        }

        let offset = self.samples_written;
        self.samples_written += sample_count;
        match encode_tone(offset, sample_count) {
            Ok(bytes) => Some(Blob::new(mime_type, bytes)),
            Err(e) => {
                error!("Failed to encode simulated audio: {}", e);
                None
            }
        }
    }
}

fn encode_tone(offset: u64, sample_count: u64) -> std::result::Result<Vec<u8>, hound::Error> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: SAMPLE_RATE,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer = hound::WavWriter::new(&mut cursor, spec)?;
        for n in offset..offset + sample_count {
            let t = n as f32 / SAMPLE_RATE as f32;
            let sample = (t * TONE_HZ * std::f32::consts::TAU).sin() * 0.3;
            writer.write_sample((sample * i16::MAX as f32) as i16)?;
        }
        writer.finalize()?;
    }

    Ok(cursor.into_inner())
}

struct SimRecorder {
    tape: Arc<Mutex<Tape>>,
    mime_type: String,
    events: mpsc::UnboundedSender<RecorderEvent>,
    /// Delivers a chunk every timeslice
    segmenter: Option<JoinHandle<()>>,
}

impl SimRecorder {
    fn transition(&self, from: TapeState, to: TapeState) -> Result<()> {
        let mut tape = self.tape.lock().map_err(|_| poisoned())?;
        if tape.state != from {
            return Err(CaptureError::RecorderState(format!(
                "recorder is {:?}, expected {:?}",
                tape.state, from
            )));
        }
        tape.fold();
        tape.state = to;
        tape.running_since = (to == TapeState::Recording).then(Instant::now);
        Ok(())
    }
}

impl Recorder for SimRecorder {
    fn start(&mut self, timeslice: Option<Duration>) -> Result<()> {
        self.transition(TapeState::Inactive, TapeState::Recording)?;
        let _ = self.events.send(RecorderEvent::Start);

        if let Some(timeslice) = timeslice {
            let tape = Arc::clone(&self.tape);
            let events = self.events.clone();
            let mime_type = self.mime_type.clone();
            self.segmenter = Some(tokio::spawn(async move {
                let mut ticker = tokio::time::interval(timeslice);
                ticker.tick().await;
                loop {
                    ticker.tick().await;
                    let chunk = match tape.lock() {
                        Ok(mut tape) => tape.flush(&mime_type),
                        Err(_) => break,
                    };
                    if let Some(chunk) = chunk {
                        if events.send(RecorderEvent::Data(chunk)).is_err() {
                            break;
                        }
                    }
                }
            }));
        }
        Ok(())
    }

    fn pause(&mut self) -> Result<()> {
        self.transition(TapeState::Recording, TapeState::Paused)?;
        let _ = self.events.send(RecorderEvent::Pause);
        Ok(())
    }

    fn resume(&mut self) -> Result<()> {
        self.transition(TapeState::Paused, TapeState::Recording)?;
        let _ = self.events.send(RecorderEvent::Resume);
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        if let Some(segmenter) = self.segmenter.take() {
            segmenter.abort();
        }

        let chunk = {
            let mut tape = self.tape.lock().map_err(|_| poisoned())?;
            if tape.state == TapeState::Inactive {
                return Err(CaptureError::RecorderState(
                    "recorder is not running".to_string(),
                ));
            }
            tape.fold();
            tape.state = TapeState::Inactive;
            tape.running_since = None;
            tape.flush(&self.mime_type)
        };

        if let Some(chunk) = chunk {
            let _ = self.events.send(RecorderEvent::Data(chunk));
        }
        let _ = self.events.send(RecorderEvent::Stop);
        Ok(())
    }
}

impl Drop for SimRecorder {
    fn drop(&mut self) {
        if let Some(segmenter) = self.segmenter.take() {
            segmenter.abort();
        }
    }
}

fn poisoned() -> CaptureError {
    CaptureError::RecorderState("recorder state poisoned".to_string())
}
