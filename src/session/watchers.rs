use tokio::sync::mpsc;

use crate::platform::{AudioBuffer, AudioTap, Device};

/// Peak absolute magnitude of a buffer, scaled to 0-100
pub fn peak_volume(samples: &[f32]) -> u8 {
    let peak = samples
        .iter()
        .map(|s| s.abs())
        .fold(0.0_f32, f32::max)
        .min(1.0);
    (peak * 100.0).round() as u8
}

/// First device in `after` whose id is absent from `before`
pub fn first_new_device<'a>(before: &[Device], after: &'a [Device]) -> Option<&'a Device> {
    after
        .iter()
        .find(|device| !before.iter().any(|prior| prior.id == device.id))
}

/// Orientation changes are applied on the following resize, once the
/// platform reports dimensions for the new orientation.
#[derive(Debug, Default)]
pub(crate) struct OrientationDebounce {
    dirty: bool,
}

impl OrientationDebounce {
    pub(crate) fn orientation_changed(&mut self) {
        self.dirty = true;
    }

    /// Whether this resize should trigger a re-measure
    pub(crate) fn take_resize(&mut self) -> bool {
        std::mem::take(&mut self.dirty)
    }
}

/// Audio tap plus the buffers it delivers
pub(crate) struct VolumeMeter {
    tap: Box<dyn AudioTap>,
    buffers: Option<mpsc::UnboundedReceiver<AudioBuffer>>,
}

impl VolumeMeter {
    pub(crate) fn new(tap: Box<dyn AudioTap>, buffers: mpsc::UnboundedReceiver<AudioBuffer>) -> Self {
        Self {
            tap,
            buffers: Some(buffers),
        }
    }

    pub(crate) fn close(mut self) {
        self.tap.close();
    }

    pub(crate) async fn next_buffer(&mut self) -> AudioBuffer {
        if let Some(buffers) = self.buffers.as_mut() {
            if let Some(buffer) = buffers.recv().await {
                return buffer;
            }
            self.buffers = None;
        }
        std::future::pending().await
    }
}
