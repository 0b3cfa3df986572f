//! Device acquisition flow
//!
//! Runs outside the driver: enumerates devices (unlocking labels when the
//! platform hides them), picks one, opens a stream and resolves its video
//! dimensions. Each step is reported back to the driver as a
//! [`DriverEvent`] tagged with the attempt's generation, so the driver can
//! discard results from attempts that were superseded in the meantime.

use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info};

use super::driver::DriverEvent;
use crate::error::{CaptureError, Result};
use crate::platform::{CaptureBackend, Device, MediaConstraints, MediaStream};

/// Everything an acquisition attempt needs, captured when it is launched
#[derive(Debug, Clone)]
pub(crate) struct AcquireRequest {
    pub generation: u64,
    pub constraints: MediaConstraints,
    /// Pinned device id, or the configured preference
    pub preferred: Option<String>,
}

/// Pick a device: exact id match, then a case-insensitive label match, then
/// the first device listed.
pub fn choose_device<'a>(devices: &'a [Device], preferred: Option<&str>) -> Option<&'a Device> {
    if let Some(preferred) = preferred {
        if let Some(device) = devices.iter().find(|d| d.id == preferred) {
            return Some(device);
        }

        let fragment = preferred.to_lowercase();
        if let Some(device) = devices
            .iter()
            .find(|d| d.label.to_lowercase().contains(&fragment))
        {
            return Some(device);
        }
    }

    devices.first()
}

/// Enumerate devices matching the constraints.
///
/// When every device comes back without a label, permission has not been
/// granted yet: a throwaway stream is opened to trigger the grant, released
/// at once, and the list is read again.
pub(crate) async fn fetch_devices(
    backend: &dyn CaptureBackend,
    constraints: &MediaConstraints,
) -> Result<Vec<Device>> {
    let Some(kind) = constraints.device_kind() else {
        return Ok(Vec::new());
    };

    let devices = backend.enumerate_devices(kind).await;
    let labelless = !devices.is_empty() && devices.iter().all(|d| d.label.is_empty());
    if !labelless {
        return Ok(devices);
    }

    debug!("Device labels hidden, requesting permission");
    let stream = backend.request_stream(constraints).await?;
    backend.stop_stream(&stream);

    Ok(backend.enumerate_devices(kind).await)
}

/// Run one acquisition attempt to completion, reporting each stage
pub(crate) async fn run(
    backend: Arc<dyn CaptureBackend>,
    request: AcquireRequest,
    events: mpsc::UnboundedSender<DriverEvent>,
) {
    let generation = request.generation;

    let outcome = acquire_stream(backend.as_ref(), &request).await;
    let (stream, wants_video) = match outcome {
        Ok((devices, device_id, stream)) => {
            let wants_video = request.constraints.video.is_enabled();
            let ready = DriverEvent::StreamOpened {
                generation,
                devices,
                device_id,
                stream: stream.clone(),
            };
            if events.send(ready).is_err() {
                backend.stop_stream(&stream);
                return;
            }
            (stream, wants_video)
        }
        Err(error) => {
            let _ = events.send(DriverEvent::AcquireFailed { generation, error });
            return;
        }
    };

    if !wants_video {
        let _ = events.send(DriverEvent::StreamReady {
            generation,
            stream,
            meta: None,
        });
        return;
    }

    match backend.read_video_meta(&stream).await {
        Ok(meta) => {
            info!("Video stream ready: {}x{}", meta.width, meta.height);
            let _ = events.send(DriverEvent::StreamReady {
                generation,
                stream,
                meta: Some(meta),
            });
        }
        Err(error) => {
            backend.stop_stream(&stream);
            let _ = events.send(DriverEvent::AcquireFailed { generation, error });
        }
    }
}

async fn acquire_stream(
    backend: &dyn CaptureBackend,
    request: &AcquireRequest,
) -> Result<(Vec<Device>, Option<String>, MediaStream)> {
    if request.constraints.device_kind().is_none() {
        return Err(CaptureError::PermissionOrDevice(
            "neither video nor audio requested".to_string(),
        ));
    }

    let devices = fetch_devices(backend, &request.constraints).await?;
    let device_id = choose_device(&devices, request.preferred.as_deref()).map(|d| d.id.clone());

    let constraints = match &device_id {
        Some(id) => request.constraints.clone().pinned_to(id),
        None => request.constraints.clone(),
    };

    debug!("Requesting stream with {:?}", constraints);
    let stream = backend.request_stream(&constraints).await?;

    Ok((devices, device_id, stream))
}
