use serde::Serialize;

/// Failures surfaced by a capture session.
///
/// Collaborators report through these variants as well, so the session can
/// store the most recent one in `last_error` without losing its category.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, thiserror::Error)]
#[serde(tag = "kind", content = "message", rename_all = "snake_case")]
pub enum CaptureError {
    /// Access to the device was denied, or no device could be opened
    #[error("permission or device error: {0}")]
    PermissionOrDevice(String),

    /// Stream dimensions could not be determined
    #[error("unable to obtain stream metadata: {0}")]
    Metadata(String),

    /// Operation is invalid for the current recorder state
    #[error("invalid recorder state: {0}")]
    RecorderState(String),

    /// Still-image rendering or encoding failed
    #[error("image encoding failed: {0}")]
    Encode(String),

    /// The controller went away or the session was deactivated while the
    /// operation was still pending
    #[error("operation cancelled")]
    Cancelled,
}

pub type Result<T> = std::result::Result<T, CaptureError>;
