//! Backend render status and session end codes.

use hydrant_core::RenderFailure;

/// Status of the backend's own asynchronous render loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum BackendStatus {
    #[default]
    NotStarted,
    Rendering,
    Paused,
    Restarting,
    Finished,
    Failed,
}

/// Code returned by the backend when a render session ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum RenderErrorCode {
    #[default]
    Success,
    Abort,
    NoCamera,
    BadCamera,
    Validation,
    RenderRegion,
    Interrupt,
    NoOutputs,
    UnavailableDevice,
    Error,
}

impl RenderErrorCode {
    /// Classifies the end code; `None` for a clean end.
    #[must_use]
    pub fn failure(self) -> Option<RenderFailure> {
        match self {
            RenderErrorCode::Success => None,
            RenderErrorCode::Abort => Some(RenderFailure::Aborted),
            RenderErrorCode::NoCamera => Some(RenderFailure::NoCamera),
            RenderErrorCode::BadCamera => Some(RenderFailure::BadCamera),
            RenderErrorCode::Validation => Some(RenderFailure::ValidationFailed),
            RenderErrorCode::RenderRegion => Some(RenderFailure::InvalidRenderRegion),
            RenderErrorCode::Interrupt => Some(RenderFailure::InterruptedByUser),
            RenderErrorCode::NoOutputs => Some(RenderFailure::NoOutputs),
            RenderErrorCode::UnavailableDevice => Some(RenderFailure::DeviceUnavailable),
            RenderErrorCode::Error => Some(RenderFailure::Generic),
        }
    }
}
