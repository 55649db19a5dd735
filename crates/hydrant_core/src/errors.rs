//! Error Types
//!
//! This module defines the error types used throughout the delegate.
//!
//! # Overview
//!
//! The main error type [`HydrantError`] covers the failure modes that are
//! allowed to surface as `Err`:
//! - Backend node creation failures (when a caller asks for a hard failure)
//! - Render failures reported by the backend
//! - Session lifecycle misuse
//! - Settings parsing and validation
//!
//! Most of the synchronization core is deliberately infallible: a missing
//! node is reported as `None`, a stale lookup is reported as `None`, and a
//! dangling dependency is resolved by re-syncing its sources.
//!
//! ```rust,ignore
//! use hydrant_core::errors::{HydrantError, Result};
//!
//! fn load() -> Result<DelegateSettings> {
//!     DelegateSettings::from_json("{\"fps\": 30.0}")
//! }
//! ```

use std::fmt;

use thiserror::Error;

/// The main error type for the delegate.
#[derive(Error, Debug)]
pub enum HydrantError {
    // ========================================================================
    // Backend Errors
    // ========================================================================
    /// The backend refused to allocate a node.
    #[error("Failed to create node '{name}' of type '{node_type}'")]
    NodeCreationFailed {
        /// Requested node type
        node_type: String,
        /// Requested node name
        name: String,
    },

    /// The backend render session terminated with a failure.
    #[error("Render failed: {0}")]
    RenderFailed(RenderFailure),

    /// An operation required an active backend session.
    #[error("Render session is not active")]
    SessionInactive,

    // ========================================================================
    // Scene Graph Errors
    // ========================================================================
    /// The factory has no adapter for this primitive type.
    #[error("Unknown primitive type: {0}")]
    UnknownPrimType(String),

    // ========================================================================
    // Configuration Errors
    // ========================================================================
    /// A settings value is out of range.
    #[error("Invalid settings: {0}")]
    InvalidSettings(String),

    /// Settings JSON could not be parsed.
    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    /// File I/O error (debug scene dumps).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Why the backend ended a render session.
///
/// Every kind maps to a distinct, human-readable warning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RenderFailure {
    /// The render was aborted.
    Aborted,
    /// No camera was defined in the scene.
    NoCamera,
    /// The camera data was invalid.
    BadCamera,
    /// Usage could not be validated (licensing).
    ValidationFailed,
    /// The render region is outside the image.
    InvalidRenderRegion,
    /// The user interrupted the render.
    InterruptedByUser,
    /// No render outputs were declared.
    NoOutputs,
    /// The requested render device could not be initialized.
    DeviceUnavailable,
    /// Any other error.
    Generic,
}

impl fmt::Display for RenderFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            RenderFailure::Aborted => "Render was aborted.",
            RenderFailure::NoCamera => "Camera not defined.",
            RenderFailure::BadCamera => "Bad camera data.",
            RenderFailure::ValidationFailed => "Usage not validated.",
            RenderFailure::InvalidRenderRegion => "Invalid render region.",
            RenderFailure::InterruptedByUser => "Render interrupted by user.",
            RenderFailure::NoOutputs => "No rendering outputs.",
            RenderFailure::DeviceUnavailable => "Cannot create GPU context.",
            RenderFailure::Generic => "Generic error.",
        };
        f.write_str(msg)
    }
}

impl From<RenderFailure> for HydrantError {
    fn from(failure: RenderFailure) -> Self {
        HydrantError::RenderFailed(failure)
    }
}

/// Alias for `Result<T, HydrantError>`.
pub type Result<T> = std::result::Result<T, HydrantError>;
