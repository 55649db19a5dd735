//! Delegate Settings
//!
//! Runtime configuration for a render delegate instance.
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use hydrant_core::DelegateSettings;
//!
//! // Interactive viewport defaults
//! let settings = DelegateSettings::default();
//!
//! // Batch render at 30 fps with a wider shutter
//! let settings = DelegateSettings {
//!     fps: 30.0,
//!     shutter: [-0.5, 0.5],
//!     batch: true,
//!     ..Default::default()
//! };
//! ```

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::errors::{HydrantError, Result};

/// Configuration for one render delegate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DelegateSettings {
    /// Frames per second used to convert velocities into per-frame motion.
    pub fps: f32,

    /// Shutter interval, in frames relative to the current frame.
    pub shutter: [f32; 2],

    /// Batch (non-interactive) rendering.
    ///
    /// Interrupts are skipped entirely and render tags are never tracked,
    /// since the scene is translated exactly once.
    pub batch: bool,

    /// Render tags whose primitives are enabled.
    pub render_tags: Vec<String>,

    /// When set, the backend scene is written to this path before each
    /// render begin, restart or resume.
    pub debug_scene: Option<PathBuf>,

    /// Name of an enclosing procedural node.
    ///
    /// When present, node lifetime belongs to that procedural: destroyed
    /// nodes are disabled instead of freed.
    pub procedural_parent: Option<String>,
}

impl Default for DelegateSettings {
    fn default() -> Self {
        Self {
            fps: 24.0,
            shutter: [-0.25, 0.25],
            batch: false,
            render_tags: vec!["geometry".to_owned()],
            debug_scene: None,
            procedural_parent: None,
        }
    }
}

impl DelegateSettings {
    /// Parses and validates settings from JSON. Missing fields take their
    /// default values.
    pub fn from_json(json: &str) -> Result<Self> {
        let settings: Self = serde_json::from_str(json)?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.fps > 0.0) {
            return Err(HydrantError::InvalidSettings(format!(
                "fps must be positive, got {}",
                self.fps
            )));
        }
        if self.shutter[0] > self.shutter[1] {
            return Err(HydrantError::InvalidSettings(format!(
                "shutter open {} is after shutter close {}",
                self.shutter[0], self.shutter[1]
            )));
        }
        Ok(())
    }

    #[inline]
    #[must_use]
    pub fn has_render_tag(&self, tag: &str) -> bool {
        self.render_tags.iter().any(|t| t == tag)
    }
}
