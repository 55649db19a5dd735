//! # Hydrant Core
//!
//! Foundational types shared by every Hydrant crate:
//!
//! - [`PrimPath`]: interned scene-graph paths
//! - [`DirtyBits`]: the change-tracking vocabulary
//! - [`Value`] / [`SampledValue`]: type-erased values and time samples
//! - [`DelegateSettings`]: runtime configuration
//! - [`ChangeTracker`]: the host change-tracker contract
//! - [`HydrantError`]: the error type

pub mod dirty;
pub mod errors;
pub mod path;
pub mod sampled;
pub mod settings;
pub mod tracker;
pub mod value;

pub use dirty::DirtyBits;
pub use errors::{HydrantError, RenderFailure, Result};
pub use path::PrimPath;
pub use sampled::{MAX_SAMPLES, Resample, SampledValue};
pub use settings::DelegateSettings;
pub use tracker::{ChangeTracker, MemoryChangeTracker, TrackedKind};
pub use value::{FromValue, Value};
