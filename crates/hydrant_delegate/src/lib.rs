//! # Hydrant Delegate
//!
//! Incremental synchronization of a scene graph into an offline renderer:
//!
//! - [`DependencyGraph`]: cross-primitive invalidation, drained once per tick
//! - [`RenderStateMachine`]: the stop → mutate → resume render protocol
//! - [`RenderDelegateCore`]: the orchestrator and primitive factory
//! - [`SyncPrim`] and the [`prims`] adapters: per-primitive translation
//! - [`instancer`]: per-instance transforms and nested instancer chains
//! - [`RenderIndex`]: a host driver running sync and render ticks

pub mod delegate;
pub mod dependency;
pub mod instancer;
pub mod prim;
pub mod prims;
pub mod render_index;
pub mod render_state;
pub mod scene;

pub use delegate::{COMMANDS, Command, MaterialTerminals, RenderDelegateCore};
pub use dependency::DependencyGraph;
pub use instancer::{InstancePrimvarSet, InstanceSamples, InstancerAdapter};
pub use prim::{InstancerMap, PrimAdapter, PrimKind, SyncContext, SyncPrim};
pub use prims::{CameraAdapter, LightAdapter, MaterialAdapter, ShapeAdapter};
pub use render_index::RenderIndex;
pub use render_state::{RenderOutcome, RenderStateMachine};
pub use scene::{MaterialNetwork, SceneDelegate, ShaderDesc, ShaderInput, StaticScene};
