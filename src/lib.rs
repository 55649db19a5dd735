#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]

//! # Hydrant
//!
//! Incremental synchronization core of a render delegate: it mirrors a
//! scene graph into an offline renderer node by node, tracks cross-primitive
//! dependencies, and drives the renderer's asynchronous render loop.
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use hydrant::prelude::*;
//!
//! let backend = Arc::new(MemoryBackend::new());
//! let scene = Arc::new(StaticScene::new());
//! let mut index = RenderIndex::new(
//!     SessionContext::new(backend),
//!     DelegateSettings::default(),
//!     scene.clone(),
//! )?;
//!
//! index.insert_prim(PrimKind::Mesh, PrimPath::new("/World/Mesh"));
//! while index.tick([-0.25, 0.25]).is_none() {}
//! ```

pub use hydrant_backend as backend;
pub use hydrant_core as core;
pub use hydrant_delegate as delegate;

pub use hydrant_backend::{
    BackendStatus, MemoryBackend, NodeHandle, NodeHandleRegistry, NodeId, OwnershipMode,
    ParamValue, RenderBackend, RenderErrorCode, SessionContext,
};
pub use hydrant_core::{
    ChangeTracker, DelegateSettings, DirtyBits, HydrantError, MemoryChangeTracker, PrimPath,
    RenderFailure, Result, SampledValue, TrackedKind, Value,
};
pub use hydrant_delegate::{
    DependencyGraph, MaterialNetwork, PrimKind, RenderDelegateCore, RenderIndex, RenderOutcome,
    RenderStateMachine, SceneDelegate, ShaderDesc, StaticScene, SyncContext, SyncPrim,
};

pub mod prelude {
    pub use crate::{
        DelegateSettings, DirtyBits, MemoryBackend, PrimKind, PrimPath, RenderIndex,
        RenderOutcome, SceneDelegate, SessionContext, StaticScene,
    };
}
