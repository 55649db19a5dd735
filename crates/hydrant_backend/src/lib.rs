//! # Hydrant Backend
//!
//! The boundary between the synchronization core and the offline renderer:
//!
//! - [`RenderBackend`]: the narrow renderer API the core calls
//! - [`SessionContext`]: the ref-counted, process-wide render session
//! - [`NodeHandleRegistry`]: node creation, reuse, lookup and destruction
//! - [`MemoryBackend`]: an in-process backend for tests and headless hosts

pub mod api;
pub mod context;
pub mod memory;
pub mod param;
pub mod registry;
pub mod status;

pub use api::{NodeId, RenderBackend};
pub use context::SessionContext;
pub use memory::{BackendCounters, MemoryBackend};
pub use param::ParamValue;
pub use registry::{NodeHandle, NodeHandleRegistry, OwnershipMode};
pub use status::{BackendStatus, RenderErrorCode};
