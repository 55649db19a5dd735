//! The renderer backend contract.
//!
//! The offline renderer is reached through a narrow, C-like surface: create,
//! destroy and look up nodes, set parameters, and drive one asynchronous
//! render session. Everything the synchronization core needs from the
//! renderer goes through [`RenderBackend`].
//!
//! Contract:
//! - node functions tolerate stale ids (they become no-ops / `None`);
//! - [`RenderBackend::render_status`] is a small closed enum;
//! - [`RenderBackend::render_interrupt`] blocks until the backend's worker
//!   threads have stopped touching the scene.

use std::path::Path;

use slotmap::new_key_type;

use crate::param::ParamValue;
use crate::status::{BackendStatus, RenderErrorCode};

new_key_type! {
    /// Opaque identifier of a backend node.
    pub struct NodeId;
}

pub trait RenderBackend: Send + Sync {
    // === Session ===

    fn begin_session(&self);

    fn end_session(&self);

    // === Nodes ===

    /// Allocates a node. `parent` is the enclosing procedural, if any.
    /// Returns `None` when the type is unknown or allocation fails.
    fn create_node(&self, node_type: &str, name: &str, parent: Option<NodeId>) -> Option<NodeId>;

    /// Frees a node. Returns `false` when `node` was not alive.
    fn destroy_node(&self, node: NodeId) -> bool;

    /// Resets every parameter of `node` to its default.
    fn reset_node(&self, node: NodeId);

    fn set_disabled(&self, node: NodeId, disabled: bool);

    fn is_disabled(&self, node: NodeId) -> bool;

    /// Global name lookup, scoped to `parent` first when given.
    fn lookup_node(&self, name: &str, parent: Option<NodeId>) -> Option<NodeId>;

    /// Procedural parent recorded for `node`.
    fn node_parent(&self, node: NodeId) -> Option<NodeId>;

    /// Type name of a live node.
    fn node_type(&self, node: NodeId) -> Option<String>;

    fn set_param(&self, node: NodeId, name: &str, value: ParamValue);

    fn reset_param(&self, node: NodeId, name: &str);

    fn param(&self, node: NodeId, name: &str) -> Option<ParamValue>;

    // === Rendering ===

    fn render_status(&self) -> BackendStatus;

    fn render_begin(&self);

    /// Stops in-flight work. Blocks until the backend is idle.
    fn render_interrupt(&self);

    fn render_restart(&self);

    fn render_resume(&self);

    /// Ends the session and reports why it ended.
    fn render_end(&self) -> RenderErrorCode;

    // === Maintenance ===

    fn flush_texture_cache(&self) {}

    /// Writes the current scene for debugging.
    fn write_scene(&self, _path: &Path) -> std::io::Result<()> {
        Ok(())
    }
}
