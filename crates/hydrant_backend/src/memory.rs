//! In-process reference backend.
//!
//! [`MemoryBackend`] keeps nodes in a [`SlotMap`] and simulates the
//! renderer's render-status machine. It is what the test-suite and headless
//! hosts run against, and it records enough bookkeeping (call counters,
//! destroyed nodes, mutations made while the render loop was active) to check
//! the delegate's invariants from the outside.

use std::fmt::Write as _;
use std::path::Path;

use parking_lot::Mutex;
use rustc_hash::{FxHashMap, FxHashSet};
use slotmap::SlotMap;

use crate::api::{NodeId, RenderBackend};
use crate::param::ParamValue;
use crate::status::{BackendStatus, RenderErrorCode};

#[derive(Debug, Clone)]
struct NodeRecord {
    node_type: String,
    name: String,
    parent: Option<NodeId>,
    disabled: bool,
    params: FxHashMap<String, ParamValue>,
}

/// Call counters exposed for assertions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BackendCounters {
    pub sessions_begun: u32,
    pub sessions_ended: u32,
    pub begins: u32,
    pub interrupts: u32,
    pub restarts: u32,
    pub resumes: u32,
    pub ends: u32,
    pub nodes_created: u32,
    pub nodes_destroyed: u32,
    pub texture_flushes: u32,
    pub scene_writes: u32,
    /// Node mutations made while the render loop was running.
    pub mid_render_mutations: u32,
}

#[derive(Debug, Default)]
struct Inner {
    nodes: SlotMap<NodeId, NodeRecord>,
    status: BackendStatus,
    end_code: RenderErrorCode,
    rejected_types: FxHashSet<String>,
    destroyed: Vec<(String, NodeId)>,
    counters: BackendCounters,
}

impl Inner {
    fn note_mutation(&mut self, what: &str) {
        if matches!(
            self.status,
            BackendStatus::Rendering | BackendStatus::Restarting
        ) {
            log::warn!("Node {what} while the render loop is active");
            self.counters.mid_render_mutations += 1;
        }
    }
}

/// A renderer that lives entirely in memory.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    inner: Mutex<Inner>,
}

impl MemoryBackend {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes `create_node` fail for `node_type`.
    pub fn reject_type(&self, node_type: &str) {
        self.inner.lock().rejected_types.insert(node_type.to_owned());
    }

    // === Render loop simulation ===

    pub fn set_status(&self, status: BackendStatus) {
        self.inner.lock().status = status;
    }

    /// Advances the render loop by one step: a restart settles into
    /// rendering, and a running render converges.
    pub fn advance(&self) {
        let mut inner = self.inner.lock();
        inner.status = match inner.status {
            BackendStatus::Restarting => BackendStatus::Rendering,
            BackendStatus::Rendering => BackendStatus::Finished,
            other => other,
        };
    }

    /// Fails the current render with `code`.
    pub fn fail(&self, code: RenderErrorCode) {
        let mut inner = self.inner.lock();
        inner.status = BackendStatus::Failed;
        inner.end_code = code;
    }

    // === Introspection ===

    #[must_use]
    pub fn counters(&self) -> BackendCounters {
        self.inner.lock().counters
    }

    #[must_use]
    pub fn node_count(&self) -> usize {
        self.inner.lock().nodes.len()
    }

    #[must_use]
    pub fn is_alive(&self, node: NodeId) -> bool {
        self.inner.lock().nodes.contains_key(node)
    }

    #[must_use]
    pub fn node_name(&self, node: NodeId) -> Option<String> {
        self.inner.lock().nodes.get(node).map(|n| n.name.clone())
    }

    /// How many times a node with this id was destroyed.
    #[must_use]
    pub fn destroy_count(&self, node: NodeId) -> usize {
        self.inner
            .lock()
            .destroyed
            .iter()
            .filter(|(_, id)| *id == node)
            .count()
    }

    /// Names of destroyed nodes, in destruction order.
    #[must_use]
    pub fn destroyed_names(&self) -> Vec<String> {
        self.inner
            .lock()
            .destroyed
            .iter()
            .map(|(name, _)| name.clone())
            .collect()
    }
}

impl RenderBackend for MemoryBackend {
    fn begin_session(&self) {
        let mut inner = self.inner.lock();
        inner.counters.sessions_begun += 1;
        inner.status = BackendStatus::NotStarted;
    }

    fn end_session(&self) {
        let mut inner = self.inner.lock();
        inner.counters.sessions_ended += 1;
        inner.nodes.clear();
        inner.status = BackendStatus::NotStarted;
    }

    fn create_node(&self, node_type: &str, name: &str, parent: Option<NodeId>) -> Option<NodeId> {
        let mut inner = self.inner.lock();
        if node_type.is_empty() || inner.rejected_types.contains(node_type) {
            return None;
        }
        inner.note_mutation("created");
        inner.counters.nodes_created += 1;
        let id = inner.nodes.insert(NodeRecord {
            node_type: node_type.to_owned(),
            name: name.to_owned(),
            parent,
            disabled: false,
            params: FxHashMap::default(),
        });
        Some(id)
    }

    fn destroy_node(&self, node: NodeId) -> bool {
        let mut inner = self.inner.lock();
        let Some(record) = inner.nodes.remove(node) else {
            return false;
        };
        inner.note_mutation("destroyed");
        inner.counters.nodes_destroyed += 1;
        inner.destroyed.push((record.name, node));
        true
    }

    fn reset_node(&self, node: NodeId) {
        let mut inner = self.inner.lock();
        inner.note_mutation("reset");
        if let Some(record) = inner.nodes.get_mut(node) {
            record.params.clear();
            record.disabled = false;
        }
    }

    fn set_disabled(&self, node: NodeId, disabled: bool) {
        let mut inner = self.inner.lock();
        inner.note_mutation("disabled");
        if let Some(record) = inner.nodes.get_mut(node) {
            record.disabled = disabled;
        }
    }

    fn is_disabled(&self, node: NodeId) -> bool {
        self.inner.lock().nodes.get(node).is_some_and(|n| n.disabled)
    }

    fn lookup_node(&self, name: &str, parent: Option<NodeId>) -> Option<NodeId> {
        let inner = self.inner.lock();
        let mut fallback = None;
        for (id, record) in &inner.nodes {
            if record.name != name {
                continue;
            }
            if record.parent == parent {
                return Some(id);
            }
            fallback.get_or_insert(id);
        }
        fallback
    }

    fn node_parent(&self, node: NodeId) -> Option<NodeId> {
        self.inner.lock().nodes.get(node).and_then(|n| n.parent)
    }

    fn node_type(&self, node: NodeId) -> Option<String> {
        self.inner.lock().nodes.get(node).map(|n| n.node_type.clone())
    }

    fn set_param(&self, node: NodeId, name: &str, value: ParamValue) {
        let mut inner = self.inner.lock();
        inner.note_mutation("parameter set");
        if let Some(record) = inner.nodes.get_mut(node) {
            record.params.insert(name.to_owned(), value);
        }
    }

    fn reset_param(&self, node: NodeId, name: &str) {
        let mut inner = self.inner.lock();
        inner.note_mutation("parameter reset");
        if let Some(record) = inner.nodes.get_mut(node) {
            record.params.remove(name);
        }
    }

    fn param(&self, node: NodeId, name: &str) -> Option<ParamValue> {
        self.inner
            .lock()
            .nodes
            .get(node)
            .and_then(|n| n.params.get(name).cloned())
    }

    fn render_status(&self) -> BackendStatus {
        self.inner.lock().status
    }

    fn render_begin(&self) {
        let mut inner = self.inner.lock();
        inner.counters.begins += 1;
        inner.status = BackendStatus::Rendering;
    }

    fn render_interrupt(&self) {
        let mut inner = self.inner.lock();
        inner.counters.interrupts += 1;
        // A finished render keeps its status: only active work is stopped.
        if matches!(
            inner.status,
            BackendStatus::Rendering | BackendStatus::Restarting
        ) {
            inner.status = BackendStatus::Paused;
        }
    }

    fn render_restart(&self) {
        let mut inner = self.inner.lock();
        inner.counters.restarts += 1;
        inner.status = BackendStatus::Restarting;
    }

    fn render_resume(&self) {
        let mut inner = self.inner.lock();
        inner.counters.resumes += 1;
        if inner.status == BackendStatus::Paused {
            inner.status = BackendStatus::Rendering;
        }
    }

    fn render_end(&self) -> RenderErrorCode {
        let mut inner = self.inner.lock();
        inner.counters.ends += 1;
        inner.status = BackendStatus::NotStarted;
        std::mem::take(&mut inner.end_code)
    }

    fn flush_texture_cache(&self) {
        self.inner.lock().counters.texture_flushes += 1;
    }

    fn write_scene(&self, path: &Path) -> std::io::Result<()> {
        let dump = {
            let mut inner = self.inner.lock();
            inner.counters.scene_writes += 1;
            let mut dump = String::new();
            for record in inner.nodes.values() {
                let _ = writeln!(
                    dump,
                    "{} {} disabled={} params={}",
                    record.node_type,
                    record.name,
                    record.disabled,
                    record.params.len()
                );
            }
            dump
        };
        std::fs::write(path, dump)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interrupt_pauses_active_render_only() {
        let backend = MemoryBackend::new();
        backend.render_interrupt();
        assert_eq!(backend.render_status(), BackendStatus::NotStarted);

        backend.render_begin();
        backend.render_interrupt();
        assert_eq!(backend.render_status(), BackendStatus::Paused);

        backend.set_status(BackendStatus::Finished);
        backend.render_interrupt();
        assert_eq!(backend.render_status(), BackendStatus::Finished);
    }

    #[test]
    fn mutations_during_render_are_counted() {
        let backend = MemoryBackend::new();
        let node = backend.create_node("polymesh", "/a", None).unwrap();
        backend.render_begin();
        backend.set_param(node, "visibility", ParamValue::Byte(255));
        assert_eq!(backend.counters().mid_render_mutations, 1);

        backend.render_interrupt();
        backend.set_param(node, "visibility", ParamValue::Byte(0));
        assert_eq!(backend.counters().mid_render_mutations, 1);
    }

    #[test]
    fn rejected_types_fail_creation() {
        let backend = MemoryBackend::new();
        backend.reject_type("volume");
        assert!(backend.create_node("volume", "/v", None).is_none());
        assert!(backend.create_node("", "/v", None).is_none());
    }

    #[test]
    fn end_reports_failure_code_once() {
        let backend = MemoryBackend::new();
        backend.fail(RenderErrorCode::NoCamera);
        assert_eq!(backend.render_status(), BackendStatus::Failed);
        assert_eq!(backend.render_end(), RenderErrorCode::NoCamera);
        assert_eq!(backend.render_end(), RenderErrorCode::Success);
    }
}
