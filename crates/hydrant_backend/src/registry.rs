//! Node handle registry.
//!
//! All backend node creation, lookup and destruction done on behalf of
//! primitive adapters goes through [`NodeHandleRegistry`]. It keeps a
//! name → handle cache so that re-syncing a primitive reuses the backend
//! object other nodes may still point at, and it applies the ownership policy:
//! nodes created inside an enclosing procedural belong to that procedural and
//! are only ever disabled, never freed.
//!
//! Primitive syncs run concurrently, so the cache sits behind a mutex.

use std::sync::Arc;

use hydrant_core::{HydrantError, Result};
use parking_lot::Mutex;
use rustc_hash::FxHashMap;

use crate::api::{NodeId, RenderBackend};
use crate::context::SessionContext;

/// Who owns the lifetime of the nodes this registry creates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OwnershipMode {
    /// The delegate frees its nodes.
    Owned,
    /// An enclosing procedural owns every node; destroy disables instead.
    BorrowedFromParent(NodeId),
}

impl OwnershipMode {
    #[inline]
    #[must_use]
    pub fn parent(self) -> Option<NodeId> {
        match self {
            OwnershipMode::Owned => None,
            OwnershipMode::BorrowedFromParent(parent) => Some(parent),
        }
    }
}

/// Reference to a backend node.
///
/// Cloning a handle does not clone the node. Two handles are equal when they
/// refer to the same backend object.
#[derive(Debug, Clone)]
pub struct NodeHandle {
    id: NodeId,
    node_type: Arc<str>,
    name: Arc<str>,
}

impl NodeHandle {
    #[inline]
    #[must_use]
    pub fn id(&self) -> NodeId {
        self.id
    }

    #[inline]
    #[must_use]
    pub fn node_type(&self) -> &str {
        &self.node_type
    }

    #[inline]
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl PartialEq for NodeHandle {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for NodeHandle {}

impl std::hash::Hash for NodeHandle {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

pub struct NodeHandleRegistry {
    context: Arc<SessionContext>,
    mode: OwnershipMode,
    names: Mutex<FxHashMap<Arc<str>, NodeHandle>>,
    /// Every node created in borrowed mode, handed to the enclosing procedural.
    borrowed: Mutex<Vec<NodeHandle>>,
}

impl NodeHandleRegistry {
    #[must_use]
    pub fn new(context: Arc<SessionContext>, mode: OwnershipMode) -> Self {
        Self {
            context,
            mode,
            names: Mutex::new(FxHashMap::default()),
            borrowed: Mutex::new(Vec::new()),
        }
    }

    #[inline]
    #[must_use]
    pub fn mode(&self) -> OwnershipMode {
        self.mode
    }

    #[inline]
    #[must_use]
    pub fn backend(&self) -> &dyn RenderBackend {
        self.context.backend()
    }

    #[inline]
    #[must_use]
    pub fn context(&self) -> &Arc<SessionContext> {
        &self.context
    }

    /// Creates a node, or reuses the live node of the same name and type.
    ///
    /// A cached node of the same name but a different type is destroyed
    /// first. Returns `None` when the backend cannot allocate the node;
    /// callers treat that as "feature unavailable" and degrade.
    pub fn create_node(&self, node_type: &str, name: &str) -> Option<NodeHandle> {
        match self.try_create_node(node_type, name) {
            Ok(handle) => Some(handle),
            Err(err) => {
                log::warn!("{err}");
                None
            }
        }
    }

    /// Like [`create_node`](Self::create_node), for callers that cannot
    /// continue without the node.
    pub fn try_create_node(&self, node_type: &str, name: &str) -> Result<NodeHandle> {
        let backend = self.backend();
        let mut names = self.names.lock();

        if let Some(existing) = names.get(name).cloned() {
            if backend.node_type(existing.id).as_deref() == Some(node_type) {
                log::trace!("Reusing node {name} ({node_type})");
                backend.reset_node(existing.id);
                if self.mode.parent().is_some() {
                    backend.set_disabled(existing.id, false);
                }
                return Ok(existing);
            }
            names.remove(name);
            self.release_node(&existing);
        }

        let id = backend
            .create_node(node_type, name, self.mode.parent())
            .ok_or_else(|| HydrantError::NodeCreationFailed {
                node_type: node_type.to_owned(),
                name: name.to_owned(),
            })?;
        let handle = NodeHandle {
            id,
            node_type: node_type.into(),
            name: name.into(),
        };
        if matches!(self.mode, OwnershipMode::BorrowedFromParent(_)) {
            self.borrowed.lock().push(handle.clone());
        }
        names.insert(handle.name.clone(), handle.clone());
        Ok(handle)
    }

    /// Destroys (or, in borrowed mode, disables) a node. `None` is a no-op.
    pub fn destroy_node(&self, handle: Option<&NodeHandle>) {
        let Some(handle) = handle else {
            return;
        };
        if let OwnershipMode::Owned = self.mode {
            let mut names = self.names.lock();
            if names.get(&handle.name).is_some_and(|h| h.id == handle.id) {
                names.remove(&handle.name);
            }
        }
        self.release_node(handle);
    }

    fn release_node(&self, handle: &NodeHandle) {
        match self.mode {
            OwnershipMode::Owned => {
                if !self.backend().destroy_node(handle.id) {
                    log::debug!("Node {} was already destroyed", handle.name);
                }
            }
            OwnershipMode::BorrowedFromParent(_) => {
                self.backend().set_disabled(handle.id, true);
            }
        }
    }

    /// Finds a node by name: the local cache first, then the backend.
    ///
    /// A backend match whose recorded procedural parent differs from ours
    /// belongs to another invocation and is reported as not found.
    #[must_use]
    pub fn lookup_node(&self, name: &str) -> Option<NodeHandle> {
        if let Some(handle) = self.names.lock().get(name) {
            return Some(handle.clone());
        }
        let backend = self.backend();
        let expected = self.mode.parent();
        let id = backend.lookup_node(name, expected)?;
        if let Some(parent) = backend.node_parent(id)
            && Some(parent) != expected
        {
            log::debug!("Ignoring node {name} owned by another procedural");
            return None;
        }
        self.handle_for(id, name)
    }

    /// Backend lookup without the procedural-parent guard.
    #[must_use]
    pub fn lookup_node_unchecked(&self, name: &str) -> Option<NodeHandle> {
        let id = self.backend().lookup_node(name, self.mode.parent())?;
        self.handle_for(id, name)
    }

    fn handle_for(&self, id: NodeId, name: &str) -> Option<NodeHandle> {
        let node_type = self.backend().node_type(id)?;
        Some(NodeHandle {
            id,
            node_type: node_type.into(),
            name: name.into(),
        })
    }

    /// Nodes created in borrowed mode, for the enclosing procedural.
    #[must_use]
    pub fn borrowed_nodes(&self) -> Vec<NodeHandle> {
        self.borrowed.lock().clone()
    }

    /// Number of live cached names.
    #[must_use]
    pub fn len(&self) -> usize {
        self.names.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl std::fmt::Debug for NodeHandleRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeHandleRegistry")
            .field("mode", &self.mode)
            .field("nodes", &self.len())
            .finish_non_exhaustive()
    }
}
