//! Render Delegate Core
//!
//! The orchestrator. It owns the node registry, the dependency graph and the
//! render state machine, creates primitive adapters, and answers the
//! per-tick question the render pass asks before stepping the renderer:
//! "is there more to sync first?"
//!
//! # Tick protocol
//!
//! ```text
//! has_pending_changes(tracker, shutter)
//!   ├─ light linking / shutter / fps changed → mark all rprims dirty
//!   └─ drain dependency queues              → mark affected sources dirty
//! true  → host syncs dirty prims again, render step skipped
//! false → render()
//! ```

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use flume::{Receiver, Sender};
use hydrant_backend::{
    NodeHandle, NodeHandleRegistry, NodeId, OwnershipMode, ParamValue, RenderBackend,
    SessionContext,
};
use hydrant_core::{ChangeTracker, DelegateSettings, DirtyBits, PrimPath, Result};
use parking_lot::Mutex;
use rustc_hash::FxHashMap;

use crate::dependency::DependencyGraph;
use crate::instancer::InstancerAdapter;
use crate::prim::{PrimAdapter, PrimKind};
use crate::prims::{CameraAdapter, LightAdapter, MaterialAdapter, ShapeAdapter};
use crate::render_state::{RenderOutcome, RenderStateMachine};

const FALLBACK_SHADER_NAME: &str = "/_hydrant/fallback_shader";
const FALLBACK_SHADER_TYPE: &str = "standard_surface";

/// A host command: a name, a label for host menus and its handler.
#[derive(Debug, Clone, Copy)]
pub struct Command {
    pub name: &'static str,
    pub description: &'static str,
    run: fn(&RenderDelegateCore),
}

/// Host commands understood by [`RenderDelegateCore::invoke_command`].
pub const COMMANDS: &[Command] = &[Command {
    name: "flush_texture",
    description: "Flush textures",
    run: RenderDelegateCore::flush_textures,
}];

/// Terminal shader nodes published by a material.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MaterialTerminals {
    pub surface: Option<NodeHandle>,
    pub displacement: Option<NodeHandle>,
}

/// Lights grouped by the collection that links them.
#[derive(Debug, Default)]
struct LinkGroups(FxHashMap<String, Vec<PrimPath>>);

impl LinkGroups {
    /// True when nothing restricts the lights a shape sees.
    fn is_unrestricted(&self) -> bool {
        self.0.is_empty() || (self.0.len() == 1 && self.0.contains_key(""))
    }
}

#[derive(Debug, Default)]
struct LightLinks {
    light: LinkGroups,
    shadow: LinkGroups,
}

struct RenderTags {
    track_tx: Sender<(NodeId, String)>,
    track_rx: Receiver<(NodeId, String)>,
    untrack_tx: Sender<NodeId>,
    untrack_rx: Receiver<NodeId>,
    node_tags: Mutex<FxHashMap<NodeId, String>>,
    active: Mutex<Vec<String>>,
}

impl RenderTags {
    fn new(active: Vec<String>) -> Self {
        let (track_tx, track_rx) = flume::unbounded();
        let (untrack_tx, untrack_rx) = flume::unbounded();
        Self {
            track_tx,
            track_rx,
            untrack_tx,
            untrack_rx,
            node_tags: Mutex::new(FxHashMap::default()),
            active: Mutex::new(active),
        }
    }

    fn is_active(&self, tag: &str) -> bool {
        self.active.lock().iter().any(|t| t == tag)
    }
}

pub struct RenderDelegateCore {
    settings: DelegateSettings,
    context: Arc<SessionContext>,
    registry: NodeHandleRegistry,
    dependencies: DependencyGraph,
    render_state: RenderStateMachine,
    fallback_shader: Option<NodeHandle>,
    materials: Mutex<FxHashMap<PrimPath, MaterialTerminals>>,
    light_links: Mutex<LightLinks>,
    light_linking_changed: AtomicBool,
    requested_fps: Mutex<f32>,
    render_tags: RenderTags,
}

impl RenderDelegateCore {
    /// Creates a delegate on `context`, taking a session reference.
    ///
    /// # Errors
    ///
    /// Returns [`HydrantError::InvalidSettings`](hydrant_core::HydrantError::InvalidSettings)
    /// when `settings` do not validate. No session reference is taken then.
    pub fn new(context: Arc<SessionContext>, settings: DelegateSettings) -> Result<Self> {
        settings.validate()?;
        context.acquire();

        let mode = match settings.procedural_parent.as_deref() {
            Some(name) => match context.backend().lookup_node(name, None) {
                Some(parent) => {
                    log::info!("Nodes are owned by procedural {name}");
                    OwnershipMode::BorrowedFromParent(parent)
                }
                None => {
                    log::warn!("Procedural parent {name} not found, delegate owns its nodes");
                    OwnershipMode::Owned
                }
            },
            None => OwnershipMode::Owned,
        };
        let registry = NodeHandleRegistry::new(context.clone(), mode);
        let fallback_shader = registry.create_node(FALLBACK_SHADER_TYPE, FALLBACK_SHADER_NAME);
        let render_state = RenderStateMachine::new(
            context.clone(),
            settings.batch,
            settings.shutter,
            settings.fps,
            settings.debug_scene.clone(),
        );

        Ok(Self {
            render_tags: RenderTags::new(settings.render_tags.clone()),
            requested_fps: Mutex::new(settings.fps),
            settings,
            context,
            registry,
            dependencies: DependencyGraph::new(),
            render_state,
            fallback_shader,
            materials: Mutex::new(FxHashMap::default()),
            light_links: Mutex::new(LightLinks::default()),
            light_linking_changed: AtomicBool::new(false),
        })
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    #[inline]
    #[must_use]
    pub fn settings(&self) -> &DelegateSettings {
        &self.settings
    }

    #[inline]
    #[must_use]
    pub fn context(&self) -> &Arc<SessionContext> {
        &self.context
    }

    #[inline]
    #[must_use]
    pub fn backend(&self) -> &dyn RenderBackend {
        self.context.backend()
    }

    #[inline]
    #[must_use]
    pub fn registry(&self) -> &NodeHandleRegistry {
        &self.registry
    }

    #[inline]
    #[must_use]
    pub fn dependencies(&self) -> &DependencyGraph {
        &self.dependencies
    }

    #[inline]
    #[must_use]
    pub fn render_state(&self) -> &RenderStateMachine {
        &self.render_state
    }

    /// Shader used by shapes without a usable material.
    #[must_use]
    pub fn fallback_shader(&self) -> Option<&NodeHandle> {
        self.fallback_shader.as_ref()
    }

    #[must_use]
    pub fn is_batch(&self) -> bool {
        self.settings.batch
    }

    // ========================================================================
    // Factory
    // ========================================================================

    /// Creates the adapter for a new primitive.
    ///
    /// Backend nodes are created lazily by the first sync, which interrupts
    /// the render loop first. A state primitive re-created at a path other
    /// primitives already depend on re-dirties them.
    #[must_use]
    pub fn create_prim(&self, kind: PrimKind, id: PrimPath) -> PrimAdapter {
        log::trace!("Creating {} adapter for {id}", kind.type_name());
        let adapter = match kind {
            PrimKind::Mesh | PrimKind::Curves | PrimKind::Points | PrimKind::Volume => {
                PrimAdapter::Prim(Box::new(ShapeAdapter::new(kind, id)))
            }
            PrimKind::Camera => PrimAdapter::Prim(Box::new(CameraAdapter::new(id))),
            PrimKind::Light => PrimAdapter::Prim(Box::new(LightAdapter::new(id))),
            PrimKind::Material => PrimAdapter::Prim(Box::new(MaterialAdapter::new(id))),
            PrimKind::Instancer => PrimAdapter::Instancer(InstancerAdapter::new(id)),
        };
        if !kind.is_geometric() && self.dependencies.is_tracked_target(id) {
            self.dependencies.mark_dirty(id);
        }
        adapter
    }

    /// Creates an adapter from a host type name.
    pub fn create_prim_by_name(&self, type_name: &str, id: PrimPath) -> Result<PrimAdapter> {
        Ok(self.create_prim(PrimKind::from_type_name(type_name)?, id))
    }

    /// Notes the deletion of a state primitive (after its finalize).
    pub fn destroy_sprim(&self, id: PrimPath) {
        if self.dependencies.is_tracked_target(id) {
            self.dependencies.remove_target(id);
        }
    }

    // ========================================================================
    // Per-tick poll
    // ========================================================================

    /// Applies global invalidation and drains the dependency queues.
    ///
    /// Returns `true` when any primitive was marked dirty: the host must
    /// sync again before the render step.
    pub fn has_pending_changes(&self, tracker: &dyn ChangeTracker, shutter: [f32; 2]) -> bool {
        let mut bits = DirtyBits::CLEAN;
        if self.light_linking_changed.swap(false, Ordering::AcqRel) {
            bits |= DirtyBits::CATEGORIES;
        }
        if self.render_state.update_shutter(shutter) {
            bits |= DirtyBits::shutter_changed();
        }
        let fps = *self.requested_fps.lock();
        if self.render_state.update_fps(fps) {
            bits |= DirtyBits::fps_changed();
        }

        let mut pending = false;
        if bits.is_dirty() {
            log::debug!("Invalidating all rprims: {bits:?}");
            tracker.mark_all_rprims_dirty(bits);
            pending = true;
        }
        self.dependencies.drain(tracker) || pending
    }

    /// Frame rate applied at the next [`has_pending_changes`](Self::has_pending_changes).
    pub fn set_fps(&self, fps: f32) {
        if fps > 0.0 {
            *self.requested_fps.lock() = fps;
        } else {
            log::warn!("Ignoring non-positive frame rate {fps}");
        }
    }

    // ========================================================================
    // Materials
    // ========================================================================

    /// Publishes the terminals of a material for its consumers.
    pub fn publish_material(&self, id: PrimPath, terminals: MaterialTerminals) {
        self.materials.lock().insert(id, terminals);
    }

    pub fn retract_material(&self, id: PrimPath) {
        self.materials.lock().remove(&id);
    }

    #[must_use]
    pub fn material_terminals(&self, id: PrimPath) -> Option<MaterialTerminals> {
        self.materials.lock().get(&id).cloned()
    }

    // ========================================================================
    // Render tags
    // ========================================================================

    /// Enables or disables `node` by its tag and remembers the tag for later
    /// [`set_render_tags`](Self::set_render_tags) calls. Skipped in batch mode.
    ///
    /// Called from syncs, after `begin_edit`.
    pub fn track_render_tag(&self, node: &NodeHandle, tag: &str) {
        if self.is_batch() {
            return;
        }
        self.backend()
            .set_disabled(node.id(), !self.render_tags.is_active(tag));
        let _ = self.render_tags.track_tx.send((node.id(), tag.to_owned()));
    }

    pub fn untrack_render_tag(&self, node: &NodeHandle) {
        let _ = self.render_tags.untrack_tx.send(node.id());
    }

    /// Applies queued tag registrations, then switches the active tag set.
    ///
    /// When the set changes every tracked node is re-enabled or disabled,
    /// after the render loop has been stopped.
    pub fn set_render_tags(&self, tags: &[String]) {
        let mut node_tags = self.render_tags.node_tags.lock();
        for (node, tag) in self.render_tags.track_rx.try_iter() {
            node_tags.insert(node, tag);
        }
        for node in self.render_tags.untrack_rx.try_iter() {
            node_tags.remove(&node);
        }

        let mut active = self.render_tags.active.lock();
        if active.as_slice() == tags {
            return;
        }
        *active = tags.to_vec();
        self.render_state.interrupt(true, true);
        for (node, tag) in node_tags.iter() {
            let disabled = !active.iter().any(|t| t == tag);
            self.backend().set_disabled(*node, disabled);
        }
        log::debug!("Render tags set to {tags:?}");
    }

    #[must_use]
    pub fn render_tags(&self) -> Vec<String> {
        self.render_tags.active.lock().clone()
    }

    // ========================================================================
    // Light linking
    // ========================================================================

    /// Registers `light` under a link collection (empty: unlinked).
    pub fn register_light_link(&self, collection: &str, light: PrimPath, shadow: bool) {
        let mut links = self.light_links.lock();
        let groups = if shadow { &mut links.shadow } else { &mut links.light };
        let changed = match groups.0.get_mut(collection) {
            None => {
                let changed = !collection.is_empty() || !groups.0.is_empty();
                groups.0.insert(collection.to_owned(), vec![light]);
                changed
            }
            Some(lights) if !lights.contains(&light) => {
                lights.push(light);
                !collection.is_empty() || groups.0.len() > 1
            }
            Some(_) => false,
        };
        if changed {
            self.light_linking_changed.store(true, Ordering::Release);
        }
    }

    pub fn deregister_light_link(&self, collection: &str, light: PrimPath, shadow: bool) {
        let mut links = self.light_links.lock();
        let groups = if shadow { &mut links.shadow } else { &mut links.light };
        let multiple = groups.0.len() > 1;
        let Some(lights) = groups.0.get_mut(collection) else {
            return;
        };
        if !collection.is_empty() || multiple {
            self.light_linking_changed.store(true, Ordering::Release);
        }
        lights.retain(|l| *l != light);
        if lights.is_empty() {
            groups.0.remove(collection);
        }
    }

    /// Forces every geometric primitive to refresh its light links at the
    /// next poll.
    pub fn mark_light_linking_changed(&self) {
        self.light_linking_changed.store(true, Ordering::Release);
    }

    /// Writes the light and shadow groups of a shape with `categories`.
    ///
    /// Lights in the empty collection illuminate every shape.
    pub fn apply_light_linking(&self, node: NodeId, categories: &[Arc<str>]) {
        let links = self.light_links.lock();
        let backend = self.backend();
        let apply = |groups: &LinkGroups, group: &str, use_group: &str| {
            if groups.is_unrestricted() {
                backend.reset_param(node, group);
                backend.reset_param(node, use_group);
                return;
            }
            let lights: Vec<NodeId> = categories
                .iter()
                .map(|category| &**category)
                .chain(std::iter::once(""))
                .filter_map(|collection| groups.0.get(collection))
                .flatten()
                .filter_map(|light| self.registry.lookup_node(light.as_str()))
                .map(|handle| handle.id())
                .collect();
            if lights.is_empty() {
                backend.reset_param(node, group);
            } else {
                backend.set_param(node, group, ParamValue::NodeArray(lights));
            }
            backend.set_param(node, use_group, ParamValue::Bool(true));
        };
        apply(&links.light, "light_group", "use_light_group");
        apply(&links.shadow, "shadow_group", "use_shadow_group");
    }

    // ========================================================================
    // Render control
    // ========================================================================

    pub fn render(&self) -> RenderOutcome {
        self.render_state.render()
    }

    pub fn pause(&self) {
        self.render_state.pause();
    }

    pub fn resume(&self) {
        self.render_state.resume();
    }

    pub fn restart(&self) {
        self.render_state.restart();
    }

    /// Runs a host command. Returns `false` for unknown commands.
    pub fn invoke_command(&self, command: &str) -> bool {
        let Some(entry) = COMMANDS.iter().find(|entry| entry.name == command) else {
            log::warn!("Unknown command {command}");
            return false;
        };
        log::debug!("Running command {command}");
        (entry.run)(self);
        true
    }

    /// Drops the backend texture cache with the render paused.
    pub fn flush_textures(&self) {
        self.render_state.pause();
        self.backend().flush_texture_cache();
        self.render_state.resume();
    }

    /// [`render`](Self::render), with an aborted session as an error.
    pub fn try_render(&self) -> Result<RenderOutcome> {
        self.render_state.try_render()
    }

    /// Writes the backend scene to `path` for debugging.
    pub fn write_scene(&self, path: &Path) -> Result<()> {
        self.render_state.write_scene(path)
    }
}

impl Drop for RenderDelegateCore {
    fn drop(&mut self) {
        self.render_state.interrupt(false, false);
        self.registry.destroy_node(self.fallback_shader.take().as_ref());
        self.context.release();
    }
}

impl std::fmt::Debug for RenderDelegateCore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RenderDelegateCore")
            .field("settings", &self.settings)
            .field("registry", &self.registry)
            .field("render_state", &self.render_state)
            .finish_non_exhaustive()
    }
}
