//! Render Index
//!
//! A minimal host driver: it owns the primitive adapters and a change
//! tracker, and runs the host side of one tick.
//!
//! ```text
//! sync_all()
//!   ├─ dirty state prims   cameras, then materials, then lights (sequential)
//!   ├─ dirty instancers    (sequential)
//!   └─ dirty shapes        scoped worker threads
//! has_pending_changes()  → true: sync again next tick
//! render()
//! ```

use std::sync::Arc;
use std::thread;

use hydrant_core::{
    ChangeTracker, DelegateSettings, DirtyBits, MemoryChangeTracker, PrimPath, Result, TrackedKind,
};
use hydrant_backend::SessionContext;
use rustc_hash::{FxHashMap, FxHashSet};

use crate::delegate::RenderDelegateCore;
use crate::prim::{InstancerMap, PrimAdapter, PrimKind, SyncContext, SyncPrim};
use crate::render_state::RenderOutcome;
use crate::scene::SceneDelegate;

pub struct RenderIndex {
    delegate: RenderDelegateCore,
    scene: Arc<dyn SceneDelegate>,
    tracker: MemoryChangeTracker,
    prims: FxHashMap<PrimPath, Box<dyn SyncPrim>>,
    instancers: InstancerMap,
}

impl RenderIndex {
    pub fn new(
        context: Arc<SessionContext>,
        settings: DelegateSettings,
        scene: Arc<dyn SceneDelegate>,
    ) -> Result<Self> {
        Ok(Self {
            delegate: RenderDelegateCore::new(context, settings)?,
            scene,
            tracker: MemoryChangeTracker::new(),
            prims: FxHashMap::default(),
            instancers: InstancerMap::default(),
        })
    }

    #[inline]
    #[must_use]
    pub fn delegate(&self) -> &RenderDelegateCore {
        &self.delegate
    }

    #[inline]
    #[must_use]
    pub fn tracker(&self) -> &MemoryChangeTracker {
        &self.tracker
    }

    #[must_use]
    pub fn prim(&self, id: PrimPath) -> Option<&dyn SyncPrim> {
        self.prims.get(&id).map(|prim| &**prim)
    }

    /// Concrete adapter of a primitive, e.g. a `ShapeAdapter`.
    #[must_use]
    pub fn prim_as<T: 'static>(&self, id: PrimPath) -> Option<&T> {
        self.prim(id)?.as_any().downcast_ref()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.prims.len() + self.instancers.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    // ========================================================================
    // Population
    // ========================================================================

    /// Inserts a primitive, replacing any primitive already at `id`.
    pub fn insert_prim(&mut self, kind: PrimKind, id: PrimPath) {
        self.evict(id);
        let adapter = self.delegate.create_prim(kind, id);
        self.insert_adapter(adapter);
    }

    /// Inserts a primitive by its host type name, e.g. `"basisCurves"`.
    pub fn insert_prim_by_name(&mut self, type_name: &str, id: PrimPath) -> Result<()> {
        let adapter = self.delegate.create_prim_by_name(type_name, id)?;
        self.evict(id);
        self.insert_adapter(adapter);
        Ok(())
    }

    fn evict(&mut self, id: PrimPath) {
        if self.prims.contains_key(&id) || self.instancers.contains_key(&id) {
            self.remove_prim(id);
        }
    }

    fn insert_adapter(&mut self, adapter: PrimAdapter) {
        let id = adapter.id();
        self.tracker
            .insert(id, adapter.kind().tracked_kind(), adapter.initial_dirty_bits());
        match adapter {
            PrimAdapter::Prim(prim) => {
                self.prims.insert(id, prim);
            }
            PrimAdapter::Instancer(instancer) => {
                self.instancers.insert(id, instancer);
            }
        }
    }

    /// Finalizes and drops a primitive. Unknown ids are ignored.
    pub fn remove_prim(&mut self, id: PrimPath) {
        self.tracker.remove(id);
        if self.instancers.remove(&id).is_some() {
            return;
        }
        let Some(mut prim) = self.prims.remove(&id) else {
            return;
        };
        let ctx = SyncContext::new(&self.delegate, self.scene.as_ref(), &self.instancers);
        prim.finalize(&ctx);
        if !prim.kind().is_geometric() {
            self.delegate.destroy_sprim(id);
        }
    }

    /// Records a host edit.
    pub fn mark_dirty(&self, id: PrimPath, bits: DirtyBits) {
        self.tracker.mark_dirty(id, bits);
    }

    // ========================================================================
    // Tick
    // ========================================================================

    /// Syncs every dirty primitive.
    pub fn sync_all(&mut self) {
        let scene = self.scene.as_ref();
        let tracker = &self.tracker;

        // State prims: cameras feed materials, materials feed lights.
        let mut sprims = tracker.dirty_prims(TrackedKind::Sprim);
        sprims.sort_by_key(|id| self.prims.get(id).map(|p| sprim_order(p.kind())));
        {
            let ctx = SyncContext::new(&self.delegate, scene, &self.instancers);
            for id in sprims {
                if let Some(prim) = self.prims.get_mut(&id) {
                    sync_one(&mut **prim, &ctx, tracker);
                }
            }
        }

        // Instancers, then re-dirty the shapes they replicate.
        let dirty_instancers = tracker.dirty_prims(TrackedKind::Instancer);
        if !dirty_instancers.is_empty() {
            let ctx = SyncContext::new(&self.delegate, scene, &self.instancers);
            for id in &dirty_instancers {
                if let Some(instancer) = self.instancers.get(id) {
                    let mut bits = tracker.dirty_bits(*id);
                    instancer.sync(&ctx, &mut bits);
                    tracker.set_dirty_bits(*id, bits);
                }
            }
            let synced: FxHashSet<PrimPath> = dirty_instancers.into_iter().collect();
            for (id, prim) in &self.prims {
                if prim.kind().is_geometric() && instanced_by(scene, *id, &synced) {
                    tracker.mark_dirty(*id, DirtyBits::INSTANCER);
                }
            }
        }

        // Shapes, concurrently.
        let rprims = tracker.dirty_prims(TrackedKind::Rprim);
        if rprims.is_empty() {
            return;
        }
        let wanted: FxHashSet<PrimPath> = rprims.into_iter().collect();
        let mut work: Vec<&mut Box<dyn SyncPrim>> = self
            .prims
            .iter_mut()
            .filter(|(id, _)| wanted.contains(id))
            .map(|(_, prim)| prim)
            .collect();
        let workers = thread::available_parallelism().map_or(1, usize::from);
        let chunk = work.len().div_ceil(workers).max(1);
        let delegate = &self.delegate;
        let instancers = &self.instancers;
        log::debug!("Syncing {} rprims on up to {workers} threads", work.len());

        thread::scope(|s| {
            for batch in work.chunks_mut(chunk) {
                s.spawn(move || {
                    for prim in batch {
                        // One context per prim: each sync interrupts on its own.
                        let ctx = SyncContext::new(delegate, scene, instancers);
                        sync_one(&mut ***prim, &ctx, tracker);
                    }
                });
            }
        });
    }

    /// See [`RenderDelegateCore::has_pending_changes`].
    pub fn has_pending_changes(&self, shutter: [f32; 2]) -> bool {
        self.delegate.has_pending_changes(&self.tracker, shutter)
    }

    pub fn render(&self) -> RenderOutcome {
        self.delegate.render()
    }

    /// One host tick: sync, then render unless more syncing is needed.
    ///
    /// Returns `None` when the render step was skipped.
    pub fn tick(&mut self, shutter: [f32; 2]) -> Option<RenderOutcome> {
        self.sync_all();
        if self.has_pending_changes(shutter) {
            return None;
        }
        Some(self.render())
    }

    pub fn set_render_tags(&self, tags: &[String]) {
        self.delegate.set_render_tags(tags);
    }
}

impl Drop for RenderIndex {
    fn drop(&mut self) {
        let ids: Vec<PrimPath> = self.prims.keys().copied().collect();
        for id in ids {
            self.remove_prim(id);
        }
        self.instancers.clear();
    }
}

impl std::fmt::Debug for RenderIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RenderIndex")
            .field("prims", &self.prims.len())
            .field("instancers", &self.instancers.len())
            .field("delegate", &self.delegate)
            .finish_non_exhaustive()
    }
}

fn sprim_order(kind: PrimKind) -> u8 {
    match kind {
        PrimKind::Camera => 0,
        PrimKind::Material => 1,
        _ => 2,
    }
}

fn sync_one(prim: &mut dyn SyncPrim, ctx: &SyncContext<'_>, tracker: &MemoryChangeTracker) {
    let id = prim.id();
    let mut bits = tracker.dirty_bits(id);
    prim.sync(ctx, &mut bits);
    tracker.set_dirty_bits(id, bits);
}

/// True when any instancer above `id` is in `instancers`.
fn instanced_by(scene: &dyn SceneDelegate, id: PrimPath, instancers: &FxHashSet<PrimPath>) -> bool {
    let mut seen = FxHashSet::default();
    let mut current = scene.instancer_id(id);
    while let Some(instancer) = current {
        if instancers.contains(&instancer) {
            return true;
        }
        if !seen.insert(instancer) {
            log::warn!("Instancer cycle through {instancer}");
            return false;
        }
        current = scene.instancer_id(instancer);
    }
    false
}
