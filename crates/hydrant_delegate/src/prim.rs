//! Primitive sync protocol.
//!
//! Every scene primitive is mirrored by an adapter implementing
//! [`SyncPrim`]. The host calls [`SyncPrim::sync`] with the primitive's dirty
//! bits; the adapter reads only what those bits ask for, updates its backend
//! nodes through the registry, declares its dependencies, and clears the
//! bits it handled.
//!
//! Before the first backend mutation of a sync the adapter calls
//! [`SyncContext::begin_edit`], which stops the render loop and requests a
//! restart. Syncs of independent primitives run concurrently.

use std::any::Any;
use std::cell::Cell;
use std::sync::Arc;

use hydrant_backend::NodeHandleRegistry;
use hydrant_core::{DirtyBits, HydrantError, PrimPath, Result, TrackedKind};
use rustc_hash::FxHashMap;

use crate::delegate::RenderDelegateCore;
use crate::dependency::DependencyGraph;
use crate::instancer::InstancerAdapter;
use crate::scene::SceneDelegate;

/// Primitive types the delegate can create adapters for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PrimKind {
    Mesh,
    Curves,
    Points,
    Volume,
    Camera,
    Light,
    Material,
    Instancer,
}

impl PrimKind {
    pub const ALL: [PrimKind; 8] = [
        PrimKind::Mesh,
        PrimKind::Curves,
        PrimKind::Points,
        PrimKind::Volume,
        PrimKind::Camera,
        PrimKind::Light,
        PrimKind::Material,
        PrimKind::Instancer,
    ];

    /// Geometric primitives use the rprim dirty-bit vocabulary.
    #[must_use]
    pub fn is_geometric(self) -> bool {
        matches!(
            self,
            PrimKind::Mesh | PrimKind::Curves | PrimKind::Points | PrimKind::Volume
        )
    }

    #[must_use]
    pub fn tracked_kind(self) -> TrackedKind {
        match self {
            _ if self.is_geometric() => TrackedKind::Rprim,
            PrimKind::Instancer => TrackedKind::Instancer,
            _ => TrackedKind::Sprim,
        }
    }

    /// Host type name.
    #[must_use]
    pub fn type_name(self) -> &'static str {
        match self {
            PrimKind::Mesh => "mesh",
            PrimKind::Curves => "basisCurves",
            PrimKind::Points => "points",
            PrimKind::Volume => "volume",
            PrimKind::Camera => "camera",
            PrimKind::Light => "light",
            PrimKind::Material => "material",
            PrimKind::Instancer => "instancer",
        }
    }

    /// Backend node type of a geometric primitive.
    #[must_use]
    pub fn shape_node_type(self) -> Option<&'static str> {
        match self {
            PrimKind::Mesh => Some("polymesh"),
            PrimKind::Curves => Some("curves"),
            PrimKind::Points => Some("points"),
            PrimKind::Volume => Some("volume"),
            _ => None,
        }
    }

    /// Parses a host type name.
    pub fn from_type_name(name: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.type_name() == name)
            .ok_or_else(|| HydrantError::UnknownPrimType(name.to_owned()))
    }
}

/// A primitive adapter.
pub trait SyncPrim: Send + Any {
    fn id(&self) -> PrimPath;

    fn kind(&self) -> PrimKind;

    /// Bits the host marks when the primitive is inserted.
    fn initial_dirty_bits(&self) -> DirtyBits;

    /// Brings the backend up to date with the scene for the aspects in
    /// `dirty`, then clears them.
    fn sync(&mut self, ctx: &SyncContext<'_>, dirty: &mut DirtyBits);

    /// Releases backend nodes and dependencies before the adapter is dropped.
    fn finalize(&mut self, ctx: &SyncContext<'_>);

    fn as_any(&self) -> &dyn Any;
}

/// Adapter created by [`RenderDelegateCore::create_prim`].
///
/// Instancers are shared with the prototype shapes that read them while
/// syncing, so they are reference counted instead of boxed.
pub enum PrimAdapter {
    Prim(Box<dyn SyncPrim>),
    Instancer(Arc<InstancerAdapter>),
}

impl PrimAdapter {
    #[must_use]
    pub fn id(&self) -> PrimPath {
        match self {
            PrimAdapter::Prim(prim) => prim.id(),
            PrimAdapter::Instancer(instancer) => instancer.id(),
        }
    }

    #[must_use]
    pub fn kind(&self) -> PrimKind {
        match self {
            PrimAdapter::Prim(prim) => prim.kind(),
            PrimAdapter::Instancer(_) => PrimKind::Instancer,
        }
    }

    #[must_use]
    pub fn initial_dirty_bits(&self) -> DirtyBits {
        match self {
            PrimAdapter::Prim(prim) => prim.initial_dirty_bits(),
            PrimAdapter::Instancer(instancer) => instancer.initial_dirty_bits(),
        }
    }
}

impl std::fmt::Debug for PrimAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PrimAdapter")
            .field("id", &self.id())
            .field("kind", &self.kind())
            .finish()
    }
}

pub type InstancerMap = FxHashMap<PrimPath, Arc<InstancerAdapter>>;

/// Everything one primitive sync may touch.
///
/// A context is built per primitive sync and used on a single thread.
pub struct SyncContext<'a> {
    delegate: &'a RenderDelegateCore,
    scene: &'a dyn SceneDelegate,
    instancers: &'a InstancerMap,
    interrupted: Cell<bool>,
}

impl<'a> SyncContext<'a> {
    #[must_use]
    pub fn new(
        delegate: &'a RenderDelegateCore,
        scene: &'a dyn SceneDelegate,
        instancers: &'a InstancerMap,
    ) -> Self {
        Self {
            delegate,
            scene,
            instancers,
            interrupted: Cell::new(false),
        }
    }

    /// Stops the render loop before the first backend mutation of this sync.
    ///
    /// The edit also clears a previous render failure, so fixing the scene
    /// (say, adding the missing camera) renders again. Later calls on the
    /// same context are free.
    pub fn begin_edit(&self) {
        if !self.interrupted.replace(true) {
            self.delegate.render_state().interrupt(true, true);
        }
    }

    #[inline]
    #[must_use]
    pub fn delegate(&self) -> &'a RenderDelegateCore {
        self.delegate
    }

    #[inline]
    #[must_use]
    pub fn scene(&self) -> &'a dyn SceneDelegate {
        self.scene
    }

    #[inline]
    #[must_use]
    pub fn registry(&self) -> &'a NodeHandleRegistry {
        self.delegate.registry()
    }

    #[inline]
    #[must_use]
    pub fn dependencies(&self) -> &'a DependencyGraph {
        self.delegate.dependencies()
    }

    #[must_use]
    pub fn instancer(&self, id: PrimPath) -> Option<&'a Arc<InstancerAdapter>> {
        self.instancers.get(&id)
    }

    #[must_use]
    pub fn fps(&self) -> f32 {
        self.delegate.render_state().fps()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn type_names_round_trip_through_the_factory_table() {
        for kind in PrimKind::ALL {
            assert_eq!(PrimKind::from_type_name(kind.type_name()).unwrap(), kind);
        }
        assert!(matches!(
            PrimKind::from_type_name("nurbsPatch"),
            Err(HydrantError::UnknownPrimType(_))
        ));
    }

    #[test]
    fn vocabularies_follow_the_kind() {
        assert_eq!(PrimKind::Mesh.tracked_kind(), TrackedKind::Rprim);
        assert_eq!(PrimKind::Light.tracked_kind(), TrackedKind::Sprim);
        assert_eq!(PrimKind::Instancer.tracked_kind(), TrackedKind::Instancer);
        assert!(PrimKind::Camera.shape_node_type().is_none());
    }
}
