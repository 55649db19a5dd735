//! Cameras.

use std::any::Any;

use hydrant_backend::{NodeHandle, ParamValue};
use hydrant_core::{DirtyBits, PrimPath};

use super::write_matrix;
use crate::prim::{PrimKind, SyncContext, SyncPrim};

const CAMERA_NODE_TYPE: &str = "persp_camera";
const DEFAULT_FOV: f32 = 54.43;

/// Camera adapter.
///
/// Projection shaders read the camera node, so every sync re-dirties the
/// primitives that depend on the camera.
#[derive(Debug)]
pub struct CameraAdapter {
    id: PrimPath,
    node: Option<NodeHandle>,
}

impl CameraAdapter {
    #[must_use]
    pub fn new(id: PrimPath) -> Self {
        Self { id, node: None }
    }

    #[must_use]
    pub fn node(&self) -> Option<&NodeHandle> {
        self.node.as_ref()
    }
}

impl SyncPrim for CameraAdapter {
    fn id(&self) -> PrimPath {
        self.id
    }

    fn kind(&self) -> PrimKind {
        PrimKind::Camera
    }

    fn initial_dirty_bits(&self) -> DirtyBits {
        DirtyBits::SPRIM_TRANSFORM | DirtyBits::SPRIM_PARAMS
    }

    fn sync(&mut self, ctx: &SyncContext<'_>, dirty: &mut DirtyBits) {
        if !dirty.is_dirty() {
            return;
        }
        ctx.begin_edit();
        if self.node.is_none() {
            self.node = ctx.registry().create_node(CAMERA_NODE_TYPE, self.id.as_str());
            *dirty |= DirtyBits::SPRIM_TRANSFORM | DirtyBits::SPRIM_PARAMS;
        }
        if let Some(node) = &self.node {
            let scene = ctx.scene();
            let backend = ctx.registry().backend();
            if dirty.contains(DirtyBits::SPRIM_TRANSFORM) {
                write_matrix(backend, node.id(), &scene.sample_transform(self.id));
            }
            if dirty.contains(DirtyBits::SPRIM_PARAMS) {
                let fov = scene.get(self.id, "fov").get::<f32>().unwrap_or(DEFAULT_FOV);
                backend.set_param(node.id(), "fov", ParamValue::Float(fov));
            }
        }
        ctx.dependencies().mark_dirty(self.id);
        *dirty = DirtyBits::CLEAN;
    }

    fn finalize(&mut self, ctx: &SyncContext<'_>) {
        ctx.begin_edit();
        ctx.registry().destroy_node(self.node.take().as_ref());
        ctx.dependencies().clear_dependencies(self.id);
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
