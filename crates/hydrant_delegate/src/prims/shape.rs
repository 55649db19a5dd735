//! Geometric primitives.

use std::any::Any;
use std::sync::Arc;

use hydrant_backend::{NodeHandle, ParamValue, RenderBackend};
use hydrant_core::{DirtyBits, PrimPath};

use super::write_matrix;
use crate::prim::{PrimKind, SyncContext, SyncPrim};

/// Mesh, curves, points or volume adapter.
///
/// Owns one shape node. When the primitive is instanced the shape node is
/// hidden and replicated by a chain of instancer nodes, innermost first.
#[derive(Debug)]
pub struct ShapeAdapter {
    kind: PrimKind,
    id: PrimPath,
    node: Option<NodeHandle>,
    instancers: Vec<NodeHandle>,
    visible: bool,
}

impl ShapeAdapter {
    #[must_use]
    pub fn new(kind: PrimKind, id: PrimPath) -> Self {
        debug_assert!(kind.is_geometric());
        Self {
            kind,
            id,
            node: None,
            instancers: Vec::new(),
            visible: true,
        }
    }

    #[must_use]
    pub fn node(&self) -> Option<&NodeHandle> {
        self.node.as_ref()
    }

    /// Instancer nodes replicating this shape, innermost first.
    #[must_use]
    pub fn instancer_nodes(&self) -> &[NodeHandle] {
        &self.instancers
    }

    fn ensure_node(&mut self, ctx: &SyncContext<'_>) -> Option<NodeHandle> {
        if self.node.is_none() {
            let node_type = self.kind.shape_node_type()?;
            self.node = ctx.registry().create_node(node_type, self.id.as_str());
        }
        self.node.clone()
    }

    fn bind_material(&self, ctx: &SyncContext<'_>, node: &NodeHandle) {
        let delegate = ctx.delegate();
        let material = ctx.scene().material_id(self.id);
        ctx.dependencies().track_dependencies(
            self.id,
            material.map(|m| (m, DirtyBits::MATERIAL_ID)),
        );

        let terminals = material
            .and_then(|m| delegate.material_terminals(m))
            .unwrap_or_default();
        let surface = terminals
            .surface
            .as_ref()
            .or_else(|| delegate.fallback_shader())
            .map(NodeHandle::id);
        let backend = ctx.registry().backend();
        backend.set_param(node.id(), "shader", ParamValue::Node(surface));
        match terminals.displacement {
            Some(displacement) => {
                backend.set_param(node.id(), "disp_map", ParamValue::Node(Some(displacement.id())));
            }
            None => backend.reset_param(node.id(), "disp_map"),
        }
    }

    fn rebuild_instancers(&mut self, ctx: &SyncContext<'_>, node: &NodeHandle) {
        let previous = std::mem::take(&mut self.instancers);
        if let Some(instancer) = ctx
            .scene()
            .instancer_id(self.id)
            .and_then(|id| ctx.instancer(id))
        {
            instancer.build_nodes(ctx, self.id, self.id, &mut self.instancers);
        }
        for stale in previous.iter().filter(|h| !self.instancers.contains(h)) {
            ctx.registry().destroy_node(Some(stale));
        }

        let backend = ctx.registry().backend();
        let mut child = node.id();
        for instancer in &self.instancers {
            backend.set_param(instancer.id(), "nodes", ParamValue::NodeArray(vec![child]));
            child = instancer.id();
        }
        if self.instancers.is_empty() && !previous.is_empty() {
            backend.reset_param(node.id(), "visibility");
        }
    }

    fn apply_visibility(&self, backend: &dyn RenderBackend, node: &NodeHandle) {
        let visibility = if self.visible { u8::MAX } else { 0 };
        match self.instancers.first() {
            Some(instancer) => {
                backend.set_param(node.id(), "visibility", ParamValue::Byte(0));
                backend.set_param(
                    instancer.id(),
                    "instance_visibility",
                    ParamValue::ByteArray(vec![visibility]),
                );
            }
            None => backend.set_param(node.id(), "visibility", ParamValue::Byte(visibility)),
        }
    }
}

impl SyncPrim for ShapeAdapter {
    fn id(&self) -> PrimPath {
        self.id
    }

    fn kind(&self) -> PrimKind {
        self.kind
    }

    fn initial_dirty_bits(&self) -> DirtyBits {
        DirtyBits::ALL_DIRTY
    }

    fn sync(&mut self, ctx: &SyncContext<'_>, dirty: &mut DirtyBits) {
        if !dirty.is_dirty() {
            return;
        }
        ctx.begin_edit();
        let Some(node) = self.ensure_node(ctx) else {
            *dirty = DirtyBits::CLEAN;
            return;
        };
        let scene = ctx.scene();
        let backend = ctx.registry().backend();

        if dirty.contains(DirtyBits::TRANSFORM) {
            write_matrix(backend, node.id(), &scene.sample_transform(self.id));
        }
        if dirty.contains(DirtyBits::MATERIAL_ID) {
            self.bind_material(ctx, &node);
        }
        if dirty.contains(DirtyBits::CATEGORIES) {
            let categories = scene
                .get(self.id, "categories")
                .get::<Vec<Arc<str>>>()
                .unwrap_or_default();
            ctx.delegate().apply_light_linking(node.id(), &categories);
        }
        if dirty.contains(DirtyBits::RENDER_TAG) {
            ctx.delegate().track_render_tag(&node, &scene.render_tag(self.id));
        }

        let instancing = dirty.intersects(DirtyBits::INSTANCER | DirtyBits::INSTANCE_INDEX);
        if instancing {
            self.rebuild_instancers(ctx, &node);
        }
        if dirty.contains(DirtyBits::VISIBILITY) {
            self.visible = scene.visible(self.id);
        }
        if instancing || dirty.contains(DirtyBits::VISIBILITY) {
            self.apply_visibility(backend, &node);
        }
        *dirty = DirtyBits::CLEAN;
    }

    fn finalize(&mut self, ctx: &SyncContext<'_>) {
        ctx.begin_edit();
        if let Some(node) = self.node.take() {
            ctx.delegate().untrack_render_tag(&node);
            ctx.registry().destroy_node(Some(&node));
        }
        for instancer in self.instancers.drain(..) {
            ctx.registry().destroy_node(Some(&instancer));
        }
        ctx.dependencies().clear_dependencies(self.id);
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
