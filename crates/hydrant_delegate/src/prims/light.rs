//! Lights.

use std::any::Any;
use std::sync::Arc;

use hydrant_backend::{NodeHandle, ParamValue};
use hydrant_core::{DirtyBits, PrimPath};

use super::write_matrix;
use crate::prim::{PrimKind, SyncContext, SyncPrim};

const DEFAULT_LIGHT_TYPE: &str = "point_light";

/// Plain parameters copied from the scene when present.
const LIGHT_PARAMS: &[&str] = &["intensity", "exposure", "color"];

#[derive(Debug, Default, Clone, PartialEq, Eq)]
struct LinkCollections {
    light: String,
    shadow: String,
}

/// Light adapter.
///
/// The optional light shader is a node graph primitive; the light depends on
/// it and rebinds whenever it is re-dirtied.
#[derive(Debug)]
pub struct LightAdapter {
    id: PrimPath,
    node: Option<NodeHandle>,
    shader: Option<PrimPath>,
    links: Option<LinkCollections>,
}

impl LightAdapter {
    #[must_use]
    pub fn new(id: PrimPath) -> Self {
        Self {
            id,
            node: None,
            shader: None,
            links: None,
        }
    }

    #[must_use]
    pub fn node(&self) -> Option<&NodeHandle> {
        self.node.as_ref()
    }

    fn link_string(ctx: &SyncContext<'_>, id: PrimPath, key: &str) -> String {
        ctx.scene()
            .get(id, key)
            .get::<Arc<str>>()
            .map(|s| s.to_string())
            .unwrap_or_default()
    }

    fn sync_links(&mut self, ctx: &SyncContext<'_>) {
        let links = LinkCollections {
            light: Self::link_string(ctx, self.id, "light_link"),
            shadow: Self::link_string(ctx, self.id, "shadow_link"),
        };
        if self.links.as_ref() == Some(&links) {
            return;
        }
        self.deregister_links(ctx);
        let delegate = ctx.delegate();
        delegate.register_light_link(&links.light, self.id, false);
        delegate.register_light_link(&links.shadow, self.id, true);
        self.links = Some(links);
    }

    fn deregister_links(&mut self, ctx: &SyncContext<'_>) {
        if let Some(old) = self.links.take() {
            ctx.delegate().deregister_light_link(&old.light, self.id, false);
            ctx.delegate().deregister_light_link(&old.shadow, self.id, true);
        }
    }

    fn bind_shader(&mut self, ctx: &SyncContext<'_>, node: &NodeHandle) {
        let shader = ctx.scene().light_shader(self.id);
        let backend = ctx.registry().backend();
        match shader {
            Some(shader) => {
                ctx.dependencies()
                    .track_dependencies(self.id, [(shader, DirtyBits::SPRIM_PARAMS)]);
                let surface = ctx
                    .delegate()
                    .material_terminals(shader)
                    .and_then(|t| t.surface)
                    .map(|h| h.id());
                backend.set_param(node.id(), "shader", ParamValue::Node(surface));
            }
            None if self.shader.is_some() => {
                ctx.dependencies()
                    .track_dependencies(self.id, std::iter::empty());
                backend.reset_param(node.id(), "shader");
            }
            None => {}
        }
        self.shader = shader;
    }
}

impl SyncPrim for LightAdapter {
    fn id(&self) -> PrimPath {
        self.id
    }

    fn kind(&self) -> PrimKind {
        PrimKind::Light
    }

    fn initial_dirty_bits(&self) -> DirtyBits {
        DirtyBits::SPRIM_ALL
    }

    fn sync(&mut self, ctx: &SyncContext<'_>, dirty: &mut DirtyBits) {
        let scene = ctx.scene();
        if dirty.intersects(DirtyBits::SPRIM_PARAMS | DirtyBits::SPRIM_TRANSFORM) {
            ctx.begin_edit();
            let light_type = scene
                .get(self.id, "light_type")
                .get::<Arc<str>>()
                .unwrap_or_else(|| DEFAULT_LIGHT_TYPE.into());
            if self
                .node
                .as_ref()
                .is_none_or(|n| n.node_type() != &*light_type)
            {
                let replaced = self.node.is_some();
                self.node = ctx.registry().create_node(&light_type, self.id.as_str());
                *dirty |= DirtyBits::SPRIM_PARAMS | DirtyBits::SPRIM_TRANSFORM;
                if replaced {
                    // Light groups of shapes point at the old node.
                    ctx.delegate().mark_light_linking_changed();
                }
            }
        }

        if let Some(node) = self.node.clone() {
            let backend = ctx.registry().backend();
            if dirty.contains(DirtyBits::SPRIM_TRANSFORM) {
                write_matrix(backend, node.id(), &scene.sample_transform(self.id));
            }
            if dirty.contains(DirtyBits::SPRIM_PARAMS) {
                for name in LIGHT_PARAMS {
                    if let Some(param) = ParamValue::from_value(&scene.get(self.id, name)) {
                        backend.set_param(node.id(), name, param);
                    }
                }
                self.bind_shader(ctx, &node);
            }
        }

        if dirty.contains(DirtyBits::SPRIM_COLLECTION) {
            self.sync_links(ctx);
        }
        *dirty = DirtyBits::CLEAN;
    }

    fn finalize(&mut self, ctx: &SyncContext<'_>) {
        self.deregister_links(ctx);
        ctx.begin_edit();
        ctx.registry().destroy_node(self.node.take().as_ref());
        ctx.dependencies().clear_dependencies(self.id);
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
