//! Material node graph.

use std::any::Any;

use hydrant_backend::{NodeHandle, ParamValue};
use hydrant_core::{DirtyBits, PrimPath};

use crate::delegate::MaterialTerminals;
use crate::prim::{PrimKind, SyncContext, SyncPrim};
use crate::scene::{ShaderDesc, ShaderInput};

/// Translates a material network into terminal shader nodes.
///
/// Shapes bound to the material depend on it. Whenever a resync swaps a
/// terminal for a different backend node (say, the surface shader type
/// changed), those shapes are re-dirtied so they rebind.
#[derive(Debug)]
pub struct MaterialAdapter {
    id: PrimPath,
    surface: Option<NodeHandle>,
    displacement: Option<NodeHandle>,
    synced_once: bool,
}

impl MaterialAdapter {
    #[must_use]
    pub fn new(id: PrimPath) -> Self {
        Self {
            id,
            surface: None,
            displacement: None,
            synced_once: false,
        }
    }

    #[must_use]
    pub fn surface(&self) -> Option<&NodeHandle> {
        self.surface.as_ref()
    }

    #[must_use]
    pub fn displacement(&self) -> Option<&NodeHandle> {
        self.displacement.as_ref()
    }

    fn build_terminal(
        &self,
        ctx: &SyncContext<'_>,
        terminal: &str,
        desc: Option<&ShaderDesc>,
        previous: Option<&NodeHandle>,
    ) -> Option<NodeHandle> {
        let Some(desc) = desc else {
            ctx.registry().destroy_node(previous);
            return None;
        };
        let node = ctx
            .registry()
            .create_node(&desc.node_type, &self.id.node_name(terminal))?;
        let backend = ctx.registry().backend();
        for (name, input) in &desc.inputs {
            match input {
                ShaderInput::Value(value) => match ParamValue::from_value(value) {
                    Some(param) => backend.set_param(node.id(), name, param),
                    None => log::debug!("Skipping input {name} of {}", self.id),
                },
                ShaderInput::Prim(path) => {
                    let target = ctx.registry().lookup_node(path.as_str()).map(|h| h.id());
                    backend.set_param(node.id(), name, ParamValue::Node(target));
                }
            }
        }
        Some(node)
    }
}

impl SyncPrim for MaterialAdapter {
    fn id(&self) -> PrimPath {
        self.id
    }

    fn kind(&self) -> PrimKind {
        PrimKind::Material
    }

    fn initial_dirty_bits(&self) -> DirtyBits {
        DirtyBits::SPRIM_PARAMS | DirtyBits::SPRIM_RESOURCE
    }

    fn sync(&mut self, ctx: &SyncContext<'_>, dirty: &mut DirtyBits) {
        if !dirty.intersects(DirtyBits::SPRIM_PARAMS | DirtyBits::SPRIM_RESOURCE) {
            *dirty = DirtyBits::CLEAN;
            return;
        }
        ctx.begin_edit();

        let network = ctx.scene().material_network(self.id).unwrap_or_default();
        let surface = self.build_terminal(
            ctx,
            "surface",
            network.surface.as_ref(),
            self.surface.as_ref(),
        );
        let displacement = self.build_terminal(
            ctx,
            "displacement",
            network.displacement.as_ref(),
            self.displacement.as_ref(),
        );

        let referenced = network
            .surface
            .iter()
            .chain(network.displacement.iter())
            .flat_map(ShaderDesc::referenced_prims)
            .map(|prim| (prim, DirtyBits::SPRIM_PARAMS));
        ctx.dependencies().track_dependencies(self.id, referenced);

        let changed = surface != self.surface || displacement != self.displacement;
        self.surface = surface;
        self.displacement = displacement;
        ctx.delegate().publish_material(
            self.id,
            MaterialTerminals {
                surface: self.surface.clone(),
                displacement: self.displacement.clone(),
            },
        );
        if self.synced_once && changed {
            log::debug!("Terminals of {} changed, re-dirtying consumers", self.id);
            ctx.dependencies().mark_dirty(self.id);
        }
        self.synced_once = true;
        *dirty = DirtyBits::CLEAN;
    }

    fn finalize(&mut self, ctx: &SyncContext<'_>) {
        ctx.delegate().retract_material(self.id);
        ctx.begin_edit();
        ctx.registry().destroy_node(self.surface.take().as_ref());
        ctx.registry().destroy_node(self.displacement.take().as_ref());
        ctx.dependencies().clear_dependencies(self.id);
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
