//! Scene delegate contract.
//!
//! Primitive adapters pull scene data through [`SceneDelegate`]. Only the
//! values a dirty bit asks for are read during a sync.
//!
//! [`StaticScene`] is an in-memory implementation: tests and headless hosts
//! author primitives with its setters and edit them between ticks.

use glam::Mat4;
use hydrant_core::{PrimPath, SampledValue, Value};
use parking_lot::RwLock;
use rustc_hash::FxHashMap;

/// One input of a shader node.
#[derive(Debug, Clone, PartialEq)]
pub enum ShaderInput {
    /// A constant value.
    Value(Value),
    /// A reference to the backend node of another primitive (e.g. the camera
    /// of a projection shader). Referencing creates a dependency edge.
    Prim(PrimPath),
}

/// A single shader node of a material network.
#[derive(Debug, Clone, PartialEq)]
pub struct ShaderDesc {
    pub node_type: String,
    pub inputs: Vec<(String, ShaderInput)>,
}

impl ShaderDesc {
    pub fn new(node_type: impl Into<String>) -> Self {
        Self {
            node_type: node_type.into(),
            inputs: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_value(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.inputs
            .push((name.to_owned(), ShaderInput::Value(value.into())));
        self
    }

    #[must_use]
    pub fn with_prim(mut self, name: &str, prim: PrimPath) -> Self {
        self.inputs.push((name.to_owned(), ShaderInput::Prim(prim)));
        self
    }

    /// Primitives referenced by this node's inputs.
    pub fn referenced_prims(&self) -> impl Iterator<Item = PrimPath> + '_ {
        self.inputs.iter().filter_map(|(_, input)| match input {
            ShaderInput::Prim(path) => Some(*path),
            ShaderInput::Value(_) => None,
        })
    }
}

/// Terminal shaders of a material.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MaterialNetwork {
    pub surface: Option<ShaderDesc>,
    pub displacement: Option<ShaderDesc>,
}

/// Scene data the adapters read.
pub trait SceneDelegate: Send + Sync {
    /// Generic attribute lookup, [`Value::Empty`] when unset.
    fn get(&self, id: PrimPath, key: &str) -> Value;

    /// Transform samples over the shutter interval.
    fn sample_transform(&self, id: PrimPath) -> SampledValue<Mat4>;

    /// Primvar samples over the shutter interval.
    fn sample_primvar(&self, id: PrimPath, name: &str) -> SampledValue<Value>;

    fn visible(&self, id: PrimPath) -> bool;

    fn render_tag(&self, id: PrimPath) -> String;

    /// Bound material, if any.
    fn material_id(&self, id: PrimPath) -> Option<PrimPath>;

    /// Instancer instancing `id` (a shape or a nested instancer).
    fn instancer_id(&self, id: PrimPath) -> Option<PrimPath>;

    /// Instances of `instancer` that replicate `prototype`.
    fn instance_indices(&self, instancer: PrimPath, prototype: PrimPath) -> Vec<i32>;

    fn material_network(&self, id: PrimPath) -> Option<MaterialNetwork>;

    /// Shader node graph bound to a light.
    fn light_shader(&self, id: PrimPath) -> Option<PrimPath>;
}

#[derive(Debug, Clone)]
struct PrimData {
    attributes: FxHashMap<String, Value>,
    primvars: FxHashMap<String, SampledValue<Value>>,
    transform: SampledValue<Mat4>,
    visible: bool,
    render_tag: Option<String>,
    material: Option<PrimPath>,
    instancer: Option<PrimPath>,
    instance_indices: FxHashMap<PrimPath, Vec<i32>>,
    network: Option<MaterialNetwork>,
    light_shader: Option<PrimPath>,
}

impl Default for PrimData {
    fn default() -> Self {
        Self {
            attributes: FxHashMap::default(),
            primvars: FxHashMap::default(),
            transform: SampledValue::constant(Mat4::IDENTITY),
            visible: true,
            render_tag: None,
            material: None,
            instancer: None,
            instance_indices: FxHashMap::default(),
            network: None,
            light_shader: None,
        }
    }
}

/// In-memory scene.
#[derive(Debug, Default)]
pub struct StaticScene {
    prims: RwLock<FxHashMap<PrimPath, PrimData>>,
}

impl StaticScene {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn edit(&self, id: PrimPath, f: impl FnOnce(&mut PrimData)) {
        f(self.prims.write().entry(id).or_default());
    }

    fn read<T>(&self, id: PrimPath, f: impl FnOnce(&PrimData) -> T) -> Option<T> {
        self.prims.read().get(&id).map(f)
    }

    pub fn set_attribute(&self, id: PrimPath, key: &str, value: impl Into<Value>) {
        let value = value.into();
        self.edit(id, |p| {
            p.attributes.insert(key.to_owned(), value);
        });
    }

    pub fn set_primvar(&self, id: PrimPath, name: &str, samples: SampledValue<Value>) {
        self.edit(id, |p| {
            p.primvars.insert(name.to_owned(), samples);
        });
    }

    pub fn set_transform(&self, id: PrimPath, samples: SampledValue<Mat4>) {
        self.edit(id, |p| p.transform = samples);
    }

    pub fn set_visible(&self, id: PrimPath, visible: bool) {
        self.edit(id, |p| p.visible = visible);
    }

    pub fn set_render_tag(&self, id: PrimPath, tag: &str) {
        self.edit(id, |p| p.render_tag = Some(tag.to_owned()));
    }

    pub fn bind_material(&self, id: PrimPath, material: Option<PrimPath>) {
        self.edit(id, |p| p.material = material);
    }

    pub fn set_instancer(&self, id: PrimPath, instancer: Option<PrimPath>) {
        self.edit(id, |p| p.instancer = instancer);
    }

    pub fn set_instance_indices(&self, instancer: PrimPath, prototype: PrimPath, indices: Vec<i32>) {
        self.edit(instancer, |p| {
            p.instance_indices.insert(prototype, indices);
        });
    }

    pub fn set_material_network(&self, id: PrimPath, network: MaterialNetwork) {
        self.edit(id, |p| p.network = Some(network));
    }

    pub fn set_light_shader(&self, id: PrimPath, shader: Option<PrimPath>) {
        self.edit(id, |p| p.light_shader = shader);
    }

    pub fn remove(&self, id: PrimPath) {
        self.prims.write().remove(&id);
    }
}

impl SceneDelegate for StaticScene {
    fn get(&self, id: PrimPath, key: &str) -> Value {
        self.read(id, |p| p.attributes.get(key).cloned())
            .flatten()
            .unwrap_or_default()
    }

    fn sample_transform(&self, id: PrimPath) -> SampledValue<Mat4> {
        self.read(id, |p| p.transform.clone())
            .unwrap_or_else(|| SampledValue::constant(Mat4::IDENTITY))
    }

    fn sample_primvar(&self, id: PrimPath, name: &str) -> SampledValue<Value> {
        self.read(id, |p| p.primvars.get(name).cloned())
            .flatten()
            .unwrap_or_default()
    }

    fn visible(&self, id: PrimPath) -> bool {
        self.read(id, |p| p.visible).unwrap_or(true)
    }

    fn render_tag(&self, id: PrimPath) -> String {
        self.read(id, |p| p.render_tag.clone())
            .flatten()
            .unwrap_or_else(|| "geometry".to_owned())
    }

    fn material_id(&self, id: PrimPath) -> Option<PrimPath> {
        self.read(id, |p| p.material).flatten()
    }

    fn instancer_id(&self, id: PrimPath) -> Option<PrimPath> {
        self.read(id, |p| p.instancer).flatten()
    }

    fn instance_indices(&self, instancer: PrimPath, prototype: PrimPath) -> Vec<i32> {
        self.read(instancer, |p| p.instance_indices.get(&prototype).cloned())
            .flatten()
            .unwrap_or_default()
    }

    fn material_network(&self, id: PrimPath) -> Option<MaterialNetwork> {
        self.read(id, |p| p.network.clone()).flatten()
    }

    fn light_shader(&self, id: PrimPath) -> Option<PrimPath> {
        self.read(id, |p| p.light_shader).flatten()
    }
}
