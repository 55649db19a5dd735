//! End-to-end synchronization tests
//!
//! Tests for:
//! - Material terminal swaps re-binding dependent meshes
//! - Material removal falling back to the default shader
//! - Camera edits re-dirtying projection materials
//! - Instancer chains (single, nested and cyclic)
//! - Frame-rate changes refreshing velocity-blurred instances
//! - Motion range of transforms
//! - Render tags, light linking and batch mode
//! - Recovery from a failed render

use std::sync::Arc;

use glam::{Mat4, Vec3};
use hydrant::delegate::{LightAdapter, MaterialAdapter, ShapeAdapter};
use hydrant::{
    ChangeTracker, DelegateSettings, DirtyBits, HydrantError, MaterialNetwork, MemoryBackend, NodeId,
    ParamValue, PrimKind, PrimPath, RenderBackend, RenderErrorCode, RenderFailure, RenderIndex,
    RenderOutcome, SampledValue, SessionContext, ShaderDesc, StaticScene, SyncPrim, Value,
};

// ============================================================================
// Helper
// ============================================================================

const SHUTTER: [f32; 2] = [-0.25, 0.25];

fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

struct Fixture {
    backend: Arc<MemoryBackend>,
    scene: Arc<StaticScene>,
    index: RenderIndex,
}

fn fixture(settings: DelegateSettings) -> Fixture {
    init_logger();
    let backend = Arc::new(MemoryBackend::new());
    let scene = Arc::new(StaticScene::new());
    let index = RenderIndex::new(SessionContext::new(backend.clone()), settings, scene.clone())
        .unwrap();
    Fixture {
        backend,
        scene,
        index,
    }
}

impl Fixture {
    /// Ticks until a render step runs.
    fn settle(&mut self) -> RenderOutcome {
        for _ in 0..8 {
            if let Some(outcome) = self.index.tick(SHUTTER) {
                return outcome;
            }
        }
        panic!("scene did not settle");
    }

    fn shape_node(&self, id: PrimPath) -> NodeId {
        self.index
            .prim_as::<ShapeAdapter>(id)
            .and_then(ShapeAdapter::node)
            .map(|h| h.id())
            .unwrap()
    }

    fn surface_node(&self, id: PrimPath) -> NodeId {
        self.index
            .prim_as::<MaterialAdapter>(id)
            .and_then(MaterialAdapter::surface)
            .map(|h| h.id())
            .unwrap()
    }

    fn param(&self, node: NodeId, name: &str) -> Option<ParamValue> {
        self.backend.param(node, name)
    }
}

fn surface(node_type: &str) -> MaterialNetwork {
    MaterialNetwork {
        surface: Some(ShaderDesc::new(node_type).with_value("base", 0.8_f32)),
        displacement: None,
    }
}

// ============================================================================
// Materials
// ============================================================================

#[test]
fn material_swap_rebinds_the_mesh() {
    let mut f = fixture(DelegateSettings::default());
    let mesh = PrimPath::new("/e2e/swap/mesh");
    let material = PrimPath::new("/e2e/swap/material");
    f.scene.set_material_network(material, surface("standard_surface"));
    f.scene.bind_material(mesh, Some(material));
    f.index.insert_prim(PrimKind::Material, material);
    f.index.insert_prim(PrimKind::Mesh, mesh);

    assert_eq!(f.settle(), RenderOutcome::Converging);
    let old_surface = f.surface_node(material);
    let mesh_node = f.shape_node(mesh);
    assert_eq!(f.param(mesh_node, "shader"), Some(ParamValue::Node(Some(old_surface))));
    assert_eq!(
        f.index.delegate().dependencies().sources_of(material),
        vec![mesh]
    );

    f.scene.set_material_network(material, surface("lambert"));
    f.index.mark_dirty(material, DirtyBits::SPRIM_PARAMS);

    // The material resync re-dirties the mesh, so the render step waits.
    assert_eq!(f.index.tick(SHUTTER), None);
    assert!(
        f.index
            .tracker()
            .dirty_bits(mesh)
            .contains(DirtyBits::MATERIAL_ID)
    );

    assert_eq!(f.index.tick(SHUTTER), Some(RenderOutcome::Converging));
    let new_surface = f.surface_node(material);
    assert_ne!(old_surface, new_surface);
    assert_eq!(f.param(mesh_node, "shader"), Some(ParamValue::Node(Some(new_surface))));
    assert_eq!(f.backend.destroy_count(old_surface), 1);
    assert!(f.backend.is_alive(new_surface));

    let counters = f.backend.counters();
    assert_eq!(counters.restarts, 1);
    assert_eq!(counters.mid_render_mutations, 0);
}

#[test]
fn unbound_mesh_uses_the_fallback_shader() {
    let mut f = fixture(DelegateSettings::default());
    let mesh = PrimPath::new("/e2e/fallback/mesh");
    f.index.insert_prim(PrimKind::Mesh, mesh);
    f.settle();

    let fallback = f.index.delegate().fallback_shader().unwrap().id();
    assert_eq!(
        f.param(f.shape_node(mesh), "shader"),
        Some(ParamValue::Node(Some(fallback)))
    );
}

#[test]
fn removing_a_material_falls_back() {
    let mut f = fixture(DelegateSettings::default());
    let mesh = PrimPath::new("/e2e/remove/mesh");
    let material = PrimPath::new("/e2e/remove/material");
    f.scene.set_material_network(material, surface("standard_surface"));
    f.scene.bind_material(mesh, Some(material));
    f.index.insert_prim(PrimKind::Material, material);
    f.index.insert_prim(PrimKind::Mesh, mesh);
    f.settle();
    let surface_node = f.surface_node(material);

    f.index.remove_prim(material);
    assert_eq!(f.backend.destroy_count(surface_node), 1);
    assert_eq!(f.index.tick(SHUTTER), None);

    f.settle();
    let fallback = f.index.delegate().fallback_shader().unwrap().id();
    assert_eq!(
        f.param(f.shape_node(mesh), "shader"),
        Some(ParamValue::Node(Some(fallback)))
    );
    assert_eq!(f.backend.destroy_count(surface_node), 1);
    assert_eq!(f.backend.counters().mid_render_mutations, 0);
}

#[test]
fn camera_edit_redirties_projection_material() {
    let mut f = fixture(DelegateSettings::default());
    let camera = PrimPath::new("/e2e/projection/camera");
    let material = PrimPath::new("/e2e/projection/material");
    f.scene.set_material_network(
        material,
        MaterialNetwork {
            surface: Some(ShaderDesc::new("camera_projection").with_prim("camera", camera)),
            displacement: None,
        },
    );
    f.index.insert_prim(PrimKind::Camera, camera);
    f.index.insert_prim(PrimKind::Material, material);
    f.settle();

    let camera_node = f.backend.lookup_node(camera.as_str(), None).unwrap();
    assert_eq!(
        f.param(f.surface_node(material), "camera"),
        Some(ParamValue::Node(Some(camera_node)))
    );

    f.index.mark_dirty(camera, DirtyBits::SPRIM_TRANSFORM);
    assert_eq!(f.index.tick(SHUTTER), None);
    assert!(
        f.index
            .tracker()
            .dirty_bits(material)
            .contains(DirtyBits::SPRIM_PARAMS)
    );
    f.settle();
}

// ============================================================================
// Instancing
// ============================================================================

#[test]
fn instanced_mesh_is_hidden_behind_an_instancer_node() {
    let mut f = fixture(DelegateSettings::default());
    let mesh = PrimPath::new("/e2e/instance/mesh");
    let instancer = PrimPath::new("/e2e/instance/instancer");
    f.scene.set_primvar(
        instancer,
        "instanceTranslations",
        SampledValue::constant(Value::from(vec![Vec3::X, Vec3::new(2.0, 0.0, 0.0)])),
    );
    f.scene.set_instancer(mesh, Some(instancer));
    f.scene.set_instance_indices(instancer, mesh, vec![0, 1]);
    f.index.insert_prim(PrimKind::Instancer, instancer);
    f.index.insert_prim(PrimKind::Mesh, mesh);
    f.settle();

    let mesh_node = f.shape_node(mesh);
    let shape = f.index.prim_as::<ShapeAdapter>(mesh).unwrap();
    let [node] = shape.instancer_nodes() else {
        panic!("expected one instancer node");
    };
    assert_eq!(node.name(), "/e2e/instance/mesh_instancer");
    assert_eq!(f.param(node.id(), "nodes"), Some(ParamValue::NodeArray(vec![mesh_node])));
    assert_eq!(f.param(mesh_node, "visibility"), Some(ParamValue::Byte(0)));
    assert_eq!(
        f.param(node.id(), "instance_visibility"),
        Some(ParamValue::ByteArray(vec![u8::MAX]))
    );
    let Some(ParamValue::MatrixArray { keys, values }) = f.param(node.id(), "instance_matrix")
    else {
        panic!("instance_matrix missing");
    };
    assert_eq!(keys, 1);
    assert_eq!(values.len(), 2);
    assert_eq!(values[1].w_axis.truncate(), Vec3::new(2.0, 0.0, 0.0));
}

#[test]
fn nested_instancers_build_a_chain() {
    let mut f = fixture(DelegateSettings::default());
    let mesh = PrimPath::new("/e2e/nested/mesh");
    let inner = PrimPath::new("/e2e/nested/inner");
    let outer = PrimPath::new("/e2e/nested/outer");
    f.scene.set_instancer(mesh, Some(inner));
    f.scene.set_instancer(inner, Some(outer));
    f.scene.set_instance_indices(inner, mesh, vec![0]);
    f.scene.set_instance_indices(outer, inner, vec![0, 0, 0]);
    f.index.insert_prim(PrimKind::Instancer, outer);
    f.index.insert_prim(PrimKind::Instancer, inner);
    f.index.insert_prim(PrimKind::Mesh, mesh);
    f.settle();

    let shape = f.index.prim_as::<ShapeAdapter>(mesh).unwrap();
    let [first, second] = shape.instancer_nodes() else {
        panic!("expected two instancer nodes");
    };
    assert_eq!(first.name(), "/e2e/nested/mesh_instancer");
    assert_eq!(second.name(), "/e2e/nested/mesh_instancer_1");
    assert_eq!(
        f.param(second.id(), "nodes"),
        Some(ParamValue::NodeArray(vec![first.id()]))
    );
    assert_eq!(f.param(first.id(), "visibility"), Some(ParamValue::Byte(0)));
    assert_eq!(f.param(second.id(), "visibility"), None);

    // Dropping the instancer binding destroys the chain.
    let (first, second) = (first.id(), second.id());
    f.scene.set_instancer(mesh, None);
    f.index.mark_dirty(mesh, DirtyBits::INSTANCER);
    f.settle();
    assert_eq!(f.backend.destroy_count(first), 1);
    assert_eq!(f.backend.destroy_count(second), 1);
    assert_eq!(
        f.param(f.shape_node(mesh), "visibility"),
        Some(ParamValue::Byte(u8::MAX))
    );
}

#[test]
fn fps_change_refreshes_velocity_blurred_instances() {
    let mut f = fixture(DelegateSettings::default());
    let mesh = PrimPath::new("/e2e/fps/mesh");
    let instancer = PrimPath::new("/e2e/fps/instancer");
    let mut xform = SampledValue::new();
    xform.push(0.0, Mat4::IDENTITY);
    xform.push(1.0 / 24.0, Mat4::IDENTITY);
    f.scene.set_transform(instancer, xform);
    f.scene.set_primvar(
        instancer,
        "instanceTranslations",
        SampledValue::constant(Value::from(vec![Vec3::ZERO])),
    );
    f.scene.set_attribute(instancer, "velocities", vec![Vec3::X]);
    f.scene.set_instancer(mesh, Some(instancer));
    f.scene.set_instance_indices(instancer, mesh, vec![0]);
    f.index.insert_prim(PrimKind::Instancer, instancer);
    f.index.insert_prim(PrimKind::Mesh, mesh);
    f.settle();

    let last_sample_x = |f: &Fixture| {
        let shape = f.index.prim_as::<ShapeAdapter>(mesh).unwrap();
        let node = shape.instancer_nodes()[0].id();
        let Some(ParamValue::MatrixArray { keys, values }) = f.param(node, "instance_matrix")
        else {
            panic!("instance_matrix missing");
        };
        assert_eq!(keys, 2);
        values[1].w_axis.x
    };
    assert!((last_sample_x(&f) - 1.0).abs() < 1e-4);

    f.index.delegate().set_fps(48.0);
    f.settle();
    assert!((last_sample_x(&f) - 2.0).abs() < 1e-4);
    assert_eq!(f.backend.counters().mid_render_mutations, 0);
}

#[test]
fn instancer_cycle_builds_each_level_once() {
    let mut f = fixture(DelegateSettings::default());
    let mesh = PrimPath::new("/e2e/cycle/mesh");
    let a = PrimPath::new("/e2e/cycle/a");
    let b = PrimPath::new("/e2e/cycle/b");
    f.scene.set_instancer(mesh, Some(a));
    f.scene.set_instancer(a, Some(b));
    f.scene.set_instancer(b, Some(a));
    f.scene.set_instance_indices(a, mesh, vec![0]);
    f.scene.set_instance_indices(b, a, vec![0]);
    f.index.insert_prim(PrimKind::Instancer, a);
    f.index.insert_prim(PrimKind::Instancer, b);
    f.index.insert_prim(PrimKind::Mesh, mesh);
    f.settle();

    let shape = f.index.prim_as::<ShapeAdapter>(mesh).unwrap();
    let [first, second] = shape.instancer_nodes() else {
        panic!("expected two instancer nodes");
    };
    assert_eq!(first.name(), "/e2e/cycle/mesh_instancer");
    assert_eq!(second.name(), "/e2e/cycle/mesh_instancer_1");
    assert_eq!(f.param(first.id(), "visibility"), Some(ParamValue::Byte(0)));
    assert_eq!(f.param(second.id(), "visibility"), None);
}

// ============================================================================
// Transforms and factory
// ============================================================================

#[test]
fn single_sample_transform_drops_the_motion_range() {
    let mut f = fixture(DelegateSettings::default());
    let mesh = PrimPath::new("/e2e/motion/mesh");
    let mut xform = SampledValue::new();
    xform.push(-0.25, Mat4::IDENTITY);
    xform.push(0.25, Mat4::from_translation(Vec3::X));
    f.scene.set_transform(mesh, xform);
    f.index.insert_prim(PrimKind::Mesh, mesh);
    f.settle();

    let node = f.shape_node(mesh);
    assert_eq!(f.param(node, "motion_start"), Some(ParamValue::Float(-0.25)));
    assert_eq!(f.param(node, "motion_end"), Some(ParamValue::Float(0.25)));

    let still = Mat4::from_translation(Vec3::Y);
    f.scene.set_transform(mesh, SampledValue::constant(still));
    f.index.mark_dirty(mesh, DirtyBits::TRANSFORM);
    f.settle();
    assert_eq!(f.param(node, "matrix"), Some(ParamValue::Matrix(still)));
    assert_eq!(f.param(node, "motion_start"), None);
    assert_eq!(f.param(node, "motion_end"), None);
}

#[test]
fn prims_inserted_by_type_name() {
    let mut f = fixture(DelegateSettings::default());
    let curves = PrimPath::new("/e2e/by_name/curves");
    f.index.insert_prim_by_name("basisCurves", curves).unwrap();
    f.settle();
    assert_eq!(f.index.prim(curves).map(|p| p.kind()), Some(PrimKind::Curves));
    assert!(f.backend.is_alive(f.shape_node(curves)));

    let err = f
        .index
        .insert_prim_by_name("nurbsPatch", PrimPath::new("/e2e/by_name/patch"))
        .unwrap_err();
    assert!(matches!(err, HydrantError::UnknownPrimType(_)));
    assert_eq!(f.index.len(), 1);
}

// ============================================================================
// Render tags and light linking
// ============================================================================

#[test]
fn render_tags_enable_and_disable_shapes() {
    let mut f = fixture(DelegateSettings::default());
    let proxy = PrimPath::new("/e2e/tags/proxy");
    f.scene.set_render_tag(proxy, "proxy");
    f.index.insert_prim(PrimKind::Mesh, proxy);
    f.settle();
    let node = f.shape_node(proxy);
    assert!(f.backend.is_disabled(node));

    let interrupts = f.backend.counters().interrupts;
    f.index
        .set_render_tags(&["geometry".to_owned(), "proxy".to_owned()]);
    assert!(!f.backend.is_disabled(node));
    assert_eq!(f.backend.counters().interrupts, interrupts + 1);

    // Same set again: nothing to do.
    f.index
        .set_render_tags(&["geometry".to_owned(), "proxy".to_owned()]);
    assert_eq!(f.backend.counters().interrupts, interrupts + 1);
    assert_eq!(f.backend.counters().mid_render_mutations, 0);
}

#[test]
fn linked_lights_only_reach_matching_shapes() {
    let mut f = fixture(DelegateSettings::default());
    let light = PrimPath::new("/e2e/link/key");
    let linked = PrimPath::new("/e2e/link/linked");
    let other = PrimPath::new("/e2e/link/other");
    f.scene.set_attribute(light, "light_link", "key");
    f.scene
        .set_attribute(linked, "categories", vec![Arc::<str>::from("key")]);
    f.index.insert_prim(PrimKind::Light, light);
    f.index.insert_prim(PrimKind::Mesh, linked);
    f.index.insert_prim(PrimKind::Mesh, other);
    f.settle();

    let light_node = f
        .index
        .prim_as::<LightAdapter>(light)
        .and_then(LightAdapter::node)
        .map(|h| h.id())
        .unwrap();
    let linked_node = f.shape_node(linked);
    let other_node = f.shape_node(other);

    assert_eq!(
        f.param(linked_node, "light_group"),
        Some(ParamValue::NodeArray(vec![light_node]))
    );
    assert_eq!(f.param(linked_node, "use_light_group"), Some(ParamValue::Bool(true)));
    assert_eq!(f.param(other_node, "light_group"), None);
    assert_eq!(f.param(other_node, "use_light_group"), Some(ParamValue::Bool(true)));
    // Shadows are unrestricted.
    assert_eq!(f.param(linked_node, "use_shadow_group"), None);
}

#[test]
fn batch_mode_skips_interrupts_and_tags() {
    let mut f = fixture(DelegateSettings {
        batch: true,
        ..Default::default()
    });
    let proxy = PrimPath::new("/e2e/batch/proxy");
    f.scene.set_render_tag(proxy, "proxy");
    f.index.insert_prim(PrimKind::Mesh, proxy);
    f.settle();

    f.index.mark_dirty(proxy, DirtyBits::TRANSFORM);
    f.settle();
    assert_eq!(f.backend.counters().interrupts, 0);
    assert!(!f.backend.is_disabled(f.shape_node(proxy)));
}

// ============================================================================
// Failure recovery
// ============================================================================

#[test]
fn scene_edit_recovers_from_a_failed_render() {
    let mut f = fixture(DelegateSettings::default());
    let mesh = PrimPath::new("/e2e/failure/mesh");
    f.index.insert_prim(PrimKind::Mesh, mesh);
    f.settle();

    f.backend.fail(RenderErrorCode::NoCamera);
    assert_eq!(f.index.render(), RenderOutcome::Aborted);
    assert_eq!(
        f.index.delegate().render_state().last_failure(),
        Some(RenderFailure::NoCamera)
    );
    assert_eq!(f.index.render(), RenderOutcome::Aborted);

    f.index.mark_dirty(mesh, DirtyBits::TRANSFORM);
    assert_eq!(f.settle(), RenderOutcome::Converging);
    assert_eq!(f.backend.counters().begins, 2);
}

#[test]
fn dropping_the_index_releases_everything() {
    let mut f = fixture(DelegateSettings::default());
    let mesh = PrimPath::new("/e2e/drop/mesh");
    f.index.insert_prim(PrimKind::Mesh, mesh);
    f.settle();
    let node = f.shape_node(mesh);

    let Fixture { backend, index, .. } = f;
    drop(index);
    assert_eq!(backend.destroy_count(node), 1);
    assert_eq!(backend.counters().sessions_ended, 1);
}
