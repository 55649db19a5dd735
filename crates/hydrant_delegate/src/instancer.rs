//! Instance transform resolution.
//!
//! An instancer carries time-sampled per-instance translate, rotate, scale
//! and full-transform primvars, plus optional velocities and accelerations.
//! For each prototype it instances, [`resolve`] turns those into a dense
//! `samples × instances` matrix array ready for the backend's keyed instance
//! matrix parameter.
//!
//! Per instance and sample time `t` the matrix is
//!
//! ```text
//! M = instancer(t) · T(p + v·fps·t + ½·a·fps²·t²) · R(q(t)) · S(s) · X
//! ```
//!
//! where `X` is the per-instance transform. A factor whose array does not
//! cover the instance index is skipped.

use std::sync::Arc;

use glam::{Mat4, Quat, Vec3};
use hydrant_backend::{NodeHandle, ParamValue};
use hydrant_core::{DirtyBits, PrimPath, SampledValue, Value};
use parking_lot::Mutex;
use smallvec::SmallVec;

use crate::prim::SyncContext;

pub const TRANSLATIONS: &str = "instanceTranslations";
pub const ROTATIONS: &str = "instanceRotations";
pub const SCALES: &str = "instanceScales";
pub const TRANSFORMS: &str = "instanceTransforms";
pub const VELOCITIES: &str = "velocities";
pub const ACCELERATIONS: &str = "accelerations";
pub const ANGULAR_VELOCITIES: &str = "angularVelocities";
pub const DEFORM_KEYS: &str = "deform_keys";

/// Sample times closer than this are considered identical.
const TIME_EPSILON: f32 = 1e-6;

/// Cached instancer primvars.
#[derive(Debug, Clone, Default)]
pub struct InstancePrimvarSet {
    pub transforms: SampledValue<Vec<Mat4>>,
    pub translates: SampledValue<Vec<Vec3>>,
    pub rotates: SampledValue<Vec<Quat>>,
    pub scales: SampledValue<Vec<Vec3>>,
    pub velocities: Vec<Vec3>,
    pub accelerations: Vec<Vec3>,
    /// Degrees per unit time about the vector's axis.
    pub angular_velocities: Vec<Vec3>,
    /// Overrides the number of output samples when set.
    pub deform_keys: Option<u32>,
}

impl InstancePrimvarSet {
    /// True when positions are extrapolated from velocities or
    /// accelerations instead of read from multiple samples.
    #[must_use]
    pub fn velocity_blur(&self) -> bool {
        !self.velocities.is_empty() || !self.accelerations.is_empty()
    }
}

/// Resolved instance matrices of one prototype.
#[derive(Debug, Clone, PartialEq)]
pub struct InstanceSamples {
    pub times: Vec<f32>,
    /// Sample-major: all instances of sample 0, then sample 1, ...
    pub matrices: Vec<Mat4>,
    pub num_instances: usize,
}

impl InstanceSamples {
    #[inline]
    #[must_use]
    pub fn num_samples(&self) -> usize {
        self.times.len()
    }

    #[inline]
    #[must_use]
    pub fn matrix(&self, sample: usize, instance: usize) -> Mat4 {
        self.matrices[sample * self.num_instances + instance]
    }
}

/// Output sample times: those of the input with the most samples, then
/// adjusted by the deform-key override.
fn sample_times(instancer_xform: &SampledValue<Mat4>, set: &InstancePrimvarSet) -> Vec<f32> {
    let candidates: [&[f32]; 5] = [
        instancer_xform.times(),
        set.transforms.times(),
        set.translates.times(),
        set.rotates.times(),
        set.scales.times(),
    ];
    let mut times: Vec<f32> = Vec::new();
    for candidate in candidates {
        if candidate.len() > times.len() {
            times = candidate.to_vec();
        }
    }

    match set.deform_keys {
        Some(keys) if keys > 1 => {
            let min = times.iter().copied().reduce(f32::min).unwrap_or(0.0);
            let max = times.iter().copied().reduce(f32::max).unwrap_or(0.0);
            let last = (keys - 1) as f32;
            times = (0..keys)
                .map(|i| min + i as f32 * (max - min) / last)
                .collect();
        }
        Some(_) if times.len() < 2 => times = vec![0.0],
        _ => {}
    }

    if times.len() > 1 {
        let min = times.iter().copied().reduce(f32::min).unwrap_or(0.0);
        let max = times.iter().copied().reduce(f32::max).unwrap_or(0.0);
        if max - min <= TIME_EPSILON {
            times.truncate(1);
        }
    }
    times
}

#[inline]
fn element<T: Copy>(array: &[T], index: Option<usize>) -> Option<T> {
    index.and_then(|i| array.get(i).copied())
}

/// Computes the instance matrices of the instances listed in `indices`.
///
/// Returns `None` when there are no instances or nothing is sampled.
#[must_use]
pub fn resolve(
    indices: &[i32],
    instancer_xform: &SampledValue<Mat4>,
    set: &InstancePrimvarSet,
    fps: f32,
) -> Option<InstanceSamples> {
    if indices.is_empty() {
        return None;
    }
    let times = sample_times(instancer_xform, set);
    if times.is_empty() {
        return None;
    }

    let velocity_blur = set.velocity_blur();
    let angular_blur = !set.angular_velocities.is_empty();
    let fps2 = fps * fps;
    let slots: SmallVec<[Option<usize>; 16]> =
        indices.iter().map(|&i| usize::try_from(i).ok()).collect();

    let mut matrices = Vec::with_capacity(times.len() * indices.len());
    for &t in &times {
        let base = instancer_xform.resample(t).unwrap_or(Mat4::IDENTITY);
        let transforms = set.transforms.resample(t).unwrap_or_default();
        // Extrapolated positions start from the unblurred sample.
        let translates = set
            .translates
            .resample(if velocity_blur { 0.0 } else { t })
            .unwrap_or_default();
        let rotates = set
            .rotates
            .resample(if angular_blur { 0.0 } else { t })
            .unwrap_or_default();
        let scales = set.scales.resample(t).unwrap_or_default();

        for &slot in &slots {
            let mut matrix = base;
            if let Some(mut position) = element(&translates, slot) {
                if let Some(velocity) = element(&set.velocities, slot) {
                    position += velocity * fps * t;
                }
                if let Some(acceleration) = element(&set.accelerations, slot) {
                    position += acceleration * fps2 * t * t * 0.5;
                }
                matrix *= Mat4::from_translation(position);
            }
            if let Some(mut rotation) = element(&rotates, slot) {
                if let Some(omega) = element(&set.angular_velocities, slot)
                    && let Some(axis) = omega.try_normalize()
                {
                    let degrees = omega.length() * fps * t;
                    rotation *= Quat::from_axis_angle(axis, degrees.to_radians());
                }
                matrix *= Mat4::from_quat(rotation.normalize());
            }
            if let Some(scale) = element(&scales, slot) {
                matrix *= Mat4::from_scale(scale);
            }
            if let Some(transform) = element(&transforms, slot) {
                matrix *= transform;
            }
            matrices.push(matrix);
        }
    }

    Some(InstanceSamples {
        times,
        matrices,
        num_instances: indices.len(),
    })
}

/// Instancer primitive adapter.
///
/// Prototype shapes sharing an instancer build their instancer nodes from it
/// concurrently, so the cached primvars sit behind a mutex.
#[derive(Debug)]
pub struct InstancerAdapter {
    id: PrimPath,
    state: Mutex<InstancerState>,
}

#[derive(Debug, Default)]
struct InstancerState {
    primvars: InstancePrimvarSet,
    transform: SampledValue<Mat4>,
    parent: Option<PrimPath>,
}

impl InstancerAdapter {
    #[must_use]
    pub fn new(id: PrimPath) -> Arc<Self> {
        Arc::new(Self {
            id,
            state: Mutex::new(InstancerState::default()),
        })
    }

    #[inline]
    #[must_use]
    pub fn id(&self) -> PrimPath {
        self.id
    }

    #[must_use]
    pub fn initial_dirty_bits(&self) -> DirtyBits {
        DirtyBits::TRANSFORM | DirtyBits::PRIMVAR | DirtyBits::INSTANCER | DirtyBits::INSTANCE_INDEX
    }

    /// Parent instancer, for nested instancing.
    #[must_use]
    pub fn parent(&self) -> Option<PrimPath> {
        self.state.lock().parent
    }

    /// Snapshot of the cached primvars.
    #[must_use]
    pub fn primvars(&self) -> InstancePrimvarSet {
        self.state.lock().primvars.clone()
    }

    /// Pulls dirty primvars from the scene.
    ///
    /// Instancers own no backend node, so syncing never interrupts.
    pub fn sync(&self, ctx: &SyncContext<'_>, dirty: &mut DirtyBits) {
        let scene = ctx.scene();
        let mut state = self.state.lock();

        if dirty.intersects(DirtyBits::TRANSFORM) {
            state.transform = scene.sample_transform(self.id);
        }
        if dirty.intersects(DirtyBits::INSTANCER) {
            state.parent = scene.instancer_id(self.id);
        }
        if dirty.intersects(DirtyBits::PRIMVAR) {
            let primvars = &mut state.primvars;
            primvars.deform_keys = scene
                .get(self.id, DEFORM_KEYS)
                .get::<i32>()
                .map(|keys| u32::try_from(keys).unwrap_or(0));
            primvars.transforms = SampledValue::unbox_from(&scene.sample_primvar(self.id, TRANSFORMS));
            primvars.translates =
                SampledValue::unbox_from(&scene.sample_primvar(self.id, TRANSLATIONS));
            primvars.rotates = SampledValue::unbox_from(&scene.sample_primvar(self.id, ROTATIONS));
            primvars.scales = SampledValue::unbox_from(&scene.sample_primvar(self.id, SCALES));
            let vectors = |key: &str| scene.get(self.id, key).get::<Vec<Vec3>>().unwrap_or_default();
            primvars.velocities = vectors(VELOCITIES);
            primvars.accelerations = vectors(ACCELERATIONS);
            primvars.angular_velocities = vectors(ANGULAR_VELOCITIES);
        }
        *dirty = DirtyBits::CLEAN;
    }

    /// Matrices of the instances of `prototype`.
    #[must_use]
    pub fn instance_samples(&self, ctx: &SyncContext<'_>, prototype: PrimPath) -> Option<InstanceSamples> {
        let indices = ctx.scene().instance_indices(self.id, prototype);
        let state = self.state.lock();
        resolve(&indices, &state.transform, &state.primvars, ctx.fps())
    }

    /// Builds the backend instancer nodes that replicate `prototype`,
    /// appending them to `out` innermost first.
    ///
    /// `shape` names the leaf prototype the chain is built for; nested
    /// levels are suffixed with their depth. Every level but the outermost
    /// is hidden, since only the outermost instancer is rendered directly.
    pub fn build_nodes(
        &self,
        ctx: &SyncContext<'_>,
        prototype: PrimPath,
        shape: PrimPath,
        out: &mut Vec<NodeHandle>,
    ) {
        let mut visited = SmallVec::<[PrimPath; 4]>::new();
        self.build_level(ctx, prototype, shape, out, &mut visited);
    }

    /// One level of [`build_nodes`](Self::build_nodes). Returns `false`
    /// when no node was built for this level.
    fn build_level(
        &self,
        ctx: &SyncContext<'_>,
        prototype: PrimPath,
        shape: PrimPath,
        out: &mut Vec<NodeHandle>,
        visited: &mut SmallVec<[PrimPath; 4]>,
    ) -> bool {
        if visited.contains(&self.id) {
            log::warn!("Instancer cycle through {} while instancing {shape}", self.id);
            return false;
        }
        visited.push(self.id);

        let level = out.len();
        let Some(samples) = self.instance_samples(ctx, prototype) else {
            return false;
        };
        let name = if level == 0 {
            format!("{shape}_instancer")
        } else {
            format!("{shape}_instancer_{level}")
        };
        let Some(node) = ctx.registry().create_node("instancer", &name) else {
            return false;
        };
        let backend = ctx.registry().backend();
        let id = node.id();

        backend.set_param(id, "instance_inherit_xform", ParamValue::BoolArray(vec![true]));
        let keys = u32::try_from(samples.num_samples()).unwrap_or(1);
        let num_instances = samples.num_instances;
        backend.set_param(
            id,
            "instance_matrix",
            ParamValue::MatrixArray {
                keys,
                values: samples.matrices,
            },
        );
        backend.set_param(
            id,
            "node_idxs",
            ParamValue::UIntArray {
                keys: 1,
                values: vec![0; num_instances],
            },
        );
        let (start, end) = match samples.times.as_slice() {
            [first, .., last] => (*first, *last),
            _ => (0.0, 1.0),
        };
        backend.set_param(id, "instance_motion_start", ParamValue::FloatArray(vec![start]));
        backend.set_param(id, "instance_motion_end", ParamValue::FloatArray(vec![end]));

        let scene = ctx.scene();
        if let Some(matte) = scene.get(self.id, "matte").as_bool() {
            backend.set_param(id, "matte", ParamValue::Bool(matte));
        }
        if let Value::Int(visibility) = scene.get(self.id, "visibility") {
            let visibility = u8::try_from(visibility.clamp(0, 255)).unwrap_or(u8::MAX);
            backend.set_param(id, "visibility", ParamValue::Byte(visibility));
        }
        out.push(node);

        let Some(parent_id) = self.parent() else {
            return true;
        };
        let Some(parent) = ctx.instancer(parent_id) else {
            log::debug!("Parent instancer {parent_id} of {} is not available", self.id);
            return true;
        };
        if parent.build_level(ctx, self.id, shape, out, visited) {
            backend.set_param(id, "visibility", ParamValue::Byte(0));
        }
        true
    }
}
