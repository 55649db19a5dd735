//! Reference primitive adapters.
//!
//! | adapter | primitive | backend nodes |
//! |---|---|---|
//! | [`ShapeAdapter`] | mesh, curves, points, volume | one shape node, plus an instancer chain when instanced |
//! | [`MaterialAdapter`] | material | surface and displacement terminal shaders |
//! | [`LightAdapter`] | light | one light node |
//! | [`CameraAdapter`] | camera | one camera node |
//!
//! Instancers live in [`crate::instancer`]: they are shared with the shapes
//! that read them and never own a node of their own.

mod camera;
mod light;
mod material;
mod shape;

pub use camera::CameraAdapter;
pub use light::LightAdapter;
pub use material::MaterialAdapter;
pub use shape::ShapeAdapter;

use glam::Mat4;
use hydrant_backend::{NodeId, ParamValue, RenderBackend};
use hydrant_core::SampledValue;

/// Writes transform samples onto `node`.
///
/// A single sample is a plain matrix; several become a keyed matrix array
/// with its motion range.
pub(crate) fn write_matrix(backend: &dyn RenderBackend, node: NodeId, samples: &SampledValue<Mat4>) {
    match samples.values() {
        [] | [_] => {
            let matrix = samples.values().first().copied().unwrap_or(Mat4::IDENTITY);
            backend.set_param(node, "matrix", ParamValue::Matrix(matrix));
            backend.reset_param(node, "motion_start");
            backend.reset_param(node, "motion_end");
        }
        values => {
            backend.set_param(
                node,
                "matrix",
                ParamValue::MatrixArray {
                    keys: u32::try_from(values.len()).unwrap_or(1),
                    values: values.to_vec(),
                },
            );
            let start = samples.min_time().unwrap_or(0.0);
            let end = samples.max_time().unwrap_or(start);
            backend.set_param(node, "motion_start", ParamValue::Float(start));
            backend.set_param(node, "motion_end", ParamValue::Float(end));
        }
    }
}
