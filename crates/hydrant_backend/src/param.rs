//! Parameter values written onto backend nodes.

use glam::{Mat4, Vec3};
use hydrant_core::Value;

use crate::api::NodeId;

/// A node parameter value.
///
/// Keyed arrays carry `keys` motion keys of `len / keys` elements each,
/// laid out key-major.
#[derive(Debug, Clone, PartialEq)]
pub enum ParamValue {
    Bool(bool),
    Byte(u8),
    Int(i32),
    UInt(u32),
    Float(f32),
    Vec3(Vec3),
    Str(String),
    Node(Option<NodeId>),
    Matrix(Mat4),
    NodeArray(Vec<NodeId>),
    BoolArray(Vec<bool>),
    ByteArray(Vec<u8>),
    FloatArray(Vec<f32>),
    UIntArray { keys: u32, values: Vec<u32> },
    MatrixArray { keys: u32, values: Vec<Mat4> },
}

impl ParamValue {
    /// Converts a scene value into a node parameter.
    ///
    /// Returns `None` for empty values and for arrays the backend has no
    /// direct parameter type for.
    #[must_use]
    pub fn from_value(value: &Value) -> Option<Self> {
        Some(match value {
            Value::Empty
            | Value::IntArray(_)
            | Value::Vec3Array(_)
            | Value::QuatArray(_)
            | Value::StringArray(_) => return None,
            Value::Bool(b) => ParamValue::Bool(*b),
            Value::Int(i) => ParamValue::Int(*i),
            Value::Float(f) => ParamValue::Float(*f),
            Value::String(s) => ParamValue::Str(s.to_string()),
            Value::Vec3(v) => ParamValue::Vec3(*v),
            Value::Matrix(m) => ParamValue::Matrix(*m),
            Value::FloatArray(v) => ParamValue::FloatArray(v.to_vec()),
            Value::MatrixArray(v) => ParamValue::MatrixArray {
                keys: 1,
                values: v.to_vec(),
            },
        })
    }

    #[must_use]
    pub fn as_node(&self) -> Option<NodeId> {
        match self {
            ParamValue::Node(n) => *n,
            _ => None,
        }
    }

    #[must_use]
    pub fn as_float(&self) -> Option<f32> {
        match self {
            ParamValue::Float(f) => Some(*f),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ParamValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_float_array(&self) -> Option<&[f32]> {
        match self {
            ParamValue::FloatArray(v) => Some(v),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_byte(&self) -> Option<u8> {
        match self {
            ParamValue::Byte(b) => Some(*b),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_node_array(&self) -> Option<&[NodeId]> {
        match self {
            ParamValue::NodeArray(v) => Some(v),
            _ => None,
        }
    }

    /// Motion keys and matrices of a keyed matrix array.
    #[must_use]
    pub fn as_matrix_array(&self) -> Option<(u32, &[Mat4])> {
        match self {
            ParamValue::MatrixArray { keys, values } => Some((*keys, values)),
            _ => None,
        }
    }
}
