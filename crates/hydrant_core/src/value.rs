//! Dynamically typed values handed over by the scene graph.
//!
//! The host delivers attribute and primvar samples as type-erased values.
//! [`FromValue`] is the checked unboxing step: it never panics and reports a
//! type mismatch as `None`, which [`SampledValue::unbox_from`] relies on to
//! stop at the first sample of the wrong type.
//!
//! [`SampledValue::unbox_from`]: crate::sampled::SampledValue::unbox_from

use std::sync::Arc;

use glam::{Mat4, Quat, Vec3};

/// A type-erased attribute value.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum Value {
    #[default]
    Empty,
    Bool(bool),
    Int(i32),
    Float(f32),
    String(Arc<str>),
    Vec3(Vec3),
    Matrix(Mat4),
    IntArray(Arc<[i32]>),
    FloatArray(Arc<[f32]>),
    Vec3Array(Arc<[Vec3]>),
    QuatArray(Arc<[Quat]>),
    MatrixArray(Arc<[Mat4]>),
    StringArray(Arc<[Arc<str>]>),
}

impl Value {
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        matches!(self, Value::Empty)
    }

    /// Extracts a typed copy, `None` on type mismatch.
    #[inline]
    #[must_use]
    pub fn get<T: FromValue>(&self) -> Option<T> {
        T::from_value(self)
    }

    /// Lenient boolean read: ints are accepted as well.
    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            Value::Int(i) => Some(*i != 0),
            _ => None,
        }
    }
}

/// Checked conversion out of a [`Value`].
pub trait FromValue: Sized {
    fn from_value(value: &Value) -> Option<Self>;
}

macro_rules! impl_from_value {
    ($ty:ty, $variant:ident) => {
        impl FromValue for $ty {
            fn from_value(value: &Value) -> Option<Self> {
                match value {
                    Value::$variant(v) => Some(v.clone()),
                    _ => None,
                }
            }
        }

        impl From<$ty> for Value {
            fn from(v: $ty) -> Self {
                Value::$variant(v)
            }
        }
    };
}

impl_from_value!(bool, Bool);
impl_from_value!(i32, Int);
impl_from_value!(f32, Float);
impl_from_value!(Arc<str>, String);
impl_from_value!(Vec3, Vec3);
impl_from_value!(Mat4, Matrix);

macro_rules! impl_array_from_value {
    ($elem:ty, $variant:ident) => {
        impl FromValue for Vec<$elem> {
            fn from_value(value: &Value) -> Option<Self> {
                match value {
                    Value::$variant(v) => Some(v.to_vec()),
                    _ => None,
                }
            }
        }

        impl From<Vec<$elem>> for Value {
            fn from(v: Vec<$elem>) -> Self {
                Value::$variant(v.into())
            }
        }
    };
}

impl_array_from_value!(i32, IntArray);
impl_array_from_value!(f32, FloatArray);
impl_array_from_value!(Vec3, Vec3Array);
impl_array_from_value!(Quat, QuatArray);
impl_array_from_value!(Mat4, MatrixArray);
impl_array_from_value!(Arc<str>, StringArray);

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.into())
    }
}
