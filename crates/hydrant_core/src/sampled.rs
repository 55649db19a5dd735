//! Time-sampled attribute values.
//!
//! A [`SampledValue`] holds up to [`MAX_SAMPLES`] `(time, value)` pairs over
//! the active shutter interval. Times are non-decreasing and any time inside
//! `[times.first, times.last]` can be resampled by linear interpolation
//! between the neighbouring samples; times outside clamp to the ends.

use glam::{Mat4, Quat, Vec3};
use smallvec::SmallVec;

use crate::value::{FromValue, Value};

/// Maximum number of motion samples carried per attribute.
pub const MAX_SAMPLES: usize = 3;

/// Linear blend between two neighbouring samples.
pub trait Resample: Clone {
    fn resample(start: &Self, end: &Self, alpha: f32) -> Self;
}

impl Resample for f32 {
    fn resample(start: &Self, end: &Self, alpha: f32) -> Self {
        start + (end - start) * alpha
    }
}

impl Resample for Vec3 {
    fn resample(start: &Self, end: &Self, alpha: f32) -> Self {
        start.lerp(*end, alpha)
    }
}

impl Resample for Quat {
    fn resample(start: &Self, end: &Self, alpha: f32) -> Self {
        start.slerp(*end, alpha)
    }
}

impl Resample for Mat4 {
    fn resample(start: &Self, end: &Self, alpha: f32) -> Self {
        // Component-wise, matching how the host blends matrix samples.
        *start + (*end - *start) * alpha
    }
}

impl<T: Resample> Resample for Vec<T> {
    fn resample(start: &Self, end: &Self, alpha: f32) -> Self {
        if start.len() != end.len() {
            log::debug!(
                "Resampling arrays of different lengths ({} vs {}), keeping the earlier sample",
                start.len(),
                end.len()
            );
            return start.clone();
        }
        start
            .iter()
            .zip(end)
            .map(|(a, b)| T::resample(a, b, alpha))
            .collect()
    }
}

/// Fixed-capacity sequence of time samples.
#[derive(Debug, Clone, PartialEq)]
pub struct SampledValue<T> {
    times: SmallVec<[f32; MAX_SAMPLES]>,
    values: SmallVec<[T; MAX_SAMPLES]>,
}

impl<T> Default for SampledValue<T> {
    fn default() -> Self {
        Self {
            times: SmallVec::new(),
            values: SmallVec::new(),
        }
    }
}

impl<T> SampledValue<T> {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A single sample at time 0.
    #[must_use]
    pub fn constant(value: T) -> Self {
        let mut out = Self::new();
        out.times.push(0.0);
        out.values.push(value);
        out
    }

    /// Appends a sample. Returns `false` (and drops the sample) when the
    /// container is full or `time` would go backwards.
    pub fn push(&mut self, time: f32, value: T) -> bool {
        if self.times.len() >= MAX_SAMPLES {
            return false;
        }
        if self.times.last().is_some_and(|&last| time < last) {
            return false;
        }
        self.times.push(time);
        self.values.push(value);
        true
    }

    #[inline]
    #[must_use]
    pub fn count(&self) -> usize {
        self.times.len()
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.times.is_empty()
    }

    #[inline]
    #[must_use]
    pub fn times(&self) -> &[f32] {
        &self.times
    }

    #[inline]
    #[must_use]
    pub fn values(&self) -> &[T] {
        &self.values
    }

    pub fn clear(&mut self) {
        self.times.clear();
        self.values.clear();
    }

    #[must_use]
    pub fn min_time(&self) -> Option<f32> {
        self.times.iter().copied().reduce(f32::min)
    }

    #[must_use]
    pub fn max_time(&self) -> Option<f32> {
        self.times.iter().copied().reduce(f32::max)
    }
}

impl<T: Resample> SampledValue<T> {
    /// Value at `time`, `None` when there are no samples.
    #[must_use]
    pub fn resample(&self, time: f32) -> Option<T> {
        let n = self.times.len();
        match n {
            0 => return None,
            1 => return Some(self.values[0].clone()),
            _ => {}
        }
        if time <= self.times[0] {
            return Some(self.values[0].clone());
        }
        if time >= self.times[n - 1] {
            return Some(self.values[n - 1].clone());
        }
        // First sample strictly after `time`; guaranteed in 1..n here.
        let next = self.times.partition_point(|&t| t <= time);
        let prev = next - 1;
        let span = self.times[next] - self.times[prev];
        if span <= f32::EPSILON {
            return Some(self.values[prev].clone());
        }
        let alpha = (time - self.times[prev]) / span;
        Some(T::resample(&self.values[prev], &self.values[next], alpha))
    }
}

impl<T: FromValue> SampledValue<T> {
    /// Unboxes type-erased samples.
    ///
    /// Conversion stops at the first sample that does not hold a `T`; the
    /// result then simply carries fewer samples. This is not an error.
    #[must_use]
    pub fn unbox_from(input: &SampledValue<Value>) -> Self {
        let mut out = Self::new();
        for (time, value) in input.times.iter().zip(&input.values) {
            let Some(typed) = T::from_value(value) else {
                break;
            };
            out.times.push(*time);
            out.values.push(typed);
        }
        out
    }
}
