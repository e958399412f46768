//! Dense N-dimensional accumulation arrays.
//!
//! Storage is a flat `Vec` in row-major order, addressed through
//! [`crate::index`]. Arrays are created unallocated when a detector is
//! configured, and receive their zero-filled storage exactly once, when the
//! detector is initialized. They are never resized afterwards.

use std::fmt::Debug;
use std::ops::{AddAssign, Index};

use ndarray::{azip, Dimension, IxDyn};
use num_complex::Complex64;
use num_traits::Zero;

use crate::error::{Result, TallyError};
use crate::index::{element_count, index_to_flat};

/// Values that detectors can accumulate: real weights, or complex
/// frequency-domain contributions.
pub trait Element: Copy + Zero + AddAssign + PartialEq + Debug + Send + Sync + 'static {
    /// Contribution of this value to a second moment: `|w|^2`
    fn squared_magnitude(self) -> f64;

    fn scaled(self, factor: f64) -> Self;
}

impl Element for f64 {
    #[inline] fn squared_magnitude(self) -> f64 { self * self }
    #[inline] fn scaled(self, factor: f64) -> Self { self * factor }
}

impl Element for Complex64 {
    #[inline] fn squared_magnitude(self) -> f64 { self.norm_sqr() }
    #[inline] fn scaled(self, factor: f64) -> Self { self * factor }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Histogram<E> {
    shape: Vec<usize>,
    data: Vec<E>,
}

impl<E: Element> Histogram<E> {

    /// Shape known, no storage yet
    pub fn unallocated(shape: Vec<usize>) -> Self { Self { shape, data: vec![] } }

    pub fn zeros(shape: Vec<usize>) -> Self {
        let data = vec![E::zero(); element_count(&shape)];
        Self { shape, data }
    }

    /// Wrap existing row-major `data`
    pub fn from_data(shape: Vec<usize>, data: Vec<E>) -> Result<Self> {
        if data.len() != element_count(&shape) {
            return Err(TallyError::Shape {
                what: "array data".into(),
                expected: shape,
                actual: vec![data.len()],
            })
        }
        Ok(Self { shape, data })
    }

    /// Give the array its zero-filled storage. Does nothing if storage
    /// already exists.
    pub fn allocate(&mut self) {
        if !self.is_allocated() {
            self.data = vec![E::zero(); element_count(&self.shape)];
        }
    }

    pub fn is_allocated(&self) -> bool { !self.data.is_empty() }

    pub fn shape(&self) -> &[usize] { &self.shape }
    pub fn len  (&self) -> usize    { element_count(&self.shape) }
    pub fn ndim (&self) -> usize    { self.shape.len() }
    pub fn is_empty(&self) -> bool  { self.len() == 0 }

    /// Elements in row-major order
    pub fn data(&self) -> &[E] { &self.data }
    pub fn data_mut(&mut self) -> &mut [E] { &mut self.data }

    /// # Panics
    /// Panics if the array has not been allocated, or `index` lies outside
    /// the shape.
    #[inline]
    pub fn add(&mut self, index: &[usize], value: E) {
        let i = index_to_flat(index, &self.shape);
        self.data[i] += value;
    }

    #[inline]
    pub fn add_flat(&mut self, flat: usize, value: E) { self.data[flat] += value; }

    /// Divide every element by `denominator(index)`. Elements whose
    /// denominator is zero (or not finite) are set to zero.
    pub fn divide_by<F>(&mut self, denominator: F)
    where
        F: Fn(&[usize]) -> f64,
    {
        let indices = ndarray::indices(IxDyn(&self.shape));
        for (value, index) in self.data.iter_mut().zip(indices) {
            let d = denominator(index.slice());
            *value = if d != 0.0 && d.is_finite() { value.scaled(1.0 / d) }
                     else                         { E::zero() };
        }
    }

    /// Elementwise `self += other`
    pub fn merge(&mut self, other: &Self) -> Result<()> {
        if self.shape != other.shape || self.data.len() != other.data.len() {
            return Err(TallyError::Shape {
                what: "merged array".into(),
                expected: self.shape.clone(),
                actual: other.shape.clone(),
            })
        }
        azip!((mine in &mut self.data[..], &theirs in &other.data[..]) *mine += theirs);
        Ok(())
    }
}

impl<E: Element> Index<&[usize]> for Histogram<E> {
    type Output = E;
    fn index(&self, index: &[usize]) -> &Self::Output { &self.data[index_to_flat(index, &self.shape)] }
}

impl<E: Element> Index<usize> for Histogram<E> {
    type Output = E;
    fn index(&self, flat: usize) -> &Self::Output { &self.data[flat] }
}
