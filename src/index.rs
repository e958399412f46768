//! Conversion between N-dimensional bin indices and offsets into flat,
//! row-major storage (last index varies fastest), which is also the order in
//! which arrays are written to disk.

/// Row-major offset of `index` in an array of `shape`
#[inline]
pub fn index_to_flat(index: &[usize], shape: &[usize]) -> usize {
    debug_assert_eq!(index.len(), shape.len());
    index.iter().zip(shape)
        .fold(0, |offset, (&i, &n)| offset * n + i)
}

/// Number of elements in an array of `shape`; 1 for a 0-dimensional array.
pub fn element_count(shape: &[usize]) -> usize { shape.iter().product() }
