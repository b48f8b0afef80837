// Copyright 2024 RisingLight Project Authors. Licensed under Apache-2.0.

use super::ArrayImpl;

/// A collection of variable-length arrays.
///
/// A `ListArray` keeps one size per row and a single child array holding the
/// concatenated element values of all rows. The size and value facets are
/// serialized into separate substreams, and two list columns of one nested
/// group may share the same size sequence on disk.
#[derive(Clone, Debug, PartialEq)]
pub struct ListArray {
    sizes: Vec<u64>,
    values: Box<ArrayImpl>,
}

impl ListArray {
    /// Create an empty list array whose elements have the shape of `values`.
    pub fn new(values: ArrayImpl) -> Self {
        assert!(values.is_empty(), "element array of a new list must be empty");
        Self {
            sizes: Vec::new(),
            values: Box::new(values),
        }
    }

    /// Create a list array from per-row sizes and the concatenated values.
    pub fn from_sizes_and_values(sizes: Vec<u64>, values: ArrayImpl) -> Self {
        assert_eq!(
            sizes.iter().sum::<u64>() as usize,
            values.len(),
            "sizes must sum up to the number of element values"
        );
        Self {
            sizes,
            values: Box::new(values),
        }
    }

    /// Number of rows (arrays) in this column.
    pub fn len(&self) -> usize {
        self.sizes.len()
    }

    /// Check if the array is empty.
    pub fn is_empty(&self) -> bool {
        self.sizes.is_empty()
    }

    /// Per-row element counts.
    pub fn sizes(&self) -> &[u64] {
        &self.sizes
    }

    /// The concatenated element values of all rows.
    pub fn values(&self) -> &ArrayImpl {
        &self.values
    }

    pub(crate) fn values_mut(&mut self) -> &mut ArrayImpl {
        &mut self.values
    }

    pub(crate) fn extend_sizes(&mut self, sizes: impl IntoIterator<Item = u64>) {
        self.sizes.extend(sizes);
    }
}
