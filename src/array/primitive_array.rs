// Copyright 2024 RisingLight Project Authors. Licensed under Apache-2.0.

use std::fmt::Debug;
use std::iter::FromIterator;

use super::{Array, ArrayBuilder};

/// A primitive value type storable in a [`PrimitiveArray`].
pub trait NativeType:
    Copy + Clone + Default + PartialEq + Debug + Send + Sync + 'static
{
}

impl NativeType for bool {}
impl NativeType for i32 {}
impl NativeType for i64 {}
impl NativeType for u32 {}
impl NativeType for u64 {}
impl NativeType for f64 {}

/// `PrimitiveArray` is a collection of primitive types, such as `i32`, `f64`.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PrimitiveArray<T: NativeType> {
    data: Vec<T>,
}

impl<T: NativeType> PrimitiveArray<T> {
    /// View the array as a plain slice of values.
    pub fn as_slice(&self) -> &[T] {
        &self.data
    }

    pub(crate) fn push(&mut self, value: T) {
        self.data.push(value);
    }
}

impl<T: NativeType> FromIterator<T> for PrimitiveArray<T> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        Self {
            data: iter.into_iter().collect(),
        }
    }
}

impl<T: NativeType> Array for PrimitiveArray<T> {
    type Item = T;
    type Builder = PrimitiveArrayBuilder<T>;

    fn get(&self, idx: usize) -> &T {
        &self.data[idx]
    }

    fn len(&self) -> usize {
        self.data.len()
    }
}

/// `PrimitiveArrayBuilder` constructs a [`PrimitiveArray`] value by value.
pub struct PrimitiveArrayBuilder<T: NativeType> {
    data: Vec<T>,
}

impl<T: NativeType> ArrayBuilder for PrimitiveArrayBuilder<T> {
    type Array = PrimitiveArray<T>;

    fn with_capacity(capacity: usize) -> Self {
        Self {
            data: Vec::with_capacity(capacity),
        }
    }

    fn push(&mut self, value: &T) {
        self.data.push(*value);
    }

    fn append(&mut self, other: &PrimitiveArray<T>) {
        self.data.extend_from_slice(&other.data);
    }

    fn finish(self) -> PrimitiveArray<T> {
        PrimitiveArray { data: self.data }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_and_iterate() {
        let array: PrimitiveArray<u64> = (0..1000).collect();
        assert_eq!(array.len(), 1000);
        assert_eq!(array.iter().copied().collect::<Vec<_>>(), (0..1000).collect::<Vec<_>>());
    }

    #[test]
    fn test_builder_append() {
        let first: PrimitiveArray<i32> = (0..10).collect();
        let mut builder = PrimitiveArrayBuilder::<i32>::with_capacity(20);
        builder.append(&first);
        builder.push(&42);
        let array = builder.finish();
        assert_eq!(array.len(), 11);
        assert_eq!(*array.get(10), 42);
    }
}
