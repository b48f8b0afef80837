// Copyright 2024 RisingLight Project Authors. Licensed under Apache-2.0.

use std::iter::FromIterator;

use super::{Array, ArrayBuilder};

/// A collection of variable-length UTF-8 strings.
#[derive(Clone, Debug, PartialEq)]
pub struct Utf8Array {
    offset: Vec<usize>,
    data: Vec<u8>,
}

impl Utf8Array {
    pub(crate) fn push(&mut self, value: &str) {
        self.data.extend_from_slice(value.as_bytes());
        self.offset.push(self.data.len());
    }
}

impl Default for Utf8Array {
    fn default() -> Self {
        Self {
            offset: vec![0],
            data: Vec::new(),
        }
    }
}

impl Array for Utf8Array {
    type Item = str;
    type Builder = Utf8ArrayBuilder;

    fn get(&self, idx: usize) -> &str {
        let data_slice = &self.data[self.offset[idx]..self.offset[idx + 1]];
        // Only valid UTF-8 is ever pushed into `data`.
        unsafe { std::str::from_utf8_unchecked(data_slice) }
    }

    fn len(&self) -> usize {
        self.offset.len() - 1
    }
}

impl<'a> FromIterator<&'a str> for Utf8Array {
    fn from_iter<I: IntoIterator<Item = &'a str>>(iter: I) -> Self {
        let iter = iter.into_iter();
        let mut builder = Utf8ArrayBuilder::with_capacity(iter.size_hint().0);
        for value in iter {
            builder.push(value);
        }
        builder.finish()
    }
}

/// A builder that accumulates `&str` values into an [`Utf8Array`].
pub struct Utf8ArrayBuilder {
    offset: Vec<usize>,
    data: Vec<u8>,
}

impl ArrayBuilder for Utf8ArrayBuilder {
    type Array = Utf8Array;

    fn with_capacity(capacity: usize) -> Self {
        let mut offset = Vec::with_capacity(capacity + 1);
        offset.push(0);
        Self {
            offset,
            data: Vec::with_capacity(capacity),
        }
    }

    fn push(&mut self, value: &str) {
        self.data.extend_from_slice(value.as_bytes());
        self.offset.push(self.data.len());
    }

    fn append(&mut self, other: &Utf8Array) {
        for value in other.iter() {
            self.push(value);
        }
    }

    fn finish(self) -> Utf8Array {
        Utf8Array {
            offset: self.offset,
            data: self.data,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_and_get() {
        let array: Utf8Array = ["x", "", "hello", "yy"].into_iter().collect();
        assert_eq!(array.len(), 4);
        assert_eq!(array.get(0), "x");
        assert_eq!(array.get(1), "");
        assert_eq!(array.get(2), "hello");
        assert_eq!(array.iter().collect::<Vec<_>>(), vec!["x", "", "hello", "yy"]);
    }
}
