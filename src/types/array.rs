// Copyright 2024 RisingLight Project Authors. Licensed under Apache-2.0.

use bytes::{Buf, BufMut};

use super::{
    read_exact_or_eof, DataType, DataTypeRef, InputStreams, OutputStreams, Substream,
    SubstreamPath,
};
use crate::array::{ArrayImpl, ListArray};
use crate::storage::{StorageResult, TracedStorageError};

/// Variable-length arrays of a nested element type.
///
/// Serialization produces two facets per array level: a sizes substream
/// holding one `u64` element count per row, and the element values delegated
/// to the nested type. `Array(Array(T))` therefore yields `size0`, `size1`
/// and a value substream.
pub struct DataTypeArray {
    element_type: DataTypeRef,
}

impl DataTypeArray {
    pub fn new(element_type: DataTypeRef) -> Self {
        Self { element_type }
    }
}

impl DataType for DataTypeArray {
    fn name(&self) -> String {
        format!("Array({})", self.element_type.name())
    }

    fn create_column(&self) -> ArrayImpl {
        ArrayImpl::List(ListArray::new(self.element_type.create_column()))
    }

    fn nested_type(&self) -> Option<DataTypeRef> {
        Some(self.element_type.clone())
    }

    fn enumerate_streams_into(&self, path: &mut SubstreamPath, streams: &mut Vec<SubstreamPath>) {
        path.push(Substream::ArraySizes);
        streams.push(path.clone());
        path.pop();

        path.push(Substream::ArrayElements);
        self.element_type.enumerate_streams_into(path, streams);
        path.pop();
    }

    fn serialize_binary_bulk(
        &self,
        array: &ArrayImpl,
        path: &mut SubstreamPath,
        streams: &mut dyn OutputStreams,
    ) -> StorageResult<()> {
        let ArrayImpl::List(array) = array else {
            return Err(TracedStorageError::logical(format!(
                "array does not match data type {}",
                self.name()
            )));
        };

        path.push(Substream::ArraySizes);
        if let Some(output) = streams.stream(path)? {
            let mut buffer = Vec::with_capacity(array.sizes().len() * 8);
            for size in array.sizes() {
                buffer.put_u64_le(*size);
            }
            output.write_all(&buffer)?;
        }
        path.pop();

        path.push(Substream::ArrayElements);
        let result = self
            .element_type
            .serialize_binary_bulk(array.values(), path, streams);
        path.pop();
        result
    }

    fn deserialize_binary_bulk(
        &self,
        array: &mut ArrayImpl,
        path: &mut SubstreamPath,
        streams: &mut dyn InputStreams,
        rows: usize,
    ) -> StorageResult<()> {
        let ArrayImpl::List(array) = array else {
            return Err(TracedStorageError::logical(format!(
                "array does not match data type {}",
                self.name()
            )));
        };

        path.push(Substream::ArraySizes);
        let sizes = match streams.stream(path)? {
            Some(input) => {
                let mut buffer = vec![0u8; rows * 8];
                let filled = read_exact_or_eof(input, &mut buffer)?;
                if filled % 8 != 0 {
                    return Err(TracedStorageError::decode("truncated array size"));
                }
                let mut slice = &buffer[..filled];
                let mut sizes = Vec::with_capacity(filled / 8);
                while slice.has_remaining() {
                    sizes.push(slice.get_u64_le());
                }
                array.extend_sizes(sizes.iter().copied());
                sizes
            }
            // The sizes of this batch were already read through another
            // column of the same nested group.
            None => array.sizes().to_vec(),
        };
        path.pop();

        let elements: u64 = sizes.iter().sum();
        path.push(Substream::ArrayElements);
        let result = self.element_type.deserialize_binary_bulk(
            array.values_mut(),
            path,
            streams,
            elements as usize,
        );
        path.pop();
        result
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::io::{Cursor, Read, Write};
    use std::sync::Arc;

    use super::*;
    use crate::array::U32Array;
    use crate::types::DataTypeUInt32;

    #[derive(Default)]
    struct MemStreams {
        buffers: HashMap<SubstreamPath, Vec<u8>>,
    }

    impl OutputStreams for MemStreams {
        fn stream(&mut self, path: &SubstreamPath) -> StorageResult<Option<&mut dyn Write>> {
            Ok(Some(self.buffers.entry(path.clone()).or_default()))
        }
    }

    struct MemInputs {
        readers: HashMap<SubstreamPath, Cursor<Vec<u8>>>,
    }

    impl InputStreams for MemInputs {
        fn stream(&mut self, path: &SubstreamPath) -> StorageResult<Option<&mut dyn Read>> {
            Ok(self.readers.get_mut(path).map(|c| c as &mut dyn Read))
        }
    }

    #[test]
    fn test_array_round_trip() {
        let ty = DataTypeArray::new(Arc::new(DataTypeUInt32::new()));
        let original = ListArray::from_sizes_and_values(
            vec![2, 0, 1],
            U32Array::from_iter([1, 2, 3]).into(),
        );

        let mut outputs = MemStreams::default();
        ty.serialize_binary_bulk(
            &original.clone().into(),
            &mut SubstreamPath::new(),
            &mut outputs,
        )
        .unwrap();
        assert_eq!(outputs.buffers.len(), 2);

        let mut inputs = MemInputs {
            readers: outputs
                .buffers
                .into_iter()
                .map(|(path, buf)| (path, Cursor::new(buf)))
                .collect(),
        };
        let mut decoded = ty.create_column();
        ty.deserialize_binary_bulk(&mut decoded, &mut SubstreamPath::new(), &mut inputs, 3)
            .unwrap();
        assert_eq!(decoded, original.into());
    }

    #[test]
    fn test_deserialize_with_seeded_sizes() {
        let ty = DataTypeArray::new(Arc::new(DataTypeUInt32::new()));
        let original = ListArray::from_sizes_and_values(
            vec![1, 2],
            U32Array::from_iter([7, 8, 9]).into(),
        );

        let mut outputs = MemStreams::default();
        ty.serialize_binary_bulk(
            &original.clone().into(),
            &mut SubstreamPath::new(),
            &mut outputs,
        )
        .unwrap();

        // Withhold the sizes substream and pre-seed the column instead.
        let mut readers: HashMap<_, _> = outputs
            .buffers
            .into_iter()
            .map(|(path, buf)| (path, Cursor::new(buf)))
            .collect();
        let sizes_path: SubstreamPath = [Substream::ArraySizes].into_iter().collect();
        readers.remove(&sizes_path);
        let mut inputs = MemInputs { readers };

        let mut seeded = ListArray::new(U32Array::default().into());
        seeded.extend_sizes([1, 2]);
        let mut decoded = ArrayImpl::List(seeded);
        ty.deserialize_binary_bulk(&mut decoded, &mut SubstreamPath::new(), &mut inputs, 2)
            .unwrap();
        assert_eq!(decoded, original.into());
    }
}
