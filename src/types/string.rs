// Copyright 2024 RisingLight Project Authors. Licensed under Apache-2.0.

use bytes::BufMut;

use super::{
    read_exact_or_eof, DataType, InputStreams, OutputStreams, SubstreamPath,
};
use crate::array::{Array, ArrayImpl, Utf8Array};
use crate::storage::{StorageResult, TracedStorageError};

/// Variable-length UTF-8 strings, one length-prefixed record per row.
#[derive(Debug, Default)]
pub struct DataTypeString;

impl DataTypeString {
    pub fn new() -> Self {
        Self
    }
}

impl DataType for DataTypeString {
    fn name(&self) -> String {
        "String".into()
    }

    fn create_column(&self) -> ArrayImpl {
        ArrayImpl::Utf8(Utf8Array::default())
    }

    fn enumerate_streams_into(&self, path: &mut SubstreamPath, streams: &mut Vec<SubstreamPath>) {
        streams.push(path.clone());
    }

    fn serialize_binary_bulk(
        &self,
        array: &ArrayImpl,
        path: &mut SubstreamPath,
        streams: &mut dyn OutputStreams,
    ) -> StorageResult<()> {
        let Some(output) = streams.stream(path)? else {
            return Ok(());
        };
        let ArrayImpl::Utf8(array) = array else {
            return Err(TracedStorageError::logical(
                "array does not match data type String",
            ));
        };
        let mut buffer = Vec::new();
        for value in array.iter() {
            buffer.put_u32_le(value.len() as u32);
            buffer.put_slice(value.as_bytes());
        }
        output.write_all(&buffer)?;
        Ok(())
    }

    fn deserialize_binary_bulk(
        &self,
        array: &mut ArrayImpl,
        path: &mut SubstreamPath,
        streams: &mut dyn InputStreams,
        rows: usize,
    ) -> StorageResult<()> {
        let Some(input) = streams.stream(path)? else {
            return Ok(());
        };
        let ArrayImpl::Utf8(array) = array else {
            return Err(TracedStorageError::logical(
                "array does not match data type String",
            ));
        };
        for _ in 0..rows {
            let mut len_buf = [0u8; 4];
            let filled = read_exact_or_eof(input, &mut len_buf)?;
            if filled == 0 {
                break;
            }
            if filled < len_buf.len() {
                return Err(TracedStorageError::decode("truncated string length"));
            }
            let len = u32::from_le_bytes(len_buf) as usize;
            let mut data = vec![0u8; len];
            input.read_exact(&mut data)?;
            let value = std::str::from_utf8(&data)
                .map_err(|err| TracedStorageError::decode(format!("invalid UTF-8: {err}")))?;
            array.push(value);
        }
        Ok(())
    }
}
