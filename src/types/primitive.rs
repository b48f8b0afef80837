// Copyright 2024 RisingLight Project Authors. Licensed under Apache-2.0.

use std::marker::PhantomData;

use bytes::{Buf, BufMut};

use super::{
    read_exact_or_eof, DataType, InputStreams, OutputStreams, SubstreamPath,
};
use crate::array::{ArrayImpl, NativeType, PrimitiveArray};
use crate::storage::{StorageResult, TracedStorageError};

/// Fixed-width little-endian encoding of a primitive value.
pub trait Primitive: NativeType {
    /// Width of each encoded element in bytes.
    const WIDTH: usize;
    /// Name of the corresponding data type.
    const TYPE_NAME: &'static str;

    /// Encode the value to the end of a buffer.
    fn encode(&self, buffer: &mut impl BufMut);

    /// Decode one value from a buffer.
    fn decode(buffer: &mut impl Buf) -> Self;

    fn wrap_array(array: PrimitiveArray<Self>) -> ArrayImpl;

    fn unwrap_array(array: &ArrayImpl) -> Option<&PrimitiveArray<Self>>;

    fn unwrap_array_mut(array: &mut ArrayImpl) -> Option<&mut PrimitiveArray<Self>>;
}

macro_rules! impl_primitive {
    ($ty:ty, $variant:ident, $name:expr, $put:ident, $get:ident) => {
        impl Primitive for $ty {
            const WIDTH: usize = std::mem::size_of::<$ty>();
            const TYPE_NAME: &'static str = $name;

            fn encode(&self, buffer: &mut impl BufMut) {
                buffer.$put(*self);
            }

            fn decode(buffer: &mut impl Buf) -> Self {
                buffer.$get()
            }

            fn wrap_array(array: PrimitiveArray<Self>) -> ArrayImpl {
                ArrayImpl::$variant(array)
            }

            fn unwrap_array(array: &ArrayImpl) -> Option<&PrimitiveArray<Self>> {
                match array {
                    ArrayImpl::$variant(inner) => Some(inner),
                    _ => None,
                }
            }

            fn unwrap_array_mut(array: &mut ArrayImpl) -> Option<&mut PrimitiveArray<Self>> {
                match array {
                    ArrayImpl::$variant(inner) => Some(inner),
                    _ => None,
                }
            }
        }
    };
}

impl_primitive!(i32, Int32, "Int32", put_i32_le, get_i32_le);
impl_primitive!(i64, Int64, "Int64", put_i64_le, get_i64_le);
impl_primitive!(u32, UInt32, "UInt32", put_u32_le, get_u32_le);
impl_primitive!(u64, UInt64, "UInt64", put_u64_le, get_u64_le);
impl_primitive!(f64, Float64, "Float64", put_f64_le, get_f64_le);

impl Primitive for bool {
    const WIDTH: usize = 1;
    const TYPE_NAME: &'static str = "Bool";

    fn encode(&self, buffer: &mut impl BufMut) {
        buffer.put_u8(*self as u8);
    }

    fn decode(buffer: &mut impl Buf) -> Self {
        buffer.get_u8() != 0
    }

    fn wrap_array(array: PrimitiveArray<Self>) -> ArrayImpl {
        ArrayImpl::Bool(array)
    }

    fn unwrap_array(array: &ArrayImpl) -> Option<&PrimitiveArray<Self>> {
        match array {
            ArrayImpl::Bool(inner) => Some(inner),
            _ => None,
        }
    }

    fn unwrap_array_mut(array: &mut ArrayImpl) -> Option<&mut PrimitiveArray<Self>> {
        match array {
            ArrayImpl::Bool(inner) => Some(inner),
            _ => None,
        }
    }
}

/// A fixed-width primitive data type with a single value substream.
#[derive(Debug, Default)]
pub struct DataTypePrimitive<T: Primitive> {
    _marker: PhantomData<T>,
}

impl<T: Primitive> DataTypePrimitive<T> {
    pub fn new() -> Self {
        Self {
            _marker: PhantomData,
        }
    }
}

pub type DataTypeBool = DataTypePrimitive<bool>;
pub type DataTypeInt32 = DataTypePrimitive<i32>;
pub type DataTypeInt64 = DataTypePrimitive<i64>;
pub type DataTypeUInt32 = DataTypePrimitive<u32>;
pub type DataTypeUInt64 = DataTypePrimitive<u64>;
pub type DataTypeFloat64 = DataTypePrimitive<f64>;

impl<T: Primitive> DataType for DataTypePrimitive<T> {
    fn name(&self) -> String {
        T::TYPE_NAME.into()
    }

    fn create_column(&self) -> ArrayImpl {
        T::wrap_array(PrimitiveArray::default())
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
        let array = T::unwrap_array(array)
            .ok_or_else(|| type_mismatch(T::TYPE_NAME))?;
        let mut buffer = Vec::with_capacity(array.as_slice().len() * T::WIDTH);
        for value in array.as_slice() {
            value.encode(&mut buffer);
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
        let array = T::unwrap_array_mut(array)
            .ok_or_else(|| type_mismatch(T::TYPE_NAME))?;
        let mut buffer = vec![0u8; rows * T::WIDTH];
        let filled = read_exact_or_eof(input, &mut buffer)?;
        if filled % T::WIDTH != 0 {
            return Err(TracedStorageError::decode("truncated fixed-width value"));
        }
        let mut slice = &buffer[..filled];
        while slice.has_remaining() {
            array.push(T::decode(&mut slice));
        }
        Ok(())
    }
}

fn type_mismatch(expected: &str) -> TracedStorageError {
    TracedStorageError::logical(format!("array does not match data type {expected}"))
}
