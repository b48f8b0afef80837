// Copyright 2024 RisingLight Project Authors. Licensed under Apache-2.0.

//! In-memory column representation.
//!
//! An [`Array`] is an immutable collection of values of one kind, built with
//! the matching [`ArrayBuilder`]. [`ArrayImpl`] embeds all supported array
//! types into one enum so that columns of different types can travel
//! together in a [`Block`].

mod block;
mod iterator;
mod list_array;
mod primitive_array;
mod utf8_array;

pub use self::block::*;
pub use self::iterator::ArrayIter;
pub use self::list_array::*;
pub use self::primitive_array::*;
pub use self::utf8_array::*;

/// A trait over all array builders.
pub trait ArrayBuilder: Send + Sync + 'static {
    /// Corresponding array of this builder.
    type Array: Array<Builder = Self>;

    /// Create a new builder with `capacity`.
    fn with_capacity(capacity: usize) -> Self;

    /// Append a value to the builder.
    fn push(&mut self, value: &<Self::Array as Array>::Item);

    /// Append an entire array to the builder.
    fn append(&mut self, other: &Self::Array);

    /// Finish building and return the array.
    fn finish(self) -> Self::Array;
}

/// A trait over all arrays.
pub trait Array: Sized + Send + Sync + 'static {
    /// Corresponding builder of this array.
    type Builder: ArrayBuilder<Array = Self>;

    /// Type of the element retrieved from the array.
    type Item: ToOwned + ?Sized;

    /// Retrieve a reference to the value at `idx`.
    fn get(&self, idx: usize) -> &Self::Item;

    /// Number of items in the array.
    fn len(&self) -> usize;

    /// Get an iterator over the array.
    fn iter(&self) -> ArrayIter<'_, Self> {
        ArrayIter::new(self)
    }

    /// Check if the array is empty.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

pub type BoolArray = PrimitiveArray<bool>;
pub type I32Array = PrimitiveArray<i32>;
pub type I64Array = PrimitiveArray<i64>;
pub type U32Array = PrimitiveArray<u32>;
pub type U64Array = PrimitiveArray<u64>;
pub type F64Array = PrimitiveArray<f64>;

/// Embeds all possible array types into one enum.
#[derive(Debug, Clone, PartialEq)]
pub enum ArrayImpl {
    Bool(BoolArray),
    Int32(I32Array),
    Int64(I64Array),
    UInt32(U32Array),
    UInt64(U64Array),
    Float64(F64Array),
    Utf8(Utf8Array),
    List(ListArray),
}

macro_rules! impl_array_dispatch {
    ($( $variant:ident: $array:ty ),*) => {
        impl ArrayImpl {
            /// Number of items in the array.
            pub fn len(&self) -> usize {
                match self {
                    $(Self::$variant(array) => array.len(),)*
                }
            }

            /// Check if the array is empty.
            pub fn is_empty(&self) -> bool {
                self.len() == 0
            }
        }

        $(
            impl From<$array> for ArrayImpl {
                fn from(array: $array) -> Self {
                    Self::$variant(array)
                }
            }
        )*
    };
}

impl_array_dispatch! {
    Bool: BoolArray,
    Int32: I32Array,
    Int64: I64Array,
    UInt32: U32Array,
    UInt64: U64Array,
    Float64: F64Array,
    Utf8: Utf8Array,
    List: ListArray
}
