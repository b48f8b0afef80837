// Copyright 2024 RisingLight Project Authors. Licensed under Apache-2.0.

//! Data types and their binary serialization into named substreams.
//!
//! A [`DataType`] knows how to decompose a column into one or more named
//! byte substreams and how to serialize / deserialize the column through
//! them in bulk. The storage engine is polymorphic over this trait: it only
//! consumes the substream enumeration and the bulk serialization contracts,
//! and never walks type shapes itself.

mod array;
mod primitive;
mod string;

use std::io::{Read, Write};
use std::sync::Arc;

use smallvec::SmallVec;

pub use self::array::DataTypeArray;
pub use self::primitive::{
    DataTypeBool, DataTypeFloat64, DataTypeInt32, DataTypeInt64, DataTypePrimitive,
    DataTypeUInt32, DataTypeUInt64, Primitive,
};
pub use self::string::DataTypeString;

use crate::array::ArrayImpl;
use crate::storage::StorageResult;

/// Reference-counted data type handle.
pub type DataTypeRef = Arc<dyn DataType>;

/// One component of a substream path.
#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq)]
pub enum Substream {
    /// Per-row element counts of an array level.
    ArraySizes,
    /// Element values of an array level.
    ArrayElements,
}

/// Path identifying one substream of a column's serialization.
pub type SubstreamPath = SmallVec<[Substream; 2]>;

/// Resolves a substream path to a write sink.
///
/// Returning `Ok(None)` instructs the serializer to skip that substream,
/// which happens when another column of the same write-block has already
/// produced it.
pub trait OutputStreams {
    fn stream(&mut self, path: &SubstreamPath) -> StorageResult<Option<&mut dyn Write>>;
}

/// Resolves a substream path to a read source.
///
/// Returning `Ok(None)` for an array-sizes substream means the caller has
/// already read those sizes through another column of the same nested group
/// and pre-seeded the list column with them.
pub trait InputStreams {
    fn stream(&mut self, path: &SubstreamPath) -> StorageResult<Option<&mut dyn Read>>;
}

/// A data type that serializes columns into named binary substreams.
pub trait DataType: Send + Sync {
    /// Human-readable type name, e.g. `UInt64` or `Array(UInt32)`.
    fn name(&self) -> String;

    /// Create an empty column of this type.
    fn create_column(&self) -> ArrayImpl;

    /// Whether this type is a nullable wrapper around another type.
    fn is_nullable(&self) -> bool {
        false
    }

    /// The wrapped or element type, if any.
    fn nested_type(&self) -> Option<DataTypeRef> {
        None
    }

    /// Enumerate the substream paths of this type, in serialization order.
    ///
    /// The enumeration is deterministic and idempotent; substream file names
    /// are derived from it.
    fn enumerate_streams(&self) -> Vec<SubstreamPath> {
        let mut streams = Vec::new();
        self.enumerate_streams_into(&mut SubstreamPath::new(), &mut streams);
        streams
    }

    /// Recursive worker behind [`DataType::enumerate_streams`].
    fn enumerate_streams_into(&self, path: &mut SubstreamPath, streams: &mut Vec<SubstreamPath>);

    /// Serialize a whole column, obtaining one sink per substream from the
    /// resolver. A `None` sink skips that substream.
    fn serialize_binary_bulk(
        &self,
        array: &ArrayImpl,
        path: &mut SubstreamPath,
        streams: &mut dyn OutputStreams,
    ) -> StorageResult<()>;

    /// Deserialize up to `rows` rows, appending them to `array`. Stops early
    /// on a clean end of stream.
    ///
    /// `array` must be empty, except that a list column may arrive pre-seeded
    /// with this batch's row sizes when the sizes substream resolves to
    /// `None`.
    fn deserialize_binary_bulk(
        &self,
        array: &mut ArrayImpl,
        path: &mut SubstreamPath,
        streams: &mut dyn InputStreams,
        rows: usize,
    ) -> StorageResult<()>;
}

/// Escape a name so it is usable as a file name: every byte outside
/// `[A-Za-z0-9_]` becomes `%XX`.
pub fn escape_for_file_name(name: &str) -> String {
    let mut escaped = String::with_capacity(name.len());
    for byte in name.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'_' => escaped.push(byte as char),
            _ => escaped.push_str(&format!("%{byte:02X}")),
        }
    }
    escaped
}

/// Extract the nested group name of a column: the prefix up to the first
/// dot. Columns `n.a` and `n.b` belong to the group `n` and share their
/// array-sizes substream.
pub fn extract_nested_column_name(name: &str) -> &str {
    name.split('.').next().unwrap_or(name)
}

/// Derive the substream file name for `(column_name, path)`.
///
/// The same logical column always resolves to the same set of names: the
/// value stream is the escaped column name, and each array-sizes level `k`
/// of column `g.x` maps to `<escaped g>.size<k>`.
pub fn stream_file_name(column_name: &str, path: &SubstreamPath) -> String {
    let mut stream_name = escape_for_file_name(column_name);
    let mut array_level = 0;
    for component in path {
        match component {
            Substream::ArraySizes => {
                stream_name = format!(
                    "{}.size{}",
                    escape_for_file_name(extract_nested_column_name(column_name)),
                    array_level
                );
            }
            Substream::ArrayElements => array_level += 1,
        }
    }
    stream_name
}

/// Read into `buf` until it is full or the source is exhausted, returning
/// the number of bytes read.
pub(crate) fn read_exact_or_eof(
    input: &mut dyn Read,
    buf: &mut [u8],
) -> std::io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        let n = input.read(&mut buf[filled..])?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    Ok(filled)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape_for_file_name() {
        assert_eq!(escape_for_file_name("plain_name1"), "plain_name1");
        assert_eq!(escape_for_file_name("n.a"), "n%2Ea");
        assert_eq!(escape_for_file_name("weird name"), "weird%20name");
    }

    #[test]
    fn test_stream_file_name_scalar() {
        let ty = DataTypeUInt64::new();
        let streams = ty.enumerate_streams();
        assert_eq!(streams.len(), 1);
        assert_eq!(stream_file_name("a", &streams[0]), "a");
    }

    #[test]
    fn test_stream_file_name_array() {
        let ty = DataTypeArray::new(Arc::new(DataTypeUInt32::new()));
        let streams = ty.enumerate_streams();
        let names: Vec<_> = streams
            .iter()
            .map(|path| stream_file_name("arr", path))
            .collect();
        assert_eq!(names, vec!["arr.size0", "arr"]);
    }

    #[test]
    fn test_stream_file_name_nested_group() {
        let ty = DataTypeArray::new(Arc::new(DataTypeUInt32::new()));
        let streams = ty.enumerate_streams();
        let names: Vec<_> = streams
            .iter()
            .map(|path| stream_file_name("n.a", path))
            .collect();
        assert_eq!(names, vec!["n.size0", "n%2Ea"]);
        let names: Vec<_> = streams
            .iter()
            .map(|path| stream_file_name("n.b", path))
            .collect();
        assert_eq!(names, vec!["n.size0", "n%2Eb"]);
    }

    #[test]
    fn test_stream_file_name_array_of_array() {
        let ty = DataTypeArray::new(Arc::new(DataTypeArray::new(Arc::new(
            DataTypeUInt32::new(),
        ))));
        let names: Vec<_> = ty
            .enumerate_streams()
            .iter()
            .map(|path| stream_file_name("arr", path))
            .collect();
        assert_eq!(names, vec!["arr.size0", "arr.size1", "arr"]);
    }
}
