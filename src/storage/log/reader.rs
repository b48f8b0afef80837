// Copyright 2024 RisingLight Project Authors. Licensed under Apache-2.0.

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{BufReader, Read, Seek, SeekFrom};
use std::path::Path;

use super::compress::CompressedReader;
use super::table::{LogTableInner, SharedTableRead};
use crate::array::{ArrayImpl, Block, BlockColumn};
use crate::catalog::ColumnCatalog;
use crate::storage::{StorageError, StorageResult, TracedStorageError};
use crate::types::{
    extract_nested_column_name, stream_file_name, InputStreams, Substream, SubstreamPath,
};

/// A lazy block producer over one mark-range slice of a log table.
///
/// Substream files are opened on first access, seeked to the slice's first
/// mark, and dropped as soon as the stream ends so that a scan plan with
/// many mostly-idle readers does not hold buffers alive.
pub struct LogBlockReader {
    table: SharedTableRead,
    columns: Vec<ColumnCatalog>,
    block_size: usize,
    /// Mark index to start reading from.
    mark_number: usize,
    /// The maximum number of rows that can be read.
    rows_limit: u64,
    rows_read: u64,
    max_read_buffer_size: usize,
    streams: HashMap<String, InputStream>,
}

struct InputStream {
    compressed: CompressedReader<BufReader<File>>,
}

impl InputStream {
    fn open(data_file: &Path, offset: u64, max_read_buffer_size: usize) -> StorageResult<Self> {
        let mut file = File::open(data_file)?;
        let file_size = file.metadata()?.len();
        if offset > 0 {
            file.seek(SeekFrom::Start(offset))?;
        }
        let capacity = max_read_buffer_size.min(file_size.max(1) as usize);
        Ok(Self {
            compressed: CompressedReader::new(BufReader::with_capacity(capacity, file)),
        })
    }
}

impl std::fmt::Debug for LogBlockReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LogBlockReader").finish_non_exhaustive()
    }
}

impl LogBlockReader {
    pub(crate) fn new(
        table: SharedTableRead,
        columns: Vec<ColumnCatalog>,
        mark_number: usize,
        rows_limit: u64,
        block_size: usize,
        max_read_buffer_size: usize,
    ) -> Self {
        Self {
            table,
            columns,
            block_size,
            mark_number,
            rows_limit,
            rows_read: 0,
            max_read_buffer_size,
            streams: HashMap::new(),
        }
    }

    /// Produce the next block of at most `block_size` rows, or `None` at the
    /// end of the slice.
    pub fn read_block(&mut self) -> StorageResult<Option<Block>> {
        if self.rows_read == self.rows_limit {
            self.streams.clear();
            return Ok(None);
        }

        let table: &LogTableInner = &self.table;

        // No files in the directory means the table is empty.
        if fs::read_dir(table.table_dir())?.next().is_none() {
            return Ok(None);
        }

        let to_read = (self.block_size as u64).min(self.rows_limit - self.rows_read) as usize;

        // Sizes columns read so far in this block, shared between columns of
        // one nested group.
        let mut offset_columns: HashMap<String, Vec<u64>> = HashMap::new();
        let mut columns = Vec::with_capacity(self.columns.len());

        for catalog in &self.columns {
            let datatype = catalog.datatype();
            let stream_paths = datatype.enumerate_streams();
            let is_array = stream_paths.first().and_then(|path| path.last())
                == Some(&Substream::ArraySizes);
            let nested_name = extract_nested_column_name(catalog.name()).to_string();

            let mut read_sizes = true;
            let mut array = datatype.create_column();
            if is_array {
                if let Some(sizes) = offset_columns.get(&nested_name) {
                    read_sizes = false;
                    match &mut array {
                        ArrayImpl::List(list) => list.extend_sizes(sizes.iter().copied()),
                        _ => {
                            return Err(TracedStorageError::logical(
                                "sizes substream on a non-list column",
                            ))
                        }
                    }
                }
            }

            let mut resolver = ReadStreamResolver {
                streams: &mut self.streams,
                table,
                column_name: catalog.name(),
                mark_number: self.mark_number,
                read_sizes,
                max_read_buffer_size: self.max_read_buffer_size,
            };
            datatype
                .deserialize_binary_bulk(
                    &mut array,
                    &mut SubstreamPath::new(),
                    &mut resolver,
                    to_read,
                )
                .map_err(|err| {
                    TracedStorageError::from(StorageError::ReadColumn {
                        column: catalog.name().to_string(),
                        path: table.table_dir(),
                        source: Box::new(err),
                    })
                })?;

            if is_array && read_sizes {
                if let ArrayImpl::List(list) = &array {
                    offset_columns.insert(nested_name, list.sizes().to_vec());
                }
            }

            if !array.is_empty() {
                columns.push(BlockColumn::new(catalog.name().to_string(), array));
            }
        }

        if columns.is_empty() {
            self.streams.clear();
            return Ok(None);
        }

        let block = Block::try_from_columns(columns)?;
        self.rows_read += block.cardinality() as u64;
        if self.rows_read == self.rows_limit {
            self.streams.clear();
        }
        Ok(Some(block))
    }
}

impl Iterator for LogBlockReader {
    type Item = StorageResult<Block>;

    fn next(&mut self) -> Option<Self::Item> {
        self.read_block().transpose()
    }
}

struct ReadStreamResolver<'a> {
    streams: &'a mut HashMap<String, InputStream>,
    table: &'a LogTableInner,
    column_name: &'a str,
    mark_number: usize,
    read_sizes: bool,
    max_read_buffer_size: usize,
}

impl InputStreams for ReadStreamResolver<'_> {
    fn stream(&mut self, path: &SubstreamPath) -> StorageResult<Option<&mut dyn Read>> {
        if !self.read_sizes && path.last() == Some(&Substream::ArraySizes) {
            return Ok(None);
        }

        let stream_name = stream_file_name(self.column_name, path);
        let file = self.table.files.get(&stream_name).ok_or_else(|| {
            TracedStorageError::logical(format!(
                "no information about file {stream_name} in log table"
            ))
        })?;

        let stream = match self.streams.entry(stream_name) {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => {
                let offset = match self.mark_number {
                    0 => 0,
                    n => {
                        file.marks
                            .get(n)
                            .ok_or_else(|| TracedStorageError::logical("mark index out of range"))?
                            .offset
                    }
                };
                entry.insert(InputStream::open(
                    &file.data_file,
                    offset,
                    self.max_read_buffer_size,
                )?)
            }
        };
        Ok(Some(&mut stream.compressed))
    }
}
