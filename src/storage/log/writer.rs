// Copyright 2024 RisingLight Project Authors. Licensed under Apache-2.0.

use std::collections::hash_map::Entry;
use std::collections::{HashMap, HashSet};
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::mem::discriminant;
use std::path::{Path, PathBuf};

use itertools::Itertools;
use tracing::warn;

use super::compress::CompressedWriter;
use super::table::{ExclusiveTableWrite, LogTableInner};
use super::Mark;
use crate::array::{Block, BlockColumn};
use crate::storage::{StorageError, StorageResult, TracedStorageError};
use crate::types::{stream_file_name, DataTypeRef, OutputStreams, SubstreamPath};

/// A block sink appending to a log table.
///
/// Construction takes the table's exclusive lock and holds it for the
/// writer's lifetime. Every written block extends each substream's data file
/// and appends exactly one marks-file record group; `finish` flushes
/// everything and records the resulting file sizes in the size checkpoint.
pub struct LogBlockWriter {
    table: ExclusiveTableWrite,
    streams: HashMap<String, OutputStream>,
    marks_stream: BufWriter<File>,
    done: bool,
}

struct OutputStream {
    /// File size observed when this substream was first touched by the
    /// writer.
    plain_offset: u64,
    compressed: CompressedWriter<BufWriter<File>>,
}

impl OutputStream {
    fn create(data_file: &Path, max_compress_block_size: usize) -> StorageResult<Self> {
        let file = OpenOptions::new().create(true).append(true).open(data_file)?;
        let plain_offset = file.metadata()?.len();
        Ok(Self {
            plain_offset,
            compressed: CompressedWriter::new(BufWriter::new(file), max_compress_block_size),
        })
    }

    /// Offset at which the next frame of this substream will begin.
    fn offset(&self) -> u64 {
        self.plain_offset + self.compressed.compressed_bytes()
    }

    fn finalize(&mut self) -> std::io::Result<()> {
        self.compressed.flush()
    }
}

impl LogBlockWriter {
    /// The marks file is opened only after the exclusive lock is taken, so
    /// the handle's lifetime nests inside the lock's.
    pub(crate) fn new(table: ExclusiveTableWrite) -> StorageResult<Self> {
        let marks_file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&table.marks_file)?;
        Ok(Self {
            table,
            streams: HashMap::new(),
            marks_stream: BufWriter::with_capacity(4096, marks_file),
            done: false,
        })
    }

    /// Append one block: serialize every column into its substreams, then
    /// emit one marks-file record group.
    pub fn write(&mut self, block: &Block) -> StorageResult<()> {
        self.check_block(block)?;

        let mut written_streams = HashSet::new();
        let mut marks = Vec::with_capacity(self.table.file_count);

        for column in block.columns() {
            let datatype = self
                .table
                .column_by_name(column.name())
                .map(|catalog| catalog.datatype())
                .ok_or_else(|| {
                    TracedStorageError::from(StorageError::NoSuchColumn(column.name().into()))
                })?;
            Self::write_column(
                &self.table,
                &mut self.streams,
                column,
                &datatype,
                &mut marks,
                &mut written_streams,
            )?;
        }

        self.write_marks(marks)
    }

    fn check_block(&self, block: &Block) -> StorageResult<()> {
        if block.column_count() != self.table.columns.len() {
            return Err(TracedStorageError::logical(format!(
                "block has {} columns, table has {}",
                block.column_count(),
                self.table.columns.len()
            )));
        }
        let mut seen = HashSet::new();
        for column in block.columns() {
            let catalog = self
                .table
                .column_by_name(column.name())
                .ok_or_else(|| {
                    TracedStorageError::from(StorageError::NoSuchColumn(column.name().into()))
                })?;
            if !seen.insert(column.name()) {
                return Err(StorageError::DuplicateColumn(column.name().into()).into());
            }
            if discriminant(&catalog.datatype().create_column()) != discriminant(column.array()) {
                return Err(TracedStorageError::logical(format!(
                    "type mismatch for column {}: expected {}",
                    column.name(),
                    catalog.datatype().name()
                )));
            }
        }
        Ok(())
    }

    /// Two phases per column: first compute the mark every affected
    /// substream will close (before any byte of this block is written to
    /// it), then serialize through a resolver that skips substreams already
    /// written by an earlier column of this block, and finally flush the
    /// frame tail of each newly written substream.
    fn write_column(
        table: &LogTableInner,
        streams: &mut HashMap<String, OutputStream>,
        column: &BlockColumn,
        datatype: &DataTypeRef,
        out_marks: &mut Vec<(usize, Mark)>,
        written_streams: &mut HashSet<String>,
    ) -> StorageResult<()> {
        let stream_paths = datatype.enumerate_streams();

        for stream_path in &stream_paths {
            let stream_name = stream_file_name(column.name(), stream_path);
            if written_streams.contains(&stream_name) {
                continue;
            }
            let file = table.files.get(&stream_name).ok_or_else(|| {
                TracedStorageError::logical(format!(
                    "no information about file {stream_name} in log table"
                ))
            })?;
            let stream = match streams.entry(stream_name) {
                Entry::Occupied(entry) => entry.into_mut(),
                Entry::Vacant(entry) => entry.insert(OutputStream::create(
                    &file.data_file,
                    table.options.max_compress_block_size,
                )?),
            };
            let rows = file.marks.last().map_or(0, |mark| mark.rows)
                + column.array().len() as u64;
            out_marks.push((
                file.column_index,
                Mark {
                    rows,
                    offset: stream.offset(),
                },
            ));
        }

        let mut resolver = WriteStreamResolver {
            streams,
            written_streams,
            column_name: column.name(),
        };
        datatype.serialize_binary_bulk(column.array(), &mut SubstreamPath::new(), &mut resolver)?;

        for stream_path in &stream_paths {
            let stream_name = stream_file_name(column.name(), stream_path);
            if !written_streams.insert(stream_name.clone()) {
                continue;
            }
            streams
                .get_mut(&stream_name)
                .ok_or_else(|| {
                    TracedStorageError::logical("stream was not created when writing data")
                })?
                .compressed
                .flush_block()?;
        }
        Ok(())
    }

    /// Append one record group: `file_count` marks sorted by column index,
    /// written as a single contiguous write, mirrored into the in-memory
    /// mark vectors.
    fn write_marks(&mut self, marks: Vec<(usize, Mark)>) -> StorageResult<()> {
        let table = &mut *self.table;
        if marks.len() != table.file_count {
            return Err(TracedStorageError::logical(
                "wrong number of marks generated from block",
            ));
        }

        let mut buffer = Vec::with_capacity(marks.len() * Mark::ENCODED_SIZE);
        for (column_index, mark) in marks
            .into_iter()
            .sorted_by_key(|(column_index, _)| *column_index)
        {
            mark.encode(&mut buffer);
            let stream_name = &table.column_names[column_index];
            table
                .files
                .get_mut(stream_name)
                .ok_or_else(|| {
                    TracedStorageError::logical(format!(
                        "no information about file {stream_name} in log table"
                    ))
                })?
                .marks
                .push(mark);
        }
        self.marks_stream.write_all(&buffer)?;
        Ok(())
    }

    /// Finish the append: flush the marks stream, finalize every touched
    /// substream and record the resulting file sizes. Idempotent; also
    /// invoked on drop.
    pub fn finish(&mut self) -> StorageResult<()> {
        if self.done {
            return Ok(());
        }
        self.done = true;

        self.marks_stream.flush()?;
        for stream in self.streams.values_mut() {
            stream.finalize()?;
        }

        let table = &mut *self.table;
        let mut files: Vec<PathBuf> = self
            .streams
            .keys()
            .map(|stream_name| {
                table
                    .files
                    .get(stream_name)
                    .map(|file| file.data_file.clone())
                    .ok_or_else(|| {
                        TracedStorageError::logical(format!(
                            "no information about file {stream_name} in log table"
                        ))
                    })
            })
            .try_collect()?;
        files.push(table.marks_file.clone());
        table.file_checker.update(&files)?;

        self.streams.clear();
        Ok(())
    }
}

impl Drop for LogBlockWriter {
    fn drop(&mut self) {
        if let Err(err) = self.finish() {
            warn!("failed to finalize log block writer: {err}");
        }
    }
}

struct WriteStreamResolver<'a> {
    streams: &'a mut HashMap<String, OutputStream>,
    written_streams: &'a HashSet<String>,
    column_name: &'a str,
}

impl OutputStreams for WriteStreamResolver<'_> {
    fn stream(&mut self, path: &SubstreamPath) -> StorageResult<Option<&mut dyn Write>> {
        let stream_name = stream_file_name(self.column_name, path);
        if self.written_streams.contains(&stream_name) {
            return Ok(None);
        }
        match self.streams.get_mut(&stream_name) {
            Some(stream) => Ok(Some(&mut stream.compressed)),
            None => Err(TracedStorageError::logical(
                "stream was not created when writing data",
            )),
        }
    }
}
