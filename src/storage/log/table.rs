// Copyright 2024 RisingLight Project Authors. Licensed under Apache-2.0.

use std::collections::{HashMap, HashSet};
use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use bytes::Buf;
use itertools::Itertools;
use parking_lot::lock_api::{ArcRwLockReadGuard, ArcRwLockWriteGuard};
use parking_lot::{RawRwLock, RwLock};

use super::file_checker::FileChecker;
use super::reader::LogBlockReader;
use super::writer::LogBlockWriter;
use super::{
    LogTableOptions, Mark, DATA_FILE_EXTENSION, MARKS_FILE_NAME, SIZES_FILE_NAME,
};
use crate::catalog::ColumnCatalog;
use crate::storage::{StorageError, StorageResult, TracedStorageError};
use crate::types::{escape_for_file_name, stream_file_name};

/// One shared acquisition of the table lock, cloned into every reader of a
/// scan plan.
pub(crate) type SharedTableRead = Arc<ArcRwLockReadGuard<RawRwLock, LogTableInner>>;

/// The exclusive acquisition a writer owns for its whole lifetime.
pub(crate) type ExclusiveTableWrite = ArcRwLockWriteGuard<RawRwLock, LogTableInner>;

/// A table of the log engine.
///
/// The descriptor holds the substream registry and the per-substream mark
/// vectors behind a single reader/writer lock: readers of one scan share one
/// shared acquisition, while writers and structural operations (loading
/// marks, rename) take it exclusively.
#[derive(Clone)]
pub struct LogTable {
    inner: Arc<RwLock<LogTableInner>>,
}

impl std::fmt::Debug for LogTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LogTable").finish_non_exhaustive()
    }
}

pub(crate) struct ColumnData {
    /// Stable slot of this substream in marks-file record groups.
    pub column_index: usize,
    pub data_file: PathBuf,
    pub marks: Vec<Mark>,
}

pub(crate) struct LogTableInner {
    /// Directory that contains the table directory.
    pub path: PathBuf,
    pub name: String,
    /// All columns (ordered) in the table.
    pub columns: Vec<ColumnCatalog>,
    /// Substream name -> data file and marks.
    pub files: HashMap<String, ColumnData>,
    /// Substream names ordered by column index.
    pub column_names: Vec<String>,
    /// Total number of substream files of the table.
    pub file_count: usize,
    pub marks_file: PathBuf,
    pub loaded_marks: bool,
    pub options: LogTableOptions,
    pub file_checker: FileChecker,
}

impl LogTableInner {
    pub fn table_dir(&self) -> PathBuf {
        self.path.join(escape_for_file_name(&self.name))
    }

    pub fn column_by_name(&self, name: &str) -> Option<&ColumnCatalog> {
        self.columns.iter().find(|column| column.name() == name)
    }

    /// The mark vector carrying the real row count of the table.
    ///
    /// Marks are taken from the first substream of the first column. For an
    /// array column this is the sizes substream, whose row count is the
    /// number of arrays rather than the number of elements.
    pub fn marks_for_row_count(&self) -> StorageResult<&[Mark]> {
        let first = &self.columns[0];
        let mut datatype = first.datatype();
        if datatype.is_nullable() {
            if let Some(nested) = datatype.nested_type() {
                datatype = nested;
            }
        }
        let stream_path = datatype
            .enumerate_streams()
            .into_iter()
            .next()
            .ok_or_else(|| TracedStorageError::logical("data type enumerates no substreams"))?;
        let stream_name = stream_file_name(first.name(), &stream_path);
        let file = self.files.get(&stream_name).ok_or_else(|| {
            TracedStorageError::logical(format!("cannot find file {stream_name}"))
        })?;
        Ok(&file.marks)
    }
}

impl LogTable {
    /// Create the descriptor for a table at `<path>/<escaped name>/`,
    /// creating the directory and empty data files as needed. Reopening an
    /// existing table is the same call with the same columns.
    pub fn create(
        path: impl AsRef<Path>,
        name: impl Into<String>,
        columns: Vec<ColumnCatalog>,
        options: LogTableOptions,
    ) -> StorageResult<Self> {
        let path = path.as_ref().to_path_buf();
        let name = name.into();
        if columns.is_empty() {
            return Err(StorageError::EmptyColumns.into());
        }

        let dir = path.join(escape_for_file_name(&name));
        fs::create_dir_all(&dir)?;

        let mut files = HashMap::new();
        let mut column_names = Vec::new();
        let mut seen_columns = HashSet::new();
        for column in &columns {
            if !seen_columns.insert(column.name().to_string()) {
                return Err(StorageError::DuplicateColumn(column.name().into()).into());
            }
            for stream_path in column.datatype().enumerate_streams() {
                let stream_name = stream_file_name(column.name(), &stream_path);
                if files.contains_key(&stream_name) {
                    continue;
                }
                let data_file = dir.join(format!("{stream_name}{DATA_FILE_EXTENSION}"));
                OpenOptions::new().create(true).append(true).open(&data_file)?;
                files.insert(
                    stream_name.clone(),
                    ColumnData {
                        column_index: column_names.len(),
                        data_file,
                        marks: Vec::new(),
                    },
                );
                column_names.push(stream_name);
            }
        }

        let file_count = column_names.len();
        let marks_file = dir.join(MARKS_FILE_NAME);
        let file_checker = FileChecker::new(dir.join(SIZES_FILE_NAME));
        Ok(Self {
            inner: Arc::new(RwLock::new(LogTableInner {
                path,
                name,
                columns,
                files,
                column_names,
                file_count,
                marks_file,
                loaded_marks: false,
                options,
                file_checker,
            })),
        })
    }

    /// Load the per-substream mark vectors from the marks file. Idempotent;
    /// an absent marks file means a valid zero-block table.
    pub fn load_marks(&self) -> StorageResult<()> {
        let mut inner = self.inner.write();
        if inner.loaded_marks {
            return Ok(());
        }

        if inner.marks_file.exists() {
            let contents = fs::read(&inner.marks_file)?;
            let group_size = inner.file_count * Mark::ENCODED_SIZE;
            if contents.len() % group_size != 0 {
                return Err(
                    StorageError::InconsistentMarksFile(inner.marks_file.clone()).into(),
                );
            }
            let marks_count = contents.len() / group_size;

            let inner = &mut *inner;
            for file in inner.files.values_mut() {
                file.marks.reserve(marks_count);
            }
            let mut buffer = &contents[..];
            while buffer.has_remaining() {
                for stream_name in &inner.column_names {
                    let mark = Mark::decode(&mut buffer);
                    inner
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
            }
        }

        inner.loaded_marks = true;
        Ok(())
    }

    /// Rename the table directory and rebind all cached paths.
    pub fn rename(
        &self,
        new_path: impl AsRef<Path>,
        new_name: impl Into<String>,
    ) -> StorageResult<()> {
        let mut inner = self.inner.write();
        let new_path = new_path.as_ref().to_path_buf();
        let new_name = new_name.into();
        let new_dir = new_path.join(escape_for_file_name(&new_name));

        fs::create_dir_all(&new_path)?;
        fs::rename(inner.table_dir(), &new_dir)?;

        inner.path = new_path;
        inner.name = new_name;
        for (stream_name, file) in inner.files.iter_mut() {
            file.data_file = new_dir.join(format!("{stream_name}{DATA_FILE_EXTENSION}"));
        }
        inner.marks_file = new_dir.join(MARKS_FILE_NAME);
        inner.file_checker.set_path(new_dir.join(SIZES_FILE_NAME));
        Ok(())
    }

    /// Plan a scan: one lazy block reader per contiguous mark slice, all
    /// sharing one shared lock acquisition.
    pub fn read(
        &self,
        column_names: &[&str],
        num_streams: usize,
        block_size: usize,
    ) -> StorageResult<Vec<LogBlockReader>> {
        let columns: Vec<ColumnCatalog> = {
            let inner = self.inner.read();
            column_names
                .iter()
                .map(|name| {
                    inner.column_by_name(name).cloned().ok_or_else(|| {
                        TracedStorageError::from(StorageError::NoSuchColumn(name.to_string()))
                    })
                })
                .try_collect()?
        };

        self.load_marks()?;
        let table: SharedTableRead = Arc::new(self.inner.read_arc());

        let max_read_buffer_size = table.options.max_read_buffer_size;
        let marks = table.marks_for_row_count()?;
        let marks_size = marks.len();
        let num_streams = num_streams.min(marks_size);

        let mut readers = Vec::with_capacity(num_streams);
        for stream in 0..num_streams {
            let mark_begin = stream * marks_size / num_streams;
            let mark_end = (stream + 1) * marks_size / num_streams;
            let rows_begin = if mark_begin > 0 {
                marks[mark_begin - 1].rows
            } else {
                0
            };
            let rows_end = if mark_end > 0 { marks[mark_end - 1].rows } else { 0 };

            readers.push(LogBlockReader::new(
                table.clone(),
                columns.clone(),
                mark_begin,
                rows_end - rows_begin,
                block_size,
                max_read_buffer_size,
            ));
        }
        Ok(readers)
    }

    /// Open a block sink. The writer owns the exclusive lock until it is
    /// finalized or dropped, serializing all writers and excluding readers
    /// for the whole append.
    pub fn write(&self) -> StorageResult<LogBlockWriter> {
        self.load_marks()?;
        LogBlockWriter::new(self.inner.write_arc())
    }

    /// Verify that on-disk file sizes match the last successful checkpoint.
    pub fn check_data(&self) -> StorageResult<bool> {
        let inner = self.inner.read();
        inner.file_checker.check()
    }

    #[cfg(test)]
    pub(crate) fn substream_marks(&self, stream_name: &str) -> Option<Vec<Mark>> {
        self.inner
            .read()
            .files
            .get(stream_name)
            .map(|file| file.marks.clone())
    }

    #[cfg(test)]
    pub(crate) fn substream_names(&self) -> Vec<String> {
        self.inner.read().column_names.clone()
    }
}
