// Copyright 2024 RisingLight Project Authors. Licensed under Apache-2.0.

use std::backtrace::Backtrace;
use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("empty list of columns passed to log table")]
    EmptyColumns,
    #[error("duplicate column: {0}")]
    DuplicateColumn(String),
    #[error("no column {0} in table")]
    NoSuchColumn(String),
    #[error("size of marks file {} is inconsistent", .0.display())]
    InconsistentMarksFile(PathBuf),
    #[error("logical error: {0}")]
    Logical(String),
    #[error("decode error: {0}")]
    Decode(String),
    #[error("IO error: {0}")]
    Io(#[from] Box<std::io::Error>),
    #[error("JSON decode error: {0}")]
    JsonDecode(#[from] serde_json::Error),
    #[error("{source}, while reading column {column} at {}", .path.display())]
    ReadColumn {
        column: String,
        path: PathBuf,
        source: Box<TracedStorageError>,
    },
}

impl From<std::io::Error> for TracedStorageError {
    #[inline]
    fn from(e: std::io::Error) -> TracedStorageError {
        StorageError::Io(e.into()).into()
    }
}

impl From<serde_json::Error> for TracedStorageError {
    #[inline]
    fn from(e: serde_json::Error) -> TracedStorageError {
        StorageError::JsonDecode(e).into()
    }
}

/// [`StorageError`] with backtrace.
pub struct TracedStorageError {
    source: StorageError,
    backtrace: Backtrace,
}

impl std::fmt::Display for TracedStorageError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}\n{}", self.source, self.backtrace)
    }
}

impl std::error::Error for TracedStorageError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.source)
    }
}

impl From<StorageError> for TracedStorageError {
    fn from(source: StorageError) -> Self {
        TracedStorageError {
            source,
            backtrace: Backtrace::capture(),
        }
    }
}

impl std::fmt::Debug for TracedStorageError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self)
    }
}

impl TracedStorageError {
    pub fn logical(message: impl ToString) -> Self {
        StorageError::Logical(message.to_string()).into()
    }

    pub fn decode(message: impl ToString) -> Self {
        StorageError::Decode(message.to_string()).into()
    }

    /// The wrapped error kind.
    pub fn inner(&self) -> &StorageError {
        &self.source
    }
}

pub type StorageResult<T> = std::result::Result<T, TracedStorageError>;
