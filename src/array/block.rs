// Copyright 2024 RisingLight Project Authors. Licensed under Apache-2.0.

use super::ArrayImpl;
use crate::storage::{StorageResult, TracedStorageError};

/// A named column inside a [`Block`].
#[derive(Clone, Debug, PartialEq)]
pub struct BlockColumn {
    name: String,
    array: ArrayImpl,
}

impl BlockColumn {
    pub fn new(name: impl Into<String>, array: impl Into<ArrayImpl>) -> Self {
        Self {
            name: name.into(),
            array: array.into(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn array(&self) -> &ArrayImpl {
        &self.array
    }

    pub fn into_array(self) -> ArrayImpl {
        self.array
    }
}

/// An ordered set of named, typed columns with equal row counts.
///
/// A block is the unit of read and write of a log table.
#[derive(Clone, Debug, PartialEq)]
pub struct Block {
    columns: Vec<BlockColumn>,
}

impl Block {
    /// Build a block from named columns, verifying that the set is
    /// non-empty and that every column has the same number of rows.
    pub fn try_from_columns(columns: Vec<BlockColumn>) -> StorageResult<Self> {
        let Some(first) = columns.first() else {
            return Err(TracedStorageError::logical(
                "block must have at least one column",
            ));
        };
        let cardinality = first.array().len();
        if let Some(column) = columns.iter().find(|c| c.array().len() != cardinality) {
            return Err(TracedStorageError::logical(format!(
                "column {} has {} rows, expected {}",
                column.name(),
                column.array().len(),
                cardinality
            )));
        }
        Ok(Block { columns })
    }

    /// Return the number of rows in the block.
    pub fn cardinality(&self) -> usize {
        self.columns[0].array().len()
    }

    /// Return the number of columns in the block.
    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    /// All columns of the block, in order.
    pub fn columns(&self) -> &[BlockColumn] {
        &self.columns
    }

    /// Find a column by its name.
    pub fn column_by_name(&self, name: &str) -> Option<&BlockColumn> {
        self.columns.iter().find(|c| c.name() == name)
    }
}
