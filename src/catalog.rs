// Copyright 2024 RisingLight Project Authors. Licensed under Apache-2.0.

//! Column descriptions consumed by the storage engine.

use crate::types::DataTypeRef;

/// The name and data type of one column of a table.
#[derive(Clone)]
pub struct ColumnCatalog {
    name: String,
    datatype: DataTypeRef,
}

impl ColumnCatalog {
    pub fn new(name: impl Into<String>, datatype: DataTypeRef) -> Self {
        Self {
            name: name.into(),
            datatype,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn datatype(&self) -> DataTypeRef {
        self.datatype.clone()
    }
}
