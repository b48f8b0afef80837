// Copyright 2024 RisingLight Project Authors. Licensed under Apache-2.0.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::storage::{StorageResult, TracedStorageError};

#[derive(Debug, Default, Serialize, Deserialize)]
struct FileSizes {
    files: BTreeMap<String, u64>,
}

/// Records the expected sizes of a table's files and verifies them later.
///
/// The checkpoint is a JSON map from file name to byte size, replaced
/// atomically on every update so a concurrent reader never observes a torn
/// file.
#[derive(Debug)]
pub(crate) struct FileChecker {
    path: PathBuf,
}

impl FileChecker {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn set_path(&mut self, path: PathBuf) {
        self.path = path;
    }

    /// Capture the current sizes of `files`, keeping entries for files not
    /// listed here.
    pub fn update(&self, files: &[PathBuf]) -> StorageResult<()> {
        let mut sizes = self.load()?;
        for file in files {
            let name = file_name(file)?;
            sizes.files.insert(name, fs::metadata(file)?.len());
        }
        self.save(&sizes)
    }

    /// Compare every recorded size against the live file. Nothing recorded
    /// counts as consistent.
    pub fn check(&self) -> StorageResult<bool> {
        let sizes = self.load()?;
        let dir = self
            .path
            .parent()
            .ok_or_else(|| TracedStorageError::logical("size checkpoint has no parent directory"))?;
        for (name, expected) in &sizes.files {
            let actual = match fs::metadata(dir.join(name)) {
                Ok(metadata) => metadata.len(),
                Err(err) => {
                    warn!("cannot stat file {name}: {err}");
                    return Ok(false);
                }
            };
            if actual != *expected {
                warn!("size of file {name} differs: expected {expected}, found {actual}");
                return Ok(false);
            }
        }
        Ok(true)
    }

    fn load(&self) -> StorageResult<FileSizes> {
        if !self.path.exists() {
            return Ok(FileSizes::default());
        }
        let contents = fs::read(&self.path)?;
        Ok(serde_json::from_slice(&contents)?)
    }

    fn save(&self, sizes: &FileSizes) -> StorageResult<()> {
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, serde_json::to_vec_pretty(sizes)?)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

fn file_name(path: &Path) -> StorageResult<String> {
    path.file_name()
        .and_then(|name| name.to_str())
        .map(|name| name.to_string())
        .ok_or_else(|| {
            TracedStorageError::logical(format!("invalid file path {}", path.display()))
        })
}
