use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use super::heap_file::DbFile;
use crate::common::{DbError, FileId, Result};

/// Resolves the `FileId` half of a page key to its file store.
#[derive(Default)]
pub struct FileRegistry {
    files: RwLock<HashMap<FileId, Arc<dyn DbFile>>>,
}

impl FileRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// First registration of an id wins.
    pub fn register(&self, file: Arc<dyn DbFile>) {
        if self.contains(file.file_id()) {
            return;
        }
        self.files.write().entry(file.file_id()).or_insert(file);
    }

    pub fn get(&self, id: FileId) -> Result<Arc<dyn DbFile>> {
        self.files
            .read()
            .get(&id)
            .cloned()
            .ok_or(DbError::UnknownFile(id))
    }

    pub fn contains(&self, id: FileId) -> bool {
        self.files.read().contains_key(&id)
    }
}
