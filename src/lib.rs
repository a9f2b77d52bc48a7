pub mod buffer;
pub mod common;
pub mod lock;
pub mod log_mod;
pub mod recovery;
pub mod storage;
pub mod transaction;

pub use buffer::BufferPool;
pub use common::{
    DatabaseConfig, DbError, FileId, PageKey, Permission, RecoveryPolicy, Result, TransactionID,
};
pub use log_mod::LogFile;
pub use recovery::RecoveryReport;
pub use storage::{DBFiles, DbFile, HeapFile, Page};

use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::sync::Arc;

use log::info;
use parking_lot::Mutex;

/// Heap files keep their id across restarts because it is derived from the
/// file name (32-bit FNV-1a).
fn file_id_for(name: &str) -> FileId {
    let mut hash: u32 = 0x811c_9dc5;
    for byte in name.bytes() {
        hash ^= byte as u32;
        hash = hash.wrapping_mul(0x0100_0193);
    }
    FileId(hash)
}

/// A database directory: heap files, the write-ahead log, and the buffer
/// pool in front of them. Opening runs recovery before anything else.
pub struct Database {
    files: DBFiles,
    config: DatabaseConfig,
    buffer_pool: Arc<BufferPool>,
    heap_files: Mutex<HashMap<String, Arc<HeapFile>>>,
    last_recovery: RecoveryReport,
}

impl Database {
    pub fn open(db_path: &Path, config: DatabaseConfig) -> Result<Self> {
        let files = DBFiles::new(db_path)?;
        let log = LogFile::open(&files.get_log_file_path())?;
        let buffer_pool = Arc::new(BufferPool::new(config.buffer_pool_size, log, config.policy));

        let db = Self {
            files,
            config,
            buffer_pool,
            heap_files: Mutex::new(HashMap::new()),
            last_recovery: RecoveryReport::default(),
        };

        // Every existing file must be resolvable before the log is replayed.
        for entry in fs::read_dir(db.files.data_directory())? {
            let path = entry?.path();
            if path.extension().map_or(false, |ext| ext == "dat") {
                if let Some(name) = path.file_stem().and_then(|stem| stem.to_str()) {
                    db.open_heap_file(name)?;
                }
            }
        }

        let last_recovery = db.buffer_pool.recover()?;
        info!("opened database at {}", db.files.root().display());
        Ok(Self { last_recovery, ..db })
    }

    pub fn buffer_pool(&self) -> &Arc<BufferPool> {
        &self.buffer_pool
    }

    pub fn config(&self) -> &DatabaseConfig {
        &self.config
    }

    pub fn last_recovery(&self) -> &RecoveryReport {
        &self.last_recovery
    }

    /// Opens (creating if needed) the heap file `name` and registers it with
    /// the buffer pool.
    pub fn open_heap_file(&self, name: &str) -> Result<Arc<HeapFile>> {
        let mut heap_files = self.heap_files.lock();
        if let Some(file) = heap_files.get(name) {
            return Ok(Arc::clone(file));
        }

        let id = file_id_for(name);
        if let Some((other, _)) = heap_files.iter().find(|(_, f)| f.file_id() == id) {
            return Err(DbError::Other(format!(
                "heap files {} and {} hash to the same id {}",
                name, other, id
            )));
        }

        let path = self.files.get_data_file_path(name);
        let file = Arc::new(HeapFile::open(id, &path, self.config.page_size)?);
        self.buffer_pool.register_file(file.clone());
        heap_files.insert(name.to_string(), Arc::clone(&file));
        Ok(file)
    }

    /// Writes back every cached page and forces the log.
    pub fn close(&self) -> Result<()> {
        self.buffer_pool.flush_all_pages()?;
        self.buffer_pool.log_file().lock().force()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_ids_are_stable_per_name() {
        assert_eq!(file_id_for("accounts"), file_id_for("accounts"));
        assert_ne!(file_id_for("accounts"), file_id_for("orders"));
    }
}
