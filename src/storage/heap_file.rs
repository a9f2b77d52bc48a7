use std::path::Path;

use parking_lot::Mutex;

use super::file::{File, FileMode, MemoryFile, PosixFile};
use super::page::Page;
use crate::common::{DbError, FileId, PageKey, Result};

/// A page-addressed file store the buffer pool loads pages from and writes
/// pages back to.
pub trait DbFile: Send + Sync {
    fn file_id(&self) -> FileId;

    fn page_size(&self) -> usize;

    fn num_pages(&self) -> Result<usize>;

    /// Reads a page straight from storage, bypassing any cache.
    fn read_page(&self, page_no: usize) -> Result<Page>;

    fn write_page(&self, page_no: usize, data: &[u8]) -> Result<()>;

    fn flush_page(&self, page: &Page) -> Result<()> {
        let data = page.data();
        self.write_page(page.page_no(), &data)
    }

    fn page_key(&self, page_no: usize) -> PageKey {
        PageKey::new(self.file_id(), page_no)
    }
}

/// Fixed-size pages laid end to end in a single `File`.
pub struct HeapFile {
    id: FileId,
    page_size: usize,
    file: Mutex<Box<dyn File>>,
}

impl HeapFile {
    pub fn new(id: FileId, file: Box<dyn File>, page_size: usize) -> Self {
        Self {
            id,
            page_size,
            file: Mutex::new(file),
        }
    }

    pub fn open(id: FileId, path: &Path, page_size: usize) -> Result<Self> {
        let file = PosixFile::new(path, FileMode::WRITE)?;
        Ok(Self::new(id, Box::new(file), page_size))
    }

    pub fn in_memory(id: FileId, page_size: usize) -> Self {
        Self::new(id, Box::new(MemoryFile::new(FileMode::WRITE)), page_size)
    }

    /// Appends a zeroed page and returns its number.
    pub fn allocate_page(&self) -> Result<usize> {
        let mut file = self.file.lock();
        let page_no = file.size()? / self.page_size;
        file.write_block(&vec![0u8; self.page_size], page_no * self.page_size)?;
        file.sync()?;
        Ok(page_no)
    }

    fn check_page(&self, file: &dyn File, page_no: usize) -> Result<()> {
        if page_no >= file.size()? / self.page_size {
            return Err(DbError::PageNotFound {
                file: self.id,
                page_no,
            });
        }
        Ok(())
    }
}

impl DbFile for HeapFile {
    fn file_id(&self) -> FileId {
        self.id
    }

    fn page_size(&self) -> usize {
        self.page_size
    }

    fn num_pages(&self) -> Result<usize> {
        Ok(self.file.lock().size()? / self.page_size)
    }

    fn read_page(&self, page_no: usize) -> Result<Page> {
        let mut file = self.file.lock();
        self.check_page(&**file, page_no)?;
        let data = file.read_block(page_no * self.page_size, self.page_size)?;
        Ok(Page::new(self.page_key(page_no), data))
    }

    fn write_page(&self, page_no: usize, data: &[u8]) -> Result<()> {
        if data.len() != self.page_size {
            return Err(DbError::PageSizeMismatch {
                expected: self.page_size,
                actual: data.len(),
            });
        }
        let mut file = self.file.lock();
        file.write_block(data, page_no * self.page_size)?;
        file.sync()
    }
}
