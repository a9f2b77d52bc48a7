mod db_files;
mod file;
mod heap_file;
mod page;
mod registry;

pub use db_files::DBFiles;
pub use file::{File, FileMode, MemoryFile, PosixFile};
pub use heap_file::{DbFile, HeapFile};
pub use page::Page;
pub use registry::FileRegistry;
