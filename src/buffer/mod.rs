mod buffer_pool;
mod page_table;

pub use buffer_pool::BufferPool;
pub use page_table::{PageTable, SlotId};
