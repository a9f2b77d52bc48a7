mod log_file;
mod log_record;

pub use log_file::LogFile;
pub use log_record::{LogEntry, LogRecord, LogRecordType};
