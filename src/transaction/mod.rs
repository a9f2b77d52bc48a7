mod transaction;

pub use transaction::{TransactionStatus, TransactionTable};
