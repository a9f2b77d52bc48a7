mod recovery_manager;

pub use recovery_manager::{recover, rollback, RecoveryReport};
