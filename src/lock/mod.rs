mod lock_manager;
mod wait_for_graph;

pub use lock_manager::{LockManager, LockOutcome, LockState};
