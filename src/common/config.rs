/// Which buffer-management rules the engine runs under.
///
/// `steal` lets eviction write a page dirtied by a still-active transaction to
/// its file, after forcing an update record for it. `force` makes commit write
/// every page the transaction dirtied before returning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecoveryPolicy {
    pub steal: bool,
    pub force: bool,
}

impl RecoveryPolicy {
    pub const NO_STEAL_FORCE: RecoveryPolicy = RecoveryPolicy {
        steal: false,
        force: true,
    };

    pub const STEAL_FORCE: RecoveryPolicy = RecoveryPolicy {
        steal: true,
        force: true,
    };

    pub const STEAL_NO_FORCE: RecoveryPolicy = RecoveryPolicy {
        steal: true,
        force: false,
    };
}

impl Default for RecoveryPolicy {
    fn default() -> Self {
        Self::NO_STEAL_FORCE
    }
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub page_size: usize,
    pub buffer_pool_size: usize,
    pub policy: RecoveryPolicy,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            page_size: 4096,
            buffer_pool_size: 1000,
            policy: RecoveryPolicy::default(),
        }
    }
}
