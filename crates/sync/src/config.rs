//! Sync configuration.

/// Configuration for sync session admission.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Maximum number of simultaneous synchronization sessions.
    pub permit_capacity: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self { permit_capacity: 8 }
    }
}
