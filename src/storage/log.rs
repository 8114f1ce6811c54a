use std::fmt::Debug;

use crate::error::Result;

/// Write-ahead-log hook consulted before a dirty page goes to disk: no
/// page may be written back while log records describing its mutations
/// are still volatile.
///
/// Like the disk manager, one log manager is shared by every pool
/// instance and must be internally thread-safe.
pub trait LogManager: Debug + Send + Sync {
    /// Block until every log record with a sequence number up to and
    /// including `lsn` is durable.
    fn force_flush_up_to(&self, lsn: u64) -> Result<()>;
}

/// Log manager for deployments without a write-ahead log: every flush
/// request succeeds immediately.
#[derive(Debug)]
pub struct StubLogManager;

impl LogManager for StubLogManager {
    fn force_flush_up_to(&self, _lsn: u64) -> Result<()> {
        Ok(())
    }
}
