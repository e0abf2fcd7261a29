use crate::record::PersistedRow;
use async_trait::async_trait;
use std::error::Error;

/// Asynchronous destination for [`PersistedRow`]s produced by the hook.
///
/// Implementations wrap a concrete relational store (Postgres, an
/// in-memory table in tests, etc). The flush worker calls this from a
/// background task and never awaits it on the producer's thread.
#[async_trait]
pub trait DbSink: Send + Sync {
    /// Insert a single row into the underlying store.
    ///
    /// **Returns**
    /// - `Ok(())` if the store accepted the row.
    /// - `Err(..)` on any failure (connectivity, constraint violation,
    ///   serialization). The hook treats this as a transient failure and
    ///   retries the whole batch on the next flush cycle.
    async fn insert(&self, row: &PersistedRow) -> Result<(), Box<dyn Error + Send + Sync>>;

    /// Insert a batch of rows as one logical unit, in order.
    ///
    /// Must be safe to call repeatedly with the same batch: a failed cycle
    /// is resubmitted wholesale, so delivery is at-least-once and any
    /// deduplication is the store's concern.
    ///
    /// The default implementation falls back to per-row inserts for
    /// stores without bulk support, aborting at the first error with no
    /// partial-success reporting.
    async fn insert_batch(
        &self,
        rows: &[PersistedRow],
    ) -> Result<(), Box<dyn Error + Send + Sync>> {
        for row in rows {
            self.insert(row).await?;
        }
        Ok(())
    }
}
