use crate::record::PersistedRow;
use crate::sink::DbSink;
use async_trait::async_trait;
use std::error::Error;

/// A sink that simply drops all rows.
///
/// Useful for measuring the overhead of the hook itself without any
/// external I/O, and for unit tests that don't care about persistence.
#[derive(Clone, Default)]
pub struct NoopSink;

#[async_trait]
impl DbSink for NoopSink {
    async fn insert(&self, _row: &PersistedRow) -> Result<(), Box<dyn Error + Send + Sync>> {
        Ok(())
    }
}
