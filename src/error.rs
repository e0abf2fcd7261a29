use std::error::Error;

/// Errors surfaced by the hook's public API.
///
/// Per-event failures (a filter panicking, structured data that won't
/// serialize) are deliberately absent: those degrade or drop the single
/// event and are reported on the diagnostic channel instead of failing
/// the producer.
#[derive(thiserror::Error, Debug)]
pub enum HookError {
    /// Ingestion or lifecycle call after [`close`](crate::hook::AsyncHook::close).
    #[error("log hook is closed")]
    Closed,

    /// The sink rejected a batch. The batch has been requeued and will be
    /// retried on the next flush cycle.
    #[error("log sink error: {0}")]
    Sink(#[source] Box<dyn Error + Send + Sync>),
}
