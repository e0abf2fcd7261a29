use crate::record::LogEvent;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

/// A filter inspects an event before it is queued and may alter or
/// suppress it. Returning `None` drops the event silently.
pub type FilterFn = dyn Fn(LogEvent) -> Option<LogEvent> + Send + Sync;

/// Ordered, append-only set of filters applied to every incoming event.
///
/// Filters run in registration order; each filter receives the previous
/// filter's output, and the first one to return `None` short-circuits the
/// rest. There is no removal API: callers needing a different pipeline
/// construct a new hook instance.
///
/// The list is kept as an immutable snapshot behind an `RwLock`, so the
/// ingestion path clones one `Arc` and never holds a lock while user
/// filters run. Registration is safe to call concurrently with ingestion.
pub struct FilterPipeline {
    filters: RwLock<Arc<Vec<Arc<FilterFn>>>>,
    /// Filters that panicked; the affected events were dropped.
    panics: AtomicU64,
}

impl FilterPipeline {
    pub fn new() -> Self {
        FilterPipeline {
            filters: RwLock::new(Arc::new(Vec::new())),
            panics: AtomicU64::new(0),
        }
    }

    /// Append a filter to the end of the pipeline.
    pub fn add<F>(&self, filter: F)
    where
        F: Fn(LogEvent) -> Option<LogEvent> + Send + Sync + 'static,
    {
        let mut guard = self.filters.write().unwrap_or_else(|e| e.into_inner());
        let mut next = Vec::with_capacity(guard.len() + 1);
        next.extend(guard.iter().cloned());
        next.push(Arc::new(filter) as Arc<FilterFn>);
        *guard = Arc::new(next);
    }

    /// Run the event through every filter in order.
    ///
    /// Returns `None` as soon as any filter drops the event. A panicking
    /// filter counts as a drop: the event is discarded, the panic is
    /// reported, and subsequent events keep flowing through the pipeline.
    pub fn apply(&self, event: LogEvent) -> Option<LogEvent> {
        let snapshot = {
            let guard = self.filters.read().unwrap_or_else(|e| e.into_inner());
            Arc::clone(&guard)
        };

        let mut current = event;
        for filter in snapshot.iter() {
            match catch_unwind(AssertUnwindSafe(|| (**filter)(current))) {
                Ok(Some(next)) => current = next,
                Ok(None) => return None,
                Err(_) => {
                    self.panics.fetch_add(1, Ordering::Relaxed);
                    eprintln!("log filter panicked, dropping event");
                    return None;
                }
            }
        }
        Some(current)
    }

    pub fn len(&self) -> usize {
        self.filters.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of events dropped because a filter panicked.
    pub fn panic_count(&self) -> u64 {
        self.panics.load(Ordering::Relaxed)
    }
}

impl Default for FilterPipeline {
    fn default() -> Self {
        Self::new()
    }
}
