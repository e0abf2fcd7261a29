use crate::error::HookError;
use crate::record::PersistedRow;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

/// Concurrency-safe holding area for encoded rows awaiting persistence.
///
/// Producers append; the flush worker claims the whole contents with
/// [`take_batch`](BufferedQueue::take_batch). The mutex is held only for
/// the append or the snapshot, never across a sink call, so a slow sink
/// never blocks producers.
///
/// Unbounded by default. With a configured capacity the incoming row is
/// dropped (counted and reported) once the bound is hit; a requeued batch
/// bypasses the bound so a sink outage never discards rows the queue
/// already accepted.
pub struct BufferedQueue {
    inner: Mutex<QueueState>,
    capacity: Option<usize>,
    dropped: AtomicU64,
}

struct QueueState {
    rows: VecDeque<PersistedRow>,
    closed: bool,
}

impl BufferedQueue {
    pub fn new(capacity: Option<usize>) -> Self {
        BufferedQueue {
            inner: Mutex::new(QueueState {
                rows: VecDeque::new(),
                closed: false,
            }),
            capacity,
            dropped: AtomicU64::new(0),
        }
    }

    /// Append a row. Never blocks on a flush in progress.
    ///
    /// Fails with [`HookError::Closed`] once the queue has been closed.
    /// If a capacity is configured and reached, the row is dropped and
    /// counted; this is the configured-overflow path, not an error.
    pub fn push(&self, row: PersistedRow) -> Result<(), HookError> {
        let mut state = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        if state.closed {
            return Err(HookError::Closed);
        }
        if let Some(cap) = self.capacity {
            if state.rows.len() >= cap {
                drop(state);
                self.dropped.fetch_add(1, Ordering::Relaxed);
                eprintln!("log queue full, dropping log row");
                return Ok(());
            }
        }
        state.rows.push_back(row);
        Ok(())
    }

    /// Atomically snapshot and clear the queue.
    ///
    /// Rows enqueued after this call belong to the next flush cycle. Works
    /// in the closed state too, so the final drain can claim what remains.
    pub fn take_batch(&self) -> Vec<PersistedRow> {
        let mut state = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        std::mem::take(&mut state.rows).into()
    }

    /// Put a failed batch back at the front, preserving its original
    /// order ahead of anything enqueued since the snapshot.
    pub fn requeue_front(&self, batch: Vec<PersistedRow>) {
        let mut state = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        for row in batch.into_iter().rev() {
            state.rows.push_front(row);
        }
    }

    /// Transition to the terminal closed state; subsequent pushes fail.
    pub fn close(&self) {
        let mut state = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        state.closed = true;
    }

    pub fn is_closed(&self) -> bool {
        self.inner.lock().unwrap_or_else(|e| e.into_inner()).closed
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap_or_else(|e| e.into_inner()).rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Rows dropped because the configured capacity was reached.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}
