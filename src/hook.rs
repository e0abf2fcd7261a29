use crate::encode::RowEncoder;
use crate::error::HookError;
use crate::filter::FilterPipeline;
use crate::queue::BufferedQueue;
use crate::record::LogEvent;
use crate::redact::RedactionSet;
use crate::sink::DbSink;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{sleep, Duration};

/// Construction-time configuration for [`AsyncHook`].
///
/// **Fields**
/// - `extra_fields`: fixed fields merged into every event's structured
///   data at encode time; event-level keys win on collision.
/// - `flush_interval`: period of the automatic flush timer. `None` means
///   manual flush only.
/// - `max_buffered`: optional bound on the queue; `None` is unbounded.
///   Unbounded growth under sink unavailability is the caller's risk.
/// - `blacklist`: initial redaction set, replaceable later via
///   [`AsyncHook::blacklist`].
#[derive(Clone, Debug)]
pub struct HookConfig {
    pub extra_fields: BTreeMap<String, serde_json::Value>,
    pub flush_interval: Option<Duration>,
    pub max_buffered: Option<usize>,
    pub blacklist: Vec<String>,
}

impl Default for HookConfig {
    fn default() -> Self {
        Self {
            extra_fields: BTreeMap::new(),
            flush_interval: Some(Duration::from_secs(1)),
            max_buffered: None,
            blacklist: Vec::new(),
        }
    }
}

/// Snapshot of the hook's diagnostic counters.
#[derive(Debug, Clone, Copy, Default)]
pub struct HookStats {
    /// Rows accepted into the queue.
    pub submitted: u64,
    /// Events dropped by a filter (success path, not an error).
    pub filtered: u64,
    /// Events dropped because a filter panicked.
    pub filter_panics: u64,
    /// Rows dropped because the configured capacity was reached.
    pub overflow_dropped: u64,
    /// Flush cycles that failed at the sink and were requeued.
    pub flush_failures: u64,
}

struct HookCore {
    filters: FilterPipeline,
    redaction: RedactionSet,
    encoder: RowEncoder,
    queue: BufferedQueue,
    submitted: AtomicU64,
    filtered: AtomicU64,
    flush_failures: AtomicU64,
}

enum Command {
    Flush(oneshot::Sender<Result<(), HookError>>),
    SetInterval(Option<Duration>),
    Close(oneshot::Sender<Result<(), HookError>>),
}

/// Asynchronous hook that batches structured log events into a [`DbSink`].
///
/// Producers call [`submit`](AsyncHook::submit), which runs the filter
/// pipeline, redaction and encoding inline and appends the row to the
/// buffered queue; it never waits on the sink. A single background worker
/// drains the queue on the flush timer, on an explicit
/// [`flush`](AsyncHook::flush), and once more during
/// [`close`](AsyncHook::close). At most one flush cycle runs at a time
/// because the worker is the only flusher.
///
/// A failed cycle requeues its batch at the front of the queue in original
/// order and retries on the next cycle, so delivery to the sink is
/// at-least-once; rows buffered at the time of an abnormal process exit
/// are lost.
///
/// Must be constructed inside a tokio runtime. Cloning is cheap and all
/// clones share the same queue and worker.
#[derive(Clone)]
pub struct AsyncHook {
    core: Arc<HookCore>,
    ctl: mpsc::UnboundedSender<Command>,
}

impl AsyncHook {
    /// Create a hook with default configuration and the given extra fixed
    /// fields, and spawn its background flush worker.
    pub fn new(sink: Arc<dyn DbSink>, extra_fields: BTreeMap<String, serde_json::Value>) -> Self {
        Self::with_config(
            sink,
            HookConfig {
                extra_fields,
                ..HookConfig::default()
            },
        )
    }

    /// Create a hook from an explicit [`HookConfig`].
    pub fn with_config(sink: Arc<dyn DbSink>, config: HookConfig) -> Self {
        let core = Arc::new(HookCore {
            filters: FilterPipeline::new(),
            redaction: RedactionSet::new(),
            encoder: RowEncoder::new(config.extra_fields),
            queue: BufferedQueue::new(config.max_buffered),
            submitted: AtomicU64::new(0),
            filtered: AtomicU64::new(0),
            flush_failures: AtomicU64::new(0),
        });
        if !config.blacklist.is_empty() {
            core.redaction.blacklist(config.blacklist);
        }

        let (ctl, rx) = mpsc::unbounded_channel();
        tokio::spawn(run_worker(
            Arc::clone(&core),
            sink,
            rx,
            config.flush_interval,
        ));

        AsyncHook { core, ctl }
    }

    /// Append a filter to the pipeline. Append-only; safe to call while
    /// events are being ingested.
    pub fn add_filter<F>(&self, filter: F)
    where
        F: Fn(LogEvent) -> Option<LogEvent> + Send + Sync + 'static,
    {
        self.core.filters.add(filter);
    }

    /// Replace the active redaction set.
    pub fn blacklist<I, S>(&self, names: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.core.redaction.blacklist(names);
    }

    /// Reconfigure the automatic flush timer at runtime.
    ///
    /// `Duration::ZERO` disables automatic cycles (manual flush only).
    /// A cycle already in flight is unaffected. No-op once closed.
    pub fn flush_every(&self, every: Duration) {
        let interval = if every.is_zero() { None } else { Some(every) };
        let _ = self.ctl.send(Command::SetInterval(interval));
    }

    /// Ingest one event: filter, redact, encode, enqueue.
    ///
    /// Never blocks on a flush in progress. Returns
    /// [`HookError::Closed`] after [`close`](AsyncHook::close); a
    /// filter-dropped event is a success.
    pub fn submit(&self, event: LogEvent) -> Result<(), HookError> {
        if self.core.queue.is_closed() {
            return Err(HookError::Closed);
        }
        let Some(mut event) = self.core.filters.apply(event) else {
            self.core.filtered.fetch_add(1, Ordering::Relaxed);
            return Ok(());
        };
        self.core.redaction.redact(&mut event.fields);
        let row = self.core.encoder.encode(event);
        self.core.queue.push(row)?;
        self.core.submitted.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Force a flush cycle and wait for it to complete.
    ///
    /// Returns the sink error if the cycle failed; the batch has then
    /// been requeued for the next cycle.
    pub async fn flush(&self) -> Result<(), HookError> {
        let (reply, done) = oneshot::channel();
        self.ctl
            .send(Command::Flush(reply))
            .map_err(|_| HookError::Closed)?;
        done.await.map_err(|_| HookError::Closed)?
    }

    /// Shut down: reject further ingestion, perform one final flush, and
    /// stop the worker.
    ///
    /// Rows enqueued before this call are drained; delivery across an
    /// abnormal process exit is not guaranteed.
    pub async fn close(&self) -> Result<(), HookError> {
        self.core.queue.close();
        let (reply, done) = oneshot::channel();
        self.ctl
            .send(Command::Close(reply))
            .map_err(|_| HookError::Closed)?;
        done.await.map_err(|_| HookError::Closed)?
    }

    /// Number of rows currently buffered.
    pub fn pending(&self) -> usize {
        self.core.queue.len()
    }

    pub fn is_closed(&self) -> bool {
        self.core.queue.is_closed()
    }

    pub fn stats(&self) -> HookStats {
        HookStats {
            submitted: self.core.submitted.load(Ordering::Relaxed),
            filtered: self.core.filtered.load(Ordering::Relaxed),
            filter_panics: self.core.filters.panic_count(),
            overflow_dropped: self.core.queue.dropped(),
            flush_failures: self.core.flush_failures.load(Ordering::Relaxed),
        }
    }
}

async fn run_worker(
    core: Arc<HookCore>,
    sink: Arc<dyn DbSink>,
    mut rx: mpsc::UnboundedReceiver<Command>,
    mut every: Option<Duration>,
) {
    loop {
        tokio::select! {
            cmd = rx.recv() => match cmd {
                Some(Command::Flush(reply)) => {
                    let _ = reply.send(flush_cycle(&core, sink.as_ref()).await);
                }
                Some(Command::SetInterval(interval)) => every = interval,
                Some(Command::Close(reply)) => {
                    let _ = reply.send(flush_cycle(&core, sink.as_ref()).await);
                    break;
                }
                None => {
                    // Every handle was dropped without close(); drain what
                    // remains before the worker exits.
                    if let Err(e) = flush_cycle(&core, sink.as_ref()).await {
                        eprintln!("final log flush failed: {e}");
                    }
                    break;
                }
            },
            _ = tick(every) => {
                if let Err(e) = flush_cycle(&core, sink.as_ref()).await {
                    eprintln!("periodic log flush failed: {e}");
                }
            }
        }
    }
}

/// One flush cycle: snapshot-and-clear, then persist the batch as a unit.
///
/// An empty queue skips the sink call entirely. On failure the whole
/// batch goes back to the front of the queue, never dropped silently.
async fn flush_cycle(core: &HookCore, sink: &dyn DbSink) -> Result<(), HookError> {
    let batch = core.queue.take_batch();
    if batch.is_empty() {
        return Ok(());
    }
    match sink.insert_batch(&batch).await {
        Ok(()) => Ok(()),
        Err(e) => {
            core.queue.requeue_front(batch);
            core.flush_failures.fetch_add(1, Ordering::Relaxed);
            Err(HookError::Sink(e))
        }
    }
}

async fn tick(every: Option<Duration>) {
    match every {
        Some(interval) => sleep(interval).await,
        None => std::future::pending().await,
    }
}
