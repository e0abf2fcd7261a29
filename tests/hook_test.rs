use async_trait::async_trait;
use serde_json::Value;
use std::collections::BTreeMap;
use std::error::Error;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::time::{sleep, Duration};

use tracing_db_hook::error::HookError;
use tracing_db_hook::hook::{AsyncHook, HookConfig};
use tracing_db_hook::record::{Level, LogEvent, PersistedRow};
use tracing_db_hook::sink::DbSink;

/// In-memory sink recording every successfully persisted batch, with
/// optional failure injection for the next N batch attempts.
#[derive(Default)]
struct MemorySink {
    batches: Mutex<Vec<Vec<PersistedRow>>>,
    fail_remaining: AtomicUsize,
    attempts: AtomicUsize,
}

impl MemorySink {
    fn new() -> Arc<Self> {
        Arc::new(MemorySink::default())
    }

    fn fail_next(&self, n: usize) {
        self.fail_remaining.store(n, Ordering::SeqCst);
    }

    fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    fn batches(&self) -> Vec<Vec<PersistedRow>> {
        self.batches.lock().unwrap().clone()
    }

    fn rows(&self) -> Vec<PersistedRow> {
        self.batches().into_iter().flatten().collect()
    }
}

#[async_trait]
impl DbSink for MemorySink {
    async fn insert(&self, row: &PersistedRow) -> Result<(), Box<dyn Error + Send + Sync>> {
        self.insert_batch(std::slice::from_ref(row)).await
    }

    async fn insert_batch(
        &self,
        rows: &[PersistedRow],
    ) -> Result<(), Box<dyn Error + Send + Sync>> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if self
            .fail_remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err("injected sink failure".into());
        }
        self.batches.lock().unwrap().push(rows.to_vec());
        Ok(())
    }
}

fn manual_hook(sink: Arc<MemorySink>) -> AsyncHook {
    AsyncHook::with_config(
        sink,
        HookConfig {
            flush_interval: None,
            ..HookConfig::default()
        },
    )
}

fn event(level: Level, message: &str, fields: &[(&str, &str)]) -> LogEvent {
    let mut e = LogEvent::new(level, message);
    for (k, v) in fields {
        e = e.with_field(*k, Value::from(*v));
    }
    e
}

/// The original acceptance scenario: four events at mixed levels, one
/// blacklisted field, one filter dropping events carrying an `ignore`
/// field. Three rows survive, none containing the blacklisted key.
#[tokio::test]
async fn filter_and_redact_scenario() {
    let sink = MemorySink::new();
    let hook = manual_hook(Arc::clone(&sink));
    hook.blacklist(["filterMe"]);
    hook.add_filter(|e: LogEvent| {
        if e.fields.contains_key("ignore") {
            None
        } else {
            Some(e)
        }
    });

    let msg = "test message\nsecond line";
    let err_msg = "some error occurred";

    let events = vec![
        event(Level::Error, err_msg, &[("withField", "1"), ("user", "123")]),
        event(Level::Info, msg, &[("withField", "2"), ("filterMe", "1")]),
        event(Level::Debug, msg, &[("withField", "3")]),
        event(Level::Info, msg, &[("ignore", "me")]),
    ];

    let mut handles = Vec::new();
    for e in events {
        let hook = hook.clone();
        handles.push(tokio::spawn(async move { hook.submit(e).unwrap() }));
    }
    for h in handles {
        h.await.unwrap();
    }

    hook.flush().await.unwrap();

    let rows = sink.rows();
    assert_eq!(rows.len(), 3);
    for row in &rows {
        assert!(row.data.get("filterMe").is_none());
        let expected = match row.data.get("withField").and_then(Value::as_str) {
            Some("1") => (Level::Error, err_msg),
            Some("2") => (Level::Info, msg),
            Some("3") => (Level::Debug, msg),
            other => panic!("unexpected row: {other:?}"),
        };
        assert_eq!(row.level, expected.0.code());
        assert_eq!(row.message, expected.1);
    }
    // The error event kept its other field.
    assert!(rows
        .iter()
        .any(|r| r.data.get("user").and_then(Value::as_str) == Some("123")));
}

#[tokio::test]
async fn timer_flushes_exactly_once_without_explicit_flush() {
    let sink = MemorySink::new();
    let hook = manual_hook(Arc::clone(&sink));
    hook.flush_every(Duration::from_millis(100));

    hook.submit(event(Level::Error, "timed", &[])).unwrap();
    sleep(Duration::from_millis(250)).await;

    let rows = sink.rows();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].message, "timed");
}

#[tokio::test]
async fn disabling_timer_stops_automatic_cycles() {
    let sink = MemorySink::new();
    let hook = manual_hook(Arc::clone(&sink));
    hook.flush_every(Duration::from_millis(50));
    hook.flush_every(Duration::ZERO);
    // Give the worker a moment to pick up the reconfiguration.
    sleep(Duration::from_millis(20)).await;

    hook.submit(event(Level::Error, "held", &[])).unwrap();
    sleep(Duration::from_millis(200)).await;
    assert!(sink.rows().is_empty());
    assert_eq!(hook.pending(), 1);

    hook.flush().await.unwrap();
    assert_eq!(sink.rows().len(), 1);
}

#[tokio::test]
async fn failed_cycle_requeues_batch_in_original_order() {
    let sink = MemorySink::new();
    let hook = manual_hook(Arc::clone(&sink));

    hook.submit(event(Level::Error, "a", &[])).unwrap();
    hook.submit(event(Level::Error, "b", &[])).unwrap();

    sink.fail_next(1);
    let err = hook.flush().await.unwrap_err();
    assert!(matches!(err, HookError::Sink(_)));
    assert_eq!(hook.stats().flush_failures, 1);

    // A row enqueued after the failed cycle lands behind the requeued batch.
    hook.submit(event(Level::Error, "c", &[])).unwrap();
    hook.flush().await.unwrap();

    let batches = sink.batches();
    assert_eq!(batches.len(), 1);
    let messages: Vec<_> = batches[0].iter().map(|r| r.message.as_str()).collect();
    assert_eq!(messages, vec!["a", "b", "c"]);
    assert_eq!(sink.attempts(), 2);
}

#[tokio::test]
async fn close_drains_concurrent_producers_in_fifo_order() {
    let sink = MemorySink::new();
    let hook = manual_hook(Arc::clone(&sink));

    const PRODUCERS: usize = 4;
    const PER_PRODUCER: usize = 50;

    let mut handles = Vec::new();
    for p in 0..PRODUCERS {
        let hook = hook.clone();
        handles.push(tokio::spawn(async move {
            for i in 0..PER_PRODUCER {
                let e = LogEvent::new(Level::Error, format!("p{p}"))
                    .with_field("producer", Value::from(p as u64))
                    .with_field("seq", Value::from(i as u64));
                hook.submit(e).unwrap();
                if i % 16 == 0 {
                    tokio::task::yield_now().await;
                }
            }
        }));
    }
    for h in handles {
        h.await.unwrap();
    }

    hook.close().await.unwrap();

    let rows = sink.rows();
    assert_eq!(rows.len(), PRODUCERS * PER_PRODUCER);

    // Each producer's own stream must come out in submission order.
    let mut next_seq = [0u64; PRODUCERS];
    for row in &rows {
        let p = row.data.get("producer").and_then(Value::as_u64).unwrap() as usize;
        let seq = row.data.get("seq").and_then(Value::as_u64).unwrap();
        assert_eq!(seq, next_seq[p], "producer {p} out of order");
        next_seq[p] += 1;
    }
}

#[tokio::test]
async fn concurrent_timer_and_explicit_flush_never_duplicate_rows() {
    let sink = MemorySink::new();
    let hook = manual_hook(Arc::clone(&sink));
    hook.flush_every(Duration::from_millis(5));

    const TOTAL: usize = 200;
    for i in 0..TOTAL {
        hook.submit(
            LogEvent::new(Level::Error, "e").with_field("id", Value::from(i as u64)),
        )
        .unwrap();
        if i % 20 == 0 {
            hook.flush().await.unwrap();
        }
        if i % 7 == 0 {
            sleep(Duration::from_millis(1)).await;
        }
    }
    hook.close().await.unwrap();

    let mut seen = vec![0usize; TOTAL];
    for row in sink.rows() {
        let id = row.data.get("id").and_then(Value::as_u64).unwrap() as usize;
        seen[id] += 1;
    }
    assert!(
        seen.iter().all(|&count| count == 1),
        "every row persisted exactly once"
    );
}

#[tokio::test]
async fn filters_see_fields_before_redaction() {
    let sink = MemorySink::new();
    let hook = manual_hook(Arc::clone(&sink));
    // The same field is both the filter's criterion and blacklisted; the
    // filter still sees it and drops the event.
    hook.blacklist(["ignore"]);
    hook.add_filter(|e: LogEvent| {
        if e.fields.contains_key("ignore") {
            None
        } else {
            Some(e)
        }
    });

    hook.submit(event(Level::Error, "dropped", &[("ignore", "1")]))
        .unwrap();
    hook.flush().await.unwrap();
    assert!(sink.rows().is_empty());
    assert_eq!(hook.stats().filtered, 1);
}

#[tokio::test]
async fn extra_fields_appear_in_every_row() {
    let sink = MemorySink::new();
    let hook = AsyncHook::with_config(
        Arc::clone(&sink) as Arc<dyn DbSink>,
        HookConfig {
            extra_fields: BTreeMap::from([(
                "this".to_string(),
                Value::from("is logged every time"),
            )]),
            flush_interval: None,
            ..HookConfig::default()
        },
    );

    hook.submit(event(Level::Info, "one", &[])).unwrap();
    hook.submit(event(Level::Info, "two", &[("this", "overridden")]))
        .unwrap();
    hook.flush().await.unwrap();

    let rows = sink.rows();
    assert_eq!(
        rows[0].data.get("this").and_then(Value::as_str),
        Some("is logged every time")
    );
    assert_eq!(
        rows[1].data.get("this").and_then(Value::as_str),
        Some("overridden")
    );
}

#[tokio::test]
async fn configured_capacity_drops_overflow() {
    let sink = MemorySink::new();
    let hook = AsyncHook::with_config(
        Arc::clone(&sink) as Arc<dyn DbSink>,
        HookConfig {
            flush_interval: None,
            max_buffered: Some(2),
            ..HookConfig::default()
        },
    );

    for i in 0..5 {
        hook.submit(event(Level::Error, &format!("m{i}"), &[]))
            .unwrap();
    }
    hook.flush().await.unwrap();

    assert_eq!(sink.rows().len(), 2);
    assert_eq!(hook.stats().overflow_dropped, 3);
}
