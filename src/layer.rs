use crate::hook::AsyncHook;
use crate::record::{Level, LogEvent};
use chrono::Utc;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::field::{Field, Visit};
use tracing::{Event, Metadata, Subscriber};
use tracing_subscriber::layer::{Context, Layer};
use tracing_subscriber::registry::LookupSpan;

/// `tracing_subscriber` layer that turns events into [`LogEvent`]s and
/// hands them to an [`AsyncHook`].
///
/// Only events at or above the configured minimum severity are captured;
/// everything else is ignored before any field work happens. The hook's
/// queue decouples the sink entirely from application threads, so
/// `on_event` does no I/O.
pub struct HookLayer {
    hook: AsyncHook,
    min_level: Level,
    /// Total events seen by the layer (before the level gate).
    pub total_events: Arc<AtomicU64>,
    /// Events lost because the hook was already closed.
    pub dropped_events: Arc<AtomicU64>,
}

impl HookLayer {
    /// Capture events at `Error` severity and above, the usual setup for
    /// shipping only failures to the database.
    pub fn new(hook: AsyncHook) -> Self {
        Self::with_min_level(hook, Level::Error)
    }

    /// Capture events at `min_level` severity and above.
    pub fn with_min_level(hook: AsyncHook, min_level: Level) -> Self {
        HookLayer {
            hook,
            min_level,
            total_events: Arc::new(AtomicU64::new(0)),
            dropped_events: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Whether this layer captures events of the given severity.
    pub fn enabled_for(&self, level: Level) -> bool {
        level >= self.min_level
    }

    pub fn hook(&self) -> &AsyncHook {
        &self.hook
    }
}

fn caller_of(meta: &Metadata<'_>) -> Option<String> {
    let site = meta.module_path().or_else(|| Some(meta.target()))?;
    match (meta.file(), meta.line()) {
        (Some(file), Some(line)) => Some(format!("{site} ({file}:{line})")),
        _ => Some(site.to_string()),
    }
}

impl<S> Layer<S> for HookLayer
where
    S: Subscriber + for<'span> LookupSpan<'span>,
{
    fn on_event(&self, event: &Event, _ctx: Context<'_, S>) {
        self.total_events.fetch_add(1, Ordering::Relaxed);

        let level = Level::from(*event.metadata().level());
        if !self.enabled_for(level) {
            return;
        }

        let mut fields = BTreeMap::new();
        let mut message: Option<String> = None;
        let mut visitor = FieldVisitor {
            fields: &mut fields,
            message: &mut message,
        };
        event.record(&mut visitor);

        let log_event = LogEvent {
            timestamp: Utc::now(),
            level,
            message,
            fields,
            caller: caller_of(event.metadata()),
        };

        if self.hook.submit(log_event).is_err() {
            self.dropped_events.fetch_add(1, Ordering::Relaxed);
            eprintln!("log hook closed, dropping log event");
        }
    }
}

/// Captures a `tracing` event's fields into the hook's structured-data
/// shape; the conventional `message` field becomes the event message.
pub struct FieldVisitor<'a> {
    pub fields: &'a mut BTreeMap<String, serde_json::Value>,
    pub message: &'a mut Option<String>,
}

impl<'a> Visit for FieldVisitor<'a> {
    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            *self.message = Some(value.to_string());
        } else {
            self.fields.insert(
                field.name().to_string(),
                serde_json::Value::String(value.to_string()),
            );
        }
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.fields
            .insert(field.name().to_string(), serde_json::Value::from(value));
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.fields
            .insert(field.name().to_string(), serde_json::Value::from(value));
    }

    fn record_f64(&mut self, field: &Field, value: f64) {
        self.fields
            .insert(field.name().to_string(), serde_json::Value::from(value));
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.fields
            .insert(field.name().to_string(), serde_json::Value::from(value));
    }

    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        if field.name() == "message" {
            *self.message = Some(format!("{:?}", value));
        } else {
            self.fields.insert(
                field.name().to_string(),
                serde_json::Value::String(format!("{:?}", value)),
            );
        }
    }
}
