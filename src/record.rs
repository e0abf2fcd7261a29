use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Severity of a [`LogEvent`], ordered from least to most severe.
///
/// This is a superset of `tracing`'s levels: `Fatal` and `Panic` exist so
/// that events originating from pipelines with a wider level set map onto
/// the same fixed storage codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
    Fatal,
    Panic,
}

impl Level {
    /// Numeric code stored in the sink's `level_id` column.
    ///
    /// The table is fixed: panic=0, fatal=1, error=2, warn=3, info=4,
    /// debug=5, trace=6. Lower codes mean more severe.
    pub fn code(self) -> i16 {
        match self {
            Level::Panic => 0,
            Level::Fatal => 1,
            Level::Error => 2,
            Level::Warn => 3,
            Level::Info => 4,
            Level::Debug => 5,
            Level::Trace => 6,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Level::Trace => "trace",
            Level::Debug => "debug",
            Level::Info => "info",
            Level::Warn => "warn",
            Level::Error => "error",
            Level::Fatal => "fatal",
            Level::Panic => "panic",
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when a level name is not part of the fixed level set.
///
/// Unknown levels are surfaced to the caller, never silently coerced.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("unknown log level: {0:?}")]
pub struct ParseLevelError(pub String);

impl FromStr for Level {
    type Err = ParseLevelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "trace" => Ok(Level::Trace),
            "debug" => Ok(Level::Debug),
            "info" => Ok(Level::Info),
            "warn" | "warning" => Ok(Level::Warn),
            "error" => Ok(Level::Error),
            "fatal" => Ok(Level::Fatal),
            "panic" => Ok(Level::Panic),
            other => Err(ParseLevelError(other.to_string())),
        }
    }
}

impl From<tracing::Level> for Level {
    fn from(level: tracing::Level) -> Self {
        match level {
            tracing::Level::TRACE => Level::Trace,
            tracing::Level::DEBUG => Level::Debug,
            tracing::Level::INFO => Level::Info,
            tracing::Level::WARN => Level::Warn,
            tracing::Level::ERROR => Level::Error,
        }
    }
}

/// A structured log event as handed to the hook by a producer.
///
/// Ownership moves into the hook on submit; the event is never mutated
/// after encoding.
#[derive(Debug, Clone, Serialize)]
pub struct LogEvent {
    pub timestamp: DateTime<Utc>,
    pub level: Level,
    /// Free text, may span multiple lines.
    pub message: Option<String>,
    /// Structured data attached to the event. Keys are unique.
    pub fields: BTreeMap<String, serde_json::Value>,
    /// Optional function/site identifier of the emitting code.
    pub caller: Option<String>,
}

impl LogEvent {
    /// Convenience constructor stamping the event with the current time.
    pub fn new(level: Level, message: impl Into<String>) -> Self {
        LogEvent {
            timestamp: Utc::now(),
            level,
            message: Some(message.into()),
            fields: BTreeMap::new(),
            caller: None,
        }
    }

    pub fn with_field(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.fields.insert(key.into(), value);
        self
    }
}

/// The encoder's output: an event reduced to exactly the columns the sink
/// accepts. Owned by the buffered queue until claimed by a flush.
#[derive(Debug, Clone, Serialize)]
pub struct PersistedRow {
    pub timestamp: DateTime<Utc>,
    /// Fixed numeric level code, see [`Level::code`].
    pub level: i16,
    pub message: String,
    /// Structured data remaining after filtering/redaction, with the
    /// hook's extra fixed fields merged in.
    pub data: serde_json::Value,
    pub caller: Option<String>,
}
