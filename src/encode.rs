use crate::record::{LogEvent, PersistedRow};
use std::collections::BTreeMap;

/// Well-known field carrying the serialization error when an event's
/// structured data could not be encoded. The rest of the row (timestamp,
/// level, message) is still persisted: partial information beats none.
pub const ENCODING_ERROR_FIELD: &str = "log_encoding_error";

/// Converts accepted events into the row shape the sink persists.
///
/// The encoder carries the hook's extra fixed fields, merged into every
/// event's structured data at encode time. On a key collision the event's
/// own field wins.
pub struct RowEncoder {
    extra_fields: BTreeMap<String, serde_json::Value>,
}

impl RowEncoder {
    pub fn new(extra_fields: BTreeMap<String, serde_json::Value>) -> Self {
        RowEncoder { extra_fields }
    }

    /// Encode one event into a [`PersistedRow`].
    ///
    /// Field keys are kept sorted (`BTreeMap`), giving a canonical JSON
    /// encoding. A value that fails to serialize degrades the payload to
    /// an object carrying the error under [`ENCODING_ERROR_FIELD`] rather
    /// than dropping the event.
    pub fn encode(&self, event: LogEvent) -> PersistedRow {
        let mut merged = self.extra_fields.clone();
        merged.extend(event.fields);

        let data = match serde_json::to_value(&merged) {
            Ok(value) => value,
            Err(e) => {
                eprintln!("log field serialization failed: {e}");
                serde_json::json!({ ENCODING_ERROR_FIELD: e.to_string() })
            }
        };

        PersistedRow {
            timestamp: event.timestamp,
            level: event.level.code(),
            message: event.message.unwrap_or_default(),
            data,
            caller: event.caller,
        }
    }
}
