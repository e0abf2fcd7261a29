use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, RwLock};

/// Field names stripped from every event's structured data before it is
/// queued or stored.
///
/// Redaction runs after the filter pipeline so filters still see the full
/// field set (a filter may drop an event based on a field that would later
/// be redacted). Application is idempotent and order-independent.
pub struct RedactionSet {
    names: RwLock<Arc<HashSet<String>>>,
}

impl RedactionSet {
    pub fn new() -> Self {
        RedactionSet {
            names: RwLock::new(Arc::new(HashSet::new())),
        }
    }

    /// Replace the active set of redacted field names.
    ///
    /// This replaces, never merges: calling it twice means only the second
    /// set applies.
    pub fn blacklist<I, S>(&self, names: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let set: HashSet<String> = names.into_iter().map(Into::into).collect();
        let mut guard = self.names.write().unwrap_or_else(|e| e.into_inner());
        *guard = Arc::new(set);
    }

    /// Remove every blacklisted key from `fields`. Absent keys are ignored.
    pub fn redact(&self, fields: &mut BTreeMap<String, serde_json::Value>) {
        let snapshot = {
            let guard = self.names.read().unwrap_or_else(|e| e.into_inner());
            Arc::clone(&guard)
        };
        if snapshot.is_empty() {
            return;
        }
        fields.retain(|key, _| !snapshot.contains(key));
    }
}

impl Default for RedactionSet {
    fn default() -> Self {
        Self::new()
    }
}
