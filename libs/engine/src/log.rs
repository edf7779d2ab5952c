//! Per-reconcile log buffer (§4.E / §4.I). Every reconcile step logs through `tracing` as usual,
//! for stderr, and through a [`BufferLogger`] scoped to that one pass, so `GET /deploy` can show
//! exactly what the most recent (or in-flight) reconcile did.

use std::collections::BTreeMap;
use std::sync::Mutex;

use serde::Serialize;

#[derive(Clone, Debug, Serialize)]
pub struct LogEntry {
    pub level: &'static str,
    pub msg: String,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub fields: BTreeMap<String, String>,
}

/// An append-only sink for one reconcile pass's structured events. Cheap to construct; a fresh
/// one is installed by the controller at the start of every `commit()`.
#[derive(Default)]
pub struct BufferLogger {
    entries: Mutex<Vec<LogEntry>>,
}

impl BufferLogger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn info(&self, msg: impl Into<String>) {
        self.record("info", msg, BTreeMap::new());
    }

    pub fn info_with(&self, msg: impl Into<String>, fields: BTreeMap<String, String>) {
        self.record("info", msg, fields);
    }

    pub fn warn_with(&self, msg: impl Into<String>, fields: BTreeMap<String, String>) {
        self.record("warn", msg, fields);
    }

    pub fn error_with(&self, msg: impl Into<String>, fields: BTreeMap<String, String>) {
        self.record("error", msg, fields);
    }

    fn record(&self, level: &'static str, msg: impl Into<String>, fields: BTreeMap<String, String>) {
        let msg = msg.into();
        match level {
            "warn" => tracing::warn!(?fields, "{msg}"),
            "error" => tracing::error!(?fields, "{msg}"),
            _ => tracing::info!(?fields, "{msg}"),
        }
        self.entries.lock().unwrap().push(LogEntry {
            level,
            msg,
            fields,
        });
    }

    /// Every entry recorded so far, in order.
    pub fn entries(&self) -> Vec<LogEntry> {
        self.entries.lock().unwrap().clone()
    }

    /// Just the error-level entries, for the `errors` field of `GET /deploy`.
    pub fn errors(&self) -> Vec<LogEntry> {
        self.entries
            .lock()
            .unwrap()
            .iter()
            .filter(|e| e.level == "error")
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn errors_are_filtered_from_full_log() {
        let logger = BufferLogger::new();
        logger.info("starting pass");
        logger.error_with("namespace create failed", BTreeMap::new());
        logger.info("done");

        assert_eq!(logger.entries().len(), 3);
        assert_eq!(logger.errors().len(), 1);
        assert_eq!(logger.errors()[0].msg, "namespace create failed");
    }
}
