use std::sync::Mutex;
use std::sync::mpsc::Sender;

use crate::models::{LogEntry, Severity};

/// Receives progress entries as they happen. The run keeps its own copy
/// of every entry for the final report regardless of the sink.
pub trait ProgressSink: Send + Sync {
    fn emit(&self, entry: &LogEntry);
}

/// Forwards entries over a channel, e.g. to a printer thread. Send
/// failures are ignored; a vanished listener must not fail the run.
pub struct ChannelSink {
    tx: Sender<LogEntry>,
}

impl ChannelSink {
    pub fn new(tx: Sender<LogEntry>) -> Self {
        Self { tx }
    }
}

impl ProgressSink for ChannelSink {
    fn emit(&self, entry: &LogEntry) {
        let _ = self.tx.send(entry.clone());
    }
}

pub struct NullSink;

impl ProgressSink for NullSink {
    fn emit(&self, _entry: &LogEntry) {}
}

/// Collects the run log and fans each entry out to the sink and to
/// tracing. Lock scope stays free of awaits.
pub struct Reporter<'a> {
    sink: &'a dyn ProgressSink,
    entries: Mutex<Vec<LogEntry>>,
}

impl<'a> Reporter<'a> {
    pub fn new(sink: &'a dyn ProgressSink) -> Self {
        Self {
            sink,
            entries: Mutex::new(Vec::new()),
        }
    }

    pub fn info(&self, message: impl Into<String>) {
        self.push(Severity::Info, message.into());
    }

    pub fn success(&self, message: impl Into<String>) {
        self.push(Severity::Success, message.into());
    }

    pub fn warning(&self, message: impl Into<String>) {
        self.push(Severity::Warning, message.into());
    }

    pub fn error(&self, message: impl Into<String>) {
        self.push(Severity::Error, message.into());
    }

    fn push(&self, severity: Severity, message: String) {
        match severity {
            Severity::Info => tracing::info!("{message}"),
            Severity::Success => tracing::info!("{message}"),
            Severity::Warning => tracing::warn!("{message}"),
            Severity::Error => tracing::error!("{message}"),
        }
        let entry = LogEntry::new(severity, message);
        self.sink.emit(&entry);
        self.entries.lock().unwrap().push(entry);
    }

    pub fn into_entries(self) -> Vec<LogEntry> {
        self.entries.into_inner().unwrap()
    }

    #[cfg(test)]
    pub fn entry_count(&self) -> usize {
        self.entries.lock().unwrap().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;

    #[test]
    fn test_reporter_keeps_copies_and_forwards() {
        let (tx, rx) = mpsc::channel();
        let sink = ChannelSink::new(tx);
        let reporter = Reporter::new(&sink);

        reporter.info("logging in");
        reporter.warning("selector fell through");
        reporter.success("applied");

        let forwarded: Vec<LogEntry> = rx.try_iter().collect();
        assert_eq!(forwarded.len(), 3);
        assert_eq!(forwarded[1].severity, Severity::Warning);

        let kept = reporter.into_entries();
        assert_eq!(kept.len(), 3);
        assert_eq!(kept[2].message, "applied");
        assert_eq!(kept[2].severity, Severity::Success);
    }

    #[test]
    fn test_dropped_receiver_does_not_panic() {
        let (tx, rx) = mpsc::channel();
        drop(rx);
        let sink = ChannelSink::new(tx);
        let reporter = Reporter::new(&sink);
        reporter.info("nobody listening");
        assert_eq!(reporter.entry_count(), 1);
    }
}
