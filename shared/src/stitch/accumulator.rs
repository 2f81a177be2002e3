//! Per-run stitch buffers.
//!
//! Records are collected per window, sorted when the window is committed and then
//! appended to their buffer. Windows arrive in chronological order, so each buffer
//! stays ordered without a global sort and only one window of records is pending
//! at any time. Records that arrive out of window order (source clock skew,
//! late ingestion) are not reordered across windows. The same holds when one
//! record shape is fed by more than one table, which is why the extraction
//! registry binds each shape to a single table.

use super::descriptor::ExtractionKind;
use super::order::sort_by_timestamp;
use super::record::{ContainerLogRecord, EventRecord, Record, StitchKey};
use crate::storage::naming::{container_log_path, events_log_path};
use crate::storage::{ArtifactSink, SinkError};
use std::collections::BTreeMap;

/// Counts of what a flush wrote.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlushStats {
    /// Container log files written.
    pub container_logs: usize,
    /// Event log files written.
    pub event_logs: usize,
}

/// Accumulates stitched logs for one export run.
///
/// # Example
///
/// ```
/// use shared::stitch::{ContainerLogRecord, Record, StitchAccumulator, StitchKey};
///
/// let mut acc = StitchAccumulator::new(true, false);
/// for ts in ["2024-01-01T00:00:02Z", "2024-01-01T00:00:01Z"] {
///     acc.push(Record::ContainerLog(ContainerLogRecord {
///         timestamp: ts.to_string(),
///         namespace: "default".to_string(),
///         pod: "web-0".to_string(),
///         container: "nginx".to_string(),
///         source: "stdout".to_string(),
///         message: ts.to_string(),
///     }));
/// }
/// acc.commit_window();
///
/// let text = acc.container_log(&StitchKey::new("default", "web-0", "nginx")).unwrap();
/// assert!(text.starts_with("2024-01-01T00:00:01"));
/// ```
#[derive(Debug, Default)]
pub struct StitchAccumulator {
    stitch_logs: bool,
    stitch_events: bool,
    pending_logs: Vec<ContainerLogRecord>,
    pending_events: Vec<EventRecord>,
    logs: BTreeMap<StitchKey, String>,
    events: BTreeMap<String, String>,
}

impl StitchAccumulator {
    /// Creates an accumulator. Disabled shapes are dropped on [`push`](Self::push).
    #[must_use]
    pub fn new(stitch_logs: bool, stitch_events: bool) -> Self {
        Self {
            stitch_logs,
            stitch_events,
            ..Self::default()
        }
    }

    /// Returns true if records of the given shape are collected.
    #[must_use]
    pub fn accepts(&self, kind: ExtractionKind) -> bool {
        match kind {
            ExtractionKind::ContainerLog => self.stitch_logs,
            ExtractionKind::ClusterEvent => self.stitch_events,
        }
    }

    /// Adds a record to the current window.
    pub fn push(&mut self, record: Record) {
        match record {
            Record::ContainerLog(r) if self.stitch_logs => self.pending_logs.push(r),
            Record::Event(r) if self.stitch_events => self.pending_events.push(r),
            _ => {}
        }
    }

    /// Returns the number of records waiting for the current window to commit.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.pending_logs.len() + self.pending_events.len()
    }

    /// Sorts the current window and appends it to the buffers.
    ///
    /// Container log records without namespace, pod and container are dropped.
    pub fn commit_window(&mut self) {
        let logs = sort_by_timestamp(std::mem::take(&mut self.pending_logs), |r| {
            r.timestamp.as_str()
        });
        for record in logs.into_iter().filter(|r| !r.is_noise()) {
            self.logs
                .entry(record.key())
                .or_default()
                .push_str(&record.format_line());
        }

        let events = sort_by_timestamp(std::mem::take(&mut self.pending_events), |r| {
            r.timestamp.as_str()
        });
        for record in events {
            self.events
                .entry(record.namespace.clone())
                .or_default()
                .push_str(&record.format_line());
        }
    }

    /// Drops the records of the current window.
    pub fn discard_window(&mut self) {
        self.pending_logs.clear();
        self.pending_events.clear();
    }

    /// Returns the stitched log of one container.
    #[must_use]
    pub fn container_log(&self, key: &StitchKey) -> Option<&str> {
        self.logs.get(key).map(String::as_str)
    }

    /// Returns the stitched events of one namespace.
    #[must_use]
    pub fn event_log(&self, namespace: &str) -> Option<&str> {
        self.events.get(namespace).map(String::as_str)
    }

    /// Returns the keys of all container logs in key order.
    pub fn container_keys(&self) -> impl Iterator<Item = &StitchKey> {
        self.logs.keys()
    }

    /// Writes every non-empty buffer to the sink.
    ///
    /// Buffers stay in memory, so a second flush writes the same artifacts again.
    /// Keys that sanitize to the same path are merged into one time-ordered file.
    ///
    /// # Errors
    ///
    /// Returns an error if a write fails.
    pub fn flush(&self, sink: &mut dyn ArtifactSink) -> Result<FlushStats, SinkError> {
        let mut stats = FlushStats::default();

        if self.stitch_logs {
            let mut files = BTreeMap::new();
            for (key, text) in self.logs.iter().filter(|(_, t)| !t.is_empty()) {
                let path = container_log_path(&key.namespace, &key.pod, &key.container);
                add_file(&mut files, path, text);
            }
            for (path, text) in &files {
                sink.put(path, text.as_bytes())?;
                stats.container_logs += 1;
            }
        }

        if self.stitch_events {
            let mut files = BTreeMap::new();
            for (namespace, text) in self.events.iter().filter(|(_, t)| !t.is_empty()) {
                add_file(&mut files, events_log_path(namespace), text);
            }
            for (path, text) in &files {
                sink.put(path, text.as_bytes())?;
                stats.event_logs += 1;
            }
        }

        tracing::info!(
            container_logs = stats.container_logs,
            event_logs = stats.event_logs,
            "Flushed stitched logs"
        );
        Ok(stats)
    }
}

fn add_file(files: &mut BTreeMap<String, String>, path: String, text: &str) {
    let Some(existing) = files.get_mut(&path) else {
        files.insert(path, text.to_string());
        return;
    };
    tracing::warn!(path = %path, "Stitched logs map to the same file; merging");
    let lines: Vec<&str> = existing.lines().chain(text.lines()).collect();
    let merged = sort_by_timestamp(lines, |line| line.split(' ').next().unwrap_or_default());
    let mut out = String::with_capacity(existing.len() + text.len());
    for line in merged {
        out.push_str(line);
        out.push('\n');
    }
    *existing = out;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::InMemoryArtifactSink;

    fn log(ts: &str, pod: &str, message: &str) -> Record {
        Record::ContainerLog(ContainerLogRecord {
            timestamp: ts.to_string(),
            namespace: "default".to_string(),
            pod: pod.to_string(),
            container: "app".to_string(),
            source: "stdout".to_string(),
            message: message.to_string(),
        })
    }

    fn event(ts: &str, namespace: &str, reason: &str) -> Record {
        Record::Event(EventRecord {
            timestamp: ts.to_string(),
            namespace: namespace.to_string(),
            name: "obj".to_string(),
            reason: reason.to_string(),
            message: "msg".to_string(),
        })
    }

    fn lines(text: &str) -> Vec<&str> {
        text.lines().collect()
    }

    #[test]
    fn test_buffers_stay_ordered_across_windows() {
        let mut acc = StitchAccumulator::new(true, true);

        acc.push(log("2024-01-01T00:10:00Z", "web", "third"));
        acc.push(log("2024-01-01T00:00:00Z", "web", "first"));
        acc.push(log("2024-01-01T00:05:00Z", "web", "second"));
        acc.commit_window();

        acc.push(log("2024-01-01T00:20:00Z", "web", "fifth"));
        acc.push(log("2024-01-01T00:15:00Z", "web", "fourth"));
        acc.commit_window();

        let text = acc
            .container_log(&StitchKey::new("default", "web", "app"))
            .unwrap();
        let messages: Vec<&str> = lines(text)
            .iter()
            .map(|l| l.rsplit(' ').next().unwrap())
            .collect();
        assert_eq!(messages, vec!["first", "second", "third", "fourth", "fifth"]);
        assert_eq!(acc.pending(), 0);
    }

    #[test]
    fn test_noise_rows_are_dropped() {
        let mut acc = StitchAccumulator::new(true, false);
        acc.push(Record::ContainerLog(ContainerLogRecord {
            timestamp: "2024-01-01T00:00:00Z".to_string(),
            namespace: String::new(),
            pod: String::new(),
            container: String::new(),
            source: "stdout".to_string(),
            message: "noise".to_string(),
        }));
        acc.commit_window();

        assert_eq!(acc.container_keys().count(), 0);
    }

    #[test]
    fn test_disabled_shapes_are_ignored() {
        let mut acc = StitchAccumulator::new(true, false);
        acc.push(event("2024-01-01T00:00:00Z", "default", "Created"));
        assert_eq!(acc.pending(), 0);
        assert!(!acc.accepts(ExtractionKind::ClusterEvent));
        assert!(acc.accepts(ExtractionKind::ContainerLog));
    }

    #[test]
    fn test_events_are_bucketed_by_namespace() {
        let mut acc = StitchAccumulator::new(false, true);
        acc.push(event("2024-01-01T00:00:02Z", "kube-system", "Pulled"));
        acc.push(event("2024-01-01T00:00:01Z", "kube-system", "Scheduled"));
        acc.push(event("2024-01-01T00:00:03Z", "default", "Created"));
        acc.commit_window();

        let system = lines(acc.event_log("kube-system").unwrap());
        assert_eq!(system.len(), 2);
        assert!(system[0].contains("Scheduled"));
        assert!(acc.event_log("default").unwrap().contains("Created"));
    }

    #[test]
    fn test_discard_window_drops_pending() {
        let mut acc = StitchAccumulator::new(true, true);
        acc.push(log("2024-01-01T00:00:00Z", "web", "lost"));
        acc.discard_window();
        acc.commit_window();
        assert_eq!(acc.container_keys().count(), 0);
    }

    #[test]
    fn test_flush_writes_sanitized_paths() {
        let mut acc = StitchAccumulator::new(true, true);
        acc.push(log("2024-01-01T00:00:00Z", "web.0", "hello"));
        acc.push(event("2024-01-01T00:00:00Z", "default", "Created"));
        acc.commit_window();

        let mut sink = InMemoryArtifactSink::new();
        let stats = acc.flush(&mut sink).unwrap();

        assert_eq!(
            stats,
            FlushStats {
                container_logs: 1,
                event_logs: 1
            }
        );
        assert!(sink
            .get_text("namespaces/default/pods/web_0/app.log")
            .unwrap()
            .ends_with("[stdout] hello\n"));
        assert!(sink.get("namespaces/default/events/events.log").is_some());
    }

    #[test]
    fn test_flush_merges_keys_sharing_a_path() {
        let mut acc = StitchAccumulator::new(true, false);
        acc.push(log("2024-01-01T00:00:00Z", "web.0", "a"));
        acc.push(log("2024-01-01T00:00:02Z", "web.0", "c"));
        acc.push(log("2024-01-01T00:00:01Z", "web_0", "b"));
        acc.commit_window();

        let mut sink = InMemoryArtifactSink::new();
        let stats = acc.flush(&mut sink).unwrap();

        assert_eq!(stats.container_logs, 1);
        assert_eq!(sink.paths(), vec!["namespaces/default/pods/web_0/app.log"]);
        let text = sink.get_text("namespaces/default/pods/web_0/app.log").unwrap();
        let messages: Vec<&str> = lines(text)
            .iter()
            .map(|l| l.rsplit(' ').next().unwrap())
            .collect();
        assert_eq!(messages, vec!["a", "b", "c"]);
    }
}
