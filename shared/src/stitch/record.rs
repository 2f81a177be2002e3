//! Records extracted from result rows and their stitched line format.

use super::order::normalize_timestamp;

/// Identity of one stitched container log.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StitchKey {
    /// Kubernetes namespace.
    pub namespace: String,
    /// Pod name.
    pub pod: String,
    /// Container name.
    pub container: String,
}

impl StitchKey {
    /// Creates a new key.
    #[must_use]
    pub fn new(
        namespace: impl Into<String>,
        pod: impl Into<String>,
        container: impl Into<String>,
    ) -> Self {
        Self {
            namespace: namespace.into(),
            pod: pod.into(),
            container: container.into(),
        }
    }
}

impl std::fmt::Display for StitchKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}/{}", self.namespace, self.pod, self.container)
    }
}

/// One line of container output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerLogRecord {
    /// Raw timestamp.
    pub timestamp: String,
    /// Kubernetes namespace.
    pub namespace: String,
    /// Pod name.
    pub pod: String,
    /// Container name.
    pub container: String,
    /// Log stream.
    pub source: String,
    /// Log message.
    pub message: String,
}

impl ContainerLogRecord {
    /// Returns true if the record names no namespace, pod or container.
    #[must_use]
    pub fn is_noise(&self) -> bool {
        self.namespace.is_empty() && self.pod.is_empty() && self.container.is_empty()
    }

    /// Returns the stitch key of the record.
    #[must_use]
    pub fn key(&self) -> StitchKey {
        StitchKey::new(&self.namespace, &self.pod, &self.container)
    }

    /// Formats the record as `<timestamp> [<source>] <message>\n`.
    ///
    /// Carriage returns are dropped and newlines inside the message are written
    /// as the two characters `\n`, so every record is exactly one line.
    ///
    /// # Example
    ///
    /// ```
    /// use shared::stitch::ContainerLogRecord;
    ///
    /// let record = ContainerLogRecord {
    ///     timestamp: "2024-01-01T00:00:00Z".to_string(),
    ///     namespace: "default".to_string(),
    ///     pod: "web-0".to_string(),
    ///     container: "nginx".to_string(),
    ///     source: "stderr".to_string(),
    ///     message: "a\r\nb".to_string(),
    /// };
    /// assert_eq!(
    ///     record.format_line(),
    ///     "2024-01-01T00:00:00.000000000Z [stderr] a\\nb\n"
    /// );
    /// ```
    #[must_use]
    pub fn format_line(&self) -> String {
        let message = self.message.replace('\r', "").replace('\n', "\\n");
        format!(
            "{} [{}] {}\n",
            normalize_timestamp(&self.timestamp),
            self.source,
            message
        )
    }
}

/// One cluster event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventRecord {
    /// Raw timestamp.
    pub timestamp: String,
    /// Namespace, `default` when the source had none.
    pub namespace: String,
    /// Involved object name.
    pub name: String,
    /// Event reason.
    pub reason: String,
    /// Event message.
    pub message: String,
}

impl EventRecord {
    /// Formats the event as `<timestamp> <namespace>/<name> <reason> <message>\n`.
    ///
    /// Line breaks inside the message become spaces.
    #[must_use]
    pub fn format_line(&self) -> String {
        let message = self.message.replace('\r', "").replace('\n', " ");
        format!(
            "{} {}/{} {} {}\n",
            normalize_timestamp(&self.timestamp),
            self.namespace,
            self.name,
            self.reason,
            message
        )
    }
}

/// A record extracted from one row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Record {
    /// Container output.
    ContainerLog(ContainerLogRecord),
    /// Cluster event.
    Event(EventRecord),
}

impl Record {
    /// Returns the raw timestamp.
    #[must_use]
    pub fn timestamp(&self) -> &str {
        match self {
            Self::ContainerLog(r) => &r.timestamp,
            Self::Event(r) => &r.timestamp,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn log(namespace: &str, pod: &str, container: &str) -> ContainerLogRecord {
        ContainerLogRecord {
            timestamp: "bogus".to_string(),
            namespace: namespace.to_string(),
            pod: pod.to_string(),
            container: container.to_string(),
            source: "stdout".to_string(),
            message: "hi".to_string(),
        }
    }

    #[test]
    fn test_noise_requires_all_identity_fields_empty() {
        assert!(log("", "", "").is_noise());
        assert!(!log("", "", "c").is_noise());
        assert!(!log("ns", "", "").is_noise());
    }

    #[test]
    fn test_unparseable_timestamp_is_kept() {
        assert_eq!(log("a", "b", "c").format_line(), "bogus [stdout] hi\n");
    }

    #[test]
    fn test_event_line_flattens_newlines() {
        let event = EventRecord {
            timestamp: "2024-01-01T00:00:00.25Z".to_string(),
            namespace: "kube-system".to_string(),
            name: "coredns-abc".to_string(),
            reason: "BackOff".to_string(),
            message: "line one\r\nline two".to_string(),
        };
        assert_eq!(
            event.format_line(),
            "2024-01-01T00:00:00.250000000Z kube-system/coredns-abc BackOff line one line two\n"
        );
    }

    #[test]
    fn test_key_display() {
        assert_eq!(log("ns", "pod", "c").key().to_string(), "ns/pod/c");
    }
}
