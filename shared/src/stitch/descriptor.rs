//! Extraction descriptors.
//!
//! A descriptor declares which columns carry which semantic field for one record
//! shape. Descriptors are registered per target and bound once per result set;
//! a target supports a shape only if every field of its descriptor resolves.

use super::record::{ContainerLogRecord, EventRecord, Record};
use crate::models::{Cell, ColumnIndex, ExportTarget};
use std::collections::HashMap;

/// Namespace substituted for events without one.
pub const DEFAULT_EVENT_NAMESPACE: &str = "default";

/// Semantic meaning of a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SemanticField {
    /// Event time.
    Timestamp,
    /// Kubernetes namespace.
    Namespace,
    /// Pod name.
    Pod,
    /// Container name.
    Container,
    /// Log stream (`stdout`, `stderr`).
    Source,
    /// Log or event message.
    Message,
    /// Involved object name.
    Name,
    /// Event reason.
    Reason,
}

/// Record shapes the stitcher understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExtractionKind {
    /// One line of container output.
    ContainerLog,
    /// One cluster event.
    ClusterEvent,
}

impl ExtractionKind {
    fn required_fields(self) -> &'static [SemanticField] {
        match self {
            Self::ContainerLog => &[
                SemanticField::Timestamp,
                SemanticField::Namespace,
                SemanticField::Pod,
                SemanticField::Container,
                SemanticField::Source,
                SemanticField::Message,
            ],
            Self::ClusterEvent => &[
                SemanticField::Timestamp,
                SemanticField::Namespace,
                SemanticField::Name,
                SemanticField::Reason,
                SemanticField::Message,
            ],
        }
    }
}

/// Ordered mapping of semantic fields to column names for one record shape.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractionDescriptor {
    kind: ExtractionKind,
    fields: Vec<(SemanticField, String)>,
}

impl ExtractionDescriptor {
    /// Creates an empty descriptor for a shape.
    #[must_use]
    pub fn new(kind: ExtractionKind) -> Self {
        Self {
            kind,
            fields: Vec::new(),
        }
    }

    /// Maps a semantic field to a column name.
    #[must_use]
    pub fn with_field(mut self, field: SemanticField, column: impl Into<String>) -> Self {
        self.fields.retain(|(f, _)| *f != field);
        self.fields.push((field, column.into()));
        self
    }

    /// Container log rows as stored in `ContainerLogV2`.
    #[must_use]
    pub fn container_log() -> Self {
        Self::new(ExtractionKind::ContainerLog)
            .with_field(SemanticField::Timestamp, "TimeGenerated")
            .with_field(SemanticField::Namespace, "PodNamespace")
            .with_field(SemanticField::Pod, "PodName")
            .with_field(SemanticField::Container, "ContainerName")
            .with_field(SemanticField::Source, "LogSource")
            .with_field(SemanticField::Message, "LogMessage")
    }

    /// Cluster events as stored in `KubeEvents`.
    #[must_use]
    pub fn cluster_event() -> Self {
        Self::new(ExtractionKind::ClusterEvent)
            .with_field(SemanticField::Timestamp, "TimeGenerated")
            .with_field(SemanticField::Namespace, "Namespace")
            .with_field(SemanticField::Name, "Name")
            .with_field(SemanticField::Reason, "Reason")
            .with_field(SemanticField::Message, "Message")
    }

    /// Returns the record shape.
    #[must_use]
    pub fn kind(&self) -> ExtractionKind {
        self.kind
    }

    /// Returns the field mappings in declaration order.
    #[must_use]
    pub fn fields(&self) -> &[(SemanticField, String)] {
        &self.fields
    }

    /// Resolves the descriptor against one result set.
    ///
    /// Returns `None` unless every field the shape requires maps to a column.
    #[must_use]
    pub fn bind(&self, columns: &ColumnIndex) -> Option<BoundDescriptor> {
        let mut positions = HashMap::with_capacity(self.fields.len());
        for (field, column) in &self.fields {
            positions.insert(*field, columns.position(column)?);
        }
        let complete = self
            .kind
            .required_fields()
            .iter()
            .all(|f| positions.contains_key(f));
        complete.then_some(BoundDescriptor {
            kind: self.kind,
            positions,
        })
    }
}

/// A descriptor resolved to column positions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoundDescriptor {
    kind: ExtractionKind,
    positions: HashMap<SemanticField, usize>,
}

impl BoundDescriptor {
    /// Returns the record shape.
    #[must_use]
    pub fn kind(&self) -> ExtractionKind {
        self.kind
    }

    fn text(&self, row: &[Cell], field: SemanticField) -> String {
        self.positions
            .get(&field)
            .and_then(|&i| row.get(i))
            .map(Cell::as_text)
            .unwrap_or_default()
    }

    /// Extracts a record from a row. Missing cells read as empty strings.
    #[must_use]
    pub fn extract(&self, row: &[Cell]) -> Record {
        let timestamp = self.text(row, SemanticField::Timestamp);
        let namespace = self.text(row, SemanticField::Namespace);
        let message = self.text(row, SemanticField::Message);
        match self.kind {
            ExtractionKind::ContainerLog => Record::ContainerLog(ContainerLogRecord {
                timestamp,
                namespace,
                pod: self.text(row, SemanticField::Pod),
                container: self.text(row, SemanticField::Container),
                source: self.text(row, SemanticField::Source),
                message,
            }),
            ExtractionKind::ClusterEvent => Record::Event(EventRecord {
                timestamp,
                namespace: if namespace.is_empty() {
                    DEFAULT_EVENT_NAMESPACE.to_string()
                } else {
                    namespace
                },
                name: self.text(row, SemanticField::Name),
                reason: self.text(row, SemanticField::Reason),
                message,
            }),
        }
    }
}

/// Descriptors registered per target.
#[derive(Debug, Clone, Default)]
pub struct ExtractionRegistry {
    by_target: HashMap<ExportTarget, Vec<ExtractionDescriptor>>,
}

impl ExtractionRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// `ContainerLogV2` yields container logs, `KubeEvents` yields events.
    #[must_use]
    pub fn builtin() -> Self {
        Self::new()
            .with_descriptor("ContainerLogV2", ExtractionDescriptor::container_log())
            .with_descriptor("KubeEvents", ExtractionDescriptor::cluster_event())
    }

    /// Registers a descriptor for a target.
    ///
    /// Each shape is fed by exactly one target: every target's windows restart at
    /// the beginning of the lookback, so two targets appending to the same buffers
    /// would break their ordering. Registering a shape again moves it to `target`.
    #[must_use]
    pub fn with_descriptor(
        mut self,
        target: impl Into<ExportTarget>,
        descriptor: ExtractionDescriptor,
    ) -> Self {
        let target = target.into();
        let kind = descriptor.kind();
        for (owner, descriptors) in &mut self.by_target {
            let before = descriptors.len();
            descriptors.retain(|d| d.kind() != kind);
            if descriptors.len() != before && *owner != target {
                tracing::warn!(from = %owner, to = %target, shape = ?kind, "Moving extraction shape to another table");
            }
        }
        self.by_target.retain(|_, descriptors| !descriptors.is_empty());
        self.by_target.entry(target).or_default().push(descriptor);
        self
    }

    /// Returns the descriptors registered for a target.
    #[must_use]
    pub fn descriptors(&self, target: &ExportTarget) -> &[ExtractionDescriptor] {
        self.by_target.get(target).map_or(&[], Vec::as_slice)
    }

    /// Returns true if the target has a descriptor of the given shape.
    #[must_use]
    pub fn supports(&self, target: &ExportTarget, kind: ExtractionKind) -> bool {
        self.descriptors(target).iter().any(|d| d.kind() == kind)
    }

    /// Binds the target's descriptors of the enabled shapes to a result set.
    #[must_use]
    pub fn bind(
        &self,
        target: &ExportTarget,
        columns: &ColumnIndex,
        enabled: impl Fn(ExtractionKind) -> bool,
    ) -> Vec<BoundDescriptor> {
        self.descriptors(target)
            .iter()
            .filter(|d| enabled(d.kind()))
            .filter_map(|d| d.bind(columns))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn index(names: &[&str]) -> ColumnIndex {
        ColumnIndex::new(names.iter().map(ToString::to_string))
    }

    #[test]
    fn test_shape_belongs_to_one_target() {
        let registry = ExtractionRegistry::builtin()
            .with_descriptor("ContainerLogV3", ExtractionDescriptor::container_log());
        let v2 = ExportTarget::from("ContainerLogV2");
        let v3 = ExportTarget::from("ContainerLogV3");

        assert!(!registry.supports(&v2, ExtractionKind::ContainerLog));
        assert!(registry.descriptors(&v2).is_empty());
        assert!(registry.supports(&v3, ExtractionKind::ContainerLog));
        assert!(registry.supports(&"KubeEvents".into(), ExtractionKind::ClusterEvent));

        let again = registry.with_descriptor("ContainerLogV3", ExtractionDescriptor::container_log());
        assert_eq!(again.descriptors(&v3).len(), 1);
    }

    #[test]
    fn test_bind_requires_every_field() {
        let full = index(&[
            "TimeGenerated",
            "PodNamespace",
            "PodName",
            "ContainerName",
            "LogSource",
            "LogMessage",
        ]);
        let partial = index(&["TimeGenerated", "PodNamespace", "PodName"]);

        assert!(ExtractionDescriptor::container_log().bind(&full).is_some());
        assert!(ExtractionDescriptor::container_log().bind(&partial).is_none());
    }

    #[test]
    fn test_bind_rejects_incomplete_descriptor() {
        let descriptor = ExtractionDescriptor::new(ExtractionKind::ClusterEvent)
            .with_field(SemanticField::Timestamp, "TimeGenerated");
        assert!(descriptor.bind(&index(&["TimeGenerated"])).is_none());
    }

    #[test]
    fn test_extract_container_log_with_short_row() {
        let columns = index(&[
            "LogMessage",
            "TimeGenerated",
            "PodNamespace",
            "PodName",
            "ContainerName",
            "LogSource",
        ]);
        let bound = ExtractionDescriptor::container_log().bind(&columns).unwrap();
        let row = vec![Cell::from("hello"), Cell::from("2024-01-01T00:00:00Z")];

        let Record::ContainerLog(record) = bound.extract(&row) else {
            panic!("expected container log");
        };
        assert_eq!(record.message, "hello");
        assert_eq!(record.timestamp, "2024-01-01T00:00:00Z");
        assert_eq!(record.namespace, "");
        assert_eq!(record.container, "");
    }

    #[test]
    fn test_extract_event_defaults_namespace() {
        let columns = index(&["TimeGenerated", "Namespace", "Name", "Reason", "Message"]);
        let bound = ExtractionDescriptor::cluster_event().bind(&columns).unwrap();
        let row = vec![
            Cell::from("2024-01-01T00:00:00Z"),
            Cell::Null,
            Cell::from("node-1"),
            Cell::from("NodeReady"),
            Cell::from("ready"),
        ];

        let Record::Event(event) = bound.extract(&row) else {
            panic!("expected event");
        };
        assert_eq!(event.namespace, DEFAULT_EVENT_NAMESPACE);
        assert_eq!(event.reason, "NodeReady");
    }

    #[test]
    fn test_registry_capabilities() {
        let registry = ExtractionRegistry::builtin();
        let logs = ExportTarget::new("ContainerLogV2");
        let events = ExportTarget::new("KubeEvents");

        assert!(registry.supports(&logs, ExtractionKind::ContainerLog));
        assert!(!registry.supports(&logs, ExtractionKind::ClusterEvent));
        assert!(registry.supports(&events, ExtractionKind::ClusterEvent));
        assert!(registry.descriptors(&ExportTarget::new("Perf")).is_empty());
    }

    #[test]
    fn test_registry_bind_respects_enabled_kinds() {
        let registry = ExtractionRegistry::builtin();
        let columns = index(&["TimeGenerated", "Namespace", "Name", "Reason", "Message"]);
        let target = ExportTarget::new("KubeEvents");

        assert_eq!(registry.bind(&target, &columns, |_| true).len(), 1);
        assert!(registry
            .bind(&target, &columns, |k| k == ExtractionKind::ContainerLog)
            .is_empty());
    }
}
