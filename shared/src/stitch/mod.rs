//! Row classification and log stitching.
//!
//! Rows of targets with a registered [`ExtractionDescriptor`] are turned into
//! [`Record`]s and collected by a [`StitchAccumulator`], which keeps one
//! chronologically ordered text buffer per container and per event namespace.

pub mod accumulator;
pub mod descriptor;
pub mod order;
pub mod record;

pub use accumulator::{FlushStats, StitchAccumulator};
pub use descriptor::{
    BoundDescriptor, ExtractionDescriptor, ExtractionKind, ExtractionRegistry, SemanticField,
};
pub use order::{compare_timestamps, normalize_timestamp, parse_timestamp, sort_by_timestamp};
pub use record::{ContainerLogRecord, EventRecord, Record, StitchKey};
