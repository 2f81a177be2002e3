//! Querying the remote log store.
//!
//! This module splits a lookback into windows ([`WindowPlan`]) and defines the
//! seams to the store: [`QuerySource`] runs one windowed query and
//! [`TableCatalog`] lists tables and fetches schemas. In-memory implementations
//! of both live in [`memory`].
//!
//! # Example
//!
//! ```
//! use chrono::Utc;
//! use shared::query::WindowPlan;
//! use std::time::Duration;
//!
//! let plan = WindowPlan::new(Duration::from_secs(3600), Utc::now()).unwrap();
//! assert_eq!(plan.iter().count(), 4);
//! ```

pub mod catalog;
pub mod memory;
pub mod planner;
pub mod source;

pub use catalog::{CatalogError, TableCatalog};
pub use memory::{InMemoryCatalog, InMemoryQuerySource};
pub use planner::{PlanError, WindowIter, WindowPlan};
pub use source::{QueryError, QueryRequest, QueryResponse, QuerySource, DEFAULT_QUERY_WAIT};
