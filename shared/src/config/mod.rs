//! Configuration module for aks-must-gather.
//!
//! This module contains timespan parsing and the profile registry used to resolve
//! which tables an export run covers.

pub mod profiles;
pub mod timespan;

pub use profiles::{
    resolve_targets, ProfileRegistry, Resolution, TargetSelection, DEFAULT_PROFILE,
};
pub use timespan::{Timespan, TimespanError};
