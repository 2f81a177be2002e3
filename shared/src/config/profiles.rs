//! Profile registry and export target resolution.
//!
//! A profile is a named group of tables. The registry holds the built-in groups and
//! a derived `aks-debug` group whose members are the de-duplicated union of
//! `podLogs`, `inventory` and `metrics`.

use crate::models::ExportTarget;
use std::collections::HashSet;

/// Name of the group used when nothing else selects targets.
pub const DEFAULT_PROFILE: &str = "aks-debug";

const POD_LOGS: &[&str] = &[
    "ContainerLogV2",
    "ContainerLog",
    "KubeEvents",
    "KubeMonAgentEvents",
    "Syslog",
];

const INVENTORY: &[&str] = &[
    "KubePodInventory",
    "KubeNodeInventory",
    "KubeServices",
    "KubePVInventory",
    "ContainerInventory",
    "ContainerImageInventory",
    "ContainerNodeInventory",
    "KubeHealth",
];

const METRICS: &[&str] = &["InsightsMetrics", "Perf", "Heartbeat"];

const AUDIT: &[&str] = &["AKSControlPlane", "AKSAudit", "AKSAuditAdmin"];

/// Registry of named table groups.
///
/// Groups keep their registration order so listings are stable.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProfileRegistry {
    groups: Vec<(String, Vec<ExportTarget>)>,
}

impl ProfileRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates the registry of built-in AKS groups.
    ///
    /// # Example
    ///
    /// ```
    /// use shared::config::ProfileRegistry;
    ///
    /// let registry = ProfileRegistry::builtin();
    /// let debug = registry.get("aks-debug").unwrap();
    /// assert_eq!(debug.len(), 16);
    /// ```
    #[must_use]
    pub fn builtin() -> Self {
        Self::new()
            .with_group("podLogs", POD_LOGS.iter().copied())
            .with_group("inventory", INVENTORY.iter().copied())
            .with_group("metrics", METRICS.iter().copied())
            .with_group("audit", AUDIT.iter().copied())
            .with_combined_group(DEFAULT_PROFILE, &["podLogs", "inventory", "metrics"])
    }

    /// Adds (or replaces) a group. Duplicate members are dropped.
    #[must_use]
    pub fn with_group<I, T>(mut self, name: impl Into<String>, tables: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<ExportTarget>,
    {
        let name = name.into();
        let mut dedup = Dedup::default();
        for table in tables {
            dedup.push(table.into());
        }
        self.insert(name, dedup.into_vec());
        self
    }

    /// Adds a group whose members are the de-duplicated union of existing groups,
    /// in the order given. Unknown member groups contribute nothing.
    #[must_use]
    pub fn with_combined_group(mut self, name: impl Into<String>, members: &[&str]) -> Self {
        let mut dedup = Dedup::default();
        for member in members {
            if let Some(tables) = self.get(member) {
                dedup.extend(tables.iter().cloned());
            }
        }
        self.insert(name.into(), dedup.into_vec());
        self
    }

    /// Returns the members of a group.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&[ExportTarget]> {
        self.groups
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, tables)| tables.as_slice())
    }

    /// Returns the group names in registration order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.groups.iter().map(|(n, _)| n.as_str())
    }

    fn insert(&mut self, name: String, tables: Vec<ExportTarget>) {
        if let Some(slot) = self.groups.iter_mut().find(|(n, _)| *n == name) {
            slot.1 = tables;
        } else {
            self.groups.push((name, tables));
        }
    }
}

/// How the user asked for targets to be selected.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TargetSelection {
    /// Explicit table list. Overrides every other input when non-empty.
    pub tables: Vec<String>,
    /// Profile names to union.
    pub profiles: Vec<String>,
    /// Export the full workspace catalog instead of profiles.
    pub all_tables: bool,
}

impl TargetSelection {
    /// Builds a selection from the comma-separated forms accepted on the command line.
    ///
    /// Empty and whitespace-only items are ignored.
    #[must_use]
    pub fn from_csv(tables: Option<&str>, profiles: Option<&str>, all_tables: bool) -> Self {
        Self {
            tables: split_csv(tables),
            profiles: split_csv(profiles),
            all_tables,
        }
    }
}

fn split_csv(input: Option<&str>) -> Vec<String> {
    input
        .unwrap_or_default()
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(ToString::to_string)
        .collect()
}

/// Outcome of target resolution.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Resolution {
    /// Ordered, duplicate-free targets.
    pub targets: Vec<ExportTarget>,
    /// Profile names that were requested but not found.
    pub unknown_profiles: Vec<String>,
}

/// Resolves the selection into an ordered, duplicate-free target list.
///
/// Precedence: explicit tables, then the catalog when `all_tables` is set, then the
/// union of requested profiles, then the default profile. The catalog is used as
/// given (only de-duplicated); when `all_tables` is set no default is applied, so an
/// empty catalog yields no targets. Unknown profiles are reported and skipped.
///
/// # Example
///
/// ```
/// use shared::config::{resolve_targets, ProfileRegistry, TargetSelection};
///
/// let registry = ProfileRegistry::builtin();
/// let selection = TargetSelection::from_csv(None, Some("audit,nope"), false);
/// let resolution = resolve_targets(&selection, &registry, None);
///
/// assert_eq!(resolution.targets.len(), 3);
/// assert_eq!(resolution.unknown_profiles, vec!["nope".to_string()]);
/// ```
#[must_use]
pub fn resolve_targets(
    selection: &TargetSelection,
    registry: &ProfileRegistry,
    catalog: Option<&[ExportTarget]>,
) -> Resolution {
    let mut resolution = Resolution::default();

    if !selection.tables.is_empty() {
        let mut dedup = Dedup::default();
        dedup.extend(selection.tables.iter().map(|t| ExportTarget::new(t.as_str())));
        resolution.targets = dedup.into_vec();
        return resolution;
    }

    if selection.all_tables {
        let mut dedup = Dedup::default();
        dedup.extend(catalog.unwrap_or_default().iter().cloned());
        resolution.targets = dedup.into_vec();
        return resolution;
    }

    let mut dedup = Dedup::default();
    for profile in &selection.profiles {
        if let Some(tables) = registry.get(profile) {
            dedup.extend(tables.iter().cloned());
        } else {
            tracing::warn!(profile = %profile, "unknown profile, skipping");
            resolution.unknown_profiles.push(profile.clone());
        }
    }

    if dedup.is_empty() {
        if let Some(tables) = registry.get(DEFAULT_PROFILE) {
            dedup.extend(tables.iter().cloned());
        }
    }

    resolution.targets = dedup.into_vec();
    resolution
}

/// Insertion-order-preserving de-duplication.
#[derive(Default)]
struct Dedup {
    seen: HashSet<ExportTarget>,
    items: Vec<ExportTarget>,
}

impl Dedup {
    fn push(&mut self, target: ExportTarget) {
        if self.seen.insert(target.clone()) {
            self.items.push(target);
        }
    }

    fn extend(&mut self, targets: impl IntoIterator<Item = ExportTarget>) {
        for target in targets {
            self.push(target);
        }
    }

    fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    fn into_vec(self) -> Vec<ExportTarget> {
        self.items
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(targets: &[ExportTarget]) -> Vec<&str> {
        targets.iter().map(ExportTarget::as_str).collect()
    }

    fn assert_unique(targets: &[ExportTarget]) {
        let set: HashSet<_> = targets.iter().collect();
        assert_eq!(set.len(), targets.len(), "duplicates in {targets:?}");
    }

    #[test]
    fn test_builtin_groups() {
        let registry = ProfileRegistry::builtin();
        let listed: Vec<&str> = registry.names().collect();
        assert_eq!(
            listed,
            vec!["podLogs", "inventory", "metrics", "audit", "aks-debug"]
        );
        assert_eq!(registry.get("podLogs").unwrap().len(), 5);
        assert_eq!(registry.get("inventory").unwrap().len(), 8);
        assert_eq!(registry.get("metrics").unwrap().len(), 3);
        assert_eq!(registry.get("audit").unwrap().len(), 3);
    }

    #[test]
    fn test_combined_group_is_union_in_order() {
        let registry = ProfileRegistry::builtin();
        let combined = registry.get(DEFAULT_PROFILE).unwrap();

        let mut expected: Vec<&str> = Vec::new();
        expected.extend(POD_LOGS);
        expected.extend(INVENTORY);
        expected.extend(METRICS);
        assert_eq!(names(combined), expected);
    }

    #[test]
    fn test_combined_group_dedups_overlapping_members() {
        let registry = ProfileRegistry::new()
            .with_group("a", ["T1", "T2"])
            .with_group("b", ["T2", "T3"])
            .with_combined_group("ab", &["a", "b", "missing"]);

        assert_eq!(names(registry.get("ab").unwrap()), vec!["T1", "T2", "T3"]);
    }

    #[test]
    fn test_explicit_tables_override_everything() {
        let registry = ProfileRegistry::builtin();
        let selection = TargetSelection::from_csv(
            Some(" Table1, Table2 ,,Table1"),
            Some("audit"),
            true,
        );
        let catalog = vec![ExportTarget::new("Other")];

        let resolution = resolve_targets(&selection, &registry, Some(catalog.as_slice()));

        assert_eq!(names(&resolution.targets), vec!["Table1", "Table2"]);
    }

    #[test]
    fn test_all_tables_uses_catalog() {
        let registry = ProfileRegistry::builtin();
        let selection = TargetSelection::from_csv(None, Some("audit"), true);
        let catalog = vec![
            ExportTarget::new("AllTable1"),
            ExportTarget::new("AllTable2"),
            ExportTarget::new("AllTable3"),
        ];

        let resolution = resolve_targets(&selection, &registry, Some(catalog.as_slice()));

        assert_eq!(
            names(&resolution.targets),
            vec!["AllTable1", "AllTable2", "AllTable3"]
        );
    }

    #[test]
    fn test_all_tables_with_empty_catalog_has_no_default() {
        let registry = ProfileRegistry::builtin();
        let selection = TargetSelection::from_csv(None, None, true);

        let resolution = resolve_targets(&selection, &registry, Some(&[][..]));

        assert!(resolution.targets.is_empty());
    }

    #[test]
    fn test_profiles_union_with_combined_group() {
        let registry = ProfileRegistry::builtin();
        let selection = TargetSelection::from_csv(None, Some("podLogs,aks-debug"), false);

        let resolution = resolve_targets(&selection, &registry, None);

        assert_unique(&resolution.targets);
        assert_eq!(
            resolution.targets,
            registry.get(DEFAULT_PROFILE).unwrap().to_vec()
        );
    }

    #[test]
    fn test_profiles_preserve_first_seen_order() {
        let registry = ProfileRegistry::builtin();
        let selection = TargetSelection::from_csv(None, Some("metrics,podLogs,metrics"), false);

        let resolution = resolve_targets(&selection, &registry, None);

        let mut expected: Vec<&str> = Vec::new();
        expected.extend(METRICS);
        expected.extend(POD_LOGS);
        assert_eq!(names(&resolution.targets), expected);
    }

    #[test]
    fn test_unknown_profile_is_skipped() {
        let registry = ProfileRegistry::builtin();
        let selection = TargetSelection::from_csv(None, Some("bogus,audit"), false);

        let resolution = resolve_targets(&selection, &registry, None);

        assert_eq!(
            names(&resolution.targets),
            vec!["AKSControlPlane", "AKSAudit", "AKSAuditAdmin"]
        );
        assert_eq!(resolution.unknown_profiles, vec!["bogus".to_string()]);
    }

    #[test]
    fn test_only_unknown_profiles_fall_back_to_default() {
        let registry = ProfileRegistry::builtin();
        let selection = TargetSelection::from_csv(None, Some("bogus"), false);

        let resolution = resolve_targets(&selection, &registry, None);

        assert_eq!(
            resolution.targets,
            registry.get(DEFAULT_PROFILE).unwrap().to_vec()
        );
    }

    #[test]
    fn test_default_when_nothing_selected() {
        let registry = ProfileRegistry::builtin();
        let resolution = resolve_targets(&TargetSelection::default(), &registry, None);

        assert_eq!(resolution.targets.len(), 16);
        assert_unique(&resolution.targets);
    }

    #[test]
    fn test_with_group_replaces_existing() {
        let registry = ProfileRegistry::new()
            .with_group("a", ["T1"])
            .with_group("a", ["T2", "T2"]);

        assert_eq!(names(registry.get("a").unwrap()), vec!["T2"]);
        assert_eq!(registry.names().count(), 1);
    }
}
