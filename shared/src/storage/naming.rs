//! Artifact naming.
//!
//! Every identifier that ends up in an artifact path goes through [`sanitize`].
//! The helpers below build the fixed archive layout.

use crate::models::{ExportTarget, Window};
use chrono::SecondsFormat;

/// Run-level descriptor.
pub const WORKSPACE_METADATA_PATH: &str = "metadata/workspace.json";

/// Management-plane identity, written only when resolvable.
pub const AZURE_METADATA_PATH: &str = "metadata/azure.json";

/// Global index of resolved targets.
pub const INDEX_PATH: &str = "index.json";

/// Replaces every character outside `[A-Za-z0-9_-]` with `_`.
///
/// The input is trimmed first and an empty result becomes `unnamed`. Dots and
/// slashes are replaced too, so a sanitized name never escapes its directory.
/// Applying the function twice gives the same result as applying it once.
///
/// # Example
///
/// ```
/// use shared::storage::sanitize;
///
/// assert_eq!(sanitize("kube-system"), "kube-system");
/// assert_eq!(sanitize("../etc/passwd"), "___etc_passwd");
/// assert_eq!(sanitize("  "), "unnamed");
/// ```
#[must_use]
pub fn sanitize(name: &str) -> String {
    let sanitized: String = name
        .trim()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect();

    if sanitized.is_empty() {
        "unnamed".to_string()
    } else {
        sanitized
    }
}

/// Directory holding everything exported for one target.
#[must_use]
pub fn table_dir(target: &ExportTarget) -> String {
    format!("tables/{}", sanitize(target.as_str()))
}

/// `tables/<target>/schema.json`
#[must_use]
pub fn schema_path(target: &ExportTarget) -> String {
    format!("{}/schema.json", table_dir(target))
}

/// `tables/<target>/summary.json`
#[must_use]
pub fn summary_path(target: &ExportTarget) -> String {
    format!("{}/summary.json", table_dir(target))
}

/// `tables/<target>/parts/<NNNN>-<start>_<end>.ndjson`
///
/// Window bounds are rendered as RFC 3339 in UTC with whole seconds.
#[must_use]
pub fn part_path(target: &ExportTarget, index: usize, window: &Window) -> String {
    format!(
        "{}/parts/{:04}-{}_{}.ndjson",
        table_dir(target),
        index,
        window.start.to_rfc3339_opts(SecondsFormat::Secs, true),
        window.end.to_rfc3339_opts(SecondsFormat::Secs, true)
    )
}

/// `namespaces/<ns>/pods/<pod>/<container>.log`
#[must_use]
pub fn container_log_path(namespace: &str, pod: &str, container: &str) -> String {
    format!(
        "namespaces/{}/pods/{}/{}.log",
        sanitize(namespace),
        sanitize(pod),
        sanitize(container)
    )
}

/// `namespaces/<ns>/events/events.log`
#[must_use]
pub fn events_log_path(namespace: &str) -> String {
    format!("namespaces/{}/events/events.log", sanitize(namespace))
}
