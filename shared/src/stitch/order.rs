//! Timestamp ordering.
//!
//! Timestamps compare as instants when both sides parse as RFC 3339 and as raw
//! bytes otherwise. That comparison is not a total order once parseable and
//! unparseable values mix, so sorting goes through a stable merge sort that
//! tolerates it instead of `slice::sort_by`, which may panic on such input.

use chrono::{DateTime, SecondsFormat, Utc};
use std::cmp::Ordering;

/// Parses an RFC 3339 timestamp.
#[must_use]
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw.trim())
        .ok()
        .map(|t| t.with_timezone(&Utc))
}

/// Renders a timestamp in UTC with nanosecond precision, or returns it unchanged
/// if it does not parse.
///
/// # Example
///
/// ```
/// use shared::stitch::normalize_timestamp;
///
/// assert_eq!(
///     normalize_timestamp("2024-01-01T02:00:00.5+02:00"),
///     "2024-01-01T00:00:00.500000000Z"
/// );
/// assert_eq!(normalize_timestamp("yesterday"), "yesterday");
/// ```
#[must_use]
pub fn normalize_timestamp(raw: &str) -> String {
    parse_timestamp(raw).map_or_else(
        || raw.to_string(),
        |t| t.to_rfc3339_opts(SecondsFormat::Nanos, true),
    )
}

fn compare_parsed(
    a: (Option<DateTime<Utc>>, &str),
    b: (Option<DateTime<Utc>>, &str),
) -> Ordering {
    match (a.0, b.0) {
        (Some(x), Some(y)) => x.cmp(&y),
        _ => a.1.as_bytes().cmp(b.1.as_bytes()),
    }
}

/// Compares two raw timestamps.
#[must_use]
pub fn compare_timestamps(a: &str, b: &str) -> Ordering {
    compare_parsed((parse_timestamp(a), a), (parse_timestamp(b), b))
}

/// Sorts items by their timestamp. Equal timestamps keep their input order.
pub fn sort_by_timestamp<T, F>(items: Vec<T>, timestamp: F) -> Vec<T>
where
    F: Fn(&T) -> &str,
{
    let keyed: Vec<(Option<DateTime<Utc>>, T)> = items
        .into_iter()
        .map(|item| (parse_timestamp(timestamp(&item)), item))
        .collect();

    let compare = |a: &(Option<DateTime<Utc>>, T), b: &(Option<DateTime<Utc>>, T)| {
        compare_parsed((a.0, timestamp(&a.1)), (b.0, timestamp(&b.1)))
    };
    merge_sort_by(keyed, &compare)
        .into_iter()
        .map(|(_, item)| item)
        .collect()
}

/// Stable top-down merge sort.
///
/// Terminates and returns a permutation of the input for any comparator.
pub fn merge_sort_by<T, F>(mut items: Vec<T>, compare: &F) -> Vec<T>
where
    F: Fn(&T, &T) -> Ordering,
{
    if items.len() <= 1 {
        return items;
    }
    let right = items.split_off(items.len() / 2);
    let left = merge_sort_by(items, compare);
    let right = merge_sort_by(right, compare);

    let mut merged = Vec::with_capacity(left.len() + right.len());
    let mut left = left.into_iter().peekable();
    let mut right = right.into_iter().peekable();
    loop {
        let take_right = match (left.peek(), right.peek()) {
            (Some(l), Some(r)) => compare(r, l) == Ordering::Less,
            (Some(_), None) => false,
            (None, Some(_)) => true,
            (None, None) => break,
        };
        if take_right {
            merged.extend(right.next());
        } else {
            merged.extend(left.next());
        }
    }
    merged
}
