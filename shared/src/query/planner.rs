//! Window planning.
//!
//! Splits a lookback `[now - D, now)` into contiguous, non-overlapping windows so
//! that each query stays small. Chunks are one hour when `D > 2h`, otherwise fifteen
//! minutes. The final window is clipped to `now`.

use crate::models::Window;
use chrono::{DateTime, TimeDelta, Utc};
use std::time::Duration;
use thiserror::Error;

/// Lookback substituted when the requested duration is zero.
pub const DEFAULT_LOOKBACK: Duration = Duration::from_secs(2 * 60 * 60);

const LONG_CHUNK: Duration = Duration::from_secs(60 * 60);
const SHORT_CHUNK: Duration = Duration::from_secs(15 * 60);

/// Errors that can occur while planning windows.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PlanError {
    /// The lookback cannot be represented relative to `now`.
    #[error("lookback of {0:?} is out of range")]
    OutOfRange(Duration),
}

/// Returns the chunk size used for a lookback duration.
///
/// # Example
///
/// ```
/// use shared::query::planner::chunk_size;
/// use std::time::Duration;
///
/// assert_eq!(chunk_size(Duration::from_secs(3 * 3600)), Duration::from_secs(3600));
/// assert_eq!(chunk_size(Duration::from_secs(2 * 3600)), Duration::from_secs(900));
/// ```
#[must_use]
pub fn chunk_size(lookback: Duration) -> Duration {
    if lookback > DEFAULT_LOOKBACK {
        LONG_CHUNK
    } else {
        SHORT_CHUNK
    }
}

/// An ordered sequence of windows covering `[start, end)`.
///
/// Windows are produced lazily by [`WindowPlan::iter`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowPlan {
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    chunk: TimeDelta,
}

impl WindowPlan {
    /// Plans the windows for a lookback ending at `now`.
    ///
    /// A zero lookback is replaced by [`DEFAULT_LOOKBACK`].
    ///
    /// # Errors
    ///
    /// Returns [`PlanError::OutOfRange`] if `now - lookback` cannot be represented.
    ///
    /// # Example
    ///
    /// ```
    /// use chrono::Utc;
    /// use shared::query::WindowPlan;
    /// use std::time::Duration;
    ///
    /// let now = Utc::now();
    /// let plan = WindowPlan::new(Duration::from_secs(5 * 3600), now).unwrap();
    /// assert_eq!(plan.len(), 5);
    /// assert_eq!(plan.iter().last().unwrap().end, now);
    /// ```
    pub fn new(lookback: Duration, now: DateTime<Utc>) -> Result<Self, PlanError> {
        let lookback = if lookback.is_zero() {
            DEFAULT_LOOKBACK
        } else {
            lookback
        };
        let span = TimeDelta::from_std(lookback).map_err(|_| PlanError::OutOfRange(lookback))?;
        let start = now
            .checked_sub_signed(span)
            .ok_or(PlanError::OutOfRange(lookback))?;
        let chunk = TimeDelta::from_std(chunk_size(lookback))
            .map_err(|_| PlanError::OutOfRange(lookback))?;

        Ok(Self {
            start,
            end: now,
            chunk,
        })
    }

    /// Returns the start of the first window.
    #[must_use]
    pub fn start(&self) -> DateTime<Utc> {
        self.start
    }

    /// Returns the end of the last window.
    #[must_use]
    pub fn end(&self) -> DateTime<Utc> {
        self.end
    }

    /// Returns the nominal chunk size.
    #[must_use]
    pub fn chunk(&self) -> TimeDelta {
        self.chunk
    }

    /// Returns the number of windows, `ceil((end - start) / chunk)`.
    #[must_use]
    pub fn len(&self) -> usize {
        let total = (self.end - self.start).num_nanoseconds().unwrap_or(i64::MAX);
        let chunk = self.chunk.num_nanoseconds().unwrap_or(i64::MAX).max(1);
        let count = total / chunk + i64::from(total % chunk != 0);
        usize::try_from(count).unwrap_or(0)
    }

    /// Returns true if the plan covers no time.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.start >= self.end
    }

    /// Iterates over the windows in chronological order.
    #[must_use]
    pub fn iter(&self) -> WindowIter {
        WindowIter {
            cursor: self.start,
            end: self.end,
            chunk: self.chunk,
        }
    }
}

impl IntoIterator for &WindowPlan {
    type Item = Window;
    type IntoIter = WindowIter;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Iterator over the windows of a [`WindowPlan`].
#[derive(Debug, Clone)]
pub struct WindowIter {
    cursor: DateTime<Utc>,
    end: DateTime<Utc>,
    chunk: TimeDelta,
}

impl Iterator for WindowIter {
    type Item = Window;

    fn next(&mut self) -> Option<Self::Item> {
        if self.cursor >= self.end {
            return None;
        }
        let start = self.cursor;
        let stop = start
            .checked_add_signed(self.chunk)
            .map_or(self.end, |t| t.min(self.end));
        self.cursor = stop;
        Some(Window::new(start, stop))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()
            + TimeDelta::milliseconds(345)
    }

    fn assert_contiguous(windows: &[Window], start: DateTime<Utc>, end: DateTime<Utc>) {
        assert_eq!(windows.first().unwrap().start, start);
        assert_eq!(windows.last().unwrap().end, end);
        for pair in windows.windows(2) {
            assert_eq!(pair[0].end, pair[1].start);
            assert!(pair[0].start < pair[0].end);
        }
    }

    #[test]
    fn test_chunk_size_policy() {
        assert_eq!(chunk_size(Duration::from_secs(2 * 3600 + 1)), LONG_CHUNK);
        assert_eq!(chunk_size(Duration::from_secs(2 * 3600)), SHORT_CHUNK);
        assert_eq!(chunk_size(Duration::from_secs(60)), SHORT_CHUNK);
    }

    #[test]
    fn test_window_count_matches_ceiling() {
        let cases = [
            Duration::from_secs(60),
            Duration::from_secs(15 * 60),
            Duration::from_secs(16 * 60),
            Duration::from_secs(2 * 3600),
            Duration::from_secs(2 * 3600 + 1),
            Duration::from_secs(6 * 3600),
            Duration::from_secs(6 * 3600 + 30 * 60),
            Duration::from_millis(1500),
        ];

        for lookback in cases {
            let plan = WindowPlan::new(lookback, now()).unwrap();
            let windows: Vec<Window> = plan.iter().collect();
            let chunk = chunk_size(lookback).as_nanos();
            let expected = lookback.as_nanos().div_ceil(chunk);

            assert_eq!(windows.len() as u128, expected, "lookback {lookback:?}");
            assert_eq!(plan.len(), windows.len(), "lookback {lookback:?}");
            assert_contiguous(&windows, plan.start(), now());
        }
    }

    #[test]
    fn test_final_window_is_clipped() {
        let plan = WindowPlan::new(Duration::from_secs(40 * 60), now()).unwrap();
        let windows: Vec<Window> = plan.iter().collect();

        assert_eq!(windows.len(), 3);
        assert_eq!(windows[0].duration(), TimeDelta::minutes(15));
        assert_eq!(windows[1].duration(), TimeDelta::minutes(15));
        assert_eq!(windows[2].duration(), TimeDelta::minutes(10));
        assert_eq!(windows[2].end, now());
    }

    #[test]
    fn test_zero_lookback_matches_two_hours() {
        let zero: Vec<Window> = WindowPlan::new(Duration::ZERO, now()).unwrap().iter().collect();
        let two_hours: Vec<Window> = WindowPlan::new(Duration::from_secs(7200), now())
            .unwrap()
            .iter()
            .collect();

        assert_eq!(zero, two_hours);
        assert_eq!(zero.len(), 8);
    }

    #[test]
    fn test_long_lookback_uses_hourly_windows() {
        let plan = WindowPlan::new(Duration::from_secs(24 * 3600), now()).unwrap();
        assert_eq!(plan.chunk(), TimeDelta::hours(1));
        assert_eq!(plan.iter().count(), 24);
    }

    #[test]
    fn test_out_of_range_lookback() {
        let result = WindowPlan::new(Duration::from_secs(u64::MAX), now());
        assert!(matches!(result, Err(PlanError::OutOfRange(_))));
    }

    #[test]
    fn test_into_iterator_for_reference() {
        let plan = WindowPlan::new(Duration::from_secs(30 * 60), now()).unwrap();
        let mut count = 0;
        for window in &plan {
            assert!(window.end <= plan.end());
            count += 1;
        }
        assert_eq!(count, 2);
        assert!(!plan.is_empty());
    }
}
