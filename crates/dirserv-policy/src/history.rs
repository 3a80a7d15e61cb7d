//! Password history.
//!
//! History entries carry millisecond-resolution timestamps. The retention
//! bounds (count and duration) are evaluated with the *current* policy
//! configuration at check time, so tightening or loosening either bound
//! takes effect immediately.

use crate::error::PolicyError;
use crate::scheme;

/// A single recorded password value.
#[derive(Debug, Clone)]
pub struct HistoryEntry {
    /// Scheme-tagged encoded password value.
    pub encoded: String,
    /// When the entry was recorded, milliseconds since the epoch.
    pub added_at_ms: i64,
}

/// An account's password history, oldest first. Entries recorded at the
/// same millisecond keep their insertion order, so the newest entry is
/// always last and never evicted by a timestamp tie.
#[derive(Debug, Clone, Default)]
pub struct PasswordHistory {
    entries: Vec<HistoryEntry>,
}

impl PasswordHistory {
    /// The retained entries, oldest first.
    #[must_use]
    pub fn entries(&self) -> &[HistoryEntry] {
        &self.entries
    }

    /// Record a password value at `at_ms`, then drop entries that fall
    /// outside both the count bound and the duration bound.
    ///
    /// A bound of zero is disabled. An entry is retained while *either*
    /// bound still covers it.
    pub fn record(
        &mut self,
        encoded: impl Into<String>,
        at_ms: i64,
        count_bound: u32,
        duration_secs: i64,
    ) {
        self.entries.push(HistoryEntry {
            encoded: encoded.into(),
            added_at_ms: at_ms,
        });
        // Insertion order already sorts equal-millisecond entries newest-last.
        self.entries.sort_by_key(|e| e.added_at_ms);

        let len = self.entries.len();
        let keep_from_count = if count_bound == 0 {
            0
        } else {
            len.saturating_sub(count_bound as usize)
        };
        let cutoff_ms = at_ms - duration_secs.saturating_mul(1000);
        self.entries.retain_with_index(|i, entry| {
            let by_count = count_bound > 0 && i >= keep_from_count;
            let by_duration = duration_secs > 0 && entry.added_at_ms >= cutoff_ms;
            by_count || by_duration
        });
    }

    /// Whether `candidate` matches a retained value that the current
    /// bounds still cover: the last `count_bound` entries, or any entry
    /// recorded within `duration_secs` of `now_ms`.
    ///
    /// # Errors
    ///
    /// Propagates scheme errors from stored values.
    pub fn contains(
        &self,
        candidate: &str,
        now_ms: i64,
        count_bound: u32,
        duration_secs: i64,
    ) -> Result<bool, PolicyError> {
        let len = self.entries.len();
        let covered_from = if count_bound == 0 {
            len
        } else {
            len.saturating_sub(count_bound as usize)
        };
        let cutoff_ms = now_ms - duration_secs.saturating_mul(1000);

        for (i, entry) in self.entries.iter().enumerate() {
            let by_count = count_bound > 0 && i >= covered_from;
            let by_duration = duration_secs > 0 && entry.added_at_ms >= cutoff_ms;
            if !(by_count || by_duration) {
                continue;
            }
            if scheme::verify(candidate, &entry.encoded)? {
                return Ok(true);
            }
        }
        Ok(false)
    }
}

trait RetainWithIndex<T> {
    fn retain_with_index(&mut self, keep: impl FnMut(usize, &T) -> bool);
}

impl<T> RetainWithIndex<T> for Vec<T> {
    fn retain_with_index(&mut self, mut keep: impl FnMut(usize, &T) -> bool) {
        let mut index = 0;
        self.retain(|item| {
            let kept = keep(index, item);
            index += 1;
            kept
        });
    }
}
