//! Count and age caps on the history.

use crate::entry::ClipboardEntry;
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};

pub const DEFAULT_MAX_ITEMS: usize = 200;
pub const DEFAULT_EXPIRY_DAYS: u32 = 30;

const SECS_PER_DAY: i64 = 86_400;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetentionPolicy {
    max_items: usize,
    expiry_days: u32,
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self {
            max_items: DEFAULT_MAX_ITEMS,
            expiry_days: DEFAULT_EXPIRY_DAYS,
        }
    }
}

impl RetentionPolicy {
    pub fn new(max_items: usize, expiry_days: u32) -> Result<Self> {
        if max_items == 0 {
            return Err(Error::ConfigInvalid("max_items must be positive".into()));
        }
        Ok(Self {
            max_items,
            expiry_days,
        })
    }

    /// Validates raw configuration values (as they appear in a settings file
    /// or on the wire).
    pub fn from_raw(max_items: i64, expiry_days: i64) -> Result<Self> {
        if max_items <= 0 {
            return Err(Error::ConfigInvalid(format!(
                "max_items must be positive, got {max_items}"
            )));
        }
        if expiry_days < 0 {
            return Err(Error::ConfigInvalid(format!(
                "expiry_days must be non-negative, got {expiry_days}"
            )));
        }
        let max_items = usize::try_from(max_items).unwrap_or(usize::MAX);
        let expiry_days = u32::try_from(expiry_days).unwrap_or(u32::MAX);
        Self::new(max_items, expiry_days)
    }

    pub fn max_items(&self) -> usize {
        self.max_items
    }

    pub fn expiry_days(&self) -> u32 {
        self.expiry_days
    }

    pub fn max_age_secs(&self) -> i64 {
        i64::from(self.expiry_days) * SECS_PER_DAY
    }

    pub fn is_expired(&self, entry: &ClipboardEntry, now: i64) -> bool {
        entry.age_at(now) > self.max_age_secs()
    }

    /// Evicts from a most-recent-first list and returns how many went.
    ///
    /// Age eviction runs before count eviction. When both limits are exceeded
    /// at once this decides which entries survive: expired entries never
    /// occupy count slots, so the count cap only trims live entries.
    pub fn apply(&self, entries: &mut Vec<ClipboardEntry>, now: i64) -> usize {
        let before = entries.len();
        entries.retain(|e| !self.is_expired(e, now));
        // Most-recent-first, so the oldest excess sits at the tail.
        entries.truncate(self.max_items);
        before - entries.len()
    }

    pub fn is_satisfied_by(&self, entries: &[ClipboardEntry], now: i64) -> bool {
        entries.len() <= self.max_items && !entries.iter().any(|e| self.is_expired(e, now))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::{Candidate, Content, EntryId};

    fn entry(id: u64, text: &str, ts: i64) -> ClipboardEntry {
        ClipboardEntry::new(EntryId(id), Candidate::new(Content::text(text)), ts)
    }

    #[test]
    fn raw_values_are_validated() {
        assert!(RetentionPolicy::from_raw(0, 30).is_err());
        assert!(RetentionPolicy::from_raw(-3, 30).is_err());
        assert!(RetentionPolicy::from_raw(10, -1).is_err());
        let p = RetentionPolicy::from_raw(10, 0).unwrap();
        assert_eq!((p.max_items(), p.expiry_days()), (10, 0));
    }

    #[test]
    fn age_eviction_runs_before_count_eviction() {
        let now = 100 * SECS_PER_DAY;
        let policy = RetentionPolicy::new(2, 1).unwrap();
        // an expired entry ahead of live ones, as persisted before a clock jump
        let mut v = vec![
            entry(4, "d", now),
            entry(3, "c", now - 2 * SECS_PER_DAY),
            entry(2, "b", now - 10),
            entry(1, "a", now - 20),
        ];
        let evicted = policy.apply(&mut v, now);
        assert_eq!(evicted, 2);
        let ids: Vec<u64> = v.iter().map(|e| e.id.0).collect();
        // With count-first, "c" would have taken a slot and then expired,
        // leaving only "d".
        assert_eq!(ids, vec![4, 2]);
    }

    #[test]
    fn boundary_age_is_kept() {
        let now = 10 * SECS_PER_DAY;
        let policy = RetentionPolicy::new(10, 1).unwrap();
        let mut v = vec![
            entry(2, "b", now - SECS_PER_DAY),
            entry(1, "a", now - SECS_PER_DAY - 1),
        ];
        policy.apply(&mut v, now);
        assert_eq!(v.len(), 1);
        assert_eq!(v[0].id, EntryId(2));
    }

    #[test]
    fn apply_is_idempotent() {
        let now = 1_000_000;
        let policy = RetentionPolicy::new(3, 1).unwrap();
        let mut v: Vec<_> = (0..6u64)
            .map(|i| entry(6 - i, &i.to_string(), now - i as i64))
            .collect();
        policy.apply(&mut v, now);
        let once = v.clone();
        assert_eq!(policy.apply(&mut v, now), 0);
        assert_eq!(v, once);
        assert!(policy.is_satisfied_by(&v, now));
    }
}
