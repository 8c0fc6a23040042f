//! Stores for active snipe and save tasks.
//!
//! These are the single source of truth for scheduling state: a target's
//! `upcoming_at` and `started_at` are always derived from here rather than
//! cached on the tracked entity.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;

/// Identity of one scheduled snipe. Several future snipes may exist for
/// the same link; the soonest wins for display.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SnipeKey {
    pub link: String,
    pub at: DateTime<Utc>,
}

impl SnipeKey {
    pub fn new(link: impl Into<String>, at: DateTime<Utc>) -> Self {
        Self {
            link: link.into(),
            at,
        }
    }
}

/// Active "wait for broadcast" tasks keyed by `(link, scheduled_at)`.
#[derive(Default)]
pub struct SnipeTasks {
    inner: RwLock<HashMap<SnipeKey, DateTime<Utc>>>,
}

impl SnipeTasks {
    /// Register a snipe. Gives true if it was newly inserted.
    pub fn add(&self, key: SnipeKey) -> bool {
        let mut inner = self.inner.write();
        if inner.contains_key(&key) {
            return false;
        }
        inner.insert(key, Utc::now());
        true
    }

    pub fn remove(&self, key: &SnipeKey) {
        self.inner.write().remove(key);
    }

    pub fn has(&self, key: &SnipeKey) -> bool {
        self.inner.read().contains_key(key)
    }

    /// The earliest scheduled time among this link's snipes.
    pub fn soonest_for(&self, link: &str) -> Option<DateTime<Utc>> {
        self.inner
            .read()
            .keys()
            .filter(|key| key.link == link)
            .map(|key| key.at)
            .min()
    }

    pub fn len(&self) -> usize {
        self.inner.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().is_empty()
    }
}

/// Active recording tasks keyed by link; at most one per link.
#[derive(Default)]
pub struct SaveTasks {
    inner: RwLock<HashMap<String, DateTime<Utc>>>,
}

impl SaveTasks {
    /// Register a save. Gives true if it was newly inserted.
    pub fn add(&self, link: &str) -> bool {
        let mut inner = self.inner.write();
        if inner.contains_key(link) {
            return false;
        }
        inner.insert(link.to_string(), Utc::now());
        true
    }

    pub fn remove(&self, link: &str) {
        self.inner.write().remove(link);
    }

    pub fn has(&self, link: &str) -> bool {
        self.inner.read().contains_key(link)
    }

    /// When the active save for this link started.
    pub fn started_at(&self, link: &str) -> Option<DateTime<Utc>> {
        self.inner.read().get(link).copied()
    }

    /// Register a save with an explicit start time.
    #[cfg(test)]
    pub(crate) fn add_at(&self, link: &str, at: DateTime<Utc>) {
        self.inner.write().insert(link.to_string(), at);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, hour, 0, 0).unwrap()
    }

    #[test]
    fn snipe_add_is_idempotent() {
        let tasks = SnipeTasks::default();
        let key = SnipeKey::new("https://x/a", at(10));
        assert!(tasks.add(key.clone()));
        assert!(!tasks.add(key.clone()));
        assert_eq!(tasks.len(), 1);
        tasks.remove(&key);
        assert!(!tasks.has(&key));
    }

    #[test]
    fn snipes_for_same_link_coexist() {
        let tasks = SnipeTasks::default();
        assert!(tasks.add(SnipeKey::new("https://x/a", at(12))));
        assert!(tasks.add(SnipeKey::new("https://x/a", at(9))));
        assert!(tasks.add(SnipeKey::new("https://x/b", at(8))));
        assert_eq!(tasks.soonest_for("https://x/a"), Some(at(9)));
        assert_eq!(tasks.soonest_for("https://x/c"), None);
    }

    #[test]
    fn save_add_is_idempotent() {
        let tasks = SaveTasks::default();
        assert!(tasks.add("https://x/a"));
        assert!(!tasks.add("https://x/a"));
        assert!(tasks.has("https://x/a"));
        assert!(tasks.started_at("https://x/a").is_some());
        tasks.remove("https://x/a");
        assert!(tasks.started_at("https://x/a").is_none());
    }
}
