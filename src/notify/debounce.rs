use std::{collections::HashMap, time::Duration};

use tokio::time::Instant;

/// A set of keys that forget themselves after a fixed window.
///
/// Expired keys are swept lazily whenever a key is inserted. When the set is
/// full after the sweep, the key closest to its expiry is dropped.
#[derive(Debug)]
pub struct ExpiringSet {
    window: Duration,
    capacity: usize,
    deadlines: HashMap<String, Instant>,
}

impl ExpiringSet {
    pub fn new(window: Duration, capacity: usize) -> Self {
        Self {
            window,
            capacity: capacity.max(1),
            deadlines: HashMap::new(),
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Registers `key` unless it is already present.
    /// Returns `false` when the key was seen within the window.
    /// Follows the tokio clock, so a paused runtime freezes the window.
    pub fn insert(&mut self, key: &str) -> bool {
        self.insert_at(key, Instant::now())
    }

    pub fn insert_at(&mut self, key: &str, now: Instant) -> bool {
        self.sweep(now);

        if self.deadlines.contains_key(key) {
            return false;
        }

        if self.deadlines.len() >= self.capacity {
            if let Some(oldest) = self
                .deadlines
                .iter()
                .min_by_key(|(_, deadline)| **deadline)
                .map(|(key, _)| key.clone())
            {
                self.deadlines.remove(&oldest);
            }
        }

        self.deadlines.insert(key.to_string(), now + self.window);
        true
    }

    #[cfg(test)]
    pub fn contains_at(&self, key: &str, now: Instant) -> bool {
        self.deadlines
            .get(key)
            .is_some_and(|deadline| *deadline > now)
    }

    pub fn len(&self) -> usize {
        self.deadlines.len()
    }

    fn sweep(&mut self, now: Instant) {
        self.deadlines.retain(|_, deadline| *deadline > now);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repeated_key_is_rejected_within_the_window() {
        let mut set = ExpiringSet::new(Duration::from_secs(30), 16);
        let start = Instant::now();

        assert!(set.insert_at("Qualification 12", start));
        assert!(!set.insert_at("Qualification 12", start + Duration::from_secs(29)));
        assert!(set.contains_at("Qualification 12", start + Duration::from_secs(29)));
    }

    #[test]
    fn key_is_accepted_again_after_the_window() {
        let mut set = ExpiringSet::new(Duration::from_secs(30), 16);
        let start = Instant::now();

        assert!(set.insert_at("Qualification 12", start));
        assert!(!set.contains_at("Qualification 12", start + Duration::from_secs(30)));
        assert!(set.insert_at("Qualification 12", start + Duration::from_secs(31)));
    }

    #[test]
    fn keys_expire_independently() {
        let mut set = ExpiringSet::new(Duration::from_secs(30), 16);
        let start = Instant::now();

        assert!(set.insert_at("Qualification 1", start));
        assert!(set.insert_at("Qualification 2", start + Duration::from_secs(20)));
        assert!(set.insert_at("Qualification 3", start + Duration::from_secs(40)));

        // the first key was swept by the last insertion
        assert_eq!(set.len(), 2);
        assert!(!set.insert_at("Qualification 2", start + Duration::from_secs(45)));
    }

    #[test]
    fn capacity_drops_the_oldest_key() {
        let mut set = ExpiringSet::new(Duration::from_secs(30), 2);
        let start = Instant::now();

        assert!(set.insert_at("a", start));
        assert!(set.insert_at("b", start + Duration::from_secs(1)));
        assert!(set.insert_at("c", start + Duration::from_secs(2)));

        assert_eq!(set.len(), 2);
        assert!(!set.contains_at("a", start + Duration::from_secs(3)));
        assert!(set.contains_at("b", start + Duration::from_secs(3)));
        assert!(set.contains_at("c", start + Duration::from_secs(3)));
    }

    #[tokio::test(start_paused = true)]
    async fn insert_follows_the_runtime_clock() {
        let mut set = ExpiringSet::new(Duration::from_secs(30), 16);

        assert!(set.insert("Qualification 12"));
        tokio::time::advance(Duration::from_secs(29)).await;
        assert!(!set.insert("Qualification 12"));
        tokio::time::advance(Duration::from_secs(2)).await;
        assert!(set.insert("Qualification 12"));
    }
}
