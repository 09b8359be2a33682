use std::collections::{HashSet, VecDeque};

/// Identifiers already seen during the current run.
///
/// Unbounded unless a capacity is set. Past the capacity the oldest half
/// of the keys is forgotten, after which those identifiers are no longer
/// reported as duplicates.
#[derive(Debug, Default)]
pub struct SeenKeys {
    keys: HashSet<String>,
    order: VecDeque<String>,
    capacity: Option<usize>,
}

impl SeenKeys {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a set that evicts its oldest half once `capacity` is exceeded.
    pub fn bounded(capacity: usize) -> Self {
        Self {
            capacity: Some(capacity.max(1)),
            ..Self::default()
        }
    }

    /// Record `key` as seen. Returns `true` if it had already been seen.
    pub fn check_and_insert(&mut self, key: &str) -> bool {
        if self.keys.contains(key) {
            return true;
        }

        self.keys.insert(key.to_string());
        self.order.push_back(key.to_string());
        self.evict();

        false
    }

    pub fn contains(&self, key: &str) -> bool {
        self.keys.contains(key)
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    fn evict(&mut self) {
        let Some(capacity) = self.capacity else {
            return;
        };

        if self.keys.len() <= capacity {
            return;
        }

        let drop = (capacity / 2).max(1);
        for key in self.order.drain(..drop) {
            self.keys.remove(&key);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_sighting_is_a_duplicate() {
        let mut seen = SeenKeys::new();

        assert!(!seen.check_and_insert("sensor_002_2026-01-01T10:00:00"));
        assert!(seen.check_and_insert("sensor_002_2026-01-01T10:00:00"));
        assert!(!seen.check_and_insert("sensor_002_2026-01-01T10:00:01"));
        assert_eq!(seen.len(), 2);
    }

    #[test]
    fn unbounded_set_never_forgets() {
        let mut seen = SeenKeys::new();
        for i in 0..10_000 {
            seen.check_and_insert(&i.to_string());
        }

        assert!(seen.contains("0"));
        assert_eq!(seen.len(), 10_000);
    }

    #[test]
    fn bounded_set_evicts_oldest_half() {
        let mut seen = SeenKeys::bounded(4);
        for key in ["a", "b", "c", "d", "e"] {
            seen.check_and_insert(key);
        }

        assert_eq!(seen.len(), 3);
        assert!(!seen.contains("a"));
        assert!(!seen.contains("b"));
        assert!(seen.contains("c"));
        assert!(seen.contains("e"));

        // Forgotten keys are treated as new again
        assert!(!seen.check_and_insert("a"));
    }
}
