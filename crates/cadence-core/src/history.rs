//! Fixed-capacity, append-only log that evicts its oldest entry when full.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use crate::constants::HISTORY_CAPACITY;

/// Ring buffer of the `HISTORY_CAPACITY` most recent entries, oldest first.
///
/// Serializes as a plain JSON array. Deserializing an over-long array keeps
/// only the newest entries.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(
    from = "Vec<T>",
    into = "Vec<T>",
    bound(serialize = "T: Serialize", deserialize = "T: Deserialize<'de>")
)]
pub struct BoundedHistory<T: Clone> {
    entries: VecDeque<T>,
}

impl<T: Clone> BoundedHistory<T> {
    pub fn new() -> Self {
        Self {
            entries: VecDeque::with_capacity(HISTORY_CAPACITY),
        }
    }

    /// Append `entry`, evicting the oldest one if the log is full.
    pub fn push(&mut self, entry: T) {
        if self.entries.len() == HISTORY_CAPACITY {
            self.entries.pop_front();
        }
        self.entries.push_back(entry);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn latest(&self) -> Option<&T> {
        self.entries.back()
    }

    /// Oldest to newest.
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &T> + ExactSizeIterator {
        self.entries.iter()
    }
}

impl<T: Clone> Default for BoundedHistory<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone> From<Vec<T>> for BoundedHistory<T> {
    fn from(entries: Vec<T>) -> Self {
        let mut history = Self::new();
        for entry in entries {
            history.push(entry);
        }
        history
    }
}

impl<T: Clone> From<BoundedHistory<T>> for Vec<T> {
    fn from(history: BoundedHistory<T>) -> Self {
        history.entries.into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_below_capacity_keeps_all() {
        let mut h = BoundedHistory::new();
        for i in 0..4 {
            h.push(i);
        }
        assert_eq!(h.iter().copied().collect::<Vec<_>>(), vec![0, 1, 2, 3]);
    }

    #[test]
    fn test_evicts_oldest_first() {
        let mut h = BoundedHistory::new();
        for i in 0..15 {
            h.push(i);
        }
        assert_eq!(h.len(), HISTORY_CAPACITY);
        assert_eq!(h.iter().copied().collect::<Vec<_>>(), (5..15).collect::<Vec<_>>());
        assert_eq!(h.latest(), Some(&14));
    }

    #[test]
    fn test_from_long_vec_truncates_to_newest() {
        let h: BoundedHistory<u32> = (0..12).collect::<Vec<_>>().into();
        assert_eq!(h.iter().next(), Some(&2));
        assert_eq!(h.len(), HISTORY_CAPACITY);
    }

    #[test]
    fn test_serializes_as_array() {
        let mut h = BoundedHistory::new();
        h.push("a".to_string());
        h.push("b".to_string());
        let json = serde_json::to_string(&h).unwrap();
        assert_eq!(json, r#"["a","b"]"#);
        let back: BoundedHistory<String> = serde_json::from_str(&json).unwrap();
        assert_eq!(back, h);
    }
}
