//! Ordered per-level membership lists.
//!
//! Each key sits in exactly one level. Links are stored by key in a side
//! table, so unlinking and relinking are O(1) and iteration preserves
//! insertion order within a level.

use std::collections::HashMap;
use std::hash::Hash;

#[derive(Debug, Clone, Copy)]
struct Ends<K> {
    head: Option<K>,
    tail: Option<K>,
    len: usize,
}

impl<K> Default for Ends<K> {
    fn default() -> Self {
        Self {
            head: None,
            tail: None,
            len: 0,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Link<K> {
    level: usize,
    prev: Option<K>,
    next: Option<K>,
}

#[derive(Debug, Clone)]
pub(crate) struct LevelLists<K> {
    levels: Vec<Ends<K>>,
    links: HashMap<K, Link<K>>,
}

impl<K: Copy + Eq + Hash> Default for LevelLists<K> {
    fn default() -> Self {
        Self {
            levels: Vec::new(),
            links: HashMap::new(),
        }
    }
}

impl<K: Copy + Eq + Hash> LevelLists<K> {
    /// Number of levels currently allocated, trailing empty ones included.
    pub(crate) fn num_levels(&self) -> usize {
        self.levels.len()
    }

    pub(crate) fn level_of(&self, key: K) -> Option<usize> {
        self.links.get(&key).map(|link| link.level)
    }

    pub(crate) fn len_at(&self, level: usize) -> usize {
        self.levels.get(level).map_or(0, |ends| ends.len)
    }

    /// Appends `key` to the tail of `level`, growing the level vector as needed.
    ///
    /// Panics if `key` is already linked.
    pub(crate) fn push(&mut self, level: usize, key: K) {
        assert!(!self.links.contains_key(&key), "key linked twice");
        if level >= self.levels.len() {
            self.levels.resize_with(level + 1, Ends::default);
        }

        let ends = &mut self.levels[level];
        let prev = ends.tail;
        ends.tail = Some(key);
        if ends.head.is_none() {
            ends.head = Some(key);
        }
        ends.len += 1;

        if let Some(prev) = prev {
            if let Some(prev_link) = self.links.get_mut(&prev) {
                prev_link.next = Some(key);
            }
        }
        self.links.insert(
            key,
            Link {
                level,
                prev,
                next: None,
            },
        );
    }

    /// Removes `key` from its level and returns the level it was on.
    pub(crate) fn unlink(&mut self, key: K) -> Option<usize> {
        let link = self.links.remove(&key)?;

        match link.prev {
            Some(prev) => {
                if let Some(prev_link) = self.links.get_mut(&prev) {
                    prev_link.next = link.next;
                }
            }
            None => self.levels[link.level].head = link.next,
        }
        match link.next {
            Some(next) => {
                if let Some(next_link) = self.links.get_mut(&next) {
                    next_link.prev = link.prev;
                }
            }
            None => self.levels[link.level].tail = link.prev,
        }
        self.levels[link.level].len -= 1;
        Some(link.level)
    }

    /// Moves `key` to the tail of `level`.
    pub(crate) fn relink(&mut self, key: K, level: usize) {
        self.unlink(key);
        self.push(level, key);
    }

    /// Snapshot of the keys on `level`, in list order.
    pub(crate) fn keys_at(&self, level: usize) -> Vec<K> {
        let mut keys = Vec::with_capacity(self.len_at(level));
        let mut cursor = self.levels.get(level).and_then(|ends| ends.head);
        while let Some(key) = cursor {
            keys.push(key);
            cursor = self.links.get(&key).and_then(|link| link.next);
        }
        keys
    }

    /// Trims trailing empty levels.
    pub(crate) fn shrink(&mut self) {
        while self.levels.last().is_some_and(|ends| ends.len == 0) {
            self.levels.pop();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_and_unlink_keep_order() {
        let mut lists = LevelLists::default();
        lists.push(0, 1u32);
        lists.push(0, 2);
        lists.push(0, 3);
        assert_eq!(lists.keys_at(0), vec![1, 2, 3]);

        assert_eq!(lists.unlink(2), Some(0));
        assert_eq!(lists.keys_at(0), vec![1, 3]);
        assert_eq!(lists.unlink(1), Some(0));
        assert_eq!(lists.unlink(3), Some(0));
        assert!(lists.keys_at(0).is_empty());
        assert_eq!(lists.unlink(3), None);
    }

    #[test]
    fn relink_grows_and_shrink_trims() {
        let mut lists = LevelLists::default();
        lists.push(0, 'a');
        lists.push(0, 'b');
        lists.relink('b', 3);

        assert_eq!(lists.num_levels(), 4);
        assert_eq!(lists.level_of('b'), Some(3));
        assert_eq!(lists.keys_at(3), vec!['b']);

        lists.relink('b', 0);
        lists.shrink();
        assert_eq!(lists.num_levels(), 1);
        assert_eq!(lists.keys_at(0), vec!['a', 'b']);
    }
}
