//! Least-recently-used eviction policy
//!
//! Pairs a [`RecencyQueue`] with a key to [`NodeId`] map so that add, remove,
//! touch and lookup are all O(1). Only the eviction scan walks the queue, and
//! it stops at the first key without active handlers.

use crate::queue::{NodeId, RecencyQueue};
use std::borrow::Borrow;
use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;
use tracing::warn;

#[derive(Debug)]
pub struct LruPolicy<K> {
    map: HashMap<K, NodeId>,
    queue: RecencyQueue<K>,
}

impl<K: Hash + Eq + Clone> LruPolicy<K> {
    pub fn new() -> Self {
        Self {
            map: HashMap::new(),
            queue: RecencyQueue::new(),
        }
    }

    /// Rebuild a policy from a persisted sequence
    ///
    /// Keys are replayed in order, so the last key of the sequence ends up
    /// most recently used. Duplicates keep their first position.
    pub fn from_sequence<I>(sequence: I) -> Self
    where
        I: IntoIterator<Item = K>,
    {
        let mut policy = Self::new();
        for key in sequence {
            policy.add(key);
        }
        policy
    }

    /// Track a key as most recently used; no-op if already tracked
    pub fn add(&mut self, key: K) {
        if self.map.contains_key(&key) {
            return;
        }
        let id = self.queue.enqueue(key.clone());
        self.map.insert(key, id);
    }

    pub fn remove(&mut self, key: &K) {
        if let Some(id) = self.map.remove(key) {
            if let Err(e) = self.queue.remove(id) {
                warn!(error = %e, "Policy map referenced an unlinked node");
            }
        }
    }

    /// Move a tracked key to the head; no-op if absent
    pub fn touch(&mut self, key: &K) {
        if let Some(id) = self.map.get(key) {
            if let Err(e) = self.queue.promote(*id) {
                warn!(error = %e, "Policy map referenced an unlinked node");
            }
        }
    }

    pub fn contains<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.map.contains_key(key)
    }

    pub fn most_recent(&self) -> Option<&K> {
        self.queue.back().ok()
    }

    /// Least recently used key for which `has_handlers` is false
    ///
    /// Returns `None` when every tracked key is in use, in which case the
    /// caller skips eviction for this cycle.
    pub fn eviction_candidate<F>(&self, has_handlers: F) -> Option<&K>
    where
        F: Fn(&K) -> bool,
    {
        self.queue.iter_lru().find(|key| !has_handlers(key))
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Sequence accepted by [`LruPolicy::from_sequence`], oldest first
    pub fn serialize(&self) -> Vec<K> {
        self.queue.iter_lru().cloned().collect()
    }

    /// Keys head to tail, most recent first
    pub fn to_ordered_sequence(&self) -> Vec<K> {
        self.queue.to_ordered_sequence()
    }
}

impl<K: Hash + Eq + Clone> Default for LruPolicy<K> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: fmt::Display> fmt::Display for LruPolicy<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.queue, f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn policy(keys: &[&str]) -> LruPolicy<String> {
        LruPolicy::from_sequence(keys.iter().map(|k| k.to_string()))
    }

    fn key(k: &str) -> String {
        k.to_string()
    }

    fn assert_consistent(policy: &LruPolicy<String>) {
        assert_eq!(policy.map.len(), policy.queue.len());
        let mapped: HashSet<_> = policy.map.keys().cloned().collect();
        let queued: HashSet<_> = policy.queue.iter().cloned().collect();
        assert_eq!(mapped, queued);
    }

    #[test]
    fn test_from_sequence_loads_last_as_most_recent() {
        let policy = policy(&["patha", "pathb", "pathc"]);
        assert_eq!(policy.len(), 3);
        assert_eq!(policy.to_string(), "pathc->pathb->patha->");
        assert_eq!(policy.most_recent(), Some(&key("pathc")));
        assert_consistent(&policy);
    }

    #[test]
    fn test_serialize_round_trip() {
        let sequence = vec![key("x"), key("y"), key("z"), key("w")];
        let policy = LruPolicy::from_sequence(sequence.clone());
        assert_eq!(policy.serialize(), sequence);
        assert_eq!(LruPolicy::from_sequence(policy.serialize()).to_string(), policy.to_string());
    }

    #[test]
    fn test_add_is_idempotent() {
        let mut policy = LruPolicy::new();
        policy.add(key("a"));
        policy.add(key("a"));
        assert_eq!(policy.len(), 1);
        assert_consistent(&policy);
    }

    #[test]
    fn test_add_does_not_change_order_of_existing_key() {
        let mut policy = policy(&["a", "b"]);
        policy.add(key("a"));
        assert_eq!(policy.to_string(), "b->a->");
    }

    #[test]
    fn test_touch_moves_to_head_and_preserves_others() {
        let mut policy = policy(&["a", "b", "c", "d", "e"]);
        policy.touch(&key("c"));
        assert_eq!(policy.to_string(), "c->e->d->b->a->");
        policy.touch(&key("missing"));
        assert_eq!(policy.to_string(), "c->e->d->b->a->");
        assert_consistent(&policy);
    }

    #[test]
    fn test_remove_absent_is_noop() {
        let mut policy = policy(&["a", "b"]);
        policy.remove(&key("zzz"));
        assert_eq!(policy.len(), 2);
        policy.remove(&key("a"));
        assert_eq!(policy.to_string(), "b->");
        assert!(!policy.contains(&key("a")));
        assert_consistent(&policy);
    }

    #[test]
    fn test_eviction_candidate_is_tail_when_unused() {
        let policy = policy(&["a", "b", "c"]);
        assert_eq!(policy.eviction_candidate(|_| false), Some(&key("a")));
    }

    #[test]
    fn test_eviction_candidate_skips_keys_in_use() {
        let policy = policy(&["a", "b", "c"]);
        let in_use: HashSet<String> = [key("a"), key("b")].into_iter().collect();
        assert_eq!(
            policy.eviction_candidate(|k| in_use.contains(k)),
            Some(&key("c"))
        );
    }

    #[test]
    fn test_no_eviction_candidate_when_all_in_use() {
        let policy = policy(&["a", "b", "c"]);
        assert_eq!(policy.eviction_candidate(|_| true), None);
        assert_eq!(LruPolicy::<String>::new().eviction_candidate(|_| false), None);
    }

    #[test]
    fn test_mixed_operations_keep_map_and_queue_in_sync() {
        let mut policy = LruPolicy::new();
        for i in 0..50u32 {
            let k = format!("k{}", i % 13);
            match i % 4 {
                0 | 1 => policy.add(k),
                2 => policy.touch(&k),
                _ => policy.remove(&k),
            }
            assert_consistent(&policy);
        }
    }

    #[test]
    fn test_scenarios_from_loaded_order() {
        let mut policy = policy(&["a", "b", "c"]);
        policy.add(key("d"));
        policy.add(key("e"));
        assert_eq!(policy.to_string(), "e->d->c->b->a->");
        assert_eq!(policy.len(), 5);

        policy.touch(&key("b"));
        assert_eq!(policy.to_string(), "b->e->d->c->a->");
    }
}
