use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use super::key::SpectrumKey;

/// A bounded map of shared values evicted in insertion order. Reads do not
/// change the eviction order.
#[derive(Debug)]
pub(crate) struct FifoStore<T> {
    capacity: usize,
    items: HashMap<SpectrumKey, Arc<T>>,
    order: VecDeque<SpectrumKey>,
}

impl<T> FifoStore<T> {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            items: HashMap::new(),
            order: VecDeque::new(),
        }
    }

    pub fn get(&self, key: &SpectrumKey) -> Option<Arc<T>> {
        self.items.get(key).cloned()
    }

    pub fn contains(&self, key: &SpectrumKey) -> bool {
        self.items.contains_key(key)
    }

    /// Insert `value` under `key` and evict down to capacity. If `key` is
    /// already present, the resident value is kept and returned instead.
    pub fn insert(&mut self, key: SpectrumKey, value: Arc<T>) -> (Arc<T>, Vec<SpectrumKey>) {
        if let Some(existing) = self.items.get(&key) {
            return (existing.clone(), Vec::new());
        }
        self.order.push_back(key.clone());
        self.items.insert(key, value.clone());
        (value, self.evict())
    }

    /// Drop the oldest entries until no more than `capacity` remain
    pub fn evict(&mut self) -> Vec<SpectrumKey> {
        let mut evicted = Vec::new();
        while self.items.len() > self.capacity {
            match self.order.pop_front() {
                Some(key) => {
                    self.items.remove(&key);
                    evicted.push(key);
                }
                None => break,
            }
        }
        evicted
    }

    /// Drop every entry read from the file named `file`
    pub fn remove_file(&mut self, file: &str) -> usize {
        let before = self.items.len();
        self.items.retain(|key, _| key.file != file);
        self.order.retain(|key| key.file != file);
        before - self.items.len()
    }

    pub fn set_capacity(&mut self, capacity: usize) -> Vec<SpectrumKey> {
        self.capacity = capacity;
        self.evict()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn clear(&mut self) {
        self.items.clear();
        self.order.clear();
    }

    /// Keys from oldest to newest
    pub fn keys(&self) -> impl Iterator<Item = &SpectrumKey> {
        self.order.iter()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn key(i: usize) -> SpectrumKey {
        SpectrumKey::new("run.mgf", format!("scan={i}"))
    }

    #[test]
    fn test_fifo_eviction() {
        let mut store = FifoStore::new(3);
        for i in 0..3 {
            let (_, evicted) = store.insert(key(i), Arc::new(i));
            assert!(evicted.is_empty());
        }
        // Reading the oldest entry does not protect it
        assert_eq!(*store.get(&key(0)).unwrap(), 0);
        let (_, evicted) = store.insert(key(3), Arc::new(3));
        assert_eq!(evicted, vec![key(0)]);
        assert!(!store.contains(&key(0)));

        let keys: Vec<_> = store.keys().cloned().collect();
        assert_eq!(keys, vec![key(1), key(2), key(3)]);
    }

    #[test]
    fn test_reinsert_keeps_resident() {
        let mut store = FifoStore::new(2);
        store.insert(key(0), Arc::new(0));
        let (value, evicted) = store.insert(key(0), Arc::new(100));
        assert_eq!(*value, 0);
        assert!(evicted.is_empty());
        assert_eq!(store.len(), 1);
        assert_eq!(store.keys().count(), 1);
    }

    #[test]
    fn test_remove_file() {
        let mut store = FifoStore::new(5);
        store.insert(key(0), Arc::new(0));
        store.insert(SpectrumKey::new("other.mgf", "scan=1"), Arc::new(1));
        store.insert(key(2), Arc::new(2));
        assert_eq!(store.remove_file("run.mgf"), 2);
        let keys: Vec<_> = store.keys().cloned().collect();
        assert_eq!(keys, vec![SpectrumKey::new("other.mgf", "scan=1")]);
        assert_eq!(store.remove_file("run.mgf"), 0);
    }

    #[test]
    fn test_shrink() {
        let mut store = FifoStore::new(5);
        for i in 0..5 {
            store.insert(key(i), Arc::new(i));
        }
        let evicted = store.set_capacity(2);
        assert_eq!(evicted, vec![key(0), key(1), key(2)]);
        assert_eq!(store.len(), 2);
        store.clear();
        assert_eq!(store.len(), 0);
        assert_eq!(store.capacity(), 2);
    }
}
