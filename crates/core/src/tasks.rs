use std::collections::HashMap;
use std::hash::Hash;

/// Work deferred until a point on the audio clock, at most one entry per key.
///
/// Scheduling a key again replaces its previous deadline. The control loop
/// drains due keys every tick.
#[derive(Debug)]
pub struct DeferredTasks<K> {
    tasks: HashMap<K, f64>,
}

impl<K> Default for DeferredTasks<K> {
    fn default() -> Self {
        Self {
            tasks: HashMap::new(),
        }
    }
}

impl<K: Copy + Eq + Hash> DeferredTasks<K> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn schedule(&mut self, key: K, at: f64) {
        self.tasks.insert(key, at);
    }

    pub fn cancel(&mut self, key: K) -> bool {
        self.tasks.remove(&key).is_some()
    }

    pub fn pending(&self, key: K) -> Option<f64> {
        self.tasks.get(&key).copied()
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn clear(&mut self) {
        self.tasks.clear();
    }

    /// Remove and return every key due at `now`, earliest first.
    pub fn take_due(&mut self, now: f64) -> Vec<K> {
        let mut due: Vec<(K, f64)> = self
            .tasks
            .iter()
            .filter(|(_, at)| **at <= now)
            .map(|(key, at)| (*key, *at))
            .collect();
        due.sort_by(|a, b| a.1.total_cmp(&b.1));
        for (key, _) in &due {
            self.tasks.remove(key);
        }
        due.into_iter().map(|(key, _)| key).collect()
    }
}
