use std::collections::HashMap;
use std::hash::Hash;
use std::time::{Duration, Instant};

/// Last successful dispatch per key.
#[derive(Debug)]
pub struct CooldownLedger<K> {
    cooldown: Duration,
    last: HashMap<K, Instant>,
}

impl<K: Eq + Hash> CooldownLedger<K> {
    pub fn new(cooldown: Duration) -> Self {
        Self {
            cooldown,
            last: HashMap::new(),
        }
    }

    pub fn cooldown(&self) -> Duration {
        self.cooldown
    }

    pub fn is_ready(&self, key: &K, now: Instant) -> bool {
        self.last
            .get(key)
            .map_or(true, |&at| now.saturating_duration_since(at) >= self.cooldown)
    }

    pub fn record(&mut self, key: K, now: Instant) {
        self.last.insert(key, now);
    }
}
