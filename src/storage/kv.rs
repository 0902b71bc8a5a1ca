use std::collections::HashMap as StdHashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

#[derive(Clone)]
struct Entry<V> {
    value: V,
    /// Optional expiry time; `None` never expires.
    expires_at: Option<Instant>,
}

impl<V> Entry<V> {
    fn expired(&self, now: Instant) -> bool {
        matches!(self.expires_at, Some(exp) if now >= exp)
    }
}

fn deadline(ttl: Option<Duration>) -> Option<Instant> {
    ttl.and_then(|d| Instant::now().checked_add(d))
}

/// A single named in-memory KV store with per-key expiry.
///
/// Expiry is fixed at insert time; reads never extend it. Expired keys are invisible to
/// reads immediately and physically removed by `sweep` (or lazily on `get`).
#[derive(Clone)]
pub struct KvStore<V: Clone> {
    name: String,
    map: Arc<parking_lot::RwLock<StdHashMap<String, Entry<V>>>>,
}

impl<V: Clone> KvStore<V> {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), map: Arc::new(parking_lot::RwLock::new(StdHashMap::new())) }
    }

    pub fn name(&self) -> &str { &self.name }

    /// Set a key with optional TTL, replacing any previous value and expiry.
    /// A TTL too large to represent as an `Instant` is stored without expiry.
    pub fn set(&self, key: impl Into<String>, value: V, ttl: Option<Duration>) {
        let expires_at = deadline(ttl);
        self.map.write().insert(key.into(), Entry { value, expires_at });
    }

    /// Set a key only if no live entry holds it. Returns `true` when this call stored the value.
    /// An expired entry counts as absent and is replaced.
    pub fn set_if_absent(&self, key: impl Into<String>, value: V, ttl: Option<Duration>) -> bool {
        let now = Instant::now();
        let mut w = self.map.write();
        let key = key.into();
        if w.get(&key).map(|e| !e.expired(now)).unwrap_or(false) {
            return false;
        }
        w.insert(key, Entry { value, expires_at: deadline(ttl) });
        true
    }

    /// Get a key. If expired, removes it and returns None.
    pub fn get(&self, key: &str) -> Option<V> {
        let now = Instant::now();
        {
            let r = self.map.read();
            match r.get(key) {
                Some(ent) if !ent.expired(now) => return Some(ent.value.clone()),
                Some(_) => {}
                None => return None,
            }
        }
        // Re-check under the write lock; a concurrent set may have replaced the entry.
        let mut w = self.map.write();
        if w.get(key).map(|e| e.expired(now)).unwrap_or(false) {
            w.remove(key);
        }
        None
    }

    pub fn contains(&self, key: &str) -> bool {
        let now = Instant::now();
        self.map.read().get(key).map(|e| !e.expired(now)).unwrap_or(false)
    }

    /// Remaining lifetime of a live key. `None` if absent, expired or without TTL.
    pub fn ttl_remaining(&self, key: &str) -> Option<Duration> {
        let now = Instant::now();
        let r = self.map.read();
        let ent = r.get(key)?;
        let exp = ent.expires_at?;
        if now >= exp { None } else { Some(exp - now) }
    }

    pub fn delete(&self, key: &str) -> bool { self.map.write().remove(key).is_some() }
    /// Number of physically stored keys, including expired ones not yet swept.
    pub fn len(&self) -> usize { self.map.read().len() }
    pub fn is_empty(&self) -> bool { self.map.read().is_empty() }

    /// Remove expired keys. Returns number removed.
    pub fn sweep(&self) -> usize {
        let now = Instant::now();
        let mut w = self.map.write();
        let before = w.len();
        w.retain(|_, e| !e.expired(now));
        before - w.len()
    }
}
