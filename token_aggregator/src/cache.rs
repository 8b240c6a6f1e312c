use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::debug;

#[derive(Debug, Clone)]
struct CacheEntry {
    value: Value,
    inserted_at: Instant,
}

/// Token-info cache keyed by token address with a fixed TTL.
///
/// Entries whose age has reached the TTL are never returned. They are
/// dropped lazily on read and in bulk by [`TokenCache::sweep`].
#[derive(Debug)]
pub struct TokenCache {
    ttl: Duration,
    entries: RwLock<HashMap<String, CacheEntry>>,
}

impl TokenCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: RwLock::new(HashMap::new()),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn get(&self, address: &str) -> Option<Value> {
        {
            let entries = self.entries.read().ok()?;
            let entry = entries.get(address)?;
            if entry.inserted_at.elapsed() < self.ttl {
                debug!("Token info cache hit for: {}", address);
                return Some(entry.value.clone());
            }
        }

        if let Ok(mut entries) = self.entries.write() {
            // Another caller may have refreshed it meanwhile
            if entries
                .get(address)
                .is_some_and(|entry| entry.inserted_at.elapsed() >= self.ttl)
            {
                entries.remove(address);
                debug!("Token info cache entry expired for: {}", address);
            }
        }
        None
    }

    pub fn insert(&self, address: &str, value: Value) {
        if let Ok(mut entries) = self.entries.write() {
            entries.insert(
                address.to_string(),
                CacheEntry {
                    value,
                    inserted_at: Instant::now(),
                },
            );
        }
    }

    /// Drop every expired entry, returning how many were removed
    pub fn sweep(&self) -> usize {
        match self.entries.write() {
            Ok(mut entries) => {
                let before = entries.len();
                entries.retain(|_, entry| entry.inserted_at.elapsed() < self.ttl);
                before - entries.len()
            }
            Err(_) => 0,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.read().map(|entries| entries.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Periodically sweep expired entries for as long as the task lives
    pub fn spawn_sweeper(self: &Arc<Self>, every: Duration) -> JoinHandle<()> {
        let cache = Arc::clone(self);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(every);
            // First tick completes immediately
            interval.tick().await;
            loop {
                interval.tick().await;
                let removed = cache.sweep();
                if removed > 0 {
                    debug!("🧹 Swept {} expired token info entries", removed);
                }
            }
        })
    }
}
