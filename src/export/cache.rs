use crate::export::encode::ImageBlob;
use std::collections::HashMap;
use std::time::{Duration, Instant};

const DEFAULT_MAX_BYTES: usize = 32 * 1024 * 1024;
const DEFAULT_TTL: Duration = Duration::from_secs(5 * 60);

struct CacheEntry {
    data: ImageBlob,
    created: Instant,
    size: usize,
    access_count: u64,
    last_accessed: Instant,
}

/// Keyed cache of encoded export results with a byte budget and TTL.
///
/// Entries are created on miss, touched on hit, and evicted least-recently
/// -accessed first when the budget is exceeded. Expired entries drop lazily
/// on access or insert.
pub struct ExportCache {
    entries: HashMap<String, CacheEntry>,
    max_bytes: usize,
    ttl: Duration,
    total_bytes: usize,
}

impl Default for ExportCache {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_BYTES, DEFAULT_TTL)
    }
}

impl ExportCache {
    pub fn new(max_bytes: usize, ttl: Duration) -> Self {
        Self {
            entries: HashMap::new(),
            max_bytes,
            ttl,
            total_bytes: 0,
        }
    }

    pub fn get(&mut self, key: &str) -> Option<ImageBlob> {
        self.expire();
        let entry = self.entries.get_mut(key)?;
        entry.access_count += 1;
        entry.last_accessed = Instant::now();
        Some(entry.data.clone())
    }

    pub fn insert(&mut self, key: impl Into<String>, blob: ImageBlob) {
        self.expire();
        let key = key.into();
        let size = blob.len();
        if let Some(old) = self.entries.remove(&key) {
            self.total_bytes -= old.size;
        }

        let now = Instant::now();
        self.entries.insert(
            key,
            CacheEntry {
                data: blob,
                created: now,
                size,
                access_count: 0,
                last_accessed: now,
            },
        );
        self.total_bytes += size;
        self.evict_to_budget();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn total_bytes(&self) -> usize {
        self.total_bytes
    }

    fn expire(&mut self) {
        let ttl = self.ttl;
        let mut freed = 0usize;
        self.entries.retain(|_, e| {
            if e.created.elapsed() < ttl {
                true
            } else {
                freed += e.size;
                false
            }
        });
        self.total_bytes -= freed;
    }

    fn evict_to_budget(&mut self) {
        while self.total_bytes > self.max_bytes && !self.entries.is_empty() {
            let victim = self
                .entries
                .iter()
                .min_by_key(|(_, e)| e.last_accessed)
                .map(|(k, _)| k.clone());
            let Some(key) = victim else { break };
            if let Some(e) = self.entries.remove(&key) {
                self.total_bytes -= e.size;
                tracing::debug!(key, size = e.size, "evicted cached export");
            }
        }
    }
}
