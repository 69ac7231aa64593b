use dashmap::DashMap;
use std::time::{Duration, Instant};

/// 带过期时间的并发缓存 / Concurrent cache with a fixed TTL
///
/// 只缓存命中结果，缺失不缓存，新配置的端点无需等待过期即可生效。
/// Only hits are cached, so newly configured endpoints show up immediately.
#[derive(Debug)]
pub struct TtlCache<V> {
    entries: DashMap<String, (V, Instant)>,
    ttl: Duration,
}

impl<V: Clone> TtlCache<V> {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            ttl,
        }
    }

    pub fn get(&self, key: &str) -> Option<V> {
        if self.ttl.is_zero() {
            return None;
        }
        let expired = match self.entries.get(key) {
            Some(entry) => {
                let (value, at) = entry.value();
                if at.elapsed() < self.ttl {
                    return Some(value.clone());
                }
                true
            }
            None => false,
        };
        if expired {
            self.entries.remove_if(key, |_, (_, at)| at.elapsed() >= self.ttl);
        }
        None
    }

    pub fn insert(&self, key: &str, value: V) {
        if self.ttl.is_zero() {
            return;
        }
        self.entries.insert(key.to_string(), (value, Instant::now()));
    }

    pub fn invalidate(&self, key: &str) {
        self.entries.remove(key);
    }

    pub fn clear(&self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
