//! Response cache configuration.

use std::time::Duration;

#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Lifetime of a stored response (default: 24 hours).
    pub default_ttl_secs: u64,
    /// Requests sampled hotter than this are never cached (default: 0.3).
    pub max_cacheable_temperature: f32,
    /// Lookups slower than this count as a miss (default: 250 ms).
    pub lookup_timeout_ms: u64,
    pub store_timeout_ms: u64,
}

impl CacheConfig {
    pub fn default_ttl(&self) -> Duration {
        Duration::from_secs(self.default_ttl_secs)
    }

    pub fn lookup_timeout(&self) -> Duration {
        Duration::from_millis(self.lookup_timeout_ms)
    }

    pub fn store_timeout(&self) -> Duration {
        Duration::from_millis(self.store_timeout_ms)
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            default_ttl_secs: 86_400,
            max_cacheable_temperature: 0.3,
            lookup_timeout_ms: 250,
            store_timeout_ms: 1000,
        }
    }
}
