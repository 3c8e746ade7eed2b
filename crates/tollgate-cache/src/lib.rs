//! Tollgate Cache — deduplicates identical completion requests within a
//! tenant so repeated questions are answered at zero marginal cost.

pub mod config;
pub mod fingerprint;
pub mod response_cache;

pub use config::CacheConfig;
pub use fingerprint::{fingerprint, is_cacheable};
pub use response_cache::{CacheLookup, ResponseCache};
