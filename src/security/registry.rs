//! Per-client bucket registry.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use crate::observability::metrics;
use crate::security::token_bucket::{BucketParams, TokenBucket};

/// Maps client keys to their token buckets.
///
/// Memory is bounded by a coarse rule: once the map holds `max_clients`
/// buckets it is swapped for an empty one, forgetting every client at once.
/// Forgetting only resets burst credit, so this is safe.
pub struct BucketRegistry {
    buckets: Mutex<HashMap<String, Arc<TokenBucket>>>,
    params: BucketParams,
    max_clients: usize,
    resets: AtomicU64,
}

impl BucketRegistry {
    pub fn new(params: BucketParams, max_clients: usize) -> Self {
        Self {
            buckets: Mutex::new(HashMap::new()),
            params,
            max_clients,
            resets: AtomicU64::new(0),
        }
    }

    /// Look up the bucket for `key`, creating it on first sighting.
    ///
    /// The registry lock is released before the caller touches the bucket.
    pub fn get(&self, key: &str) -> Arc<TokenBucket> {
        let mut buckets = self.buckets.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(bucket) = buckets.get(key) {
            return bucket.clone();
        }

        let bucket = Arc::new(TokenBucket::new(self.params));
        buckets.insert(key.to_string(), bucket.clone());
        metrics::record_tracked_clients(buckets.len());
        bucket
    }

    /// Drop every bucket if the high-water mark is reached. Returns true if it was.
    pub fn resize(&self) -> bool {
        let mut buckets = self.buckets.lock().unwrap_or_else(PoisonError::into_inner);
        if buckets.len() < self.max_clients {
            return false;
        }

        let forgotten = buckets.len();
        *buckets = HashMap::new();
        drop(buckets);

        self.resets.fetch_add(1, Ordering::Relaxed);
        metrics::record_registry_reset();
        metrics::record_tracked_clients(0);
        tracing::info!(forgotten, "Rate limiter registry reset");
        true
    }

    pub fn len(&self) -> usize {
        self.buckets.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of times the registry has been reset.
    pub fn resets(&self) -> u64 {
        self.resets.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ThrottlePolicy;
    use crate::security::token_bucket::Admission;

    fn registry(max_clients: usize) -> BucketRegistry {
        let params = BucketParams::new(1.0, 10, ThrottlePolicy::Reject).unwrap();
        BucketRegistry::new(params, max_clients)
    }

    #[test]
    fn test_same_key_same_bucket() {
        let reg = registry(100);
        let a = reg.get("10.0.0.1");
        let b = reg.get("10.0.0.1");
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(reg.len(), 1);
    }

    #[test]
    fn test_keys_are_isolated() {
        let reg = registry(100);
        assert_eq!(reg.get("a").allow(), Admission::Admit);
        assert!(!reg.get("a").allow().is_admitted());
        assert_eq!(reg.get("b").allow(), Admission::Admit);
    }

    #[test]
    fn test_resize_below_high_water_keeps_buckets() {
        let reg = registry(3);
        reg.get("a");
        reg.get("b");
        assert!(!reg.resize());
        assert_eq!(reg.len(), 2);
        assert_eq!(reg.resets(), 0);
    }

    #[test]
    fn test_resize_at_high_water_forgets_everyone() {
        let reg = registry(3);
        for key in ["a", "b", "c"] {
            reg.get(key).allow();
        }

        assert!(reg.resize());
        assert!(reg.is_empty());
        assert_eq!(reg.resets(), 1);

        // A forgotten client starts over with a fresh bucket.
        assert_eq!(reg.get("a").allow(), Admission::Admit);
    }
}
