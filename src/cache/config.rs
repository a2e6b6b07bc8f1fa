//! Cache configuration.
//!
//! Staleness, garbage collection and retry policy are tunable from the
//! `[cache]` table of `vitrine.toml`.

use std::num::NonZeroU32;
use std::time::Duration;

use serde::Deserialize;

use super::keys::{CATEGORIES, KeyFamily, PRODUCTS, QueryKey};

// Products change often; categories are close to static.
const DEFAULT_PRODUCTS_STALE_AFTER_MS: u64 = 5 * 60 * 1000;
const DEFAULT_PRODUCTS_GC_AFTER_MS: u64 = 10 * 60 * 1000;
const DEFAULT_CATEGORIES_STALE_AFTER_MS: u64 = 10 * 60 * 1000;
const DEFAULT_CATEGORIES_GC_AFTER_MS: u64 = 15 * 60 * 1000;
const DEFAULT_READ_ATTEMPTS: u32 = 3;
const DEFAULT_MUTATION_ATTEMPTS: u32 = 1;
const DEFAULT_RETRY_BASE_DELAY_MS: u64 = 1000;
const DEFAULT_RETRY_MAX_DELAY_MS: u64 = 30_000;

/// Staleness and eviction windows for one key family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct FamilyPolicy {
    /// Time after a successful fetch at which an entry turns stale.
    pub stale_after_ms: u64,
    /// Grace period before an entry without observers is evicted.
    pub gc_after_ms: u64,
}

/// Bounded retry with exponential backoff between attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: NonZeroU32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl RetryPolicy {
    pub fn once() -> Self {
        Self {
            max_attempts: NonZeroU32::MIN,
            base_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
        }
    }

    /// Delay to wait after `failed_attempts` consecutive failures.
    pub fn delay_after(&self, failed_attempts: u32) -> Duration {
        let exponent = failed_attempts.saturating_sub(1).min(16);
        self.base_delay
            .saturating_mul(1u32 << exponent)
            .min(self.max_delay)
    }
}

/// Per-read policy handed to the cache store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueryOptions {
    pub stale_after: Duration,
    pub gc_after: Duration,
    pub retry: RetryPolicy,
}

impl QueryOptions {
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }
}

/// Cache configuration from `vitrine.toml`.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub products: FamilyPolicy,
    pub categories: FamilyPolicy,
    /// Total attempts per read fetch, including the first one.
    pub retry_bound: u32,
    /// Total attempts per write. Writes are not idempotent.
    pub mutation_attempts: u32,
    pub retry_base_delay_ms: u64,
    pub retry_max_delay_ms: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            products: FamilyPolicy {
                stale_after_ms: DEFAULT_PRODUCTS_STALE_AFTER_MS,
                gc_after_ms: DEFAULT_PRODUCTS_GC_AFTER_MS,
            },
            categories: FamilyPolicy {
                stale_after_ms: DEFAULT_CATEGORIES_STALE_AFTER_MS,
                gc_after_ms: DEFAULT_CATEGORIES_GC_AFTER_MS,
            },
            retry_bound: DEFAULT_READ_ATTEMPTS,
            mutation_attempts: DEFAULT_MUTATION_ATTEMPTS,
            retry_base_delay_ms: DEFAULT_RETRY_BASE_DELAY_MS,
            retry_max_delay_ms: DEFAULT_RETRY_MAX_DELAY_MS,
        }
    }
}

impl Default for FamilyPolicy {
    fn default() -> Self {
        CacheConfig::default().products
    }
}

impl CacheConfig {
    /// Returns the read attempt bound as NonZeroU32, clamping to 1 if zero.
    pub fn retry_bound_non_zero(&self) -> NonZeroU32 {
        NonZeroU32::new(self.retry_bound).unwrap_or(NonZeroU32::MIN)
    }

    /// Returns the write attempt bound as NonZeroU32, clamping to 1 if zero.
    pub fn mutation_attempts_non_zero(&self) -> NonZeroU32 {
        NonZeroU32::new(self.mutation_attempts).unwrap_or(NonZeroU32::MIN)
    }

    pub fn read_retry(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.retry_bound_non_zero(),
            base_delay: Duration::from_millis(self.retry_base_delay_ms),
            max_delay: Duration::from_millis(self.retry_max_delay_ms),
        }
    }

    pub fn mutation_retry(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.mutation_attempts_non_zero(),
            ..self.read_retry()
        }
    }

    pub fn policy_for(&self, family: &KeyFamily) -> FamilyPolicy {
        if *family == CATEGORIES {
            self.categories
        } else {
            self.products
        }
    }

    pub fn query_options(&self, family: &KeyFamily) -> QueryOptions {
        let policy = self.policy_for(family);
        QueryOptions {
            stale_after: Duration::from_millis(policy.stale_after_ms),
            gc_after: Duration::from_millis(policy.gc_after_ms),
            retry: self.read_retry(),
        }
    }

    /// Options of the family `key` belongs to.
    pub fn options_for_key(&self, key: &QueryKey) -> QueryOptions {
        let family = if CATEGORIES.contains(key) {
            CATEGORIES
        } else {
            PRODUCTS
        };
        self.query_options(&family)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_values() {
        let config = CacheConfig::default();
        assert_eq!(config.products.stale_after_ms, 300_000);
        assert_eq!(config.products.gc_after_ms, 600_000);
        assert_eq!(config.categories.stale_after_ms, 600_000);
        assert_eq!(config.categories.gc_after_ms, 900_000);
        assert_eq!(config.retry_bound, 3);
        assert_eq!(config.mutation_attempts, 1);
    }

    #[test]
    fn families_get_their_own_windows() {
        let config = CacheConfig::default();
        let products = config.query_options(&PRODUCTS);
        let categories = config.query_options(&CATEGORIES);
        assert!(products.stale_after < categories.stale_after);
        assert_eq!(products.retry.max_attempts.get(), 3);
    }

    #[test]
    fn keys_pick_their_family_options() {
        let config = CacheConfig::default();
        assert_eq!(
            config.options_for_key(&CATEGORIES.detail(4)),
            config.query_options(&CATEGORIES)
        );
        assert_eq!(
            config.options_for_key(&PRODUCTS.lists()),
            config.query_options(&PRODUCTS)
        );
    }

    #[test]
    fn non_zero_clamps_to_min() {
        let config = CacheConfig {
            retry_bound: 0,
            mutation_attempts: 0,
            ..Default::default()
        };
        assert_eq!(config.retry_bound_non_zero().get(), 1);
        assert_eq!(config.mutation_retry().max_attempts.get(), 1);
    }

    #[test]
    fn backoff_doubles_up_to_the_cap() {
        let retry = RetryPolicy {
            max_attempts: NonZeroU32::new(10).unwrap(),
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(5),
        };
        assert_eq!(retry.delay_after(1), Duration::from_secs(1));
        assert_eq!(retry.delay_after(2), Duration::from_secs(2));
        assert_eq!(retry.delay_after(3), Duration::from_secs(4));
        assert_eq!(retry.delay_after(4), Duration::from_secs(5));
        assert_eq!(retry.delay_after(40), Duration::from_secs(5));
    }

    #[test]
    fn partial_table_keeps_defaults() {
        let config: CacheConfig = serde_json::from_value(serde_json::json!({
            "retry_bound": 5,
            "categories": { "stale_after_ms": 1, "gc_after_ms": 2 }
        }))
        .expect("config deserializes");
        assert_eq!(config.retry_bound, 5);
        assert_eq!(config.categories.gc_after_ms, 2);
        assert_eq!(config.products.stale_after_ms, DEFAULT_PRODUCTS_STALE_AFTER_MS);
    }
}
