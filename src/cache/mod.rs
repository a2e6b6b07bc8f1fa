//! Vitrine cache layer
//!
//! A keyed store of remote query results plus the write path that keeps it
//! consistent:
//!
//! - **Store**: stale-while-revalidate entries with deduplicated fetches,
//!   bounded retries and garbage collection of unobserved keys
//! - **Mutations**: validated writes followed by a declared [`EffectPlan`]
//!
//! ## Configuration
//!
//! Cache behavior is controlled via `vitrine.toml`:
//!
//! ```toml
//! [cache]
//! retry_bound = 3
//! mutation_attempts = 1
//! [cache.products]
//! stale_after_ms = 300000
//! gc_after_ms = 600000
//! # ... see config.rs for all options
//! ```

mod config;
mod data;
mod effects;
mod keys;
mod lock;
mod mutation;
mod store;

pub use config::{CacheConfig, FamilyPolicy, QueryOptions, RetryPolicy};
pub use data::{CatalogCache, CatalogData, catalog_cache};
pub use effects::{CacheEffect, EffectPlan};
pub use keys::{CATEGORIES, KeyFamily, KeySegment, PRODUCTS, QueryKey, product_list};
pub use mutation::{METRIC_MUTATION_MS, Mutation, MutationExecutor, MutationOutput};
pub use store::{
    CacheStore, FetchError, Fetcher, METRIC_CACHE_EVICT, METRIC_CACHE_FETCH, METRIC_CACHE_HIT,
    METRIC_CACHE_MISS, OptionsResolver, QueryStatus, Snapshot, Subscription, fetcher,
};
