//! Write path: validate, call the repositories, then apply cache effects.
//!
//! Validation runs before any repository is touched. Effects are applied only
//! once the write has resolved successfully, and before [`MutationExecutor::run`]
//! returns, so a read issued right after `run` already sees the invalidation.

use std::future::Future;
use std::time::Instant;

use metrics::histogram;
use tracing::{Instrument, debug, info, info_span, warn};
use uuid::Uuid;

use crate::application::categories::{CategoryService, ResolvedCategory};
use crate::application::error::CatalogError;
use crate::application::products::ProductService;
use crate::domain::entities::{
    Category, CategoryDraft, CategoryId, Product, ProductDraft, ProductId, ProductPatch,
};
use crate::domain::validation::{CategoryName, ValidProductDraft, ValidProductPatch};

use super::config::RetryPolicy;
use super::data::CatalogCache;
use super::effects::EffectPlan;

pub const METRIC_MUTATION_MS: &str = "vitrine_mutation_ms";

#[derive(Debug, Clone, PartialEq)]
pub enum Mutation {
    CreateProduct(ProductDraft),
    UpdateProduct { id: ProductId, patch: ProductPatch },
    DeleteProduct(ProductId),
    CreateCategory(CategoryDraft),
    UpdateCategory { id: CategoryId, draft: CategoryDraft },
    DeleteCategory(CategoryId),
}

impl Mutation {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::CreateProduct(_) => "create_product",
            Self::UpdateProduct { .. } => "update_product",
            Self::DeleteProduct(_) => "delete_product",
            Self::CreateCategory(_) => "create_category",
            Self::UpdateCategory { .. } => "update_category",
            Self::DeleteCategory(_) => "delete_category",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum MutationOutput {
    Product(Product),
    Category(Category),
    Deleted,
}

/// A mutation whose input passed validation.
#[derive(Debug, Clone)]
enum Validated {
    CreateProduct(ValidProductDraft),
    UpdateProduct {
        id: ProductId,
        patch: ValidProductPatch,
    },
    DeleteProduct(ProductId),
    CreateCategory(CategoryName),
    UpdateCategory {
        id: CategoryId,
        name: CategoryName,
    },
    DeleteCategory(CategoryId),
}

impl Validated {
    /// Category a product write has to resolve first.
    fn category_name(&self) -> Option<CategoryName> {
        match self {
            Self::CreateProduct(draft) => Some(draft.category_name()),
            Self::UpdateProduct { patch, .. } => patch.category_name(),
            _ => None,
        }
    }
}

pub struct MutationExecutor {
    cache: CatalogCache,
    products: ProductService,
    categories: CategoryService,
    retry: RetryPolicy,
}

impl MutationExecutor {
    pub fn new(
        cache: CatalogCache,
        products: ProductService,
        categories: CategoryService,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            cache,
            products,
            categories,
            retry,
        }
    }

    /// Runs one write and its cache effects. On failure the cache is left
    /// untouched and the error is returned as the use case produced it.
    pub async fn run(&self, mutation: Mutation) -> Result<MutationOutput, CatalogError> {
        let run_id = Uuid::new_v4();
        let kind = mutation.kind();
        let started_at = Instant::now();

        let result = self
            .run_inner(mutation)
            .instrument(info_span!("mutation", %run_id, kind))
            .await;

        histogram!(
            METRIC_MUTATION_MS,
            "kind" => kind,
            "outcome" => if result.is_ok() { "ok" } else { "error" }
        )
        .record(started_at.elapsed().as_secs_f64() * 1000.0);

        result
    }

    async fn run_inner(&self, mutation: Mutation) -> Result<MutationOutput, CatalogError> {
        let validated = self.validate(mutation).inspect_err(|err| {
            debug!(error = %err, "Mutation rejected before reaching the store");
        })?;

        // Outside the write attempts, so `created` survives a retried write.
        let resolved = match validated.category_name() {
            Some(name) => Some(self.retrying(|| self.categories.resolve(name.clone())).await?),
            None => None,
        };

        let (output, plan) = self
            .retrying(|| self.execute(validated.clone(), resolved.as_ref()))
            .await?;
        let plan = with_resolution(plan, resolved.as_ref());
        let touched = plan.apply(&self.cache);
        info!(plan = %plan, touched, "Mutation applied");

        Ok(output)
    }

    fn validate(&self, mutation: Mutation) -> Result<Validated, CatalogError> {
        Ok(match mutation {
            Mutation::CreateProduct(draft) => {
                Validated::CreateProduct(self.products.validate_draft(draft)?)
            }
            Mutation::UpdateProduct { id, patch } => Validated::UpdateProduct {
                id,
                patch: self.products.validate_patch(patch)?,
            },
            Mutation::DeleteProduct(id) => Validated::DeleteProduct(id),
            Mutation::CreateCategory(draft) => {
                Validated::CreateCategory(self.categories.validate_draft(&draft)?)
            }
            Mutation::UpdateCategory { id, draft } => Validated::UpdateCategory {
                id,
                name: self.categories.validate_draft(&draft)?,
            },
            Mutation::DeleteCategory(id) => Validated::DeleteCategory(id),
        })
    }

    async fn retrying<T, F, Fut>(&self, mut attempt_once: F) -> Result<T, CatalogError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, CatalogError>>,
    {
        let max_attempts = self.retry.max_attempts.get();
        let mut attempt = 1;

        loop {
            match attempt_once().await {
                Ok(done) => return Ok(done),
                Err(err) if err.is_transient() && attempt < max_attempts => {
                    warn!(attempt, error = %err, "Mutation attempt failed; retrying");
                    tokio::time::sleep(self.retry.delay_after(attempt)).await;
                    attempt += 1;
                }
                Err(err) => {
                    warn!(attempt, error = %err, "Mutation failed");
                    return Err(err);
                }
            }
        }
    }

    /// One attempt of the write itself. `resolved` is the category the
    /// product mutations point at.
    async fn execute(
        &self,
        validated: Validated,
        resolved: Option<&ResolvedCategory>,
    ) -> Result<(MutationOutput, EffectPlan), CatalogError> {
        let category_id = resolved.map(|resolved| resolved.category.id);
        match validated {
            Validated::CreateProduct(draft) => {
                let Some(category_id) = category_id else {
                    return Err(CatalogError::remote("product category was not resolved"));
                };
                let product = self.products.create_product(draft, category_id).await?;
                Ok((MutationOutput::Product(product), EffectPlan::product_created()))
            }
            Validated::UpdateProduct { id, patch } => {
                let product = self.products.update_product(id, patch, category_id).await?;
                let plan = EffectPlan::product_updated(&product);
                Ok((MutationOutput::Product(product), plan))
            }
            Validated::DeleteProduct(id) => {
                self.products.delete_product(id).await?;
                Ok((MutationOutput::Deleted, EffectPlan::product_deleted(id)))
            }
            Validated::CreateCategory(name) => {
                let category = self.categories.create_category(name).await?;
                Ok((MutationOutput::Category(category), EffectPlan::category_created()))
            }
            Validated::UpdateCategory { id, name } => {
                let category = self.categories.update_category(id, name).await?;
                let plan = EffectPlan::category_updated(&category);
                Ok((MutationOutput::Category(category), plan))
            }
            Validated::DeleteCategory(id) => {
                self.categories.delete_category(id).await?;
                Ok((MutationOutput::Deleted, EffectPlan::category_deleted(id)))
            }
        }
    }
}

fn with_resolution(plan: EffectPlan, resolved: Option<&ResolvedCategory>) -> EffectPlan {
    match resolved {
        Some(resolved) if resolved.created => plan.with_created_category(),
        _ => plan,
    }
}

#[cfg(test)]
mod tests {
    use std::num::NonZeroU32;
    use std::sync::Arc;
    use std::time::Duration;

    use super::*;
    use crate::application::fakes::InMemoryCatalog;
    use crate::cache::config::CacheConfig;
    use crate::cache::data::{CatalogData, catalog_cache};
    use crate::cache::keys::{CATEGORIES, PRODUCTS, QueryKey};
    use crate::cache::store::QueryStatus;

    struct Harness {
        repo: Arc<InMemoryCatalog>,
        cache: CatalogCache,
        executor: MutationExecutor,
    }

    fn harness_with(repo: InMemoryCatalog, retry: RetryPolicy) -> Harness {
        let repo = Arc::new(repo);
        let cache = catalog_cache(&CacheConfig::default());
        let executor = MutationExecutor::new(
            cache.clone(),
            ProductService::new(repo.clone()),
            CategoryService::new(repo.clone()),
            retry,
        );
        Harness {
            repo,
            cache,
            executor,
        }
    }

    fn harness() -> Harness {
        harness_with(
            InMemoryCatalog::seeded(
                &["Kitchen", "Office"],
                &[("Red Mug", 12.0, "Kitchen", "ceramic"), ("Blue Pen", 2.0, "Office", "gel ink")],
            ),
            RetryPolicy::once(),
        )
    }

    fn draft(name: &str, price: f64, category: &str) -> ProductDraft {
        ProductDraft {
            name: name.into(),
            price,
            image: String::new(),
            category: category.into(),
            description: String::new(),
        }
    }

    fn seed_fresh(cache: &CatalogCache, key: &QueryKey) {
        cache.set_data(key, CatalogData::Products(Arc::new(Vec::new())));
    }

    fn status(cache: &CatalogCache, key: &QueryKey) -> Option<QueryStatus> {
        cache.snapshot(key).map(|snapshot| snapshot.status)
    }

    #[tokio::test(start_paused = true)]
    async fn zero_price_is_rejected_without_repository_calls() {
        let h = harness();
        seed_fresh(&h.cache, &PRODUCTS.lists());

        let err = h
            .executor
            .run(Mutation::CreateProduct(draft("Lamp", 0.0, "Office")))
            .await
            .unwrap_err();

        assert!(err.is_validation());
        assert_eq!(h.repo.calls(), 0);
        assert_eq!(status(&h.cache, &PRODUCTS.lists()), Some(QueryStatus::Fresh));
    }

    #[tokio::test(start_paused = true)]
    async fn short_category_on_product_draft_is_rejected_up_front() {
        let h = harness();
        let err = h
            .executor
            .run(Mutation::CreateProduct(draft("Lamp", 10.0, " x ")))
            .await
            .unwrap_err();
        assert!(err.is_validation());
        assert_eq!(h.repo.calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn create_invalidates_lists_and_reuses_category() {
        let h = harness();
        seed_fresh(&h.cache, &PRODUCTS.lists());
        seed_fresh(&h.cache, &CATEGORIES.lists());

        let output = h
            .executor
            .run(Mutation::CreateProduct(draft(" Desk Lamp ", 30.0, "Office")))
            .await
            .expect("create succeeds");

        let MutationOutput::Product(product) = output else {
            panic!("expected a product");
        };
        assert_eq!(product.name, "Desk Lamp");
        assert_eq!(product.category, "Office");
        assert_eq!(status(&h.cache, &PRODUCTS.lists()), Some(QueryStatus::Stale));
        assert_eq!(status(&h.cache, &CATEGORIES.lists()), Some(QueryStatus::Fresh));
        assert_eq!(h.repo.category_names(), vec!["Kitchen", "Office"]);
    }

    #[tokio::test(start_paused = true)]
    async fn create_with_unknown_category_creates_it() {
        let h = harness();
        seed_fresh(&h.cache, &CATEGORIES.lists());

        h.executor
            .run(Mutation::CreateProduct(draft("Trowel", 8.0, "Garden")))
            .await
            .expect("create succeeds");

        assert_eq!(h.repo.category_names(), vec!["Kitchen", "Office", "Garden"]);
        assert_eq!(status(&h.cache, &CATEGORIES.lists()), Some(QueryStatus::Stale));
    }

    #[tokio::test(start_paused = true)]
    async fn update_patches_detail_with_returned_value() {
        let h = harness();
        let id = h.repo.product_id("Red Mug");
        seed_fresh(&h.cache, &PRODUCTS.lists());

        h.executor
            .run(Mutation::UpdateProduct {
                id,
                patch: ProductPatch {
                    price: Some(14.0),
                    ..Default::default()
                },
            })
            .await
            .expect("update succeeds");

        let detail = h.cache.snapshot(&PRODUCTS.detail(id)).expect("detail cached");
        assert_eq!(detail.status, QueryStatus::Fresh);
        let product = detail.data.as_deref().and_then(CatalogData::as_product).unwrap();
        assert_eq!(product.price, 14.0);
        assert_eq!(product.category, "Kitchen");
        assert_eq!(status(&h.cache, &PRODUCTS.lists()), Some(QueryStatus::Stale));
    }

    #[tokio::test(start_paused = true)]
    async fn update_resolves_a_changed_category() {
        let h = harness();
        let id = h.repo.product_id("Red Mug");

        let output = h
            .executor
            .run(Mutation::UpdateProduct {
                id,
                patch: ProductPatch {
                    category: Some("Office".into()),
                    ..Default::default()
                },
            })
            .await
            .expect("update succeeds");

        assert_eq!(
            output,
            MutationOutput::Product(Product {
                id,
                name: "Red Mug".into(),
                price: 12.0,
                image: String::new(),
                category: "Office".into(),
                description: "ceramic".into(),
            })
        );
    }

    #[tokio::test(start_paused = true)]
    async fn delete_removes_detail_and_invalidates_lists() {
        let h = harness();
        let id = h.repo.product_id("Blue Pen");
        let detail = PRODUCTS.detail(id);
        seed_fresh(&h.cache, &detail);
        seed_fresh(&h.cache, &PRODUCTS.lists());

        h.executor
            .run(Mutation::DeleteProduct(id))
            .await
            .expect("delete succeeds");

        assert!(h.cache.snapshot(&detail).is_none());
        assert_eq!(status(&h.cache, &PRODUCTS.lists()), Some(QueryStatus::Stale));
    }

    #[tokio::test(start_paused = true)]
    async fn failed_write_leaves_cache_untouched() {
        let h = harness();
        seed_fresh(&h.cache, &PRODUCTS.lists());
        h.repo.fail_writes(1);

        let err = h
            .executor
            .run(Mutation::DeleteProduct(h.repo.product_id("Blue Pen")))
            .await
            .unwrap_err();

        assert!(matches!(err, CatalogError::Remote { .. }));
        assert_eq!(status(&h.cache, &PRODUCTS.lists()), Some(QueryStatus::Fresh));
        assert_eq!(h.repo.calls(), 1, "writes are attempted once");
    }

    #[tokio::test(start_paused = true)]
    async fn configured_attempts_retry_transient_failures() {
        let retry = RetryPolicy {
            max_attempts: NonZeroU32::new(2).unwrap(),
            base_delay: Duration::from_millis(10),
            max_delay: Duration::from_millis(10),
        };
        let h = harness_with(
            InMemoryCatalog::seeded(&["Kitchen"], &[("Red Mug", 12.0, "Kitchen", "ceramic")]),
            retry,
        );
        h.repo.fail_writes(1);

        h.executor
            .run(Mutation::DeleteProduct(h.repo.product_id("Red Mug")))
            .await
            .expect("second attempt succeeds");
        assert_eq!(h.repo.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn not_found_is_not_retried() {
        let retry = RetryPolicy {
            max_attempts: NonZeroU32::new(3).unwrap(),
            ..RetryPolicy::once()
        };
        let h = harness_with(InMemoryCatalog::default(), retry);

        let err = h.executor.run(Mutation::DeleteProduct(99)).await.unwrap_err();
        assert_eq!(
            err,
            CatalogError::NotFound {
                entity: "product",
                id: 99
            }
        );
        assert_eq!(h.repo.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn category_update_refreshes_product_lists() {
        let h = harness();
        let id = h.repo.category_id("Office");
        seed_fresh(&h.cache, &PRODUCTS.lists());
        seed_fresh(&h.cache, &CATEGORIES.lists());

        let output = h
            .executor
            .run(Mutation::UpdateCategory {
                id,
                draft: CategoryDraft::new(" Stationery "),
            })
            .await
            .expect("rename succeeds");

        assert_eq!(
            output,
            MutationOutput::Category(Category {
                id,
                name: "Stationery".into()
            })
        );
        assert_eq!(status(&h.cache, &PRODUCTS.lists()), Some(QueryStatus::Stale));
        assert_eq!(status(&h.cache, &CATEGORIES.lists()), Some(QueryStatus::Stale));
        assert_eq!(status(&h.cache, &CATEGORIES.detail(id)), Some(QueryStatus::Fresh));
    }

    #[tokio::test(start_paused = true)]
    async fn patched_category_detail_keeps_category_windows() {
        let h = harness();
        let id = h.repo.category_id("Office");

        h.executor
            .run(Mutation::UpdateCategory {
                id,
                draft: CategoryDraft::new("Stationery"),
            })
            .await
            .expect("rename succeeds");

        // Past the product window, inside the category one.
        tokio::time::advance(Duration::from_secs(6 * 60)).await;
        assert_eq!(status(&h.cache, &CATEGORIES.detail(id)), Some(QueryStatus::Fresh));

        tokio::time::advance(Duration::from_secs(5 * 60)).await;
        assert_eq!(status(&h.cache, &CATEGORIES.detail(id)), Some(QueryStatus::Stale));
    }

    #[tokio::test(start_paused = true)]
    async fn retried_create_still_refreshes_categories_created_on_the_way() {
        let retry = RetryPolicy {
            max_attempts: NonZeroU32::new(2).unwrap(),
            base_delay: Duration::from_millis(10),
            max_delay: Duration::from_millis(10),
        };
        let h = harness_with(InMemoryCatalog::seeded(&["Kitchen"], &[]), retry);
        seed_fresh(&h.cache, &CATEGORIES.lists());
        h.repo.fail_product_writes(1);

        h.executor
            .run(Mutation::CreateProduct(draft("Trowel", 8.0, "Garden")))
            .await
            .expect("second attempt succeeds");

        assert_eq!(h.repo.category_names(), vec!["Kitchen", "Garden"]);
        assert_eq!(status(&h.cache, &CATEGORIES.lists()), Some(QueryStatus::Stale));
        // find_by_name, create category, failed create, create
        assert_eq!(h.repo.calls(), 4);
    }
}
