//! The catalog as one explicitly constructed value.

use std::sync::Arc;

use tracing::debug;

use crate::application::categories::CategoryService;
use crate::application::error::CatalogError;
use crate::application::filter::{FilterState, FilteredView};
use crate::application::products::ProductService;
use crate::application::repos::{CategoriesRepo, ProductQueryFilter, ProductsRepo};
use crate::cache::{
    CATEGORIES, CacheConfig, CatalogCache, CatalogData, Fetcher, Mutation, MutationExecutor,
    MutationOutput, PRODUCTS, QueryKey, QueryOptions, Snapshot, Subscription, catalog_cache,
    fetcher, product_list,
};
use crate::domain::entities::{
    Category, CategoryDraft, CategoryId, Product, ProductDraft, ProductId, ProductPatch,
};

pub type CatalogSnapshot = Snapshot<CatalogData, CatalogError>;
pub type CatalogSubscription = Subscription<CatalogData, CatalogError>;

/// Cache store, use cases and mutation executor wired together.
///
/// Reads go through the cache; writes go through the executor, which keeps
/// the same cache consistent.
pub struct Catalog {
    cache: CatalogCache,
    products: ProductService,
    categories: CategoryService,
    executor: MutationExecutor,
    config: CacheConfig,
}

impl Catalog {
    pub fn new(
        products: Arc<dyn ProductsRepo>,
        categories: Arc<dyn CategoriesRepo>,
        config: CacheConfig,
    ) -> Self {
        let cache = catalog_cache(&config);
        let products = ProductService::new(products);
        let categories = CategoryService::new(categories);
        let executor = MutationExecutor::new(
            cache.clone(),
            products.clone(),
            categories.clone(),
            config.mutation_retry(),
        );

        Self {
            cache,
            products,
            categories,
            executor,
            config,
        }
    }

    pub fn cache(&self) -> &CatalogCache {
        &self.cache
    }

    fn product_options(&self) -> QueryOptions {
        self.config.query_options(&PRODUCTS)
    }

    fn category_options(&self) -> QueryOptions {
        self.config.query_options(&CATEGORIES)
    }

    pub fn read_products(&self, filter: &ProductQueryFilter) -> CatalogSnapshot {
        self.cache.read(
            &product_list(filter),
            self.products_fetcher(filter.clone()),
            self.product_options(),
        )
    }

    pub async fn products(
        &self,
        filter: &ProductQueryFilter,
    ) -> Result<Arc<Vec<Product>>, CatalogError> {
        let key = product_list(filter);
        let data = self
            .cache
            .fetch(&key, self.products_fetcher(filter.clone()), self.product_options())
            .await?;
        data.as_products().cloned().ok_or_else(|| unexpected(&key, &data))
    }

    /// Cached listing narrowed by the filter engine, without another fetch
    /// when the base listing is fresh.
    pub async fn filtered_products(&self, state: &FilterState) -> Result<Vec<Product>, CatalogError> {
        let mut view = FilteredView::new();
        self.filtered_view(&mut view, state).await.map(<[Product]>::to_vec)
    }

    /// Like [`filtered_products`](Self::filtered_products), but keeps the
    /// derivation in `view` so it only reruns once the cached listing is
    /// replaced or `state` changes.
    pub async fn filtered_view<'v>(
        &self,
        view: &'v mut FilteredView<Product>,
        state: &FilterState,
    ) -> Result<&'v [Product], CatalogError> {
        let base = self.products(&ProductQueryFilter::default()).await?;
        let matched = view.view(&base, state);
        debug!(base = base.len(), matched = matched.len(), "Filtered product listing");
        Ok(matched)
    }

    pub fn subscribe_products(&self, filter: &ProductQueryFilter) -> CatalogSubscription {
        self.cache.subscribe(&product_list(filter))
    }

    pub fn read_product(&self, id: ProductId) -> CatalogSnapshot {
        self.cache.read(
            &PRODUCTS.detail(id),
            self.product_fetcher(id),
            self.product_options(),
        )
    }

    pub async fn product(&self, id: ProductId) -> Result<Product, CatalogError> {
        let key = PRODUCTS.detail(id);
        let data = self
            .cache
            .fetch(&key, self.product_fetcher(id), self.product_options())
            .await?;
        data.as_product().cloned().ok_or_else(|| unexpected(&key, &data))
    }

    pub fn read_categories(&self) -> CatalogSnapshot {
        self.cache.read(
            &CATEGORIES.lists(),
            self.categories_fetcher(),
            self.category_options(),
        )
    }

    pub async fn categories(&self) -> Result<Arc<Vec<Category>>, CatalogError> {
        let key = CATEGORIES.lists();
        let data = self
            .cache
            .fetch(&key, self.categories_fetcher(), self.category_options())
            .await?;
        data.as_categories().cloned().ok_or_else(|| unexpected(&key, &data))
    }

    pub async fn category(&self, id: CategoryId) -> Result<Category, CatalogError> {
        let key = CATEGORIES.detail(id);
        let data = self
            .cache
            .fetch(&key, self.category_fetcher(id), self.category_options())
            .await?;
        data.as_category().cloned().ok_or_else(|| unexpected(&key, &data))
    }

    pub async fn run(&self, mutation: Mutation) -> Result<MutationOutput, CatalogError> {
        self.executor.run(mutation).await
    }

    pub async fn create_product(&self, draft: ProductDraft) -> Result<Product, CatalogError> {
        match self.run(Mutation::CreateProduct(draft)).await? {
            MutationOutput::Product(product) => Ok(product),
            other => Err(unexpected_output(&other)),
        }
    }

    pub async fn update_product(
        &self,
        id: ProductId,
        patch: ProductPatch,
    ) -> Result<Product, CatalogError> {
        match self.run(Mutation::UpdateProduct { id, patch }).await? {
            MutationOutput::Product(product) => Ok(product),
            other => Err(unexpected_output(&other)),
        }
    }

    pub async fn delete_product(&self, id: ProductId) -> Result<(), CatalogError> {
        self.run(Mutation::DeleteProduct(id)).await.map(|_| ())
    }

    pub async fn create_category(&self, draft: CategoryDraft) -> Result<Category, CatalogError> {
        match self.run(Mutation::CreateCategory(draft)).await? {
            MutationOutput::Category(category) => Ok(category),
            other => Err(unexpected_output(&other)),
        }
    }

    fn products_fetcher(&self, filter: ProductQueryFilter) -> Fetcher<CatalogData, CatalogError> {
        let service = self.products.clone();
        fetcher(move || {
            let service = service.clone();
            let filter = filter.clone();
            async move {
                service
                    .list_products(&filter)
                    .await
                    .map(|products| CatalogData::Products(Arc::new(products)))
            }
        })
    }

    fn product_fetcher(&self, id: ProductId) -> Fetcher<CatalogData, CatalogError> {
        let service = self.products.clone();
        fetcher(move || {
            let service = service.clone();
            async move { service.get_product(id).await.map(CatalogData::Product) }
        })
    }

    fn categories_fetcher(&self) -> Fetcher<CatalogData, CatalogError> {
        let service = self.categories.clone();
        fetcher(move || {
            let service = service.clone();
            async move {
                service
                    .list_categories()
                    .await
                    .map(|categories| CatalogData::Categories(Arc::new(categories)))
            }
        })
    }

    fn category_fetcher(&self, id: CategoryId) -> Fetcher<CatalogData, CatalogError> {
        let service = self.categories.clone();
        fetcher(move || {
            let service = service.clone();
            async move { service.get_category(id).await.map(CatalogData::Category) }
        })
    }
}

fn unexpected(key: &QueryKey, data: &CatalogData) -> CatalogError {
    CatalogError::remote(format!("cache entry {key} holds {}", data.kind()))
}

fn unexpected_output(output: &MutationOutput) -> CatalogError {
    CatalogError::remote(format!("unexpected mutation output {output:?}"))
}
