//! Repositories over a remote gateway.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use crate::application::repos::{
    CategoriesRepo, CategoryGateway, CreateProductParams, ProductGateway, ProductQueryFilter,
    ProductsRepo, RepoError, UpdateProductParams,
};
use crate::domain::entities::{Category, CategoryId, Product, ProductId};

use super::mapper;

#[derive(Clone)]
pub struct GatewayProductsRepo {
    gateway: Arc<dyn ProductGateway>,
}

impl GatewayProductsRepo {
    pub fn new(gateway: Arc<dyn ProductGateway>) -> Self {
        Self { gateway }
    }
}

#[async_trait]
impl ProductsRepo for GatewayProductsRepo {
    async fn list(&self, filter: &ProductQueryFilter) -> Result<Vec<Product>, RepoError> {
        let rows = self
            .gateway
            .list_products(&mapper::list_query(filter))
            .await?;
        Ok(rows.into_iter().map(mapper::product_from_response).collect())
    }

    async fn get(&self, id: ProductId) -> Result<Product, RepoError> {
        self.gateway
            .get_product(id)
            .await
            .map(mapper::product_from_response)
    }

    async fn create(&self, params: CreateProductParams) -> Result<Product, RepoError> {
        self.gateway
            .create_product(&mapper::create_request(params))
            .await
            .map(mapper::product_from_response)
    }

    async fn update(&self, params: UpdateProductParams) -> Result<Product, RepoError> {
        let id = params.id;
        self.gateway
            .update_product(id, &mapper::update_request(params))
            .await
            .map(mapper::product_from_response)
    }

    async fn delete(&self, id: ProductId) -> Result<(), RepoError> {
        self.gateway.delete_product(id).await
    }
}

#[derive(Clone)]
pub struct GatewayCategoriesRepo {
    gateway: Arc<dyn CategoryGateway>,
}

impl GatewayCategoriesRepo {
    pub fn new(gateway: Arc<dyn CategoryGateway>) -> Self {
        Self { gateway }
    }
}

#[async_trait]
impl CategoriesRepo for GatewayCategoriesRepo {
    async fn list(&self) -> Result<Vec<Category>, RepoError> {
        let rows = self.gateway.list_categories().await?;
        Ok(rows
            .into_iter()
            .map(mapper::category_from_response)
            .collect())
    }

    async fn get(&self, id: CategoryId) -> Result<Category, RepoError> {
        self.gateway
            .get_category(id)
            .await
            .map(mapper::category_from_response)
    }

    /// The API has no lookup by name: list and match exactly.
    async fn find_by_name(&self, name: &str) -> Result<Option<Category>, RepoError> {
        let found = self
            .gateway
            .list_categories()
            .await?
            .into_iter()
            .find(|category| category.name == name)
            .map(mapper::category_from_response);
        debug!(name, found = found.is_some(), "Looked up category by name");
        Ok(found)
    }

    async fn create(&self, name: &str) -> Result<Category, RepoError> {
        self.gateway
            .create_category(&mapper::category_request(name))
            .await
            .map(mapper::category_from_response)
    }

    async fn update(&self, id: CategoryId, name: &str) -> Result<Category, RepoError> {
        self.gateway
            .update_category(id, &mapper::category_request(name))
            .await
            .map(mapper::category_from_response)
    }

    async fn delete(&self, id: CategoryId) -> Result<(), RepoError> {
        self.gateway.delete_category(id).await
    }
}
