//! Gateway and repository traits describing the remote store adapters.
//!
//! Gateways speak wire DTOs; repositories wrap a gateway plus the entity
//! mapper and speak domain entities. Only repositories are visible to the
//! application services.

use async_trait::async_trait;
use thiserror::Error;
use vitrine_api_types::{
    CategoryRequest, CategoryResponse, ProductCreateRequest, ProductListQuery, ProductResponse,
    ProductUpdateRequest,
};

use crate::domain::entities::{Category, CategoryId, Product, ProductId};

#[derive(Debug, Error)]
pub enum RepoError {
    #[error("transport error: {0}")]
    Transport(String),
    #[error("remote store answered {status}: {message}")]
    Status { status: u16, message: String },
    #[error("failed to decode response: {0}")]
    Decode(String),
    #[error("resource not found")]
    NotFound,
}

impl RepoError {
    pub fn from_transport(err: impl std::fmt::Display) -> Self {
        Self::Transport(err.to_string())
    }
}

/// Server-side list filter, forwarded as query parameters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct ProductQueryFilter {
    pub name: Option<String>,
    pub category: Option<String>,
}

impl ProductQueryFilter {
    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.category.is_none()
    }

    pub fn by_category(category: impl Into<String>) -> Self {
        Self {
            name: None,
            category: Some(category.into()),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CreateProductParams {
    pub name: String,
    pub price: f64,
    pub image: String,
    pub description: String,
    pub category_id: CategoryId,
}

#[derive(Debug, Clone, PartialEq)]
pub struct UpdateProductParams {
    pub id: ProductId,
    pub name: Option<String>,
    pub price: Option<f64>,
    pub image: Option<String>,
    pub description: Option<String>,
    pub category_id: Option<CategoryId>,
}

#[async_trait]
pub trait ProductGateway: Send + Sync {
    async fn list_products(&self, query: &ProductListQuery)
    -> Result<Vec<ProductResponse>, RepoError>;

    async fn get_product(&self, id: ProductId) -> Result<ProductResponse, RepoError>;

    async fn create_product(
        &self,
        request: &ProductCreateRequest,
    ) -> Result<ProductResponse, RepoError>;

    async fn update_product(
        &self,
        id: ProductId,
        request: &ProductUpdateRequest,
    ) -> Result<ProductResponse, RepoError>;

    async fn delete_product(&self, id: ProductId) -> Result<(), RepoError>;
}

#[async_trait]
pub trait CategoryGateway: Send + Sync {
    async fn list_categories(&self) -> Result<Vec<CategoryResponse>, RepoError>;

    async fn get_category(&self, id: CategoryId) -> Result<CategoryResponse, RepoError>;

    async fn create_category(
        &self,
        request: &CategoryRequest,
    ) -> Result<CategoryResponse, RepoError>;

    async fn update_category(
        &self,
        id: CategoryId,
        request: &CategoryRequest,
    ) -> Result<CategoryResponse, RepoError>;

    async fn delete_category(&self, id: CategoryId) -> Result<(), RepoError>;
}

#[async_trait]
pub trait ProductsRepo: Send + Sync {
    async fn list(&self, filter: &ProductQueryFilter) -> Result<Vec<Product>, RepoError>;

    async fn get(&self, id: ProductId) -> Result<Product, RepoError>;

    async fn create(&self, params: CreateProductParams) -> Result<Product, RepoError>;

    async fn update(&self, params: UpdateProductParams) -> Result<Product, RepoError>;

    async fn delete(&self, id: ProductId) -> Result<(), RepoError>;
}

#[async_trait]
pub trait CategoriesRepo: Send + Sync {
    async fn list(&self) -> Result<Vec<Category>, RepoError>;

    async fn get(&self, id: CategoryId) -> Result<Category, RepoError>;

    async fn find_by_name(&self, name: &str) -> Result<Option<Category>, RepoError>;

    async fn create(&self, name: &str) -> Result<Category, RepoError>;

    async fn update(&self, id: CategoryId, name: &str) -> Result<Category, RepoError>;

    async fn delete(&self, id: CategoryId) -> Result<(), RepoError>;
}
