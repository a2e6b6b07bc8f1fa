use std::sync::Arc;

use tracing::warn;

use crate::application::error::CatalogError;
use crate::application::filter::{self, FilterState};
use crate::application::repos::{
    CreateProductParams, ProductQueryFilter, ProductsRepo, UpdateProductParams,
};
use crate::domain::entities::{CategoryId, Product, ProductDraft, ProductId, ProductPatch};
use crate::domain::validation::{
    ValidProductDraft, ValidProductPatch, validate_product_draft, validate_product_patch,
};

const ENTITY: &str = "product";

/// Product use cases: validation in front of the repository.
#[derive(Clone)]
pub struct ProductService {
    repo: Arc<dyn ProductsRepo>,
}

impl ProductService {
    pub fn new(repo: Arc<dyn ProductsRepo>) -> Self {
        Self { repo }
    }

    pub fn validate_draft(&self, draft: ProductDraft) -> Result<ValidProductDraft, CatalogError> {
        validate_product_draft(draft).map_err(CatalogError::from)
    }

    pub fn validate_patch(&self, patch: ProductPatch) -> Result<ValidProductPatch, CatalogError> {
        validate_product_patch(patch).map_err(CatalogError::from)
    }

    pub async fn list_products(
        &self,
        filter: &ProductQueryFilter,
    ) -> Result<Vec<Product>, CatalogError> {
        self.repo.list(filter).await.map_err(|err| {
            warn!(error = %err, ?filter, "failed to list products");
            CatalogError::from_repo(ENTITY, None, err)
        })
    }

    pub async fn get_product(&self, id: ProductId) -> Result<Product, CatalogError> {
        self.repo.get(id).await.map_err(|err| {
            warn!(error = %err, product_id = id, "failed to load product");
            CatalogError::from_repo(ENTITY, Some(id), err)
        })
    }

    pub async fn create_product(
        &self,
        draft: ValidProductDraft,
        category_id: CategoryId,
    ) -> Result<Product, CatalogError> {
        let ProductDraft {
            name,
            price,
            image,
            description,
            ..
        } = draft.into_inner();

        let params = CreateProductParams {
            name,
            price,
            image,
            description,
            category_id,
        };

        self.repo.create(params).await.map_err(|err| {
            warn!(error = %err, "failed to create product");
            CatalogError::from_repo(ENTITY, None, err)
        })
    }

    pub async fn update_product(
        &self,
        id: ProductId,
        patch: ValidProductPatch,
        category_id: Option<CategoryId>,
    ) -> Result<Product, CatalogError> {
        let ProductPatch {
            name,
            price,
            image,
            description,
            ..
        } = patch.into_inner();

        let params = UpdateProductParams {
            id,
            name,
            price,
            image,
            description,
            category_id,
        };

        self.repo.update(params).await.map_err(|err| {
            warn!(error = %err, product_id = id, "failed to update product");
            CatalogError::from_repo(ENTITY, Some(id), err)
        })
    }

    pub async fn delete_product(&self, id: ProductId) -> Result<(), CatalogError> {
        self.repo.delete(id).await.map_err(|err| {
            warn!(error = %err, product_id = id, "failed to delete product");
            CatalogError::from_repo(ENTITY, Some(id), err)
        })
    }

    /// Lists everything, then keeps products whose name or description
    /// contains `query`, ignoring case.
    pub async fn search_products(&self, query: &str) -> Result<Vec<Product>, CatalogError> {
        let products = self.list_products(&ProductQueryFilter::default()).await?;
        Ok(filter::apply(&products, &FilterState::search(query)))
    }

    pub async fn products_in_category(&self, category: &str) -> Result<Vec<Product>, CatalogError> {
        self.list_products(&ProductQueryFilter::by_category(category))
            .await
    }
}
