use std::sync::Arc;

use tracing::{info, warn};

use crate::application::error::CatalogError;
use crate::application::repos::CategoriesRepo;
use crate::domain::entities::{Category, CategoryDraft, CategoryId};
use crate::domain::validation::CategoryName;

const ENTITY: &str = "category";

/// Result of resolving a category name to a stored category.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedCategory {
    pub category: Category,
    /// `true` when the category did not exist and was created on the way.
    pub created: bool,
}

#[derive(Clone)]
pub struct CategoryService {
    repo: Arc<dyn CategoriesRepo>,
}

impl CategoryService {
    pub fn new(repo: Arc<dyn CategoriesRepo>) -> Self {
        Self { repo }
    }

    pub fn validate_draft(&self, draft: &CategoryDraft) -> Result<CategoryName, CatalogError> {
        CategoryName::parse(&draft.name).map_err(CatalogError::from)
    }

    pub async fn list_categories(&self) -> Result<Vec<Category>, CatalogError> {
        self.repo.list().await.map_err(|err| {
            warn!(error = %err, "failed to list categories");
            CatalogError::from_repo(ENTITY, None, err)
        })
    }

    pub async fn get_category(&self, id: CategoryId) -> Result<Category, CatalogError> {
        self.repo.get(id).await.map_err(|err| {
            warn!(error = %err, category_id = id, "failed to load category");
            CatalogError::from_repo(ENTITY, Some(id), err)
        })
    }

    pub async fn find_by_name(&self, name: &str) -> Result<Option<Category>, CatalogError> {
        self.repo.find_by_name(name).await.map_err(|err| {
            warn!(error = %err, category = name, "failed to look up category by name");
            CatalogError::from_repo(ENTITY, None, err)
        })
    }

    pub async fn create_category(&self, name: CategoryName) -> Result<Category, CatalogError> {
        self.repo.create(name.as_str()).await.map_err(|err| {
            warn!(error = %err, category = name.as_str(), "failed to create category");
            CatalogError::from_repo(ENTITY, None, err)
        })
    }

    pub async fn update_category(
        &self,
        id: CategoryId,
        name: CategoryName,
    ) -> Result<Category, CatalogError> {
        self.repo.update(id, name.as_str()).await.map_err(|err| {
            warn!(error = %err, category_id = id, "failed to update category");
            CatalogError::from_repo(ENTITY, Some(id), err)
        })
    }

    pub async fn delete_category(&self, id: CategoryId) -> Result<(), CatalogError> {
        self.repo.delete(id).await.map_err(|err| {
            warn!(error = %err, category_id = id, "failed to delete category");
            CatalogError::from_repo(ENTITY, Some(id), err)
        })
    }

    /// Looks the category up by exact name and creates it when missing.
    pub async fn resolve(&self, name: CategoryName) -> Result<ResolvedCategory, CatalogError> {
        if let Some(category) = self.find_by_name(name.as_str()).await? {
            return Ok(ResolvedCategory {
                category,
                created: false,
            });
        }

        let category = self.create_category(name).await?;
        info!(
            category_id = category.id,
            category = %category.name,
            "Created missing category during resolution"
        );
        Ok(ResolvedCategory {
            category,
            created: true,
        })
    }
}
