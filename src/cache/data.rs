use std::sync::Arc;

use crate::application::error::CatalogError;
use crate::domain::entities::{Category, Product};

use super::config::CacheConfig;
use super::keys::QueryKey;
use super::store::CacheStore;

/// Value stored under a catalog query key.
///
/// Collections sit behind their own `Arc` so a derived view can tell a
/// refetched collection from the one it was computed over.
#[derive(Debug, Clone, PartialEq)]
pub enum CatalogData {
    Products(Arc<Vec<Product>>),
    Product(Product),
    Categories(Arc<Vec<Category>>),
    Category(Category),
}

impl CatalogData {
    pub fn as_products(&self) -> Option<&Arc<Vec<Product>>> {
        match self {
            Self::Products(products) => Some(products),
            _ => None,
        }
    }

    pub fn as_product(&self) -> Option<&Product> {
        match self {
            Self::Product(product) => Some(product),
            _ => None,
        }
    }

    pub fn as_categories(&self) -> Option<&Arc<Vec<Category>>> {
        match self {
            Self::Categories(categories) => Some(categories),
            _ => None,
        }
    }

    pub fn as_category(&self) -> Option<&Category> {
        match self {
            Self::Category(category) => Some(category),
            _ => None,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Products(_) => "products",
            Self::Product(_) => "product",
            Self::Categories(_) => "categories",
            Self::Category(_) => "category",
        }
    }
}

/// The cache store shared by every catalog read and mutation.
pub type CatalogCache = CacheStore<CatalogData, CatalogError>;

/// Catalog cache whose entries take the windows of their key family.
pub fn catalog_cache(config: &CacheConfig) -> CatalogCache {
    let config = config.clone();
    CacheStore::with_resolver(Arc::new(move |key: &QueryKey| config.options_for_key(key)))
}
