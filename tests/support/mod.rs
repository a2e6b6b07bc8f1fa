//! In-memory stand-in for the remote catalog API, speaking wire DTOs.

#![allow(dead_code)]

use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use vitrine::application::repos::{CategoryGateway, ProductGateway, RepoError};
use vitrine_api_types::{
    CategoryRequest, CategoryResponse, ProductCreateRequest, ProductListQuery, ProductResponse,
    ProductUpdateRequest,
};

#[derive(Default)]
struct Tables {
    products: Vec<ProductResponse>,
    categories: Vec<CategoryResponse>,
    next_id: u64,
}

impl Tables {
    fn allocate(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    fn category(&self, id: u64) -> Result<CategoryResponse, RepoError> {
        self.categories
            .iter()
            .find(|category| category.id == id)
            .cloned()
            .ok_or(RepoError::Status {
                status: 400,
                message: format!("category {id} does not exist"),
            })
    }
}

/// Counts every call; reads can be made to fail with a transport error.
#[derive(Default)]
pub struct FakeApi {
    tables: Mutex<Tables>,
    calls: AtomicUsize,
    failing_reads: AtomicUsize,
}

impl FakeApi {
    pub fn seeded(categories: &[&str], products: &[(&str, f64, &str, &str)]) -> Self {
        let api = Self::default();
        {
            let mut tables = api.tables.lock().unwrap();
            for name in categories {
                let id = tables.allocate();
                tables.categories.push(category_row(id, name));
            }
            for (name, price, category, description) in products {
                let category = tables
                    .categories
                    .iter()
                    .find(|row| row.name == *category)
                    .cloned()
                    .expect("seeded product uses a seeded category");
                let id = tables.allocate();
                tables.products.push(ProductResponse {
                    id,
                    name: (*name).to_string(),
                    image: String::new(),
                    price: *price,
                    category_id: category.id,
                    category,
                    description: (*description).to_string(),
                    created_at: None,
                    updated_at: None,
                });
            }
        }
        api
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// The next `count` reads fail as if the connection dropped.
    pub fn fail_reads(&self, count: usize) {
        self.failing_reads.store(count, Ordering::SeqCst);
    }

    pub fn product_id(&self, name: &str) -> u64 {
        let tables = self.tables.lock().unwrap();
        tables
            .products
            .iter()
            .find(|product| product.name == name)
            .map(|product| product.id)
            .expect("product exists")
    }

    pub fn category_names(&self) -> Vec<String> {
        let tables = self.tables.lock().unwrap();
        tables.categories.iter().map(|row| row.name.clone()).collect()
    }

    fn read(&self) -> Result<std::sync::MutexGuard<'_, Tables>, RepoError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let failing = self
            .failing_reads
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1));
        if failing.is_ok() {
            return Err(RepoError::Transport("connection reset by peer".into()));
        }
        Ok(self.tables.lock().unwrap())
    }

    fn write(&self) -> std::sync::MutexGuard<'_, Tables> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.tables.lock().unwrap()
    }
}

fn category_row(id: u64, name: &str) -> CategoryResponse {
    CategoryResponse {
        id,
        name: name.to_string(),
        created_at: None,
        updated_at: None,
    }
}

#[async_trait]
impl ProductGateway for FakeApi {
    async fn list_products(
        &self,
        query: &ProductListQuery,
    ) -> Result<Vec<ProductResponse>, RepoError> {
        let tables = self.read()?;
        let needle = query.name.as_deref().map(str::to_lowercase);
        Ok(tables
            .products
            .iter()
            .filter(|product| {
                query
                    .category
                    .as_deref()
                    .is_none_or(|category| product.category.name == category)
            })
            .filter(|product| {
                needle
                    .as_deref()
                    .is_none_or(|needle| product.name.to_lowercase().contains(needle))
            })
            .cloned()
            .collect())
    }

    async fn get_product(&self, id: u64) -> Result<ProductResponse, RepoError> {
        self.read()?
            .products
            .iter()
            .find(|product| product.id == id)
            .cloned()
            .ok_or(RepoError::NotFound)
    }

    async fn create_product(
        &self,
        request: &ProductCreateRequest,
    ) -> Result<ProductResponse, RepoError> {
        let mut tables = self.write();
        let category = tables.category(request.category_id)?;
        let id = tables.allocate();
        let product = ProductResponse {
            id,
            name: request.name.clone(),
            image: request.image.clone(),
            price: request.price,
            category_id: category.id,
            category,
            description: request.description.clone(),
            created_at: None,
            updated_at: None,
        };
        tables.products.push(product.clone());
        Ok(product)
    }

    async fn update_product(
        &self,
        id: u64,
        request: &ProductUpdateRequest,
    ) -> Result<ProductResponse, RepoError> {
        let mut tables = self.write();
        let category = request
            .category_id
            .map(|category_id| tables.category(category_id))
            .transpose()?;
        let product = tables
            .products
            .iter_mut()
            .find(|product| product.id == id)
            .ok_or(RepoError::NotFound)?;

        if let Some(name) = &request.name {
            product.name = name.clone();
        }
        if let Some(price) = request.price {
            product.price = price;
        }
        if let Some(image) = &request.image {
            product.image = image.clone();
        }
        if let Some(description) = &request.description {
            product.description = description.clone();
        }
        if let Some(category) = category {
            product.category_id = category.id;
            product.category = category;
        }
        Ok(product.clone())
    }

    async fn delete_product(&self, id: u64) -> Result<(), RepoError> {
        let mut tables = self.write();
        let before = tables.products.len();
        tables.products.retain(|product| product.id != id);
        if tables.products.len() == before {
            return Err(RepoError::NotFound);
        }
        Ok(())
    }
}

#[async_trait]
impl CategoryGateway for FakeApi {
    async fn list_categories(&self) -> Result<Vec<CategoryResponse>, RepoError> {
        Ok(self.read()?.categories.clone())
    }

    async fn get_category(&self, id: u64) -> Result<CategoryResponse, RepoError> {
        self.read()?
            .categories
            .iter()
            .find(|category| category.id == id)
            .cloned()
            .ok_or(RepoError::NotFound)
    }

    async fn create_category(
        &self,
        request: &CategoryRequest,
    ) -> Result<CategoryResponse, RepoError> {
        let mut tables = self.write();
        let id = tables.allocate();
        let category = category_row(id, &request.name);
        tables.categories.push(category.clone());
        Ok(category)
    }

    async fn update_category(
        &self,
        id: u64,
        request: &CategoryRequest,
    ) -> Result<CategoryResponse, RepoError> {
        let mut tables = self.write();
        let category = tables
            .categories
            .iter_mut()
            .find(|category| category.id == id)
            .ok_or(RepoError::NotFound)?;
        category.name = request.name.clone();
        let updated = category.clone();
        for product in &mut tables.products {
            if product.category_id == id {
                product.category = updated.clone();
            }
        }
        Ok(updated)
    }

    async fn delete_category(&self, id: u64) -> Result<(), RepoError> {
        let mut tables = self.write();
        let before = tables.categories.len();
        tables.categories.retain(|category| category.id != id);
        if tables.categories.len() == before {
            return Err(RepoError::NotFound);
        }
        Ok(())
    }
}
