//! In-memory repositories for unit tests.

use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;

use crate::application::repos::{
    CategoriesRepo, CreateProductParams, ProductQueryFilter, ProductsRepo, RepoError,
    UpdateProductParams,
};
use crate::domain::entities::{Category, CategoryId, Product, ProductId};

#[derive(Default)]
struct Rows {
    products: Vec<(Product, CategoryId)>,
    categories: Vec<Category>,
    next_id: u64,
}

impl Rows {
    fn allocate(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    fn category_name(&self, id: CategoryId) -> Result<String, RepoError> {
        self.categories
            .iter()
            .find(|category| category.id == id)
            .map(|category| category.name.clone())
            .ok_or(RepoError::Status {
                status: 400,
                message: format!("unknown category {id}"),
            })
    }
}

/// Products and categories kept in one table set, like the remote store.
/// Every repository call is counted; writes can be made to fail.
#[derive(Default)]
pub(crate) struct InMemoryCatalog {
    rows: Mutex<Rows>,
    calls: AtomicUsize,
    failing_writes: AtomicUsize,
    failing_product_writes: AtomicUsize,
}

impl InMemoryCatalog {
    pub(crate) fn seeded(categories: &[&str], products: &[(&str, f64, &str, &str)]) -> Self {
        let catalog = Self::default();
        {
            let mut rows = catalog.rows.lock().unwrap();
            for name in categories {
                let id = rows.allocate();
                rows.categories.push(Category {
                    id,
                    name: (*name).to_string(),
                });
            }
            for (name, price, category, description) in products {
                let category = rows
                    .categories
                    .iter()
                    .find(|row| row.name == *category)
                    .cloned()
                    .expect("seeded product uses a seeded category");
                let id = rows.allocate();
                rows.products.push((
                    Product {
                        id,
                        name: (*name).to_string(),
                        price: *price,
                        image: String::new(),
                        category: category.name,
                        description: (*description).to_string(),
                    },
                    category.id,
                ));
            }
        }
        catalog
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// The next `count` writes fail with a transport error.
    pub(crate) fn fail_writes(&self, count: usize) {
        self.failing_writes.store(count, Ordering::SeqCst);
    }

    /// The next `count` product writes fail; category writes go through.
    pub(crate) fn fail_product_writes(&self, count: usize) {
        self.failing_product_writes.store(count, Ordering::SeqCst);
    }

    pub(crate) fn category_names(&self) -> Vec<String> {
        let rows = self.rows.lock().unwrap();
        rows.categories.iter().map(|row| row.name.clone()).collect()
    }

    pub(crate) fn product_id(&self, name: &str) -> ProductId {
        let rows = self.rows.lock().unwrap();
        rows.products
            .iter()
            .find(|(product, _)| product.name == name)
            .map(|(product, _)| product.id)
            .expect("product exists")
    }

    pub(crate) fn category_id(&self, name: &str) -> CategoryId {
        let rows = self.rows.lock().unwrap();
        rows.categories
            .iter()
            .find(|category| category.name == name)
            .map(|category| category.id)
            .expect("category exists")
    }

    fn read(&self) -> std::sync::MutexGuard<'_, Rows> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.rows.lock().unwrap()
    }

    fn write(&self) -> Result<std::sync::MutexGuard<'_, Rows>, RepoError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if take_one(&self.failing_writes) {
            return Err(RepoError::Transport("connection reset by peer".into()));
        }
        Ok(self.rows.lock().unwrap())
    }

    fn product_write(&self) -> Result<std::sync::MutexGuard<'_, Rows>, RepoError> {
        if take_one(&self.failing_product_writes) {
            self.calls.fetch_add(1, Ordering::SeqCst);
            return Err(RepoError::Transport("connection reset by peer".into()));
        }
        self.write()
    }
}

fn take_one(counter: &AtomicUsize) -> bool {
    counter
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
        .is_ok()
}

#[async_trait]
impl ProductsRepo for InMemoryCatalog {
    async fn list(&self, filter: &ProductQueryFilter) -> Result<Vec<Product>, RepoError> {
        let rows = self.read();
        let needle = filter.name.as_deref().map(str::to_lowercase);
        Ok(rows
            .products
            .iter()
            .map(|(product, _)| product)
            .filter(|product| {
                filter
                    .category
                    .as_deref()
                    .is_none_or(|category| product.category == category)
            })
            .filter(|product| {
                needle
                    .as_deref()
                    .is_none_or(|needle| product.name.to_lowercase().contains(needle))
            })
            .cloned()
            .collect())
    }

    async fn get(&self, id: ProductId) -> Result<Product, RepoError> {
        self.read()
            .products
            .iter()
            .find(|(product, _)| product.id == id)
            .map(|(product, _)| product.clone())
            .ok_or(RepoError::NotFound)
    }

    async fn create(&self, params: CreateProductParams) -> Result<Product, RepoError> {
        let mut rows = self.product_write()?;
        let category = rows.category_name(params.category_id)?;
        let id = rows.allocate();
        let product = Product {
            id,
            name: params.name,
            price: params.price,
            image: params.image,
            category,
            description: params.description,
        };
        rows.products.push((product.clone(), params.category_id));
        Ok(product)
    }

    async fn update(&self, params: UpdateProductParams) -> Result<Product, RepoError> {
        let mut rows = self.product_write()?;
        let category = params
            .category_id
            .map(|id| rows.category_name(id).map(|name| (id, name)))
            .transpose()?;
        let (product, category_id) = rows
            .products
            .iter_mut()
            .find(|(product, _)| product.id == params.id)
            .ok_or(RepoError::NotFound)?;

        if let Some(name) = params.name {
            product.name = name;
        }
        if let Some(price) = params.price {
            product.price = price;
        }
        if let Some(image) = params.image {
            product.image = image;
        }
        if let Some(description) = params.description {
            product.description = description;
        }
        if let Some((id, name)) = category {
            *category_id = id;
            product.category = name;
        }
        Ok(product.clone())
    }

    async fn delete(&self, id: ProductId) -> Result<(), RepoError> {
        let mut rows = self.product_write()?;
        let before = rows.products.len();
        rows.products.retain(|(product, _)| product.id != id);
        if rows.products.len() == before {
            return Err(RepoError::NotFound);
        }
        Ok(())
    }
}

#[async_trait]
impl CategoriesRepo for InMemoryCatalog {
    async fn list(&self) -> Result<Vec<Category>, RepoError> {
        Ok(self.read().categories.clone())
    }

    async fn get(&self, id: CategoryId) -> Result<Category, RepoError> {
        self.read()
            .categories
            .iter()
            .find(|category| category.id == id)
            .cloned()
            .ok_or(RepoError::NotFound)
    }

    async fn find_by_name(&self, name: &str) -> Result<Option<Category>, RepoError> {
        Ok(self
            .read()
            .categories
            .iter()
            .find(|category| category.name == name)
            .cloned())
    }

    async fn create(&self, name: &str) -> Result<Category, RepoError> {
        let mut rows = self.write()?;
        let id = rows.allocate();
        let category = Category {
            id,
            name: name.to_string(),
        };
        rows.categories.push(category.clone());
        Ok(category)
    }

    async fn update(&self, id: CategoryId, name: &str) -> Result<Category, RepoError> {
        let mut rows = self.write()?;
        let category = rows
            .categories
            .iter_mut()
            .find(|category| category.id == id)
            .ok_or(RepoError::NotFound)?;
        category.name = name.to_string();
        let updated = category.clone();

        for (product, category_id) in &mut rows.products {
            if *category_id == id {
                product.category = updated.name.clone();
            }
        }
        Ok(updated)
    }

    async fn delete(&self, id: CategoryId) -> Result<(), RepoError> {
        let mut rows = self.write()?;
        let before = rows.categories.len();
        rows.categories.retain(|category| category.id != id);
        if rows.categories.len() == before {
            return Err(RepoError::NotFound);
        }
        Ok(())
    }
}
