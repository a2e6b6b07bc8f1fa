//! Cache effects declared by a successful write.
//!
//! A plan is built from what the write returned and applied in one go after
//! the write resolved. Nothing here talks to a repository.

use std::fmt;

use crate::domain::entities::{Category, CategoryId, Product, ProductId};

use super::data::{CatalogCache, CatalogData};
use super::keys::{CATEGORIES, KeyFamily, PRODUCTS, QueryKey};

#[derive(Debug, Clone, PartialEq)]
pub enum CacheEffect {
    /// Mark every entry under the prefix stale.
    Invalidate(QueryKey),
    /// Replace the entry with the value the store returned.
    SetData(QueryKey, CatalogData),
    Remove(QueryKey),
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct EffectPlan {
    effects: Vec<CacheEffect>,
}

impl fmt::Display for EffectPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("EffectPlan {")?;
        for (index, effect) in self.effects.iter().enumerate() {
            let sep = if index == 0 { " " } else { ", " };
            match effect {
                CacheEffect::Invalidate(key) => write!(f, "{sep}invalidate {key}")?,
                CacheEffect::SetData(key, _) => write!(f, "{sep}set {key}")?,
                CacheEffect::Remove(key) => write!(f, "{sep}remove {key}")?,
            }
        }
        f.write_str(" }")
    }
}

impl EffectPlan {
    pub fn product_created() -> Self {
        Self::default().invalidate_lists(&PRODUCTS)
    }

    pub fn product_updated(product: &Product) -> Self {
        Self::default().invalidate_lists(&PRODUCTS).push(CacheEffect::SetData(
            PRODUCTS.detail(product.id),
            CatalogData::Product(product.clone()),
        ))
    }

    pub fn product_deleted(id: ProductId) -> Self {
        Self::default()
            .invalidate_lists(&PRODUCTS)
            .push(CacheEffect::Remove(PRODUCTS.detail(id)))
    }

    pub fn category_created() -> Self {
        Self::default()
            .invalidate_lists(&CATEGORIES)
            .invalidate_lists(&PRODUCTS)
    }

    pub fn category_updated(category: &Category) -> Self {
        Self::default()
            .invalidate_lists(&CATEGORIES)
            .push(CacheEffect::SetData(
                CATEGORIES.detail(category.id),
                CatalogData::Category(category.clone()),
            ))
            .invalidate_lists(&PRODUCTS)
    }

    pub fn category_deleted(id: CategoryId) -> Self {
        Self::default()
            .invalidate_lists(&CATEGORIES)
            .push(CacheEffect::Remove(CATEGORIES.detail(id)))
            .invalidate_lists(&PRODUCTS)
    }

    /// Adds the category list refresh owed when a write created a category
    /// on the way.
    pub fn with_created_category(self) -> Self {
        self.invalidate_lists(&CATEGORIES)
    }

    pub fn effects(&self) -> &[CacheEffect] {
        &self.effects
    }

    /// Applies every effect in order. Returns how many entries were touched.
    pub fn apply(&self, cache: &CatalogCache) -> usize {
        self.effects
            .iter()
            .map(|effect| match effect {
                CacheEffect::Invalidate(prefix) => cache.invalidate(prefix),
                CacheEffect::SetData(key, value) => {
                    cache.set_data(key, value.clone());
                    1
                }
                CacheEffect::Remove(key) => usize::from(cache.remove(key)),
            })
            .sum()
    }

    fn invalidate_lists(self, family: &KeyFamily) -> Self {
        let prefix = family.lists();
        if self
            .effects
            .iter()
            .any(|effect| matches!(effect, CacheEffect::Invalidate(key) if *key == prefix))
        {
            return self;
        }
        self.push(CacheEffect::Invalidate(prefix))
    }

    fn push(mut self, effect: CacheEffect) -> Self {
        self.effects.push(effect);
        self
    }
}
