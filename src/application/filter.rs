//! Client-side derivation of a filtered view over a cached collection.
//!
//! Everything here is synchronous and side-effect free: it never fetches and
//! never writes to the cache.

use std::sync::Arc;

use serde::Deserialize;

use crate::domain::entities::Product;

/// Fields the filter engine reads from an entity.
pub trait Filterable {
    fn name(&self) -> &str;
    fn description(&self) -> &str;
    fn category(&self) -> &str;
}

impl Filterable for Product {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn category(&self) -> &str {
        &self.category
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CategoryFilter {
    #[default]
    All,
    /// Exact, case-sensitive category name.
    Named(String),
}

impl CategoryFilter {
    /// `"ALL"` (the option every category picker starts with) maps to [`CategoryFilter::All`].
    pub fn parse(raw: &str) -> Self {
        if raw == "ALL" {
            Self::All
        } else {
            Self::Named(raw.to_string())
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Deserialize)]
#[serde(default)]
pub struct FilterState {
    pub search_text: String,
    pub category: CategoryFilter,
}

impl FilterState {
    pub fn search(text: impl Into<String>) -> Self {
        Self {
            search_text: text.into(),
            category: CategoryFilter::All,
        }
    }

    pub fn category(name: impl Into<String>) -> Self {
        Self {
            search_text: String::new(),
            category: CategoryFilter::Named(name.into()),
        }
    }

    pub fn with_search(mut self, text: impl Into<String>) -> Self {
        self.search_text = text.into();
        self
    }

    pub fn with_category(mut self, category: CategoryFilter) -> Self {
        self.category = category;
        self
    }
}

/// Returns the entities matching `filter`, in their original order.
pub fn apply<T: Filterable + Clone>(base: &[T], filter: &FilterState) -> Vec<T> {
    let needle = filter.search_text.to_lowercase();

    base.iter()
        .filter(|entity| match &filter.category {
            CategoryFilter::All => true,
            CategoryFilter::Named(name) => entity.category() == name,
        })
        .filter(|entity| {
            needle.is_empty()
                || entity.name().to_lowercase().contains(&needle)
                || entity.description().to_lowercase().contains(&needle)
        })
        .cloned()
        .collect()
}

/// Memoized [`apply`] keyed on the identity of the base collection and the
/// filter state.
pub struct FilteredView<T> {
    base: Option<Arc<Vec<T>>>,
    filter: Option<FilterState>,
    result: Vec<T>,
    recomputations: u64,
}

impl<T: Filterable + Clone> FilteredView<T> {
    pub fn new() -> Self {
        Self {
            base: None,
            filter: None,
            result: Vec::new(),
            recomputations: 0,
        }
    }

    /// Returns the view for `base` filtered by `filter`, recomputing only when
    /// either input changed since the last call.
    pub fn view(&mut self, base: &Arc<Vec<T>>, filter: &FilterState) -> &[T] {
        let same_base = self
            .base
            .as_ref()
            .is_some_and(|previous| Arc::ptr_eq(previous, base));
        let same_filter = self.filter.as_ref() == Some(filter);

        if !(same_base && same_filter) {
            self.result = apply(base, filter);
            self.base = Some(Arc::clone(base));
            self.filter = Some(filter.clone());
            self.recomputations += 1;
        }

        &self.result
    }

    pub fn recomputations(&self) -> u64 {
        self.recomputations
    }
}

impl<T: Filterable + Clone> Default for FilteredView<T> {
    fn default() -> Self {
        Self::new()
    }
}
