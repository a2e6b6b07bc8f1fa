//! Write-side invariants.
//!
//! A write can only reach a repository through one of the `Valid*` wrappers
//! below, and the only way to obtain one is to pass validation.

use super::entities::{ProductDraft, ProductPatch};
use super::error::DomainError;

pub const MIN_CATEGORY_NAME_LEN: usize = 2;

/// A product draft whose name, price and category name satisfy the invariants.
/// Text fields are stored trimmed.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidProductDraft(ProductDraft);

impl ValidProductDraft {
    pub fn get(&self) -> &ProductDraft {
        &self.0
    }

    pub fn category_name(&self) -> CategoryName {
        CategoryName(self.0.category.clone())
    }

    pub fn into_inner(self) -> ProductDraft {
        self.0
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ValidProductPatch(ProductPatch);

impl ValidProductPatch {
    pub fn get(&self) -> &ProductPatch {
        &self.0
    }

    /// The new category name, when the patch moves the product.
    pub fn category_name(&self) -> Option<CategoryName> {
        self.0.category.clone().map(CategoryName)
    }

    pub fn into_inner(self) -> ProductPatch {
        self.0
    }
}

/// A trimmed category name of at least [`MIN_CATEGORY_NAME_LEN`] characters.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CategoryName(String);

impl CategoryName {
    pub fn parse(raw: &str) -> Result<Self, DomainError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(DomainError::validation("category name is required"));
        }
        if trimmed.chars().count() < MIN_CATEGORY_NAME_LEN {
            return Err(DomainError::validation(format!(
                "category name must be at least {MIN_CATEGORY_NAME_LEN} characters"
            )));
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

pub fn validate_product_draft(draft: ProductDraft) -> Result<ValidProductDraft, DomainError> {
    let name = product_name(&draft.name)?;
    ensure_positive_price(draft.price)?;
    let category = CategoryName::parse(&draft.category)?;

    Ok(ValidProductDraft(ProductDraft {
        name,
        price: draft.price,
        image: draft.image.trim().to_string(),
        category: category.into_inner(),
        description: draft.description.trim().to_string(),
    }))
}

pub fn validate_product_patch(patch: ProductPatch) -> Result<ValidProductPatch, DomainError> {
    let name = patch.name.as_deref().map(product_name).transpose()?;
    if let Some(price) = patch.price {
        ensure_positive_price(price)?;
    }
    let category = patch
        .category
        .as_deref()
        .map(CategoryName::parse)
        .transpose()?
        .map(CategoryName::into_inner);

    Ok(ValidProductPatch(ProductPatch {
        name,
        price: patch.price,
        image: patch.image.map(|value| value.trim().to_string()),
        category,
        description: patch.description.map(|value| value.trim().to_string()),
    }))
}

fn product_name(raw: &str) -> Result<String, DomainError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(DomainError::validation("product name is required"));
    }
    Ok(trimmed.to_string())
}

fn ensure_positive_price(price: f64) -> Result<(), DomainError> {
    // NaN fails this comparison as well.
    if !(price.is_finite() && price > 0.0) {
        return Err(DomainError::validation("price must be greater than zero"));
    }
    Ok(())
}
