//! Conversions between wire DTOs and domain entities.

use vitrine_api_types::{
    CategoryRequest, CategoryResponse, ProductCreateRequest, ProductListQuery, ProductResponse,
    ProductUpdateRequest,
};

use crate::application::repos::{CreateProductParams, ProductQueryFilter, UpdateProductParams};
use crate::domain::entities::{Category, Product};

/// Flattens the nested category to its name; the id only matters on writes.
pub fn product_from_response(response: ProductResponse) -> Product {
    Product {
        id: response.id,
        name: response.name,
        price: response.price,
        image: response.image,
        category: response.category.name,
        description: response.description,
    }
}

pub fn category_from_response(response: CategoryResponse) -> Category {
    Category {
        id: response.id,
        name: response.name,
    }
}

pub fn list_query(filter: &ProductQueryFilter) -> ProductListQuery {
    ProductListQuery {
        name: filter.name.clone(),
        category: filter.category.clone(),
    }
}

pub fn create_request(params: CreateProductParams) -> ProductCreateRequest {
    ProductCreateRequest {
        name: params.name,
        image: params.image,
        price: params.price,
        category_id: params.category_id,
        description: params.description,
    }
}

pub fn update_request(params: UpdateProductParams) -> ProductUpdateRequest {
    ProductUpdateRequest {
        name: params.name,
        image: params.image,
        price: params.price,
        category_id: params.category_id,
        description: params.description,
    }
}

pub fn category_request(name: &str) -> CategoryRequest {
    CategoryRequest {
        name: name.to_string(),
    }
}
