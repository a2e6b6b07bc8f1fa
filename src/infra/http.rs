//! REST gateway for the remote catalog store.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, StatusCode, Url};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};
use vitrine_api_types::{
    ApiEnvelope, CategoryRequest, CategoryResponse, ErrorResponse, ProductCreateRequest,
    ProductListQuery, ProductResponse, ProductUpdateRequest,
};

use crate::application::repos::{CategoryGateway, ProductGateway, RepoError};
use crate::domain::entities::{CategoryId, ProductId};

use super::error::InfraError;

/// Talks to `<base>/api/products` and `<base>/api/categories`.
#[derive(Clone, Debug)]
pub struct HttpGateway {
    client: Client,
    base: Url,
}

impl HttpGateway {
    pub fn new(base: &Url, timeout: Duration) -> Result<Self, InfraError> {
        let client = Client::builder()
            .user_agent(Self::user_agent())
            .timeout(timeout)
            .build()?;

        let mut base = base.clone();
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        let base = base
            .join("api/")
            .map_err(|err| InfraError::configuration(format!("invalid api base url: {err}")))?;

        Ok(Self { client, base })
    }

    pub fn user_agent() -> &'static str {
        concat!("vitrine/", env!("CARGO_PKG_VERSION"))
    }

    fn url(&self, path: &str, query: &[(&str, &str)]) -> Result<Url, RepoError> {
        let mut url = self
            .base
            .join(path)
            .map_err(|err| RepoError::Transport(format!("invalid request path `{path}`: {err}")))?;
        if !query.is_empty() {
            let mut pairs = url.query_pairs_mut();
            for (key, value) in query {
                pairs.append_pair(key, value);
            }
        }
        Ok(url)
    }

    async fn get<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, &str)],
    ) -> Result<T, RepoError> {
        let url = self.url(path, query)?;
        decode(&self.execute(self.client.get(url)).await?)
    }

    async fn send<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        method: Method,
        path: &str,
        body: &B,
    ) -> Result<T, RepoError> {
        let url = self.url(path, &[])?;
        decode(&self.execute(self.client.request(method, url).json(body)).await?)
    }

    async fn delete(&self, path: &str) -> Result<(), RepoError> {
        let url = self.url(path, &[])?;
        self.execute(self.client.delete(url)).await.map(|_| ())
    }

    async fn execute(&self, request: RequestBuilder) -> Result<Vec<u8>, RepoError> {
        let request = request.build().map_err(RepoError::from_transport)?;
        let method = request.method().clone();
        let path = request.url().path().to_string();
        let started_at = Instant::now();

        let response = self.client.execute(request).await.map_err(|err| {
            warn!(%method, path = %path, error = %err, "Gateway request failed");
            RepoError::from_transport(err)
        })?;
        let status = response.status();
        let bytes = response
            .bytes()
            .await
            .map_err(RepoError::from_transport)?;

        debug!(
            %method,
            path = %path,
            status = status.as_u16(),
            elapsed_ms = started_at.elapsed().as_millis() as u64,
            "Gateway call"
        );

        if status == StatusCode::NOT_FOUND {
            return Err(RepoError::NotFound);
        }
        if !status.is_success() {
            return Err(RepoError::Status {
                status: status.as_u16(),
                message: error_message(&bytes),
            });
        }
        Ok(bytes.to_vec())
    }
}

fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, RepoError> {
    serde_json::from_slice::<ApiEnvelope<T>>(bytes)
        .map(|envelope| envelope.data)
        .map_err(|err| RepoError::Decode(err.to_string()))
}

fn error_message(bytes: &[u8]) -> String {
    match serde_json::from_slice::<ErrorResponse>(bytes) {
        Ok(body) => body.error,
        Err(_) => String::from_utf8_lossy(bytes).into_owned(),
    }
}

#[async_trait]
impl ProductGateway for HttpGateway {
    async fn list_products(
        &self,
        query: &ProductListQuery,
    ) -> Result<Vec<ProductResponse>, RepoError> {
        let mut pairs = Vec::new();
        if let Some(name) = query.name.as_deref() {
            pairs.push(("name", name));
        }
        if let Some(category) = query.category.as_deref() {
            pairs.push(("category", category));
        }
        self.get("products", &pairs).await
    }

    async fn get_product(&self, id: ProductId) -> Result<ProductResponse, RepoError> {
        self.get(&format!("products/{id}"), &[]).await
    }

    async fn create_product(
        &self,
        request: &ProductCreateRequest,
    ) -> Result<ProductResponse, RepoError> {
        self.send(Method::POST, "products", request).await
    }

    async fn update_product(
        &self,
        id: ProductId,
        request: &ProductUpdateRequest,
    ) -> Result<ProductResponse, RepoError> {
        self.send(Method::PUT, &format!("products/{id}"), request)
            .await
    }

    async fn delete_product(&self, id: ProductId) -> Result<(), RepoError> {
        self.delete(&format!("products/{id}")).await
    }
}

#[async_trait]
impl CategoryGateway for HttpGateway {
    async fn list_categories(&self) -> Result<Vec<CategoryResponse>, RepoError> {
        self.get("categories", &[]).await
    }

    async fn get_category(&self, id: CategoryId) -> Result<CategoryResponse, RepoError> {
        self.get(&format!("categories/{id}"), &[]).await
    }

    async fn create_category(
        &self,
        request: &CategoryRequest,
    ) -> Result<CategoryResponse, RepoError> {
        self.send(Method::POST, "categories", request).await
    }

    async fn update_category(
        &self,
        id: CategoryId,
        request: &CategoryRequest,
    ) -> Result<CategoryResponse, RepoError> {
        self.send(Method::PUT, &format!("categories/{id}"), request)
            .await
    }

    async fn delete_category(&self, id: CategoryId) -> Result<(), RepoError> {
        self.delete(&format!("categories/{id}")).await
    }
}
