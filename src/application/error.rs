use thiserror::Error;

use crate::{application::repos::RepoError, cache::FetchError, domain::error::DomainError};

/// Error surfaced by every read and write of the catalog.
///
/// Cache entries keep the last error they settled with, so the type is
/// `Clone` and carries rendered messages rather than boxed sources.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CatalogError {
    #[error("validation failed: {message}")]
    Validation { message: String },
    /// `retryable` is false for answers that would repeat verbatim, such as
    /// client errors and undecodable bodies.
    #[error("remote store failed: {message}")]
    Remote { message: String, retryable: bool },
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: u64 },
}

impl CatalogError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    /// Remote failure that another attempt will not fix.
    pub fn remote(message: impl Into<String>) -> Self {
        Self::Remote {
            message: message.into(),
            retryable: false,
        }
    }

    pub fn transient(message: impl Into<String>) -> Self {
        Self::Remote {
            message: message.into(),
            retryable: true,
        }
    }

    /// Maps a repository failure for a lookup of `entity` `id`.
    pub fn from_repo(entity: &'static str, id: Option<u64>, error: RepoError) -> Self {
        match (error, id) {
            (RepoError::NotFound, Some(id)) => Self::NotFound { entity, id },
            (RepoError::Transport(message), _) => {
                Self::transient(format!("transport error: {message}"))
            }
            (RepoError::Status { status, message }, _) if retryable_status(status) => {
                Self::transient(format!("remote store answered {status}: {message}"))
            }
            (other, _) => Self::remote(other.to_string()),
        }
    }

    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation { .. })
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Whether retrying the same call could succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Remote { retryable: true, .. })
    }
}

/// Server errors, timeouts and throttling; every other status is final.
fn retryable_status(status: u16) -> bool {
    status >= 500 || status == 408 || status == 429
}

impl FetchError for CatalogError {
    fn is_retryable(&self) -> bool {
        self.is_transient()
    }

    fn not_scheduled(reason: &str) -> Self {
        Self::remote(reason)
    }
}

impl From<DomainError> for CatalogError {
    fn from(error: DomainError) -> Self {
        match error {
            DomainError::Validation { message } => Self::Validation { message },
            DomainError::NotFound { entity, id } => Self::NotFound { entity, id },
        }
    }
}
