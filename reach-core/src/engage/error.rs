use thiserror::Error;

use crate::browser::BrowserError;

pub type EngageResult<T> = Result<T, EngageError>;

#[derive(Debug, Error)]
pub enum EngageError {
    #[error("authentication failed: {0}")]
    Authentication(String),
    #[error("authentication required: {0}")]
    AuthenticationRequired(String),
    #[error("listing {url} unavailable: {source}")]
    ListingUnavailable {
        url: String,
        #[source]
        source: BrowserError,
    },
    #[error("navigation to {url} failed: {source}")]
    Navigation {
        url: String,
        #[source]
        source: BrowserError,
    },
    #[error("invalid search criterion: {0}")]
    InvalidCriterion(String),
    #[error("prior-action cache error: {0}")]
    Cache(String),
    #[error("run cancelled")]
    Cancelled,
    #[error(transparent)]
    Browser(#[from] BrowserError),
}

impl EngageError {
    /// Errors that end the whole run instead of a single item.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            EngageError::Authentication(_)
                | EngageError::AuthenticationRequired(_)
                | EngageError::ListingUnavailable { .. }
                | EngageError::InvalidCriterion(_)
                | EngageError::Cancelled
        )
    }
}
