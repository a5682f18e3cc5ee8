use thiserror::Error;

pub type BrowserResult<T> = Result<T, BrowserError>;

#[derive(Debug, Error)]
pub enum BrowserError {
    #[error("chromium launch failed: {0}")]
    Launch(String),
    #[error("cdp error: {0}")]
    Cdp(#[from] chromiumoxide::error::CdpError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("timeout waiting for {0}")]
    Timeout(String),
    #[error("navigation to {url} failed: {reason}")]
    Navigation { url: String, reason: String },
    #[error("configuration error: {0}")]
    Configuration(String),
    #[error("profile error: {0}")]
    Profile(String),
    #[error("script evaluation failed: {0}")]
    Script(String),
    #[error("unexpected error: {0}")]
    Unexpected(String),
}

impl BrowserError {
    /// Errors worth one more attempt at the same step.
    pub fn is_transient(&self) -> bool {
        match self {
            BrowserError::Timeout(_) | BrowserError::Navigation { .. } => true,
            BrowserError::Cdp(err) => {
                let text = err.to_string().to_lowercase();
                text.contains("timeout") || text.contains("net::err")
            }
            _ => false,
        }
    }
}

impl From<tokio::task::JoinError> for BrowserError {
    fn from(err: tokio::task::JoinError) -> Self {
        BrowserError::Unexpected(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeouts_and_navigation_are_transient() {
        assert!(BrowserError::Timeout("navigation".into()).is_transient());
        assert!(BrowserError::Navigation {
            url: "https://example.com".into(),
            reason: "net::ERR_CONNECTION_RESET".into(),
        }
        .is_transient());
        assert!(!BrowserError::Script("syntax error".into()).is_transient());
        assert!(!BrowserError::Configuration("bad".into()).is_transient());
    }
}
