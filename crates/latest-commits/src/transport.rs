use std::sync::Arc;

use crate::auth::Auth;

/// Errors a single GET can produce.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    /// DNS, connect, read or timeout failure. No status was received.
    #[error("connection error: {0}")]
    Connection(String),

    /// The server answered with a non-2xx status.
    #[error("HTTP {status}: {message}")]
    Http { status: u16, message: String },
}

impl TransportError {
    pub fn http(status: u16, message: impl Into<String>) -> Self {
        Self::Http {
            status,
            message: message.into(),
        }
    }

    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection(message.into())
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Http { status, .. } => Some(*status),
            Self::Connection(_) => None,
        }
    }

    /// 401 and 403 mean the credentials are wrong for the whole run.
    pub fn is_auth(&self) -> bool {
        matches!(self.status(), Some(401 | 403))
    }
}

/// Performs a single authenticated GET and returns the response body.
///
/// Implementations bound each call with their own request timeout and must
/// be safe to share between concurrent fetches.
#[async_trait::async_trait]
pub trait Transport: Send + Sync {
    async fn get(&self, url: &str, auth: &Auth) -> Result<Vec<u8>, TransportError>;
}

#[async_trait::async_trait]
impl<T: Transport + ?Sized> Transport for Arc<T> {
    async fn get(&self, url: &str, auth: &Auth) -> Result<Vec<u8>, TransportError> {
        (**self).get(url, auth).await
    }
}
