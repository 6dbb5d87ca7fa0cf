use crate::ports::provider::{ProviderError, ProviderKind};

/// Service-level error taxonomy. The HTTP layer downcasts these out of eyre
/// reports to pick a status code.
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("you need to connect your {provider} account first")]
    ServiceNotConnected { provider: ProviderKind },
    #[error("your {provider} connection has expired; reconnect the account")]
    TokenExpired { provider: ProviderKind },
    #[error("{0}")]
    Forbidden(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    InvalidInput(String),
    #[error(transparent)]
    Provider(#[from] ProviderError),
}

impl ServiceError {
    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::Forbidden(message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }

    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput(message.into())
    }
}
