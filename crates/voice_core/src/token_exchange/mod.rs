use async_trait::async_trait;
use shared::{
    error::ApiError,
    protocol::{TokenRequest, TokenResponse},
};
use thiserror::Error;

mod dev;
mod http;

pub use dev::DevTokenExchange;
pub use http::HttpTokenExchange;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TokenExchangeError {
    #[error("token service rejected request: {0}")]
    Service(#[from] ApiError),
    #[error("token service request failed: {0}")]
    Transport(String),
    #[error("unexpected token service response: {0}")]
    Decode(String),
    #[error("failed to sign voice token: {0}")]
    Signing(String),
    #[error("credential context was released")]
    CredentialsReleased,
}

/// Exchanges a login or join intent for a short-lived backend credential.
///
/// Implementations own any timeout policy; the orchestrator waits for the
/// result for as long as the implementation takes to produce it.
#[async_trait]
pub trait TokenExchange: Send + Sync {
    async fn generate_token(&self, request: TokenRequest)
        -> Result<TokenResponse, TokenExchangeError>;
}

pub struct MissingTokenExchange;

#[async_trait]
impl TokenExchange for MissingTokenExchange {
    async fn generate_token(
        &self,
        _request: TokenRequest,
    ) -> Result<TokenResponse, TokenExchangeError> {
        Err(TokenExchangeError::Transport(
            "token service is unavailable".to_string(),
        ))
    }
}

#[cfg(test)]
#[path = "../tests/token_exchange_tests.rs"]
mod tests;
