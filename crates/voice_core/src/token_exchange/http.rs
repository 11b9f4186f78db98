use async_trait::async_trait;
use reqwest::Client;
use shared::{
    error::ApiError,
    protocol::{TokenRequest, TokenResponse},
};
use tracing::debug;
use url::Url;

use super::{TokenExchange, TokenExchangeError};

/// Token exchange backed by the game platform's HTTP token endpoint.
pub struct HttpTokenExchange {
    http: Client,
    endpoint: Url,
    access_token: String,
}

impl HttpTokenExchange {
    pub fn new(
        base_url: &str,
        token_path: &str,
        access_token: impl Into<String>,
    ) -> Result<Self, url::ParseError> {
        let endpoint = Url::parse(base_url)?.join(token_path)?;
        Ok(Self {
            http: Client::new(),
            endpoint,
            access_token: access_token.into(),
        })
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }
}

#[async_trait]
impl TokenExchange for HttpTokenExchange {
    async fn generate_token(
        &self,
        request: TokenRequest,
    ) -> Result<TokenResponse, TokenExchangeError> {
        debug!(
            "voice: requesting {} token endpoint={} user={}",
            request.kind.as_str(),
            self.endpoint,
            request.username
        );
        let res = self
            .http
            .post(self.endpoint.clone())
            .bearer_auth(&self.access_token)
            .json(&request)
            .send()
            .await
            .map_err(|err| TokenExchangeError::Transport(err.to_string()))?;

        let status = res.status();
        if status.is_success() {
            return res
                .json::<TokenResponse>()
                .await
                .map_err(|err| TokenExchangeError::Decode(err.to_string()));
        }

        let body = res.text().await.unwrap_or_default();
        let api_error = serde_json::from_str::<ApiError>(&body)
            .unwrap_or_else(|_| ApiError::new(i32::from(status.as_u16()), body));
        Err(TokenExchangeError::Service(api_error))
    }
}
