use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use chrono::{Duration, Utc};
use jsonwebtoken::{encode, EncodingKey, Header};
use serde::Serialize;
use shared::{
    domain::{ChannelType, TokenRequestKind},
    error::ApiError,
    protocol::{TokenRequest, TokenResponse},
};
use tracing::warn;
use voice_backend::IdentifierScheme;

use super::{TokenExchange, TokenExchangeError};
use crate::settings::{VoiceSettings, MAX_TOKEN_TTL_SECONDS};

const DEFAULT_DEV_SIGNING_KEY: &str = "dev-signing-key";
const DEFAULT_TTL_SECONDS: i64 = 90;

#[derive(Debug, Serialize)]
struct VoiceTokenClaims {
    iss: String,
    exp: i64,
    vxa: &'static str,
    vxi: u64,
    f: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    t: Option<String>,
}

/// Issues signed voice tokens in-process. Meant for local development and
/// the loopback backend; production builds use [`super::HttpTokenExchange`].
pub struct DevTokenExchange {
    issuer: String,
    ids: IdentifierScheme,
    server_uri: String,
    signing_key: String,
    ttl: Duration,
    serial: AtomicU64,
}

impl DevTokenExchange {
    pub fn new(
        issuer: impl Into<String>,
        domain: impl Into<String>,
        server_uri: impl Into<String>,
        signing_key: impl Into<String>,
        ttl_seconds: i64,
    ) -> Self {
        let issuer = issuer.into();
        Self {
            ids: IdentifierScheme::new(issuer.clone(), domain),
            issuer,
            server_uri: server_uri.into(),
            signing_key: signing_key.into(),
            ttl: token_ttl(ttl_seconds),
            serial: AtomicU64::new(0),
        }
    }

    pub fn from_settings(settings: &VoiceSettings) -> Self {
        Self::new(
            settings.issuer.clone(),
            settings.domain.clone(),
            settings.server_uri.clone(),
            settings
                .dev_signing_key
                .clone()
                .unwrap_or_else(|| DEFAULT_DEV_SIGNING_KEY.to_string()),
            settings.token_ttl_seconds,
        )
    }

    fn claims(&self, request: &TokenRequest) -> Result<VoiceTokenClaims, ApiError> {
        if request.username.trim().is_empty() {
            return Err(ApiError::new(400, "username is required"));
        }

        let target = match request.kind {
            TokenRequestKind::Login => None,
            TokenRequestKind::Join => {
                let channel = request
                    .channel_id
                    .as_deref()
                    .filter(|channel| !channel.is_empty())
                    .ok_or_else(|| ApiError::new(400, "channelId is required for join"))?;
                let kind = request.channel_type.unwrap_or(ChannelType::NonPositional);
                Some(self.ids.channel(channel, kind).uri())
            }
        };

        Ok(VoiceTokenClaims {
            iss: self.issuer.clone(),
            exp: (Utc::now() + self.ttl).timestamp(),
            vxa: request.kind.as_str(),
            vxi: self.serial.fetch_add(1, Ordering::SeqCst) + 1,
            f: self.ids.account(&request.username).uri(),
            t: target,
        })
    }
}

#[async_trait]
impl TokenExchange for DevTokenExchange {
    async fn generate_token(
        &self,
        request: TokenRequest,
    ) -> Result<TokenResponse, TokenExchangeError> {
        let claims = self.claims(&request)?;
        let access_token = encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(self.signing_key.as_bytes()),
        )
        .map_err(|err| TokenExchangeError::Signing(err.to_string()))?;

        Ok(TokenResponse {
            access_token,
            uri: self.server_uri.clone(),
        })
    }
}

fn token_ttl(seconds: i64) -> Duration {
    if (1..=MAX_TOKEN_TTL_SECONDS).contains(&seconds) {
        if let Some(ttl) = Duration::try_seconds(seconds) {
            return ttl;
        }
    }
    warn!("voice: token ttl out of range seconds={seconds}, using {DEFAULT_TTL_SECONDS}");
    Duration::seconds(DEFAULT_TTL_SECONDS)
}
