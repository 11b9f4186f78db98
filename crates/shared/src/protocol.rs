use serde::{Deserialize, Serialize};

use crate::domain::{ChannelType, TokenRequestKind};

/// Body sent to the token issuing service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenRequest {
    #[serde(rename = "type")]
    pub kind: TokenRequestKind,
    pub username: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub channel_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub channel_type: Option<ChannelType>,
}

impl TokenRequest {
    pub fn login(username: impl Into<String>) -> Self {
        Self {
            kind: TokenRequestKind::Login,
            username: username.into(),
            channel_id: None,
            channel_type: None,
        }
    }

    pub fn join(
        username: impl Into<String>,
        channel_id: impl Into<String>,
        channel_type: ChannelType,
    ) -> Self {
        Self {
            kind: TokenRequestKind::Join,
            username: username.into(),
            channel_id: Some(channel_id.into()),
            channel_type: Some(channel_type),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub uri: String,
}
