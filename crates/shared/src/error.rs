use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error body returned by the token issuing service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Error)]
#[serde(rename_all = "camelCase")]
#[error("{error_code}: {error_message}")]
pub struct ApiError {
    pub error_code: i32,
    #[serde(default)]
    pub error_message: String,
}

impl ApiError {
    pub fn new(error_code: i32, error_message: impl Into<String>) -> Self {
        Self {
            error_code,
            error_message: error_message.into(),
        }
    }
}
