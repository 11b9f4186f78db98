use serde::{Deserialize, Serialize};

/// What a voice token is being issued for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenRequestKind {
    Login,
    Join,
}

impl TokenRequestKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Login => "login",
            Self::Join => "join",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelType {
    #[default]
    NonPositional,
    Positional,
    Echo,
}

impl ChannelType {
    /// Prefix used by the backend to tag conference channels of this type.
    pub fn conference_prefix(self) -> &'static str {
        match self {
            Self::NonPositional => "confctl-g-",
            Self::Positional => "confctl-d-",
            Self::Echo => "confctl-e-",
        }
    }
}
