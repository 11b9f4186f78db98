use std::fmt;

use shared::domain::ChannelType;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AccountId {
    issuer: String,
    name: String,
    domain: String,
}

impl AccountId {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn uri(&self) -> String {
        format!("sip:.{}.{}.@{}", self.issuer, self.name, self.domain)
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.uri())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ChannelUri {
    issuer: String,
    name: String,
    domain: String,
    kind: ChannelType,
}

impl ChannelUri {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> ChannelType {
        self.kind
    }

    pub fn uri(&self) -> String {
        format!(
            "sip:{}{}.{}@{}",
            self.kind.conference_prefix(),
            self.issuer,
            self.name,
            self.domain
        )
    }
}

impl fmt::Display for ChannelUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.uri())
    }
}

/// Builds backend identifiers from the configured issuer and domain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentifierScheme {
    issuer: String,
    domain: String,
}

impl IdentifierScheme {
    pub fn new(issuer: impl Into<String>, domain: impl Into<String>) -> Self {
        Self {
            issuer: issuer.into(),
            domain: domain.into(),
        }
    }

    pub fn account(&self, name: &str) -> AccountId {
        AccountId {
            issuer: self.issuer.clone(),
            name: name.to_string(),
            domain: self.domain.clone(),
        }
    }

    pub fn channel(&self, name: &str, kind: ChannelType) -> ChannelUri {
        ChannelUri {
            issuer: self.issuer.clone(),
            name: name.to_string(),
            domain: self.domain.clone(),
            kind,
        }
    }
}

#[cfg(test)]
#[path = "tests/ids_tests.rs"]
mod tests;
