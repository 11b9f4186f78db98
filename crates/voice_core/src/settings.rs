use std::{fs, io, path::Path};

use serde::Deserialize;
use tracing::warn;
use voice_backend::IdentifierScheme;

pub const SETTINGS_FILE: &str = "voice.toml";
/// Upper bound for issued voice tokens: one day.
pub const MAX_TOKEN_TTL_SECONDS: i64 = 24 * 60 * 60;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VoiceSettings {
    pub issuer: String,
    pub domain: String,
    /// Used for login when the token response carries no server URI.
    pub server_uri: String,
    pub token_service_url: Option<String>,
    pub token_path: String,
    pub dev_signing_key: Option<String>,
    pub token_ttl_seconds: i64,
    pub event_capacity: usize,
}

impl Default for VoiceSettings {
    fn default() -> Self {
        Self {
            issuer: "dev-issuer".into(),
            domain: "voice.localhost".into(),
            server_uri: "loopback://voice.localhost".into(),
            token_service_url: None,
            token_path: "/voice/v1/token".into(),
            dev_signing_key: None,
            token_ttl_seconds: 90,
            event_capacity: 256,
        }
    }
}

impl VoiceSettings {
    pub fn identifier_scheme(&self) -> IdentifierScheme {
        IdentifierScheme::new(self.issuer.clone(), self.domain.clone())
    }
}

#[derive(Debug, Default, Deserialize)]
struct SettingsFile {
    issuer: Option<String>,
    domain: Option<String>,
    server_uri: Option<String>,
    token_service_url: Option<String>,
    token_path: Option<String>,
    dev_signing_key: Option<String>,
    token_ttl_seconds: Option<i64>,
    event_capacity: Option<usize>,
}

pub fn load_settings() -> VoiceSettings {
    load_settings_from(Path::new(SETTINGS_FILE), |key| std::env::var(key).ok())
}

/// Layers `path` (if readable) and then the environment over the defaults.
/// For every key, `APP__VOICE_<KEY>` wins over `VOICE_<KEY>`.
pub fn load_settings_from(path: &Path, env: impl Fn(&str) -> Option<String>) -> VoiceSettings {
    let mut settings = VoiceSettings::default();

    match fs::read_to_string(path) {
        Ok(raw) => match toml::from_str::<SettingsFile>(&raw) {
            Ok(file) => apply_file(&mut settings, file),
            Err(err) => warn!(
                "voice: ignoring malformed settings file path={} error={err}",
                path.display()
            ),
        },
        Err(err) if err.kind() == io::ErrorKind::NotFound => {}
        Err(err) => warn!(
            "voice: ignoring unreadable settings file path={} error={err}",
            path.display()
        ),
    }

    let lookup = |key: &str| {
        env(&format!("APP__VOICE_{key}")).or_else(|| env(&format!("VOICE_{key}")))
    };

    if let Some(v) = lookup("ISSUER") {
        settings.issuer = v;
    }
    if let Some(v) = lookup("DOMAIN") {
        settings.domain = v;
    }
    if let Some(v) = lookup("SERVER_URI") {
        settings.server_uri = v;
    }
    if let Some(v) = lookup("TOKEN_SERVICE_URL") {
        settings.token_service_url = Some(v);
    }
    if let Some(v) = lookup("TOKEN_PATH") {
        settings.token_path = v;
    }
    if let Some(v) = lookup("DEV_SIGNING_KEY") {
        settings.dev_signing_key = Some(v);
    }
    if let Some(v) = lookup("TOKEN_TTL_SECONDS") {
        match v.parse::<i64>().ok().and_then(valid_ttl) {
            Some(parsed) => settings.token_ttl_seconds = parsed,
            None => warn!("voice: ignoring invalid token ttl value={v}"),
        }
    }
    if let Some(v) = lookup("EVENT_CAPACITY") {
        match v.parse::<usize>() {
            Ok(parsed) if parsed > 0 => settings.event_capacity = parsed,
            _ => warn!("voice: ignoring invalid event capacity value={v}"),
        }
    }

    settings
}

fn apply_file(settings: &mut VoiceSettings, file: SettingsFile) {
    if let Some(v) = file.issuer {
        settings.issuer = v;
    }
    if let Some(v) = file.domain {
        settings.domain = v;
    }
    if let Some(v) = file.server_uri {
        settings.server_uri = v;
    }
    if file.token_service_url.is_some() {
        settings.token_service_url = file.token_service_url;
    }
    if let Some(v) = file.token_path {
        settings.token_path = v;
    }
    if file.dev_signing_key.is_some() {
        settings.dev_signing_key = file.dev_signing_key;
    }
    if let Some(v) = file.token_ttl_seconds {
        match valid_ttl(v) {
            Some(ttl) => settings.token_ttl_seconds = ttl,
            None => warn!("voice: ignoring invalid token ttl value={v}"),
        }
    }
    if let Some(v) = file.event_capacity.filter(|capacity| *capacity > 0) {
        settings.event_capacity = v;
    }
}

fn valid_ttl(seconds: i64) -> Option<i64> {
    (1..=MAX_TOKEN_TTL_SECONDS).contains(&seconds).then_some(seconds)
}

#[cfg(test)]
#[path = "tests/settings_tests.rs"]
mod tests;
