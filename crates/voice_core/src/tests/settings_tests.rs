use std::{collections::HashMap, io::Write};

use super::*;

fn env_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
    let vars: HashMap<String, String> = pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    move |key| vars.get(key).cloned()
}

#[test]
fn missing_file_and_env_yield_defaults() {
    let dir = tempfile::tempdir().expect("tempdir");
    let settings = load_settings_from(&dir.path().join("voice.toml"), env_from(&[]));
    assert_eq!(settings, VoiceSettings::default());
}

#[test]
fn file_values_override_defaults() {
    let mut file = tempfile::NamedTempFile::new().expect("temp file");
    writeln!(
        file,
        r#"
issuer = "game"
domain = "mt1s.example.com"
server_uri = "https://voice.example.com/api2"
token_service_url = "https://platform.example.com"
token_ttl_seconds = 120
"#
    )
    .expect("write");

    let settings = load_settings_from(file.path(), env_from(&[]));
    assert_eq!(settings.issuer, "game");
    assert_eq!(settings.domain, "mt1s.example.com");
    assert_eq!(settings.server_uri, "https://voice.example.com/api2");
    assert_eq!(
        settings.token_service_url.as_deref(),
        Some("https://platform.example.com")
    );
    assert_eq!(settings.token_ttl_seconds, 120);
    assert_eq!(settings.token_path, "/voice/v1/token");
}

#[test]
fn app_prefixed_env_wins_over_plain_env_and_file() {
    let mut file = tempfile::NamedTempFile::new().expect("temp file");
    writeln!(file, "issuer = \"from-file\"").expect("write");

    let settings = load_settings_from(
        file.path(),
        env_from(&[
            ("VOICE_ISSUER", "from-env"),
            ("APP__VOICE_ISSUER", "from-app-env"),
            ("VOICE_DOMAIN", "env.example.com"),
            ("VOICE_EVENT_CAPACITY", "0"),
            ("VOICE_TOKEN_TTL_SECONDS", "not-a-number"),
        ]),
    );

    assert_eq!(settings.issuer, "from-app-env");
    assert_eq!(settings.domain, "env.example.com");
    assert_eq!(settings.event_capacity, 256);
    assert_eq!(settings.token_ttl_seconds, 90);
}

#[test]
fn malformed_file_is_ignored() {
    let mut file = tempfile::NamedTempFile::new().expect("temp file");
    writeln!(file, "issuer = [unterminated").expect("write");

    let settings = load_settings_from(file.path(), env_from(&[("VOICE_ISSUER", "env")]));
    assert_eq!(settings.issuer, "env");
    assert_eq!(settings.domain, VoiceSettings::default().domain);
}

#[test]
fn identifier_scheme_uses_issuer_and_domain() {
    let settings = VoiceSettings {
        issuer: "game".into(),
        domain: "example.org".into(),
        ..VoiceSettings::default()
    };
    assert_eq!(
        settings.identifier_scheme().account("alice").uri(),
        "sip:.game.alice.@example.org"
    );
}

#[test]
fn out_of_range_token_ttl_is_ignored() {
    let mut file = tempfile::NamedTempFile::new().expect("temp file");
    writeln!(file, "token_ttl_seconds = -5").expect("write");

    let from_file = load_settings_from(file.path(), env_from(&[]));
    assert_eq!(from_file.token_ttl_seconds, 90);

    let from_env = load_settings_from(
        file.path(),
        env_from(&[("VOICE_TOKEN_TTL_SECONDS", "9223372036854775807")]),
    );
    assert_eq!(from_env.token_ttl_seconds, 90);

    let bounded = load_settings_from(
        file.path(),
        env_from(&[("VOICE_TOKEN_TTL_SECONDS", "3600")]),
    );
    assert_eq!(bounded.token_ttl_seconds, 3600);
}

#[test]
fn unreadable_file_still_applies_env() {
    let dir = tempfile::tempdir().expect("tempdir");
    let settings = load_settings_from(dir.path(), env_from(&[("VOICE_ISSUER", "env")]));
    assert_eq!(settings.issuer, "env");
    assert_eq!(settings.domain, VoiceSettings::default().domain);
}
