use super::*;

#[test]
fn account_uri_wraps_name_with_issuer_and_domain() {
    let scheme = IdentifierScheme::new("game-issuer", "mt1s.vivox.com");
    let account = scheme.account("alice");
    assert_eq!(account.name(), "alice");
    assert_eq!(account.uri(), "sip:.game-issuer.alice.@mt1s.vivox.com");
}

#[test]
fn channel_uri_prefix_follows_channel_type() {
    let scheme = IdentifierScheme::new("iss", "example.org");
    assert_eq!(
        scheme.channel("party-42", ChannelType::NonPositional).uri(),
        "sip:confctl-g-iss.party-42@example.org"
    );
    assert_eq!(
        scheme.channel("party-42", ChannelType::Echo).to_string(),
        "sip:confctl-e-iss.party-42@example.org"
    );
    assert_eq!(
        scheme.channel("party-42", ChannelType::Positional).uri(),
        "sip:confctl-d-iss.party-42@example.org"
    );
}
