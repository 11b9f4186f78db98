use super::*;
use shared::domain::ChannelType;
use voice_backend::{IdentifierScheme, LoopbackVoiceBackend, VoiceBackend};

fn remote(id: &str, name: &str) -> RemoteParticipant {
    RemoteParticipant {
        participant_id: id.to_string(),
        display_name: name.to_string(),
    }
}

fn manager_with_channel(channel: &str) -> ChannelSessionManager {
    let mut manager = ChannelSessionManager::new();
    manager.insert_requesting(channel, 1);
    manager
}

#[test]
fn unknown_channel_reports_disconnected() {
    let manager = ChannelSessionManager::new();
    assert_eq!(
        manager.state("party-1"),
        ChannelConnectionState::Disconnected
    );
    assert!(!manager.contains("party-1"));
    assert!(manager.participants("party-1").is_empty());
}

#[test]
fn added_participant_starts_silent_and_unmuted() {
    let mut manager = manager_with_channel("party-1");
    let event = manager.participant_added("party-1", remote("bob", "Bob"));

    assert_eq!(
        event,
        Some(VoiceEvent::ParticipantAdded {
            channel: "party-1".into(),
            participant_id: "bob".into(),
            display_name: "Bob".into(),
        })
    );
    let bob = manager.participant("party-1", "bob").expect("bob");
    assert!(!bob.talking);
    assert!(!bob.local_muted);
}

#[test]
fn participant_events_for_absent_channel_are_ignored() {
    let mut manager = ChannelSessionManager::new();
    assert_eq!(manager.participant_added("gone", remote("bob", "Bob")), None);
    assert_eq!(manager.participant_removed("gone", "bob"), None);
    assert_eq!(
        manager.participant_updated("gone", "bob", Some(true), None),
        None
    );
    assert!(!manager.contains("gone"));
}

#[test]
fn unchanged_talking_flag_is_silent() {
    let mut manager = manager_with_channel("party-1");
    manager.participant_added("party-1", remote("bob", "Bob"));

    assert_eq!(
        manager.participant_updated("party-1", "bob", Some(false), None),
        None
    );
    assert_eq!(
        manager.participant_updated("party-1", "bob", None, None),
        None
    );
}

#[test]
fn talking_flips_emit_in_order() {
    let mut manager = manager_with_channel("party-1");
    manager.participant_added("party-1", remote("bob", "Bob"));

    let events: Vec<VoiceEvent> = [Some(true), Some(true), Some(false)]
        .into_iter()
        .filter_map(|flag| manager.participant_updated("party-1", "bob", flag, None))
        .collect();

    assert_eq!(
        events,
        vec![
            VoiceEvent::ParticipantTalkingChanged {
                channel: "party-1".into(),
                participant_id: "bob".into(),
                talking: true,
            },
            VoiceEvent::ParticipantTalkingChanged {
                channel: "party-1".into(),
                participant_id: "bob".into(),
                talking: false,
            },
        ]
    );
}

#[test]
fn update_for_unknown_participant_does_not_create_it() {
    let mut manager = manager_with_channel("party-1");
    assert_eq!(
        manager.participant_updated("party-1", "ghost", Some(true), Some(true)),
        None
    );
    assert!(manager.participant("party-1", "ghost").is_none());
}

#[test]
fn mute_flag_updates_without_talking_notification() {
    let mut manager = manager_with_channel("party-1");
    manager.participant_added("party-1", remote("bob", "Bob"));

    assert_eq!(
        manager.participant_updated("party-1", "bob", None, Some(true)),
        None
    );
    assert!(manager.participant("party-1", "bob").expect("bob").local_muted);
}

#[test]
fn removed_participant_is_erased_and_readd_starts_silent() {
    let mut manager = manager_with_channel("party-1");
    manager.participant_added("party-1", remote("bob", "Bob"));
    manager.participant_updated("party-1", "bob", Some(true), None);

    assert_eq!(
        manager.participant_removed("party-1", "bob"),
        Some(VoiceEvent::ParticipantRemoved {
            channel: "party-1".into(),
            participant_id: "bob".into(),
        })
    );
    assert!(manager.participant("party-1", "bob").is_none());

    manager.participant_added("party-1", remote("bob", "Bob"));
    assert!(manager
        .participant_updated("party-1", "bob", Some(true), None)
        .is_some());
}

#[test]
fn cleanup_twice_is_equivalent_to_once() {
    let mut manager = manager_with_channel("party-1");
    manager.participant_added("party-1", remote("bob", "Bob"));

    let first = manager.cleanup("party-1", None).expect("first cleanup");
    assert_eq!(first.state, ChannelConnectionState::Disconnected);
    assert!(manager.cleanup("party-1", None).is_none());
    assert!(manager.cleanup("never-joined", None).is_none());

    assert!(!manager.contains("party-1"));
    assert!(manager.participants("party-1").is_empty());
    assert_eq!(
        manager.participant_updated("party-1", "bob", Some(true), None),
        None
    );
}

#[test]
fn generation_identifies_the_live_connection() {
    let mut manager = manager_with_channel("party-1");
    assert!(manager.is_current("party-1", 1));
    assert!(!manager.is_current("party-1", 2));

    manager.cleanup("party-1", None);
    manager.insert_requesting("party-1", 2);
    assert!(!manager.is_current("party-1", 1));
    assert!(manager.is_current("party-1", 2));
}

#[tokio::test]
async fn cleanup_releases_backend_channel_handle() {
    let ids = IdentifierScheme::new("iss", "example.org");
    let backend = LoopbackVoiceBackend::new();
    backend.initialize().expect("init");
    let login = backend.login_session(&ids.account("alice")).expect("login");
    login
        .begin_login("loopback://voice", "token")
        .expect("begin")
        .await
        .expect("login");
    let session = login
        .channel_session(&ids.channel("party-1", ChannelType::NonPositional))
        .expect("channel");

    let mut manager = manager_with_channel("party-1");
    let listener = tokio::spawn(async {});
    manager.begin_connecting("party-1", session, listener);
    assert_eq!(manager.state("party-1"), ChannelConnectionState::Connecting);

    let loopback = backend.session("alice").expect("loopback session");
    assert!(loopback.channel("party-1").is_some());

    manager.cleanup("party-1", Some(&*login));
    assert!(loopback.channel("party-1").is_none());
}

#[test]
fn clear_all_empties_every_channel() {
    let mut manager = ChannelSessionManager::new();
    manager.insert_requesting("a", 1);
    manager.insert_requesting("b", 2);
    manager.add_pending_join("b");

    let mut cleared = manager.clear_all(None);
    cleared.sort_by(|x, y| x.0.cmp(&y.0));
    assert_eq!(cleared.len(), 2);
    assert_eq!(cleared[1].1.pending_joins, 2);
    assert!(manager.is_empty());
    assert!(manager.clear_all(None).is_empty());
}
