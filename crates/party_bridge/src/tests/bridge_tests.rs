use super::*;
use crate::StaticSessionDirectory;
use std::time::Duration;
use voice_backend::LoopbackVoiceBackend;
use voice_core::{
    spawn_service, DevTokenExchange, VoiceLoginState, VoiceOrchestrator, VoiceSettings,
};

async fn bridge_with_directory() -> (PartyVoiceBridge, Arc<StaticSessionDirectory>) {
    let settings = VoiceSettings::default();
    let backend = Arc::new(LoopbackVoiceBackend::new());
    let (voice, _task) = spawn_service(VoiceOrchestrator::new(backend, &settings), 16);
    voice.initialize().await.expect("initialize");

    let directory = Arc::new(StaticSessionDirectory::new());
    directory.set_token_exchange(0, Arc::new(DevTokenExchange::from_settings(&settings)));
    let bridge = PartyVoiceBridge::new(voice, directory.clone());
    (bridge, directory)
}

async fn next_matching(
    events: &mut broadcast::Receiver<VoiceEvent>,
    wanted: impl Fn(&VoiceEvent) -> bool,
) -> VoiceEvent {
    tokio::time::timeout(Duration::from_secs(2), async {
        loop {
            let event = events.recv().await.expect("event");
            if wanted(&event) {
                return event;
            }
        }
    })
    .await
    .expect("event before timeout")
}

#[tokio::test]
async fn failed_identity_login_skips_voice_login() {
    let (mut bridge, _directory) = bridge_with_directory().await;
    bridge
        .handle_session_event(SessionLifecycleEvent::IdentityLoginCompleted {
            local_user: 0,
            success: false,
            user_id: "alice".into(),
        })
        .await;

    let snapshot = bridge.voice.snapshot().await.expect("snapshot");
    assert_eq!(snapshot.login_state, VoiceLoginState::NotLoggedIn);
    assert!(bridge.credentials.is_none());
}

#[tokio::test]
async fn identity_login_keeps_credentials_and_logs_in() {
    let (mut bridge, _directory) = bridge_with_directory().await;
    let mut events = bridge.voice.subscribe_events();

    bridge
        .handle_session_event(SessionLifecycleEvent::IdentityLoginCompleted {
            local_user: 0,
            success: true,
            user_id: "alice".into(),
        })
        .await;

    assert!(bridge.credentials.is_some());
    assert_eq!(
        next_matching(&mut events, |event| matches!(event, VoiceEvent::LoginCompleted { .. }))
            .await,
        VoiceEvent::LoginCompleted { success: true }
    );
}

#[tokio::test]
async fn other_session_categories_are_ignored() {
    let (mut bridge, directory) = bridge_with_directory().await;
    directory.set_session("GameSession", "match-1");

    bridge
        .handle_session_event(SessionLifecycleEvent::CreateSessionCompleted {
            session_name: "GameSession".into(),
            success: true,
        })
        .await;
    assert_eq!(bridge.current_channel(), None);
}

#[tokio::test]
async fn empty_session_id_is_skipped() {
    let (mut bridge, directory) = bridge_with_directory().await;
    directory.set_session(PARTY_SESSION, "");

    bridge
        .handle_session_event(SessionLifecycleEvent::JoinSessionCompleted {
            session_name: PARTY_SESSION.into(),
            result: JoinSessionResult::Success,
        })
        .await;
    assert_eq!(bridge.current_channel(), None);
}

#[tokio::test]
async fn failed_session_join_does_not_join_voice() {
    let (mut bridge, directory) = bridge_with_directory().await;
    directory.set_session(PARTY_SESSION, "party-1");

    bridge
        .handle_session_event(SessionLifecycleEvent::JoinSessionCompleted {
            session_name: PARTY_SESSION.into(),
            result: JoinSessionResult::SessionIsFull,
        })
        .await;
    assert_eq!(bridge.current_channel(), None);
}

#[tokio::test]
async fn destroy_without_party_channel_is_a_no_op() {
    let (mut bridge, _directory) = bridge_with_directory().await;
    bridge
        .handle_session_event(SessionLifecycleEvent::DestroySessionCompleted {
            session_name: PARTY_SESSION.into(),
            success: true,
        })
        .await;
    assert_eq!(bridge.current_channel(), None);
}

#[tokio::test]
async fn joined_event_for_other_channel_does_not_route_transmission() {
    let (mut bridge, _directory) = bridge_with_directory().await;
    bridge
        .handle_voice_event(VoiceEvent::ChannelJoined {
            channel: "elsewhere".into(),
            success: true,
        })
        .await;

    let snapshot = bridge.voice.snapshot().await.expect("snapshot");
    assert_eq!(snapshot.transmission, voice_core::TransmissionRoute::None);
}
