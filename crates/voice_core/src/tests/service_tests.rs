use super::*;
use std::time::Duration;
use voice_backend::{LoopbackVoiceBackend, VoiceBackend};

use crate::{settings::VoiceSettings, token_exchange::DevTokenExchange};

fn start() -> (Arc<LoopbackVoiceBackend>, VoiceChatHandle, JoinHandle<()>) {
    let settings = VoiceSettings::default();
    let backend = Arc::new(LoopbackVoiceBackend::new());
    let orchestrator = VoiceOrchestrator::new(backend.clone(), &settings);
    let (handle, task) = spawn_service(orchestrator, 16);
    (backend, handle, task)
}

fn dev_credentials() -> Arc<dyn TokenExchange> {
    Arc::new(DevTokenExchange::from_settings(&VoiceSettings::default()))
}

async fn wait_for(
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
async fn handle_drives_login_and_join() {
    let (backend, handle, _task) = start();
    let credentials = dev_credentials();
    let mut events = handle.subscribe_events();

    handle.initialize().await.expect("initialize");
    handle.login(&credentials, "alice").await.expect("login");
    assert_eq!(
        wait_for(&mut events, |event| matches!(event, VoiceEvent::LoginCompleted { .. })).await,
        VoiceEvent::LoginCompleted { success: true }
    );

    handle.join_channel("party-1").await.expect("join");
    assert_eq!(
        wait_for(&mut events, |event| matches!(event, VoiceEvent::ChannelJoined { .. })).await,
        VoiceEvent::ChannelJoined {
            channel: "party-1".into(),
            success: true,
        }
    );
    handle
        .set_transmission_channel("party-1")
        .await
        .expect("transmission");

    let snapshot = handle.snapshot().await.expect("snapshot");
    assert_eq!(snapshot.login_state, VoiceLoginState::LoggedIn);
    assert_eq!(snapshot.username.as_deref(), Some("alice"));
    assert_eq!(
        snapshot.transmission,
        TransmissionRoute::Single("party-1".into())
    );
    let channel = snapshot.channel("party-1").expect("channel");
    assert_eq!(channel.state, ChannelConnectionState::Connected);
    assert!(backend
        .session("alice")
        .and_then(|session| session.channel("party-1"))
        .is_some_and(|session| session.is_connected()));
}

#[tokio::test]
async fn rejected_operations_come_back_as_errors() {
    let (_backend, handle, _task) = start();
    let credentials = dev_credentials();

    assert_eq!(
        handle.login(&credentials, "alice").await,
        Err(VoiceError::LoginRejected(
            crate::error::LoginRejection::BackendNotInitialized
        ))
    );
    assert_eq!(handle.logout().await, Err(VoiceError::NotLoggedIn));
    assert_eq!(
        handle.join_channel("party-1").await,
        Err(VoiceError::NotLoggedIn)
    );
    assert!(!handle
        .is_player_muted("party-1", "bob")
        .await
        .expect("query"));
}

#[tokio::test]
async fn shutdown_tears_down_and_stops_the_task() {
    let (backend, handle, task) = start();
    let credentials = dev_credentials();
    let mut events = handle.subscribe_events();

    handle.initialize().await.expect("initialize");
    handle.login(&credentials, "alice").await.expect("login");
    wait_for(&mut events, |event| matches!(event, VoiceEvent::LoginCompleted { .. })).await;

    handle.shutdown().await.expect("shutdown");
    tokio::time::timeout(Duration::from_secs(2), task)
        .await
        .expect("task finished")
        .expect("task did not panic");

    assert!(!backend.is_initialized());
    assert_eq!(
        wait_for(&mut events, |event| *event == VoiceEvent::LogoutCompleted).await,
        VoiceEvent::LogoutCompleted
    );
    assert_eq!(handle.snapshot().await, Err(VoiceError::ServiceStopped));
}
