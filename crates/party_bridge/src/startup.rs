use std::time::Duration;

use thiserror::Error;
use tokio::sync::{broadcast, mpsc};
use tracing::{info, warn};
use voice_core::VoiceEvent;

use crate::SessionLifecycleEvent;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum HostPartyError {
    #[error("session feed closed")]
    FeedClosed,
    #[error("voice event stream closed")]
    VoiceStopped,
    #[error("voice login failed")]
    LoginFailed,
    #[error("voice login did not finish within {0:?}")]
    LoginTimedOut(Duration),
}

/// Signs `user_id` in through the bridge feed and announces `session_name`
/// only after voice login has finished, so the party join never lands while
/// login is still pending.
///
/// `events` must be subscribed before the call; a login that completes before
/// subscribing is missed.
pub async fn host_party(
    sessions: &mpsc::Sender<SessionLifecycleEvent>,
    events: &mut broadcast::Receiver<VoiceEvent>,
    local_user: u32,
    user_id: &str,
    session_name: &str,
    login_timeout: Duration,
) -> Result<(), HostPartyError> {
    sessions
        .send(SessionLifecycleEvent::IdentityLoginCompleted {
            local_user,
            success: true,
            user_id: user_id.to_string(),
        })
        .await
        .map_err(|_| HostPartyError::FeedClosed)?;

    tokio::time::timeout(login_timeout, wait_for_login(events))
        .await
        .map_err(|_| HostPartyError::LoginTimedOut(login_timeout))??;

    info!("party: voice login settled, announcing session={session_name}");
    sessions
        .send(SessionLifecycleEvent::CreateSessionCompleted {
            session_name: session_name.to_string(),
            success: true,
        })
        .await
        .map_err(|_| HostPartyError::FeedClosed)
}

async fn wait_for_login(
    events: &mut broadcast::Receiver<VoiceEvent>,
) -> Result<(), HostPartyError> {
    loop {
        match events.recv().await {
            Ok(VoiceEvent::LoginCompleted { success: true }) => return Ok(()),
            Ok(VoiceEvent::LoginCompleted { success: false }) => {
                return Err(HostPartyError::LoginFailed)
            }
            Ok(_) => {}
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!("party: voice events lagged while waiting for login skipped={skipped}");
            }
            Err(broadcast::error::RecvError::Closed) => return Err(HostPartyError::VoiceStopped),
        }
    }
}
