use std::sync::Arc;

use tokio::sync::{broadcast, mpsc};
use tracing::{info, warn};
use voice_core::{TokenExchange, VoiceChatHandle, VoiceEvent};

use crate::{JoinSessionResult, SessionDirectory, SessionLifecycleEvent, PARTY_SESSION};

/// Follows the party session and keeps the voice service in its channel.
pub struct PartyVoiceBridge {
    voice: VoiceChatHandle,
    directory: Arc<dyn SessionDirectory>,
    party_session: String,
    /// Owned here; the voice service only holds a weak reference.
    credentials: Option<Arc<dyn TokenExchange>>,
    current_channel: Option<String>,
}

impl PartyVoiceBridge {
    pub fn new(voice: VoiceChatHandle, directory: Arc<dyn SessionDirectory>) -> Self {
        Self {
            voice,
            directory,
            party_session: PARTY_SESSION.to_string(),
            credentials: None,
            current_channel: None,
        }
    }

    pub fn with_party_session(mut self, session_name: impl Into<String>) -> Self {
        self.party_session = session_name.into();
        self
    }

    pub fn current_channel(&self) -> Option<&str> {
        self.current_channel.as_deref()
    }

    pub async fn handle_session_event(&mut self, event: SessionLifecycleEvent) {
        match event {
            SessionLifecycleEvent::IdentityLoginCompleted {
                local_user,
                success,
                user_id,
            } => self.on_identity_login(local_user, success, user_id).await,
            SessionLifecycleEvent::CreateSessionCompleted {
                session_name,
                success,
            } => {
                if session_name != self.party_session {
                    return;
                }
                if !success {
                    warn!("party: create session failed session={session_name}");
                    return;
                }
                self.join_party_channel(&session_name).await;
            }
            SessionLifecycleEvent::JoinSessionCompleted {
                session_name,
                result,
            } => {
                if session_name != self.party_session {
                    return;
                }
                if result != JoinSessionResult::Success {
                    warn!("party: join session failed session={session_name} result={result:?}");
                    return;
                }
                self.join_party_channel(&session_name).await;
            }
            SessionLifecycleEvent::DestroySessionCompleted { session_name, .. } => {
                if session_name != self.party_session {
                    return;
                }
                let Some(channel) = self.current_channel.take() else {
                    return;
                };
                info!("party: leaving voice channel={channel}");
                if let Err(err) = self.voice.leave_channel(channel.as_str()).await {
                    warn!("party: leave failed channel={channel}: {err}");
                }
            }
        }
    }

    pub async fn handle_voice_event(&mut self, event: VoiceEvent) {
        match event {
            VoiceEvent::LoginCompleted { success: true } => info!("party: voice login successful"),
            VoiceEvent::LoginCompleted { success: false } => warn!("party: voice login failed"),
            VoiceEvent::ChannelJoined {
                channel,
                success: true,
            } => {
                info!("party: joined voice channel={channel}");
                if self.current_channel.as_deref() != Some(channel.as_str()) {
                    return;
                }
                if let Err(err) = self.voice.set_transmission_channel(channel.as_str()).await {
                    warn!("party: failed to route transmission channel={channel}: {err}");
                }
            }
            VoiceEvent::ChannelJoined {
                channel,
                success: false,
            } => warn!("party: failed to join voice channel={channel}"),
            _ => {}
        }
    }

    /// Processes session and voice events until `sessions` closes, then shuts down.
    pub async fn run(mut self, mut sessions: mpsc::Receiver<SessionLifecycleEvent>) {
        let mut voice_events = self.voice.subscribe_events();
        loop {
            tokio::select! {
                event = sessions.recv() => match event {
                    Some(event) => self.handle_session_event(event).await,
                    None => break,
                },
                event = voice_events.recv() => match event {
                    Ok(event) => self.handle_voice_event(event).await,
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!("party: voice events lagged skipped={skipped}");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                },
            }
        }
        self.shutdown().await;
    }

    /// Leaves the party channel and logs out if still logged in.
    pub async fn shutdown(&mut self) {
        if let Some(channel) = self.current_channel.take() {
            info!("party: leaving voice channel={channel} on shutdown");
            if let Err(err) = self.voice.leave_channel(channel.as_str()).await {
                warn!("party: leave failed channel={channel}: {err}");
            }
        }
        match self.voice.snapshot().await {
            Ok(snapshot) if snapshot.username.is_some() => {
                if let Err(err) = self.voice.logout().await {
                    warn!("party: voice logout failed: {err}");
                }
            }
            Ok(_) => {}
            Err(err) => warn!("party: voice service unavailable on shutdown: {err}"),
        }
        self.credentials = None;
    }

    async fn on_identity_login(&mut self, local_user: u32, success: bool, user_id: String) {
        if !success {
            warn!("party: identity login failed, skipping voice login local_user={local_user}");
            return;
        }
        if user_id.is_empty() {
            warn!("party: identity login carried no user id local_user={local_user}");
            return;
        }
        let Some(credentials) = self.directory.token_exchange(local_user) else {
            warn!("party: no token exchange for local_user={local_user}");
            return;
        };

        info!("party: identity login successful, logging into voice user={user_id}");
        let credentials = self.credentials.insert(credentials);
        if let Err(err) = self.voice.login(credentials, user_id).await {
            warn!("party: voice login rejected: {err}");
        }
    }

    async fn join_party_channel(&mut self, session_name: &str) {
        let Some(channel) = self.directory.session_id(session_name) else {
            warn!("party: no active session named session={session_name}");
            return;
        };
        if channel.is_empty() {
            warn!("party: session has an empty id session={session_name}");
            return;
        }

        if self.current_channel.as_deref() == Some(channel.as_str()) {
            let already_in = self
                .voice
                .snapshot()
                .await
                .map(|snapshot| snapshot.channel(&channel).is_some())
                .unwrap_or(false);
            if already_in {
                info!("party: already in voice channel={channel}");
                return;
            }
        }

        info!("party: joining voice channel={channel}");
        self.current_channel = Some(channel.clone());
        if let Err(err) = self.voice.join_channel(channel.as_str()).await {
            warn!("party: join failed channel={channel}: {err}");
        }
    }
}

#[cfg(test)]
#[path = "tests/bridge_tests.rs"]
mod tests;
