//! In-process backend that accepts every request and echoes the local user
//! back as a channel participant. Used to run the whole client stack without
//! a voice engine, and to drive it from tests.

use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex, MutexGuard,
    },
};

use tokio::sync::broadcast;
use tracing::debug;

use crate::{
    AccountId, BackendCompletion, ChannelSession, ChannelUri, ConnectOptions, ConnectionState,
    LoginSession, LoginState, ParticipantEvent, RemoteParticipant, TransmissionMode, VoiceBackend,
    VoiceBackendError,
};

const EVENT_CAPACITY: usize = 64;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[derive(Default)]
pub struct LoopbackVoiceBackend {
    initialized: AtomicBool,
    input_muted: AtomicBool,
    sessions: Mutex<HashMap<AccountId, Arc<LoopbackLoginSession>>>,
}

impl LoopbackVoiceBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_input_muted(&self) -> bool {
        self.input_muted.load(Ordering::SeqCst)
    }

    pub fn session(&self, account_name: &str) -> Option<Arc<LoopbackLoginSession>> {
        lock(&self.sessions)
            .iter()
            .find(|(account, _)| account.name() == account_name)
            .map(|(_, session)| Arc::clone(session))
    }
}

impl VoiceBackend for LoopbackVoiceBackend {
    fn initialize(&self) -> Result<(), VoiceBackendError> {
        self.initialized.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn uninitialize(&self) {
        if !self.initialized.swap(false, Ordering::SeqCst) {
            return;
        }
        let sessions = std::mem::take(&mut *lock(&self.sessions));
        for session in sessions.values() {
            session.logout();
        }
    }

    fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::SeqCst)
    }

    fn login_session(
        &self,
        account: &AccountId,
    ) -> Result<Arc<dyn LoginSession>, VoiceBackendError> {
        if !self.is_initialized() {
            return Err(VoiceBackendError::NotInitialized);
        }
        let session = lock(&self.sessions)
            .entry(account.clone())
            .or_insert_with(|| Arc::new(LoopbackLoginSession::new(account.clone())))
            .clone();
        Ok(session)
    }

    fn set_input_muted(&self, muted: bool) -> Result<(), VoiceBackendError> {
        if !self.is_initialized() {
            return Err(VoiceBackendError::NotInitialized);
        }
        self.input_muted.store(muted, Ordering::SeqCst);
        Ok(())
    }
}

pub struct LoopbackLoginSession {
    account: AccountId,
    state: Arc<Mutex<LoginState>>,
    state_tx: broadcast::Sender<LoginState>,
    channels: Mutex<HashMap<ChannelUri, Arc<LoopbackChannelSession>>>,
    transmission: Mutex<TransmissionMode>,
}

impl LoopbackLoginSession {
    fn new(account: AccountId) -> Self {
        Self {
            account,
            state: Arc::new(Mutex::new(LoginState::LoggedOut)),
            state_tx: broadcast::channel(EVENT_CAPACITY).0,
            channels: Mutex::new(HashMap::new()),
            transmission: Mutex::new(TransmissionMode::None),
        }
    }

    pub fn login_state(&self) -> LoginState {
        *lock(&self.state)
    }

    pub fn transmission_mode(&self) -> TransmissionMode {
        lock(&self.transmission).clone()
    }

    pub fn channel(&self, name: &str) -> Option<Arc<LoopbackChannelSession>> {
        lock(&self.channels)
            .iter()
            .find(|(uri, _)| uri.name() == name)
            .map(|(_, session)| Arc::clone(session))
    }

    /// Simulates the server ending the session.
    pub fn force_logout(&self) {
        *lock(&self.state) = LoginState::LoggedOut;
        let _ = self.state_tx.send(LoginState::LoggedOut);
    }
}

impl LoginSession for LoopbackLoginSession {
    fn account(&self) -> &AccountId {
        &self.account
    }

    fn begin_login(
        &self,
        server_uri: &str,
        token: &str,
    ) -> Result<BackendCompletion, VoiceBackendError> {
        if server_uri.is_empty() || token.is_empty() {
            return Err(VoiceBackendError::failed(
                -1,
                "server uri and token are required",
            ));
        }
        *lock(&self.state) = LoginState::LoggingIn;

        let state = Arc::clone(&self.state);
        let state_tx = self.state_tx.clone();
        let account = self.account.clone();
        Ok(Box::pin(async move {
            *lock(&state) = LoginState::LoggedIn;
            let _ = state_tx.send(LoginState::LoggedIn);
            debug!("voice: loopback login completed account={account}");
            Ok(())
        }))
    }

    fn logout(&self) {
        let channels = std::mem::take(&mut *lock(&self.channels));
        for channel in channels.values() {
            let _ = channel.disconnect();
        }
        *lock(&self.state) = LoginState::LoggedOut;
        let _ = self.state_tx.send(LoginState::LoggedOut);
    }

    fn subscribe_state(&self) -> broadcast::Receiver<LoginState> {
        self.state_tx.subscribe()
    }

    fn channel_session(
        &self,
        channel: &ChannelUri,
    ) -> Result<Arc<dyn ChannelSession>, VoiceBackendError> {
        if self.login_state() != LoginState::LoggedIn {
            return Err(VoiceBackendError::failed(-1, "login session is not active"));
        }
        let local = RemoteParticipant {
            participant_id: self.account.name().to_string(),
            display_name: self.account.name().to_string(),
        };
        let session = lock(&self.channels)
            .entry(channel.clone())
            .or_insert_with(|| Arc::new(LoopbackChannelSession::new(channel.clone(), local)))
            .clone();
        Ok(session)
    }

    fn delete_channel_session(&self, channel: &ChannelUri) {
        lock(&self.channels).remove(channel);
    }

    fn set_transmission_mode(&self, mode: TransmissionMode) -> Result<(), VoiceBackendError> {
        *lock(&self.transmission) = mode;
        Ok(())
    }
}

pub struct LoopbackChannelSession {
    channel: ChannelUri,
    local: RemoteParticipant,
    connected: Arc<AtomicBool>,
    state_tx: broadcast::Sender<ConnectionState>,
    participants_tx: broadcast::Sender<ParticipantEvent>,
}

impl LoopbackChannelSession {
    fn new(channel: ChannelUri, local: RemoteParticipant) -> Self {
        Self {
            channel,
            local,
            connected: Arc::new(AtomicBool::new(false)),
            state_tx: broadcast::channel(EVENT_CAPACITY).0,
            participants_tx: broadcast::channel(EVENT_CAPACITY).0,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    pub fn simulate_participant_joined(&self, participant_id: &str, display_name: &str) {
        let _ = self
            .participants_tx
            .send(ParticipantEvent::Added(RemoteParticipant {
                participant_id: participant_id.to_string(),
                display_name: display_name.to_string(),
            }));
    }

    pub fn simulate_participant_left(&self, participant_id: &str) {
        let _ = self.participants_tx.send(ParticipantEvent::Removed {
            participant_id: participant_id.to_string(),
        });
    }

    pub fn simulate_speech(&self, participant_id: &str, speaking: bool) {
        let _ = self.participants_tx.send(ParticipantEvent::Updated {
            participant_id: participant_id.to_string(),
            speech_detected: Some(speaking),
            local_muted: None,
        });
    }

    /// Drops the connection without a local disconnect request.
    pub fn simulate_drop(&self) {
        self.connected.store(false, Ordering::SeqCst);
        let _ = self.state_tx.send(ConnectionState::Disconnected);
    }
}

impl ChannelSession for LoopbackChannelSession {
    fn channel(&self) -> &ChannelUri {
        &self.channel
    }

    fn begin_connect(&self, options: ConnectOptions) -> Result<BackendCompletion, VoiceBackendError> {
        if !options.audio && !options.text {
            return Err(VoiceBackendError::failed(-1, "no media requested"));
        }
        if options.token.is_empty() {
            return Err(VoiceBackendError::failed(-1, "missing channel token"));
        }

        let connected = Arc::clone(&self.connected);
        let state_tx = self.state_tx.clone();
        let participants_tx = self.participants_tx.clone();
        let local = self.local.clone();
        let _ = state_tx.send(ConnectionState::Connecting);
        Ok(Box::pin(async move {
            connected.store(true, Ordering::SeqCst);
            let _ = state_tx.send(ConnectionState::Connected);
            let _ = participants_tx.send(ParticipantEvent::Added(local));
            Ok(())
        }))
    }

    fn disconnect(&self) -> Result<(), VoiceBackendError> {
        let _ = self.state_tx.send(ConnectionState::Disconnecting);
        if self.connected.swap(false, Ordering::SeqCst) {
            let _ = self.participants_tx.send(ParticipantEvent::Removed {
                participant_id: self.local.participant_id.clone(),
            });
        }
        let _ = self.state_tx.send(ConnectionState::Disconnected);
        Ok(())
    }

    fn subscribe_state(&self) -> broadcast::Receiver<ConnectionState> {
        self.state_tx.subscribe()
    }

    fn subscribe_participants(&self) -> broadcast::Receiver<ParticipantEvent> {
        self.participants_tx.subscribe()
    }

    fn begin_set_participant_mute(
        &self,
        participant_id: &str,
        muted: bool,
    ) -> Result<BackendCompletion, VoiceBackendError> {
        let participants_tx = self.participants_tx.clone();
        let participant_id = participant_id.to_string();
        Ok(Box::pin(async move {
            let _ = participants_tx.send(ParticipantEvent::Updated {
                participant_id,
                speech_detected: None,
                local_muted: Some(muted),
            });
            Ok(())
        }))
    }
}

#[cfg(test)]
#[path = "tests/loopback_tests.rs"]
mod tests;
