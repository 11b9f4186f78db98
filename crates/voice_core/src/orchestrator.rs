use std::sync::{Arc, Weak};

use shared::{
    domain::ChannelType,
    protocol::{TokenRequest, TokenResponse},
};
use tokio::{
    sync::{broadcast, mpsc},
    task::JoinHandle,
};
use tracing::{debug, error, info, warn};
use voice_backend::{
    BackendCompletion, ConnectOptions, ConnectionState, IdentifierScheme,
    LoginState as BackendLoginState, LoginSession, ParticipantEvent, TransmissionMode,
    VoiceBackend, VoiceBackendError,
};

use crate::{
    channel_manager::{ChannelConnection, ChannelConnectionState, ChannelSessionManager, Participant},
    error::{LoginRejection, VoiceError},
    events::VoiceEvent,
    settings::VoiceSettings,
    token_exchange::{TokenExchange, TokenExchangeError},
};

const PARTY_CHANNEL_TYPE: ChannelType = ChannelType::NonPositional;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoiceLoginState {
    NotLoggedIn,
    LoggingIn,
    LoggedIn,
}

/// Which channel receives the local microphone.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum TransmissionRoute {
    #[default]
    None,
    All,
    Single(String),
}

/// Results and notifications delivered back to the control task.
pub(crate) enum Completion {
    LoginToken {
        attempt: u64,
        result: Result<TokenResponse, TokenExchangeError>,
    },
    LoginFinished {
        attempt: u64,
        result: Result<(), VoiceBackendError>,
    },
    LoginStateChanged {
        attempt: u64,
        state: BackendLoginState,
    },
    JoinToken {
        channel: String,
        generation: u64,
        result: Result<TokenResponse, TokenExchangeError>,
    },
    ConnectFinished {
        channel: String,
        generation: u64,
        result: Result<(), VoiceBackendError>,
    },
    ChannelStateChanged {
        channel: String,
        generation: u64,
        state: ConnectionState,
    },
    Participant {
        channel: String,
        generation: u64,
        event: ParticipantEvent,
    },
    ParticipantMuteFinished {
        channel: String,
        participant_id: String,
        muted: bool,
        result: Result<(), VoiceBackendError>,
    },
}

struct LoginContext {
    state: VoiceLoginState,
    /// Bumped on every login attempt and every logout; completions carrying
    /// an older value are discarded.
    attempt: u64,
    username: String,
    credentials: Option<Weak<dyn TokenExchange>>,
    session: Option<Arc<dyn LoginSession>>,
    state_listener: Option<JoinHandle<()>>,
}

impl LoginContext {
    fn new() -> Self {
        Self {
            state: VoiceLoginState::NotLoggedIn,
            attempt: 0,
            username: String::new(),
            credentials: None,
            session: None,
            state_listener: None,
        }
    }

    fn reset(&mut self) {
        if let Some(listener) = self.state_listener.take() {
            listener.abort();
        }
        self.state = VoiceLoginState::NotLoggedIn;
        self.attempt += 1;
        self.username.clear();
        self.credentials = None;
        self.session = None;
    }

    fn credentials_alive(&self) -> bool {
        self.credentials
            .as_ref()
            .is_some_and(|credentials| credentials.strong_count() > 0)
    }
}

/// Voice session state machine.
///
/// Every method runs on the caller's task and returns without waiting on the
/// token service or the backend. Their results come back through an internal
/// mailbox that is drained by [`VoiceOrchestrator::process_next`] or by the
/// service loop, so all state is mutated from a single task.
pub struct VoiceOrchestrator {
    backend: Arc<dyn VoiceBackend>,
    ids: IdentifierScheme,
    fallback_server_uri: String,
    login: LoginContext,
    channels: ChannelSessionManager,
    transmission: TransmissionRoute,
    local_muted: bool,
    next_generation: u64,
    events: broadcast::Sender<VoiceEvent>,
    completions_tx: mpsc::UnboundedSender<Completion>,
    completions_rx: Option<mpsc::UnboundedReceiver<Completion>>,
}

impl VoiceOrchestrator {
    pub fn new(backend: Arc<dyn VoiceBackend>, settings: &VoiceSettings) -> Self {
        let (events, _) = broadcast::channel(settings.event_capacity.max(1));
        let (completions_tx, completions_rx) = mpsc::unbounded_channel();
        Self {
            backend,
            ids: settings.identifier_scheme(),
            fallback_server_uri: settings.server_uri.clone(),
            login: LoginContext::new(),
            channels: ChannelSessionManager::new(),
            transmission: TransmissionRoute::None,
            local_muted: false,
            next_generation: 0,
            events,
            completions_tx,
            completions_rx: Some(completions_rx),
        }
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<VoiceEvent> {
        self.events.subscribe()
    }

    pub(crate) fn event_sender(&self) -> broadcast::Sender<VoiceEvent> {
        self.events.clone()
    }

    pub(crate) fn take_mailbox(&mut self) -> Option<mpsc::UnboundedReceiver<Completion>> {
        self.completions_rx.take()
    }

    pub fn initialize(&mut self) -> Result<(), VoiceError> {
        if self.backend.is_initialized() {
            warn!("voice: backend already initialized");
            return Ok(());
        }
        self.backend.initialize().map_err(|err| {
            error!("voice: failed to initialize backend: {err}");
            VoiceError::from(err)
        })?;
        info!("voice: backend initialized");
        Ok(())
    }

    /// Leaves every channel, logs out and shuts the backend down. Safe to
    /// call repeatedly.
    pub fn uninitialize(&mut self) {
        if !self.backend.is_initialized() {
            return;
        }
        if self.login.state != VoiceLoginState::NotLoggedIn {
            self.leave_all_channels();
            if let Err(err) = self.logout() {
                debug!("voice: logout during uninitialize failed: {err}");
            }
        }
        self.backend.uninitialize();
        info!("voice: backend uninitialized");
    }

    pub fn login_state(&self) -> VoiceLoginState {
        self.login.state
    }

    pub fn is_logged_in(&self) -> bool {
        self.login.state == VoiceLoginState::LoggedIn
    }

    pub fn username(&self) -> Option<&str> {
        (self.login.state != VoiceLoginState::NotLoggedIn).then_some(self.login.username.as_str())
    }

    pub fn is_in_channel(&self, channel: &str) -> bool {
        self.channels.contains(channel)
    }

    pub fn channel_state(&self, channel: &str) -> ChannelConnectionState {
        self.channels.state(channel)
    }

    pub fn channel_names(&self) -> Vec<String> {
        self.channels.channel_names()
    }

    pub fn participants(&self, channel: &str) -> Vec<Participant> {
        self.channels.participants(channel)
    }

    /// A route naming a channel that has since gone away reports `None`.
    pub fn transmission_route(&self) -> TransmissionRoute {
        if !self.is_logged_in() {
            return TransmissionRoute::None;
        }
        match &self.transmission {
            TransmissionRoute::Single(channel)
                if self.channels.state(channel) != ChannelConnectionState::Connected =>
            {
                TransmissionRoute::None
            }
            route => route.clone(),
        }
    }

    /// Starts a login. The caller owns `credentials` and must keep it alive
    /// for as long as the session should be able to request tokens; only a
    /// weak reference is kept here.
    pub fn login(
        &mut self,
        credentials: &Arc<dyn TokenExchange>,
        username: &str,
    ) -> Result<(), VoiceError> {
        let rejection = if !self.backend.is_initialized() {
            Some(LoginRejection::BackendNotInitialized)
        } else if self.login.state != VoiceLoginState::NotLoggedIn {
            Some(LoginRejection::AlreadyActive)
        } else if username.trim().is_empty() {
            Some(LoginRejection::EmptyUsername)
        } else {
            None
        };
        if let Some(reason) = rejection {
            warn!("voice: login rejected: {reason}");
            self.emit(VoiceEvent::LoginCompleted { success: false });
            return Err(reason.into());
        }

        let account = self.ids.account(username);
        let session = match self.backend.login_session(&account) {
            Ok(session) => session,
            Err(err) => {
                error!("voice: failed to open login session account={account}: {err}");
                self.emit(VoiceEvent::LoginCompleted { success: false });
                return Err(err.into());
            }
        };

        self.login.attempt += 1;
        self.login.state = VoiceLoginState::LoggingIn;
        self.login.username = username.to_string();
        self.login.credentials = Some(Arc::downgrade(credentials));
        self.login.session = Some(session);
        info!("voice: logging in user={username} account={account}");

        let attempt = self.login.attempt;
        self.spawn_token_request(TokenRequest::login(username), move |result| {
            Completion::LoginToken { attempt, result }
        });
        Ok(())
    }

    pub fn logout(&mut self) -> Result<(), VoiceError> {
        if self.login.state == VoiceLoginState::NotLoggedIn {
            warn!("voice: logout ignored, not logged in");
            return Err(VoiceError::NotLoggedIn);
        }

        self.leave_all_channels();
        if let Some(listener) = self.login.state_listener.take() {
            listener.abort();
        }
        if let Some(session) = self.login.session.take() {
            session.logout();
        }
        self.login.reset();
        self.transmission = TransmissionRoute::None;

        info!("voice: logged out");
        self.emit(VoiceEvent::LogoutCompleted);
        Ok(())
    }

    pub fn join_channel(&mut self, channel: &str) -> Result<(), VoiceError> {
        if !self.is_logged_in() {
            error!("voice: join failed, not logged in channel={channel}");
            self.emit_joined(channel, false, 1);
            return Err(VoiceError::NotLoggedIn);
        }
        if channel.trim().is_empty() {
            warn!("voice: join failed, empty channel name");
            self.emit_joined(channel, false, 1);
            return Err(VoiceError::InvalidChannelName);
        }

        if let Some(state) = self.channels.existing_state(channel) {
            return match state {
                ChannelConnectionState::Connected => {
                    warn!("voice: already in channel={channel}");
                    self.emit_joined(channel, true, 1);
                    Ok(())
                }
                ChannelConnectionState::Requesting | ChannelConnectionState::Connecting => {
                    debug!("voice: join already in flight channel={channel}");
                    self.channels.add_pending_join(channel);
                    Ok(())
                }
                ChannelConnectionState::Disconnecting | ChannelConnectionState::Disconnected => {
                    warn!("voice: join rejected, channel={channel} is still disconnecting");
                    self.emit_joined(channel, false, 1);
                    Err(VoiceError::ChannelBusy(channel.to_string()))
                }
            };
        }

        if !self.login.credentials_alive() {
            error!("voice: join failed, credential context released channel={channel}");
            self.emit_joined(channel, false, 1);
            return Err(VoiceError::CredentialsReleased);
        }

        self.next_generation += 1;
        let generation = self.next_generation;
        self.channels.insert_requesting(channel, generation);
        info!("voice: requesting join token channel={channel}");

        let request = TokenRequest::join(self.login.username.clone(), channel, PARTY_CHANNEL_TYPE);
        let name = channel.to_string();
        self.spawn_token_request(request, move |result| Completion::JoinToken {
            channel: name,
            generation,
            result,
        });
        Ok(())
    }

    /// Requests a disconnect. The channel stays listed until the backend
    /// reports it disconnected, at which point `ChannelLeft` is emitted.
    pub fn leave_channel(&mut self, channel: &str) -> Result<(), VoiceError> {
        let Some(state) = self.channels.existing_state(channel) else {
            warn!("voice: leave ignored, not in channel={channel}");
            return Err(VoiceError::NotInChannel(channel.to_string()));
        };

        match state {
            ChannelConnectionState::Requesting => {
                info!("voice: cancelling join channel={channel}");
                if let Some(connection) = self.cleanup_channel(channel) {
                    self.emit_joined(channel, false, connection.pending_joins);
                }
                Ok(())
            }
            ChannelConnectionState::Disconnecting | ChannelConnectionState::Disconnected => {
                debug!("voice: already leaving channel={channel}");
                Ok(())
            }
            ChannelConnectionState::Connecting | ChannelConnectionState::Connected => {
                let Some(session) = self.channels.session(channel) else {
                    return Err(VoiceError::NotInChannel(channel.to_string()));
                };
                self.channels
                    .set_state(channel, ChannelConnectionState::Disconnecting);
                if let Err(err) = session.disconnect() {
                    error!("voice: disconnect failed channel={channel}: {err}");
                    self.channels.set_state(channel, state);
                    return Err(err.into());
                }
                info!("voice: leaving channel={channel}");
                Ok(())
            }
        }
    }

    /// Disconnects every channel and clears channel state immediately,
    /// without waiting for the backend to confirm.
    pub fn leave_all_channels(&mut self) {
        if self.channels.is_empty() {
            debug!("voice: no channels to leave");
            return;
        }

        for (channel, session) in self.channels.active_sessions() {
            if let Err(err) = session.disconnect() {
                warn!("voice: disconnect failed during teardown channel={channel}: {err}");
            }
        }
        self.force_clear_channels();
    }

    pub fn set_transmission_channel(&mut self, channel: &str) -> Result<(), VoiceError> {
        let session = self.logged_in_session("set transmission channel")?;
        let Some(uri) = self.channels.connected_channel_uri(channel) else {
            warn!("voice: set transmission ignored, not in channel={channel}");
            return Err(VoiceError::NotInChannel(channel.to_string()));
        };

        session
            .set_transmission_mode(TransmissionMode::Single(uri))
            .map_err(|err| {
                error!("voice: failed to set transmission channel={channel}: {err}");
                VoiceError::from(err)
            })?;
        self.transmission = TransmissionRoute::Single(channel.to_string());
        info!("voice: transmission set to channel={channel}");
        Ok(())
    }

    pub fn set_transmission_to_all(&mut self) -> Result<(), VoiceError> {
        let session = self.logged_in_session("set transmission to all")?;
        session
            .set_transmission_mode(TransmissionMode::All)
            .map_err(|err| {
                error!("voice: failed to set transmission to all: {err}");
                VoiceError::from(err)
            })?;
        self.transmission = TransmissionRoute::All;
        info!("voice: transmission set to all channels");
        Ok(())
    }

    pub fn set_transmission_to_none(&mut self) -> Result<(), VoiceError> {
        let session = self.logged_in_session("set transmission to none")?;
        session
            .set_transmission_mode(TransmissionMode::None)
            .map_err(|err| {
                error!("voice: failed to set transmission to none: {err}");
                VoiceError::from(err)
            })?;
        self.transmission = TransmissionRoute::None;
        info!("voice: transmission set to none");
        Ok(())
    }

    pub fn set_local_mute(&mut self, muted: bool) -> Result<(), VoiceError> {
        if !self.backend.is_initialized() {
            warn!("voice: set local mute ignored, backend not initialized");
            return Err(VoiceError::BackendNotInitialized);
        }
        self.backend.set_input_muted(muted).map_err(|err| {
            error!("voice: failed to set local mute: {err}");
            VoiceError::from(err)
        })?;
        self.local_muted = muted;
        info!("voice: local mute set to {muted}");
        Ok(())
    }

    pub fn is_local_muted(&self) -> bool {
        self.local_muted
    }

    /// Issues the mute request and returns. The backend's answer is only
    /// logged; overlapping requests for one participant resolve in whatever
    /// order the backend completes them.
    pub fn set_player_mute(
        &mut self,
        channel: &str,
        participant_id: &str,
        muted: bool,
    ) -> Result<(), VoiceError> {
        let Some(session) = self.channels.session(channel) else {
            warn!("voice: set player mute ignored, not in channel={channel}");
            return Err(VoiceError::NotInChannel(channel.to_string()));
        };
        if self.channels.participant(channel, participant_id).is_none() {
            warn!(
                "voice: set player mute ignored, participant={participant_id} not found in channel={channel}"
            );
            return Err(VoiceError::ParticipantNotFound {
                channel: channel.to_string(),
                participant_id: participant_id.to_string(),
            });
        }

        let completion = session
            .begin_set_participant_mute(participant_id, muted)
            .map_err(|err| {
                error!("voice: failed to request mute participant={participant_id}: {err}");
                VoiceError::from(err)
            })?;

        let channel = channel.to_string();
        let participant_id = participant_id.to_string();
        self.spawn_completion(completion, move |result| {
            Completion::ParticipantMuteFinished {
                channel,
                participant_id,
                muted,
                result,
            }
        });
        Ok(())
    }

    pub fn is_player_muted(&self, channel: &str, participant_id: &str) -> bool {
        self.channels
            .participant(channel, participant_id)
            .is_some_and(|participant| participant.local_muted)
    }

    /// Waits for the next completion or backend notification and applies it.
    pub async fn process_next(&mut self) {
        let completion = match self.completions_rx.as_mut() {
            Some(mailbox) => mailbox.recv().await,
            None => return,
        };
        if let Some(completion) = completion {
            self.handle_completion(completion);
        }
    }

    pub(crate) fn handle_completion(&mut self, completion: Completion) {
        match completion {
            Completion::LoginToken { attempt, result } => self.on_login_token(attempt, result),
            Completion::LoginFinished { attempt, result } => {
                self.on_login_finished(attempt, result)
            }
            Completion::LoginStateChanged { attempt, state } => {
                self.on_login_state_changed(attempt, state)
            }
            Completion::JoinToken {
                channel,
                generation,
                result,
            } => self.on_join_token(channel, generation, result),
            Completion::ConnectFinished {
                channel,
                generation,
                result,
            } => self.on_connect_finished(channel, generation, result),
            Completion::ChannelStateChanged {
                channel,
                generation,
                state,
            } => self.on_channel_state_changed(channel, generation, state),
            Completion::Participant {
                channel,
                generation,
                event,
            } => self.on_participant_event(channel, generation, event),
            Completion::ParticipantMuteFinished {
                channel,
                participant_id,
                muted,
                result,
            } => self.on_participant_mute_finished(channel, participant_id, muted, result),
        }
    }

    fn is_current_login(&self, attempt: u64, state: VoiceLoginState) -> bool {
        self.login.attempt == attempt && self.login.state == state
    }

    fn on_login_token(&mut self, attempt: u64, result: Result<TokenResponse, TokenExchangeError>) {
        if !self.is_current_login(attempt, VoiceLoginState::LoggingIn) {
            debug!("voice: discarding stale login token attempt={attempt}");
            return;
        }

        let response = match result {
            Ok(response) => response,
            Err(err) => {
                error!("voice: failed to get login token: {err}");
                self.fail_login();
                return;
            }
        };

        let server_uri = if response.uri.is_empty() {
            self.fallback_server_uri.clone()
        } else {
            response.uri
        };
        if server_uri.is_empty() {
            error!("voice: login failed, no server uri in token response or settings");
            self.fail_login();
            return;
        }

        let Some(session) = self.login.session.clone() else {
            error!("voice: login session missing after token received");
            self.fail_login();
            return;
        };

        match session.begin_login(&server_uri, &response.access_token) {
            Ok(completion) => self.spawn_completion(completion, move |result| {
                Completion::LoginFinished { attempt, result }
            }),
            Err(err) => {
                error!("voice: begin login failed: {err}");
                self.fail_login();
            }
        }
    }

    fn on_login_finished(&mut self, attempt: u64, result: Result<(), VoiceBackendError>) {
        if !self.is_current_login(attempt, VoiceLoginState::LoggingIn) {
            debug!("voice: discarding stale login completion attempt={attempt}");
            return;
        }
        if let Err(err) = result {
            error!("voice: login failed: {err}");
            self.fail_login();
            return;
        }
        let Some(session) = self.login.session.clone() else {
            self.fail_login();
            return;
        };

        self.login.state = VoiceLoginState::LoggedIn;
        let listener = self.spawn_listener(session.subscribe_state(), move |state| {
            Completion::LoginStateChanged { attempt, state }
        });
        self.login.state_listener = Some(listener);

        info!("voice: login successful user={}", self.login.username);
        self.emit(VoiceEvent::LoginCompleted { success: true });
    }

    fn fail_login(&mut self) {
        self.login.reset();
        self.emit(VoiceEvent::LoginCompleted { success: false });
    }

    fn on_login_state_changed(&mut self, attempt: u64, state: BackendLoginState) {
        if !self.is_current_login(attempt, VoiceLoginState::LoggedIn) {
            debug!("voice: discarding stale login state={state:?}");
            return;
        }
        if state != BackendLoginState::LoggedOut {
            debug!("voice: login session state={state:?}");
            return;
        }

        info!("voice: login session logged out by backend");
        self.force_clear_channels();
        self.login.reset();
        self.transmission = TransmissionRoute::None;
        self.emit(VoiceEvent::LogoutCompleted);
    }

    fn on_join_token(
        &mut self,
        channel: String,
        generation: u64,
        result: Result<TokenResponse, TokenExchangeError>,
    ) {
        if !self.channels.is_current(&channel, generation)
            || self.channels.state(&channel) != ChannelConnectionState::Requesting
        {
            debug!("voice: discarding join token for cleared channel={channel}");
            return;
        }

        let response = match result {
            Ok(response) => response,
            Err(err) => {
                error!("voice: failed to get join token channel={channel}: {err}");
                self.fail_join(&channel);
                return;
            }
        };
        if response.uri.is_empty() {
            error!("voice: join failed, token response missing server uri channel={channel}");
            self.fail_join(&channel);
            return;
        }

        let Some(login) = self.login.session.clone() else {
            error!("voice: join failed, login session missing channel={channel}");
            self.fail_join(&channel);
            return;
        };
        let uri = self.ids.channel(&channel, PARTY_CHANNEL_TYPE);
        let session = match login.channel_session(&uri) {
            Ok(session) => session,
            Err(err) => {
                error!("voice: failed to open channel session channel={channel}: {err}");
                self.fail_join(&channel);
                return;
            }
        };

        // Listeners go in before connect so events raised during connect are kept.
        let name = channel.clone();
        let listener = self.spawn_listener(session.subscribe_participants(), move |event| {
            Completion::Participant {
                channel: name.clone(),
                generation,
                event,
            }
        });
        self.channels
            .begin_connecting(&channel, Arc::clone(&session), listener);

        let options = ConnectOptions {
            audio: true,
            text: false,
            switch_transmission: false,
            token: response.access_token,
        };
        match session.begin_connect(options) {
            Ok(completion) => {
                let name = channel.clone();
                self.spawn_completion(completion, move |result| Completion::ConnectFinished {
                    channel: name,
                    generation,
                    result,
                });
            }
            Err(err) => {
                error!("voice: begin connect failed channel={channel}: {err}");
                self.fail_join(&channel);
            }
        }
    }

    fn on_connect_finished(
        &mut self,
        channel: String,
        generation: u64,
        result: Result<(), VoiceBackendError>,
    ) {
        if !self.channels.is_current(&channel, generation) {
            debug!("voice: discarding connect completion for cleared channel={channel}");
            return;
        }

        if self.channels.state(&channel) == ChannelConnectionState::Disconnecting {
            info!("voice: channel={channel} left before connect completed");
            self.fail_join(&channel);
            return;
        }

        if let Err(err) = result {
            error!("voice: failed to join channel={channel}: {err}");
            self.fail_join(&channel);
            return;
        }

        let Some(session) = self.channels.session(&channel) else {
            self.fail_join(&channel);
            return;
        };
        let name = channel.clone();
        let listener = self.spawn_listener(session.subscribe_state(), move |state| {
            Completion::ChannelStateChanged {
                channel: name.clone(),
                generation,
                state,
            }
        });
        let pending = self.channels.mark_connected(&channel, listener);

        info!("voice: joined channel={channel}");
        self.emit_joined(&channel, true, pending);
    }

    fn on_channel_state_changed(&mut self, channel: String, generation: u64, state: ConnectionState) {
        if !self.channels.is_current(&channel, generation) {
            debug!("voice: discarding state={state:?} for cleared channel={channel}");
            return;
        }
        if state != ConnectionState::Disconnected {
            debug!("voice: channel={channel} state={state:?}");
            return;
        }

        info!("voice: channel={channel} disconnected");
        self.cleanup_channel(&channel);
        self.emit(VoiceEvent::ChannelLeft { channel });
    }

    fn on_participant_event(&mut self, channel: String, generation: u64, event: ParticipantEvent) {
        if !self.channels.is_current(&channel, generation) {
            debug!("voice: discarding participant event for cleared channel={channel}");
            return;
        }

        let notification = match event {
            ParticipantEvent::Added(participant) => {
                self.channels.participant_added(&channel, participant)
            }
            ParticipantEvent::Removed { participant_id } => {
                self.channels.participant_removed(&channel, &participant_id)
            }
            ParticipantEvent::Updated {
                participant_id,
                speech_detected,
                local_muted,
            } => self.channels.participant_updated(
                &channel,
                &participant_id,
                speech_detected,
                local_muted,
            ),
        };
        if let Some(notification) = notification {
            self.emit(notification);
        }
    }

    fn on_participant_mute_finished(
        &mut self,
        channel: String,
        participant_id: String,
        muted: bool,
        result: Result<(), VoiceBackendError>,
    ) {
        match result {
            Ok(()) => {
                self.channels
                    .set_participant_muted(&channel, &participant_id, muted);
                info!("voice: participant={participant_id} mute set to {muted} channel={channel}");
            }
            Err(err) => {
                error!("voice: failed to set mute participant={participant_id} channel={channel}: {err}");
            }
        }
    }

    fn logged_in_session(&self, operation: &str) -> Result<Arc<dyn LoginSession>, VoiceError> {
        match (&self.login.state, &self.login.session) {
            (VoiceLoginState::LoggedIn, Some(session)) => Ok(Arc::clone(session)),
            _ => {
                warn!("voice: {operation} ignored, not logged in");
                Err(VoiceError::NotLoggedIn)
            }
        }
    }

    fn cleanup_channel(&mut self, channel: &str) -> Option<ChannelConnection> {
        self.channels.cleanup(channel, self.login.session.as_deref())
    }

    fn fail_join(&mut self, channel: &str) {
        let pending = self
            .cleanup_channel(channel)
            .map(|connection| connection.pending_joins)
            .unwrap_or(0);
        self.emit_joined(channel, false, pending);
    }

    /// Joins still in flight resolve as failed; connected channels go quietly.
    fn force_clear_channels(&mut self) {
        let cleared = self.channels.clear_all(self.login.session.as_deref());
        if !cleared.is_empty() {
            info!("voice: cleared channels count={}", cleared.len());
        }
        for (channel, connection) in cleared {
            self.emit_joined(&channel, false, connection.pending_joins);
        }
    }

    fn emit(&self, event: VoiceEvent) {
        let _ = self.events.send(event);
    }

    fn emit_joined(&self, channel: &str, success: bool, times: usize) {
        for _ in 0..times {
            self.emit(VoiceEvent::ChannelJoined {
                channel: channel.to_string(),
                success,
            });
        }
    }

    fn spawn_token_request<F>(&self, request: TokenRequest, wrap: F)
    where
        F: FnOnce(Result<TokenResponse, TokenExchangeError>) -> Completion + Send + 'static,
    {
        let credentials = self.login.credentials.clone();
        let tx = self.completions_tx.clone();
        tokio::spawn(async move {
            let result = match credentials.and_then(|credentials| credentials.upgrade()) {
                Some(exchange) => exchange.generate_token(request).await,
                None => Err(TokenExchangeError::CredentialsReleased),
            };
            let _ = tx.send(wrap(result));
        });
    }

    fn spawn_completion<F>(&self, completion: BackendCompletion, wrap: F)
    where
        F: FnOnce(Result<(), VoiceBackendError>) -> Completion + Send + 'static,
    {
        let tx = self.completions_tx.clone();
        tokio::spawn(async move {
            let result = completion.await;
            let _ = tx.send(wrap(result));
        });
    }

    fn spawn_listener<T, F>(&self, mut events: broadcast::Receiver<T>, wrap: F) -> JoinHandle<()>
    where
        T: Clone + Send + 'static,
        F: Fn(T) -> Completion + Send + 'static,
    {
        let tx = self.completions_tx.clone();
        tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(event) => {
                        if tx.send(wrap(event)).is_err() {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!("voice: backend notifications lagged skipped={skipped}");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        })
    }
}

impl Drop for VoiceOrchestrator {
    fn drop(&mut self) {
        self.uninitialize();
        if let Some(listener) = self.login.state_listener.take() {
            listener.abort();
        }
        self.channels.clear_all(None);
    }
}

#[cfg(test)]
#[path = "tests/orchestrator_tests.rs"]
mod tests;
