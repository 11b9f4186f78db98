use std::{collections::HashMap, sync::Arc};

use tokio::task::JoinHandle;
use tracing::{debug, info};
use voice_backend::{ChannelSession, ChannelUri, LoginSession, RemoteParticipant};

use crate::events::VoiceEvent;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelConnectionState {
    Requesting,
    Connecting,
    Connected,
    Disconnecting,
    Disconnected,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Participant {
    pub participant_id: String,
    pub display_name: String,
    pub local_muted: bool,
    pub talking: bool,
}

pub(crate) struct ChannelConnection {
    pub(crate) generation: u64,
    pub(crate) state: ChannelConnectionState,
    pub(crate) session: Option<Arc<dyn ChannelSession>>,
    participants: HashMap<String, Participant>,
    participant_listener: Option<JoinHandle<()>>,
    state_listener: Option<JoinHandle<()>>,
    /// Join calls waiting for this connection to resolve.
    pub(crate) pending_joins: usize,
}

impl ChannelConnection {
    fn release_listeners(&mut self) {
        if let Some(listener) = self.state_listener.take() {
            listener.abort();
        }
        if let Some(listener) = self.participant_listener.take() {
            listener.abort();
        }
    }
}

/// Channel name → connection, plus the per-channel talking table used for
/// edge detection of talking-changed notifications.
#[derive(Default)]
pub struct ChannelSessionManager {
    connections: HashMap<String, ChannelConnection>,
    talking: HashMap<String, HashMap<String, bool>>,
}

impl ChannelSessionManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, channel: &str) -> bool {
        self.connections.contains_key(channel)
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    /// Absent channels report `Disconnected`.
    pub fn state(&self, channel: &str) -> ChannelConnectionState {
        self.connections
            .get(channel)
            .map(|connection| connection.state)
            .unwrap_or(ChannelConnectionState::Disconnected)
    }

    pub fn channel_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.connections.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn participants(&self, channel: &str) -> Vec<Participant> {
        let mut participants: Vec<Participant> = self
            .connections
            .get(channel)
            .map(|connection| connection.participants.values().cloned().collect())
            .unwrap_or_default();
        participants.sort_by(|a, b| a.participant_id.cmp(&b.participant_id));
        participants
    }

    pub fn participant(&self, channel: &str, participant_id: &str) -> Option<&Participant> {
        self.connections
            .get(channel)
            .and_then(|connection| connection.participants.get(participant_id))
    }

    pub(crate) fn existing_state(&self, channel: &str) -> Option<ChannelConnectionState> {
        self.connections.get(channel).map(|connection| connection.state)
    }

    /// True when `generation` still identifies the live connection for `channel`.
    pub(crate) fn is_current(&self, channel: &str, generation: u64) -> bool {
        self.connections
            .get(channel)
            .is_some_and(|connection| connection.generation == generation)
    }

    pub(crate) fn session(&self, channel: &str) -> Option<Arc<dyn ChannelSession>> {
        self.connections
            .get(channel)
            .and_then(|connection| connection.session.clone())
    }

    pub(crate) fn connected_channel_uri(&self, channel: &str) -> Option<ChannelUri> {
        self.connections
            .get(channel)
            .filter(|connection| connection.state == ChannelConnectionState::Connected)
            .and_then(|connection| connection.session.as_ref())
            .map(|session| session.channel().clone())
    }

    pub(crate) fn insert_requesting(&mut self, channel: &str, generation: u64) {
        self.connections.insert(
            channel.to_string(),
            ChannelConnection {
                generation,
                state: ChannelConnectionState::Requesting,
                session: None,
                participants: HashMap::new(),
                participant_listener: None,
                state_listener: None,
                pending_joins: 1,
            },
        );
        self.talking.insert(channel.to_string(), HashMap::new());
    }

    pub(crate) fn add_pending_join(&mut self, channel: &str) {
        if let Some(connection) = self.connections.get_mut(channel) {
            connection.pending_joins += 1;
        }
    }

    pub(crate) fn begin_connecting(
        &mut self,
        channel: &str,
        session: Arc<dyn ChannelSession>,
        participant_listener: JoinHandle<()>,
    ) {
        match self.connections.get_mut(channel) {
            Some(connection) => {
                connection.state = ChannelConnectionState::Connecting;
                connection.session = Some(session);
                if let Some(previous) = connection.participant_listener.replace(participant_listener)
                {
                    previous.abort();
                }
            }
            None => participant_listener.abort(),
        }
    }

    /// Marks the channel connected and returns how many join calls were waiting.
    pub(crate) fn mark_connected(&mut self, channel: &str, state_listener: JoinHandle<()>) -> usize {
        match self.connections.get_mut(channel) {
            Some(connection) => {
                connection.state = ChannelConnectionState::Connected;
                if let Some(previous) = connection.state_listener.replace(state_listener) {
                    previous.abort();
                }
                std::mem::take(&mut connection.pending_joins)
            }
            None => {
                state_listener.abort();
                0
            }
        }
    }

    pub(crate) fn set_state(&mut self, channel: &str, state: ChannelConnectionState) {
        if let Some(connection) = self.connections.get_mut(channel) {
            connection.state = state;
        }
    }

    /// Sessions that still need a disconnect request.
    pub(crate) fn active_sessions(&self) -> Vec<(String, Arc<dyn ChannelSession>)> {
        self.connections
            .iter()
            .filter(|(_, connection)| connection.state != ChannelConnectionState::Disconnecting)
            .filter_map(|(name, connection)| {
                connection
                    .session
                    .as_ref()
                    .map(|session| (name.clone(), Arc::clone(session)))
            })
            .collect()
    }

    pub fn participant_added(
        &mut self,
        channel: &str,
        participant: RemoteParticipant,
    ) -> Option<VoiceEvent> {
        let Some(connection) = self.connections.get_mut(channel) else {
            debug!(
                "voice: participant added for unknown channel={channel} participant={}",
                participant.participant_id
            );
            return None;
        };

        self.talking
            .entry(channel.to_string())
            .or_default()
            .insert(participant.participant_id.clone(), false);
        connection.participants.insert(
            participant.participant_id.clone(),
            Participant {
                participant_id: participant.participant_id.clone(),
                display_name: participant.display_name.clone(),
                local_muted: false,
                talking: false,
            },
        );

        info!(
            "voice: participant added channel={channel} participant={}",
            participant.participant_id
        );
        Some(VoiceEvent::ParticipantAdded {
            channel: channel.to_string(),
            participant_id: participant.participant_id,
            display_name: participant.display_name,
        })
    }

    pub fn participant_removed(&mut self, channel: &str, participant_id: &str) -> Option<VoiceEvent> {
        let connection = self.connections.get_mut(channel)?;
        connection.participants.remove(participant_id);
        if let Some(talking) = self.talking.get_mut(channel) {
            talking.remove(participant_id);
        }

        info!("voice: participant removed channel={channel} participant={participant_id}");
        Some(VoiceEvent::ParticipantRemoved {
            channel: channel.to_string(),
            participant_id: participant_id.to_string(),
        })
    }

    /// Emits only on an actual talking flip; never creates a participant.
    pub fn participant_updated(
        &mut self,
        channel: &str,
        participant_id: &str,
        speech_detected: Option<bool>,
        local_muted: Option<bool>,
    ) -> Option<VoiceEvent> {
        let participant = self
            .connections
            .get_mut(channel)?
            .participants
            .get_mut(participant_id)?;

        if let Some(muted) = local_muted {
            participant.local_muted = muted;
        }

        let talking = speech_detected?;
        participant.talking = talking;
        let previous = self
            .talking
            .get_mut(channel)?
            .insert(participant_id.to_string(), talking);
        if previous == Some(talking) {
            return None;
        }

        Some(VoiceEvent::ParticipantTalkingChanged {
            channel: channel.to_string(),
            participant_id: participant_id.to_string(),
            talking,
        })
    }

    pub(crate) fn set_participant_muted(&mut self, channel: &str, participant_id: &str, muted: bool) {
        if let Some(participant) = self
            .connections
            .get_mut(channel)
            .and_then(|connection| connection.participants.get_mut(participant_id))
        {
            participant.local_muted = muted;
        }
    }

    /// Unregisters listeners, releases the backend handle and erases all
    /// state for `channel`. Returns the removed connection the first time
    /// and `None` on every later call.
    pub(crate) fn cleanup(
        &mut self,
        channel: &str,
        login: Option<&dyn LoginSession>,
    ) -> Option<ChannelConnection> {
        self.talking.remove(channel);
        let mut connection = self.connections.remove(channel)?;
        connection.release_listeners();
        if let (Some(session), Some(login)) = (connection.session.take(), login) {
            login.delete_channel_session(session.channel());
        }
        connection.state = ChannelConnectionState::Disconnected;
        debug!("voice: cleaned up channel={channel}");
        Some(connection)
    }

    /// Runs cleanup for every channel without waiting for the backend.
    pub(crate) fn clear_all(
        &mut self,
        login: Option<&dyn LoginSession>,
    ) -> Vec<(String, ChannelConnection)> {
        let names: Vec<String> = self.connections.keys().cloned().collect();
        let cleared = names
            .into_iter()
            .filter_map(|name| {
                self.cleanup(&name, login)
                    .map(|connection| (name, connection))
            })
            .collect();
        self.talking.clear();
        cleared
    }
}

#[cfg(test)]
#[path = "tests/channel_manager_tests.rs"]
mod tests;
