use std::sync::Arc;

use futures::future::BoxFuture;
use thiserror::Error;
use tokio::sync::broadcast;

pub mod ids;
pub mod loopback;
pub mod null;

pub use ids::{AccountId, ChannelUri, IdentifierScheme};
pub use loopback::LoopbackVoiceBackend;
pub use null::NullVoiceBackend;

/// Completion of an asynchronous backend request. Resolves at most once.
pub type BackendCompletion = BoxFuture<'static, Result<(), VoiceBackendError>>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VoiceBackendError {
    #[error("voice backend is not available on this platform")]
    Unavailable,
    #[error("voice backend is not initialized")]
    NotInitialized,
    #[error("voice backend request failed with code {code}: {message}")]
    Failed { code: i32, message: String },
}

impl VoiceBackendError {
    pub fn failed(code: i32, message: impl Into<String>) -> Self {
        Self::Failed {
            code,
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginState {
    LoggingIn,
    LoggedIn,
    LoggingOut,
    LoggedOut,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Connected,
    Disconnecting,
    Disconnected,
}

/// Which channels receive the local microphone.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum TransmissionMode {
    #[default]
    None,
    All,
    Single(ChannelUri),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectOptions {
    pub audio: bool,
    pub text: bool,
    pub switch_transmission: bool,
    pub token: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteParticipant {
    pub participant_id: String,
    pub display_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParticipantEvent {
    Added(RemoteParticipant),
    Removed {
        participant_id: String,
    },
    /// Fields left as `None` were not part of this update.
    Updated {
        participant_id: String,
        speech_detected: Option<bool>,
        local_muted: Option<bool>,
    },
}

/// Process-wide voice engine handle.
pub trait VoiceBackend: Send + Sync {
    fn initialize(&self) -> Result<(), VoiceBackendError>;
    fn uninitialize(&self);
    fn is_initialized(&self) -> bool;
    fn login_session(&self, account: &AccountId)
        -> Result<Arc<dyn LoginSession>, VoiceBackendError>;
    fn set_input_muted(&self, muted: bool) -> Result<(), VoiceBackendError>;
}

pub trait LoginSession: Send + Sync {
    fn account(&self) -> &AccountId;
    /// `Err` means the request could not be issued at all.
    fn begin_login(&self, server_uri: &str, token: &str)
        -> Result<BackendCompletion, VoiceBackendError>;
    fn logout(&self);
    fn subscribe_state(&self) -> broadcast::Receiver<LoginState>;
    fn channel_session(
        &self,
        channel: &ChannelUri,
    ) -> Result<Arc<dyn ChannelSession>, VoiceBackendError>;
    fn delete_channel_session(&self, channel: &ChannelUri);
    fn set_transmission_mode(&self, mode: TransmissionMode) -> Result<(), VoiceBackendError>;
}

pub trait ChannelSession: Send + Sync {
    fn channel(&self) -> &ChannelUri;
    fn begin_connect(&self, options: ConnectOptions)
        -> Result<BackendCompletion, VoiceBackendError>;
    fn disconnect(&self) -> Result<(), VoiceBackendError>;
    fn subscribe_state(&self) -> broadcast::Receiver<ConnectionState>;
    fn subscribe_participants(&self) -> broadcast::Receiver<ParticipantEvent>;
    fn begin_set_participant_mute(
        &self,
        participant_id: &str,
        muted: bool,
    ) -> Result<BackendCompletion, VoiceBackendError>;
}
