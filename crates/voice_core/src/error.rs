use thiserror::Error;
use voice_backend::VoiceBackendError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum LoginRejection {
    #[error("voice backend is not initialized")]
    BackendNotInitialized,
    #[error("already logged in or login in progress")]
    AlreadyActive,
    #[error("username is empty")]
    EmptyUsername,
}

/// Outcome of an operation that was refused or could not be issued.
///
/// None of these are fatal: the orchestrator stays usable after every one of
/// them, and the matching notification has already been emitted.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VoiceError {
    #[error("login rejected: {0}")]
    LoginRejected(#[from] LoginRejection),
    #[error("not logged in")]
    NotLoggedIn,
    #[error("voice backend is not initialized")]
    BackendNotInitialized,
    #[error("channel name is empty")]
    InvalidChannelName,
    #[error("not in channel {0}")]
    NotInChannel(String),
    #[error("channel {0} is still disconnecting")]
    ChannelBusy(String),
    #[error("participant {participant_id} not found in channel {channel}")]
    ParticipantNotFound {
        channel: String,
        participant_id: String,
    },
    #[error("credential context was released")]
    CredentialsReleased,
    #[error("voice backend error: {0}")]
    Backend(#[from] VoiceBackendError),
    #[error("voice service stopped")]
    ServiceStopped,
}
