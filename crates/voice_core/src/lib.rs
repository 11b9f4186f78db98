//! Voice session orchestration for game clients: login, channel membership,
//! transmission routing and mute control on top of a [`voice_backend`]
//! engine, with tokens issued through a pluggable [`TokenExchange`].

pub mod channel_manager;
pub mod error;
pub mod events;
pub mod orchestrator;
pub mod service;
pub mod settings;
pub mod token_exchange;

pub use channel_manager::{ChannelConnectionState, ChannelSessionManager, Participant};
pub use error::{LoginRejection, VoiceError};
pub use events::VoiceEvent;
pub use orchestrator::{TransmissionRoute, VoiceLoginState, VoiceOrchestrator};
pub use service::{spawn_service, ChannelSnapshot, VoiceChatHandle, VoiceSnapshot};
pub use settings::{load_settings, load_settings_from, VoiceSettings, SETTINGS_FILE};
pub use token_exchange::{
    DevTokenExchange, HttpTokenExchange, MissingTokenExchange, TokenExchange, TokenExchangeError,
};
