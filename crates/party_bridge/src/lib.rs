//! Glue between game-session lifecycle events and the voice service: a
//! party session's unique id becomes the voice channel name.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

use voice_core::TokenExchange;

mod bridge;
mod startup;

pub use bridge::PartyVoiceBridge;
pub use startup::{host_party, HostPartyError};

/// Session category the bridge reacts to; every other session is ignored.
pub const PARTY_SESSION: &str = "PartySession";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinSessionResult {
    Success,
    SessionIsFull,
    SessionDoesNotExist,
    AlreadyInSession,
    UnknownError,
}

/// Lifecycle notifications raised by the game's online session layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionLifecycleEvent {
    IdentityLoginCompleted {
        local_user: u32,
        success: bool,
        user_id: String,
    },
    CreateSessionCompleted {
        session_name: String,
        success: bool,
    },
    JoinSessionCompleted {
        session_name: String,
        result: JoinSessionResult,
    },
    DestroySessionCompleted {
        session_name: String,
        success: bool,
    },
}

/// Lookups the bridge needs from the online session layer.
pub trait SessionDirectory: Send + Sync {
    /// Unique id of the named session, if one is active.
    fn session_id(&self, session_name: &str) -> Option<String>;
    /// Token exchange bound to the signed-in local user.
    fn token_exchange(&self, local_user: u32) -> Option<Arc<dyn TokenExchange>>;
}

/// In-memory [`SessionDirectory`] for tools and tests.
#[derive(Default)]
pub struct StaticSessionDirectory {
    sessions: Mutex<HashMap<String, String>>,
    exchanges: Mutex<HashMap<u32, Arc<dyn TokenExchange>>>,
}

impl StaticSessionDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_session(&self, session_name: impl Into<String>, session_id: impl Into<String>) {
        self.sessions
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(session_name.into(), session_id.into());
    }

    pub fn remove_session(&self, session_name: &str) {
        self.sessions
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .remove(session_name);
    }

    pub fn set_token_exchange(&self, local_user: u32, exchange: Arc<dyn TokenExchange>) {
        self.exchanges
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(local_user, exchange);
    }
}

impl SessionDirectory for StaticSessionDirectory {
    fn session_id(&self, session_name: &str) -> Option<String> {
        self.sessions
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(session_name)
            .cloned()
    }

    fn token_exchange(&self, local_user: u32) -> Option<Arc<dyn TokenExchange>> {
        self.exchanges
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(&local_user)
            .cloned()
    }
}
