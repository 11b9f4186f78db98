use std::sync::Arc;

use tracing::warn;

use crate::{AccountId, LoginSession, VoiceBackend, VoiceBackendError};

/// Backend for platforms without voice support. Every request fails
/// synchronously, so a client built on it stays inert.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullVoiceBackend;

impl VoiceBackend for NullVoiceBackend {
    fn initialize(&self) -> Result<(), VoiceBackendError> {
        warn!("voice: backend not available on this platform");
        Err(VoiceBackendError::Unavailable)
    }

    fn uninitialize(&self) {}

    fn is_initialized(&self) -> bool {
        false
    }

    fn login_session(
        &self,
        _account: &AccountId,
    ) -> Result<Arc<dyn LoginSession>, VoiceBackendError> {
        Err(VoiceBackendError::Unavailable)
    }

    fn set_input_muted(&self, _muted: bool) -> Result<(), VoiceBackendError> {
        Err(VoiceBackendError::Unavailable)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::IdentifierScheme;

    #[test]
    fn every_request_reports_unavailable() {
        let backend = NullVoiceBackend;
        assert_eq!(backend.initialize(), Err(VoiceBackendError::Unavailable));
        assert!(!backend.is_initialized());
        assert_eq!(
            backend.set_input_muted(true),
            Err(VoiceBackendError::Unavailable)
        );
        let account = IdentifierScheme::new("iss", "example.org").account("alice");
        assert!(matches!(
            backend.login_session(&account),
            Err(VoiceBackendError::Unavailable)
        ));
        backend.uninitialize();
    }
}
