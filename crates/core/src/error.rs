use crate::messages::MessageKey;

/// What went wrong on the way to the inference service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportKind {
    Network,
    Auth,
    Quota,
    Protocol,
}

/// The intake engine's error taxonomy.
///
/// None of these reach the UI as raw errors: the session converts each one into a
/// single localized turn (see [`IntakeError::message_key`]) or drops it silently.
#[derive(Debug, thiserror::Error)]
pub enum IntakeError {
    #[error("permission denied: {0}")]
    PermissionDenied(String),
    #[error("transport error ({kind:?}): {message}")]
    Transport { kind: TransportKind, message: String },
    #[error("inference service credential is missing")]
    MissingCredential,
    #[error("malformed finalization payload: {0}")]
    MalformedFinalization(String),
    #[error("audio unavailable: {0}")]
    AudioUnavailable(String),
    #[error("session is closed")]
    SessionClosed,
}

impl IntakeError {
    pub fn network(message: impl Into<String>) -> Self {
        IntakeError::Transport {
            kind: TransportKind::Network,
            message: message.into(),
        }
    }

    pub fn protocol(message: impl Into<String>) -> Self {
        IntakeError::Transport {
            kind: TransportKind::Protocol,
            message: message.into(),
        }
    }

    /// The user-facing message for this error, if it should be shown at all.
    pub fn message_key(&self) -> Option<MessageKey> {
        match self {
            IntakeError::PermissionDenied(_) => Some(MessageKey::MicrophoneDenied),
            IntakeError::Transport {
                kind: TransportKind::Auth,
                ..
            } => Some(MessageKey::CredentialRejected),
            IntakeError::Transport { .. } => Some(MessageKey::TransportApology),
            IntakeError::MissingCredential => Some(MessageKey::MissingCredential),
            IntakeError::AudioUnavailable(_) => Some(MessageKey::AudioUnavailable),
            IntakeError::MalformedFinalization(_) | IntakeError::SessionClosed => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_keys() {
        assert_eq!(
            IntakeError::network("reset").message_key(),
            Some(MessageKey::TransportApology)
        );
        assert_eq!(
            IntakeError::Transport {
                kind: TransportKind::Auth,
                message: "403".into()
            }
            .message_key(),
            Some(MessageKey::CredentialRejected)
        );
        assert_eq!(
            IntakeError::MissingCredential.message_key(),
            Some(MessageKey::MissingCredential)
        );
        assert_eq!(
            IntakeError::MalformedFinalization("bad".into()).message_key(),
            None
        );
    }
}
