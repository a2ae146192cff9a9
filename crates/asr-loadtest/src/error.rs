use asr_protocol::audio::LayoutError;
use thiserror::Error;

/// Why a single exchange failed. Every kind is scoped to one session: the
/// worker logs it, counts it and carries on.
#[derive(Debug, Error)]
pub enum ExchangeError {
    #[error("audio precondition failed: {0}")]
    Precondition(#[from] LayoutError),

    #[error("connect failed: {0}")]
    Connect(String),

    #[error("handshake failed: {0}")]
    Handshake(String),

    #[error("transport error: {0}")]
    Transport(String),
}

impl ExchangeError {
    /// Short label for logs and counters.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Precondition(_) => "precondition",
            Self::Connect(_) => "connect",
            Self::Handshake(_) => "handshake",
            Self::Transport(_) => "transport",
        }
    }

    /// Whether running the same payload again can succeed. A precondition
    /// failure is a property of the payload and fails identically every time.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, Self::Precondition(_))
    }

    pub(crate) fn transport(op: &str, err: impl std::fmt::Display) -> Self {
        Self::Transport(format!("{op}: {err}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout_errors_convert_to_precondition() {
        let err: ExchangeError = LayoutError::Empty.into();
        assert_eq!(err.kind(), "precondition");
        assert_eq!(err.to_string(), "audio precondition failed: audio payload is empty");
        assert!(!err.is_retryable());
    }

    #[test]
    fn io_failures_are_retryable() {
        assert!(ExchangeError::Connect("refused".into()).is_retryable());
        assert!(ExchangeError::Handshake("reset".into()).is_retryable());
        assert!(ExchangeError::transport("read", "timed out").is_retryable());
    }

    #[test]
    fn transport_message_names_operation() {
        let err = ExchangeError::transport("read response", "connection reset");
        assert_eq!(err.kind(), "transport");
        assert_eq!(err.to_string(), "transport error: read response: connection reset");
    }
}
