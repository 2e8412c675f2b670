use thiserror::Error;

/// Errors delivered to a watch callback.
#[derive(Debug, Error)]
pub enum WatchError {
    /// An address or mint is not well formed.
    #[error("malformed {field} '{value}': {reason}")]
    MalformedIdentity {
        field: &'static str,
        value: String,
        reason: String,
    },
    /// RPC or websocket level failure.
    #[error("transport failure: {0}")]
    Transport(String),
    /// A reply arrived but could not be interpreted.
    #[error("decode failure: {0}")]
    Decode(String),
    /// The operation observed the session's cancellation token.
    #[error("watch cancelled")]
    Cancelled,
    /// A workflow panicked.
    #[error("workflow panicked: {0}")]
    Panicked(String),
}

impl WatchError {
    /// Builds a [`WatchError::MalformedIdentity`] for `field`.
    pub fn malformed(
        field: &'static str,
        value: impl Into<String>,
        reason: impl ToString,
    ) -> Self {
        Self::MalformedIdentity {
            field,
            value: value.into(),
            reason: reason.to_string(),
        }
    }

    /// Wraps an RPC or websocket failure.
    pub fn transport(err: impl ToString) -> Self {
        Self::Transport(err.to_string())
    }

    /// True when the error exists only because the session was cancelled.
    pub fn is_cancellation(&self) -> bool {
        matches!(self, WatchError::Cancelled)
    }
}
