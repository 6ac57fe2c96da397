//! Failure taxonomy for caregiver alert delivery.
//!
//! Channel failures never leave the dispatcher as errors: they are folded into
//! a `ChannelResult`. Only `DispatchError` is returned to callers, and only for
//! misuse of the in-flight gate.

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChannelError {
    /// Required credential or destination is absent or malformed. Detected
    /// before any network attempt.
    #[error("configuration missing: {0}")]
    ConfigurationMissing(String),

    /// The channel could not be reached.
    #[error("transport error: {0}")]
    Transport(String),

    #[error("timed out after {0}ms")]
    Timeout(u64),

    /// The channel answered but did not acknowledge the message.
    #[error("rejected: {0}")]
    Rejected(String),
}

impl ChannelError {
    pub fn kind(&self) -> FailureKind {
        match self {
            Self::ConfigurationMissing(_) => FailureKind::ConfigurationMissing,
            Self::Transport(_) => FailureKind::Transport,
            Self::Timeout(_) => FailureKind::Timeout,
            Self::Rejected(_) => FailureKind::Rejected,
        }
    }

    /// Only reachability failures are worth repeating.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transport(_) | Self::Timeout(_))
    }
}

impl From<reqwest::Error> for ChannelError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Self::Transport(format!("request timed out: {}", e))
        } else {
            Self::Transport(e.to_string())
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    ConfigurationMissing,
    Transport,
    Timeout,
    Rejected,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DispatchError {
    /// `dispatch` was called while another request is still in flight. This is
    /// a caller bug; the call is a no-op.
    #[error("protocol violation: a dispatch is already in flight")]
    ProtocolViolation,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_kinds() {
        assert!(ChannelError::Transport("reset".into()).is_retryable());
        assert!(ChannelError::Timeout(100).is_retryable());
        assert!(!ChannelError::Rejected("chat not found".into()).is_retryable());
        assert!(!ChannelError::ConfigurationMissing("telegram.chat_id".into()).is_retryable());
        assert_eq!(ChannelError::Timeout(5).kind(), FailureKind::Timeout);
    }
}
