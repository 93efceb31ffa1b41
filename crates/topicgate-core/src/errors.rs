use std::borrow::Cow;
use std::time::Duration;
use thiserror::Error;

use crate::encoding::EncodingError;

/// Failure reported by a [`Transport`](crate::Transport).
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("connection error: {details}")]
    Connect { details: Cow<'static, str> },

    #[error("delivery failed: {details}")]
    Delivery { details: Cow<'static, str> },

    #[error("no acknowledgement within {0:?}")]
    Timeout(Duration),

    #[error("close failed: {details}")]
    Close { details: Cow<'static, str> },
}

/// Everything that can go wrong in a single `Publisher::send`.
#[derive(Debug, Error)]
pub enum PublishError {
    #[error("invalid message: {details}")]
    Validation { details: Cow<'static, str> },

    #[error(transparent)]
    Encoding(#[from] EncodingError),

    #[error("failed to send message: {0}")]
    Send(#[source] TransportError),

    #[error("publisher is disconnected")]
    Closed,

    #[error("failed to close broker connection: {0}")]
    Close(#[source] TransportError),
}

impl PublishError {
    pub fn validation(details: impl Into<Cow<'static, str>>) -> Self {
        PublishError::Validation {
            details: details.into(),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            PublishError::Validation { .. } => "validation",
            PublishError::Encoding(e) => e.kind(),
            PublishError::Send(_) => "send",
            PublishError::Closed => "closed",
            PublishError::Close(_) => "close",
        }
    }

    /// True when the caller sent something we can never publish, as opposed
    /// to a failure on our side or the broker's.
    pub fn is_client_error(&self) -> bool {
        match self {
            PublishError::Validation { .. } => true,
            PublishError::Encoding(e) => e.is_client_error(),
            _ => false,
        }
    }
}
