#![forbid(unsafe_code)]

//! Errors surfaced by channels.
//!
//! `dispatch` itself never fails: subscriber panics are converted into
//! [`ChannelError::SubscriberPanicked`] and logged, not returned.

use std::any::Any;

/// Errors from channel operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ChannelError {
    /// A subscriber panicked while being notified of a dispatch.
    #[error("subscriber for key `{key}` panicked: {message}")]
    SubscriberPanicked { key: &'static str, message: String },
    /// The channel was dropped before the awaited key received a value.
    #[error("channel dropped before key `{key}` received a value")]
    Closed { key: &'static str },
}

impl ChannelError {
    /// Build a [`ChannelError::SubscriberPanicked`] from a caught panic payload.
    pub(crate) fn from_panic(key: &'static str, payload: &(dyn Any + Send)) -> Self {
        let message = if let Some(msg) = payload.downcast_ref::<&'static str>() {
            (*msg).to_string()
        } else if let Some(msg) = payload.downcast_ref::<String>() {
            msg.clone()
        } else {
            "non-string panic payload".to_string()
        };
        Self::SubscriberPanicked { key, message }
    }

    /// Key the error refers to.
    #[must_use]
    pub fn key(&self) -> &'static str {
        match self {
            Self::SubscriberPanicked { key, .. } | Self::Closed { key } => *key,
        }
    }
}
