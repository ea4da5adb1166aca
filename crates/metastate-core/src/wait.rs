#![forbid(unsafe_code)]

//! One-shot waits for the first value of a key.
//!
//! [`AnyValue`] is returned by [`Channel::any_value`](crate::Channel::any_value).
//! Both completion paths feed the same `oneshot` sender, which is consumed by
//! its first use, so a wait can never resolve twice.
//!
//! # Timing
//!
//! | Key at call time | Consumer runs | Future resolves |
//! |------------------|---------------|-----------------|
//! | present | synchronously, before `any_value_with` returns | on first poll |
//! | absent | inside the first later successful dispatch of the key | once that dispatch has run |
//!
//! # Limitations
//!
//! Dropping an `AnyValue` does not unregister its pending subscription; the
//! callback stays registered until the key is dispatched or the channel is
//! dropped. Dropping the channel first resolves the future to
//! [`ChannelError::Closed`].

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use futures::FutureExt;
use futures::channel::oneshot;

use crate::error::ChannelError;

/// Future resolving to the first value observed for a key.
#[must_use = "futures do nothing unless polled"]
pub struct AnyValue<V> {
    key: &'static str,
    rx: oneshot::Receiver<V>,
}

impl<V> AnyValue<V> {
    pub(crate) fn new(key: &'static str, rx: oneshot::Receiver<V>) -> Self {
        Self { key, rx }
    }

    /// Name of the awaited key.
    #[must_use]
    pub fn key(&self) -> &'static str {
        self.key
    }
}

impl<V> Future for AnyValue<V> {
    type Output = Result<V, ChannelError>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        let key = this.key;
        this.rx
            .poll_unpin(cx)
            .map(|received| received.map_err(|_| ChannelError::Closed { key }))
    }
}

impl<V> fmt::Debug for AnyValue<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AnyValue").field("key", &self.key).finish()
    }
}
