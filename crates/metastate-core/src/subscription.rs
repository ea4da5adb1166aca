#![forbid(unsafe_code)]

//! Subscription guards returned by [`Channel::subscribe`](crate::Channel::subscribe)
//! and [`Channel::subscribe_all`](crate::Channel::subscribe_all).
//!
//! # Invariants
//!
//! 1. The release action runs at most once, whether triggered by
//!    [`Subscription::unsubscribe`] or by drop.
//! 2. Releasing removes exactly the callback registered by this guard, even
//!    when the same closure was registered more than once.
//! 3. A released or detached guard is inert.

use std::fmt;

/// Identity of one registered callback within a channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriberId(pub(crate) u64);

impl SubscriberId {
    /// Raw numeric id (unique per channel, increasing).
    #[must_use]
    pub fn get(self) -> u64 {
        self.0
    }
}

/// RAII handle for a registered callback.
///
/// Dropping the guard unsubscribes. Use [`detach`](Self::detach) to keep the
/// callback registered for the rest of the channel's lifetime.
#[must_use = "dropping a Subscription unsubscribes immediately"]
pub struct Subscription {
    id: SubscriberId,
    release: Option<Box<dyn FnOnce()>>,
}

impl Subscription {
    pub(crate) fn new(id: SubscriberId, release: impl FnOnce() + 'static) -> Self {
        Self {
            id,
            release: Some(Box::new(release)),
        }
    }

    /// Id of the callback this guard controls.
    #[must_use]
    pub fn id(&self) -> SubscriberId {
        self.id
    }

    /// Whether the callback may still be registered.
    ///
    /// `false` after [`unsubscribe`](Self::unsubscribe). A channel that was
    /// dropped does not flip this flag.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.release.is_some()
    }

    /// Remove the callback. Calling this again is a no-op.
    pub fn unsubscribe(&mut self) {
        if let Some(release) = self.release.take() {
            release();
        }
    }

    /// Consume the guard without unsubscribing.
    pub fn detach(mut self) {
        self.release = None;
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("active", &self.is_active())
            .finish()
    }
}
