#![forbid(unsafe_code)]

//! Keyed observable state channels.
//!
//! A [`Channel`] holds a fixed set of typed keys declared with
//! [`state_schema!`]. Writers [`dispatch`](Channel::dispatch) new values;
//! readers take snapshots, subscribe to one key or to all of them, or wait for
//! a key's first value with [`any_value`](Channel::any_value). Subscribers are
//! only told about values that actually changed identity, and a panicking
//! subscriber never stops the others.
//!
//! ```
//! use metastate::prelude::*;
//!
//! state_schema! {
//!     pub struct Shell(key = ShellKey, entry = ShellEntry, fields = shell) {
//!         title / Title: String,
//!         busy / Busy: bool,
//!     }
//! }
//!
//! let channel = Channel::<Shell>::new();
//! let _sub = channel.subscribe(shell::Busy, |busy| println!("busy: {busy}"));
//! channel.dispatch(shell::Busy, true);
//! channel.dispatch(shell::Busy, true); // same value, no notification
//! assert_eq!(channel.version(), 1);
//! ```
//!
//! # Crates
//!
//! - `metastate-core`: schemas, the channel, subscriptions, one-shot waits.
//! - `metastate-runtime` (feature `runtime`, on by default): component
//!   bindings, binding scopes and the `MetaContext` provider.

pub use metastate_core::{
    AnyValue, Channel, ChannelConfig, ChannelError, EntryVisitor, Field, SameValue, Schema,
    SubscriberId, Subscription, TRACE_DISPATCH_ENV, WeakChannel, impl_same_value_by_eq,
    state_schema,
};

#[cfg(feature = "runtime")]
pub use metastate_runtime::{
    Attach, Binding, BindingScope, MetaContext, ProvideGuard, SelectBinding, ValueBinding,
};

#[cfg(feature = "logging")]
pub use metastate_runtime::init_logging;

pub use metastate_core;
#[cfg(feature = "runtime")]
pub use metastate_runtime;

/// Everything needed to declare a schema and work with its channel.
pub mod prelude {
    pub use crate::{
        AnyValue, Channel, ChannelConfig, ChannelError, Field, SameValue, Schema, Subscription,
        impl_same_value_by_eq, state_schema,
    };

    #[cfg(feature = "runtime")]
    pub use crate::{Attach, BindingScope, MetaContext, SelectBinding, ValueBinding};
}
