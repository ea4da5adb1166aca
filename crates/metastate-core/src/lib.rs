#![forbid(unsafe_code)]

//! Keyed observable state channels.
//!
//! This crate provides the core of metastate:
//!
//! - [`Channel`]: a keyed store with global and per-key subscribers,
//!   identity-gated notification and panic-isolated fan-out.
//! - [`Subscription`]: RAII guard that unsubscribes on drop.
//! - [`AnyValue`]: a one-shot future resolving to the first value of a key.
//! - [`Schema`] / [`Field`]: the statically typed key set, usually declared
//!   with [`state_schema!`].
//!
//! # Architecture
//!
//! `Channel<S>` uses `Rc` with interior mutability for single-threaded shared
//! ownership; it is neither `Send` nor `Sync`. Subscriber lists hold strong
//! callbacks keyed by [`SubscriberId`] and are copied before every walk, so
//! callbacks can freely mutate them.
//!
//! # Example
//!
//! ```
//! use std::cell::RefCell;
//! use std::rc::Rc;
//!
//! use metastate_core::{state_schema, Channel};
//!
//! state_schema! {
//!     pub struct Player(key = PlayerKey, entry = PlayerEntry, fields = player) {
//!         track / Track: String,
//!         volume / Volume: u8,
//!     }
//! }
//!
//! let channel = Channel::<Player>::new();
//! let heard = Rc::new(RefCell::new(Vec::new()));
//!
//! let h = Rc::clone(&heard);
//! let _sub = channel.subscribe(player::Volume, move |v| h.borrow_mut().push(*v));
//!
//! channel.dispatch(player::Volume, 30);
//! channel.dispatch(player::Volume, 30); // same value: no notification
//! channel.dispatch_with(player::Volume, |v| v.copied().unwrap_or(0) + 5);
//!
//! assert_eq!(*heard.borrow(), vec![30, 35]);
//! ```

pub mod channel;
pub mod config;
pub mod error;
pub mod schema;
pub mod subscription;
pub mod wait;

pub use channel::{Channel, WeakChannel};
pub use config::{ChannelConfig, TRACE_DISPATCH_ENV};
pub use error::ChannelError;
pub use schema::{EntryVisitor, Field, SameValue, Schema};
pub use subscription::{SubscriberId, Subscription};
pub use wait::AnyValue;
