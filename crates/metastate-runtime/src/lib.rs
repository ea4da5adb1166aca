#![forbid(unsafe_code)]

//! Collaborator-side pieces for [`metastate_core`] channels.
//!
//! - [`binding`]: the [`Attach`] lifecycle contract a UI adapter drives, the
//!   reference [`ValueBinding`] / [`SelectBinding`] implementations, and
//!   [`BindingScope`] for per-component cleanup.
//! - [`context`]: [`MetaContext`], a provider of channel bundles with scoped
//!   overrides.
//! - `logging` (feature `logging`): an `init_logging()` helper backed by
//!   `tracing-subscriber`.

pub mod binding;
pub mod context;
#[cfg(feature = "logging")]
pub mod logging;

pub use binding::{Attach, Binding, BindingScope, SelectBinding, ValueBinding};
pub use context::{MetaContext, ProvideGuard};
#[cfg(feature = "logging")]
pub use logging::init_logging;
