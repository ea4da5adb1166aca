#![forbid(unsafe_code)]

//! Statically typed key sets for [`Channel`](crate::Channel).
//!
//! A schema is a plain struct whose fields are all `Option<V>`. `None` marks a
//! key that has never been dispatched, so the same struct serves as the live
//! store, the partial snapshot passed to constructors, and the argument of a
//! batch dispatch.
//!
//! Schemas are normally declared through [`state_schema!`](crate::state_schema),
//! which generates:
//!
//! - the snapshot struct (implements [`Schema`]);
//! - a key enum naming every slot;
//! - an entry enum carrying one key/value pair;
//! - one zero-sized marker per slot implementing [`Field`].
//!
//! # Identity
//!
//! Change detection goes through [`SameValue`] rather than `PartialEq`.
//! Immutable scalars compare by value, shared pointers (`Rc`, `Arc`) compare
//! by address. Writing a freshly allocated `Rc` with equal contents therefore
//! counts as a change, while re-dispatching the same `Rc` does not.

use std::fmt;
use std::hash::Hash;
use std::rc::Rc;
use std::sync::Arc;

/// Identity comparison used to gate notifications.
pub trait SameValue {
    /// Whether `other` is the same value as `self` for notification purposes.
    fn same_value(&self, other: &Self) -> bool;
}

macro_rules! same_value_by_eq {
    ($($ty:ty),* $(,)?) => {
        $(
            impl SameValue for $ty {
                #[inline]
                fn same_value(&self, other: &Self) -> bool {
                    self == other
                }
            }
        )*
    };
}

same_value_by_eq!(
    (),
    bool,
    char,
    u8,
    u16,
    u32,
    u64,
    u128,
    usize,
    i8,
    i16,
    i32,
    i64,
    i128,
    isize,
    f32,
    f64,
    String,
    &'static str,
);

impl<T: ?Sized> SameValue for Rc<T> {
    #[inline]
    fn same_value(&self, other: &Self) -> bool {
        Rc::ptr_eq(self, other)
    }
}

impl<T: ?Sized> SameValue for Arc<T> {
    #[inline]
    fn same_value(&self, other: &Self) -> bool {
        Arc::ptr_eq(self, other)
    }
}

impl<T: SameValue> SameValue for Option<T> {
    fn same_value(&self, other: &Self) -> bool {
        match (self, other) {
            (Some(a), Some(b)) => a.same_value(b),
            (None, None) => true,
            _ => false,
        }
    }
}

/// Implement [`SameValue`] for user types by delegating to `PartialEq`.
///
/// ```
/// #[derive(Clone, Debug, PartialEq)]
/// enum Status {
///     Loading,
///     Ready,
/// }
///
/// metastate_core::impl_same_value_by_eq!(Status);
/// ```
#[macro_export]
macro_rules! impl_same_value_by_eq {
    ($($ty:ty),+ $(,)?) => {
        $(
            impl $crate::SameValue for $ty {
                #[inline]
                fn same_value(&self, other: &Self) -> bool {
                    self == other
                }
            }
        )+
    };
}

/// A closed set of keys, each with its own value type.
pub trait Schema: Default + Clone + fmt::Debug + 'static {
    /// Names one slot of the schema.
    type Key: Copy + Eq + Hash + fmt::Debug + 'static;
    /// One key/value pair of the schema.
    type Entry: Clone + fmt::Debug + 'static;

    /// The key an entry addresses.
    fn key_of(entry: &Self::Entry) -> Self::Key;

    /// Stable, human-readable key name (used in logs and errors).
    fn key_name(key: Self::Key) -> &'static str;

    /// Present slots as entries, in declaration order.
    fn into_entries(self) -> Vec<Self::Entry>;

    /// Hand an entry to `visitor` together with its typed [`Field`] marker.
    fn visit_entry<V: EntryVisitor<Self>>(entry: Self::Entry, visitor: &mut V);
}

/// A typed handle to a single slot of schema `S`.
pub trait Field<S: Schema>: Copy + 'static {
    /// Value type stored in the slot.
    type Value: Clone + SameValue + fmt::Debug + 'static;

    /// Key of the slot.
    const KEY: S::Key;

    /// Shared access to the slot.
    fn slot(store: &S) -> &Option<Self::Value>;

    /// Exclusive access to the slot.
    fn slot_mut(store: &mut S) -> &mut Option<Self::Value>;

    /// Wrap a value into the schema's entry type.
    fn wrap(value: Self::Value) -> S::Entry;

    /// Borrow the value out of an entry addressed to this slot.
    fn project(entry: &S::Entry) -> Option<&Self::Value>;
}

/// Receives an entry split into its typed field and value.
pub trait EntryVisitor<S: Schema> {
    /// Handle one entry, already split into its field marker and value.
    fn visit<F: Field<S>>(&mut self, field: F, value: F::Value);
}

/// Declare a [`Schema`] together with its key enum, entry enum and field markers.
///
/// ```
/// use metastate_core::{state_schema, Channel};
///
/// state_schema! {
///     /// Shared state of the session view.
///     pub struct Session(key = SessionKey, entry = SessionEntry, fields = session) {
///         status / Status: String,
///         count / Count: u32,
///     }
/// }
///
/// let channel = Channel::with_initial(Session {
///     count: Some(1),
///     ..Session::default()
/// });
/// channel.dispatch_with(session::Count, |prev| prev.copied().unwrap_or(0) + 1);
/// assert_eq!(channel.get_value(session::Count), Some(2));
/// assert_eq!(channel.get_value(session::Status), None);
/// assert_eq!(SessionKey::Status.name(), "status");
/// ```
#[macro_export]
macro_rules! state_schema {
    (
        $(#[$meta:meta])*
        $vis:vis struct $name:ident (key = $key:ident, entry = $entry:ident, fields = $fields:ident) {
            $(
                $(#[$fmeta:meta])*
                $field:ident / $variant:ident : $ty:ty
            ),* $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Clone, Debug, Default)]
        $vis struct $name {
            $(
                $(#[$fmeta])*
                pub $field: ::core::option::Option<$ty>,
            )*
        }

        /// Keys of the schema.
        #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
        $vis enum $key {
            $($variant,)*
        }

        impl $key {
            /// Field name of the key.
            #[must_use]
            pub const fn name(self) -> &'static str {
                match self {
                    $(Self::$variant => ::core::stringify!($field),)*
                }
            }
        }

        /// A single key/value pair of the schema.
        #[derive(Clone, Debug)]
        $vis enum $entry {
            $($variant($ty),)*
        }

        /// Typed field markers of the schema.
        $vis mod $fields {
            $(
                #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
                pub struct $variant;
            )*
        }

        impl $crate::Schema for $name {
            type Key = $key;
            type Entry = $entry;

            fn key_of(entry: &$entry) -> $key {
                match entry {
                    $($entry::$variant(_) => $key::$variant,)*
                }
            }

            fn key_name(key: $key) -> &'static str {
                key.name()
            }

            fn into_entries(self) -> ::std::vec::Vec<$entry> {
                let mut entries = ::std::vec::Vec::new();
                $(
                    if let ::core::option::Option::Some(value) = self.$field {
                        entries.push($entry::$variant(value));
                    }
                )*
                entries
            }

            fn visit_entry<V: $crate::EntryVisitor<Self>>(entry: $entry, visitor: &mut V) {
                match entry {
                    $($entry::$variant(value) => visitor.visit($fields::$variant, value),)*
                }
            }
        }

        $(
            impl $crate::Field<$name> for $fields::$variant {
                type Value = $ty;

                const KEY: $key = $key::$variant;

                fn slot(store: &$name) -> &::core::option::Option<$ty> {
                    &store.$field
                }

                fn slot_mut(store: &mut $name) -> &mut ::core::option::Option<$ty> {
                    &mut store.$field
                }

                fn wrap(value: $ty) -> $entry {
                    $entry::$variant(value)
                }

                fn project(entry: &$entry) -> ::core::option::Option<&$ty> {
                    #[allow(unreachable_patterns)]
                    match entry {
                        $entry::$variant(value) => ::core::option::Option::Some(value),
                        _ => ::core::option::Option::None,
                    }
                }
            }
        )*
    };
}
