#![forbid(unsafe_code)]

//! Scoped provider for a bundle of channels.
//!
//! Applications usually group their channels into one struct and hand it down
//! the component tree. [`MetaContext`] owns the default bundle and a stack of
//! scoped overrides; a subtree that needs isolated state pushes a fresh bundle
//! with [`provide`](MetaContext::provide) and the previous one comes back when
//! the [`ProvideGuard`] drops.
//!
//! ```ignore
//! #[derive(Clone)]
//! struct Meta {
//!     session: Channel<Session>,
//!     layout: Channel<Layout>,
//! }
//!
//! let ctx = MetaContext::new(|| Meta {
//!     session: Channel::new(),
//!     layout: Channel::new(),
//! });
//!
//! // Isolated session for a preview pane, shared layout.
//! let outer = ctx.get();
//! let _preview = ctx.provide(|fresh| Meta { layout: outer.layout.clone(), ..fresh });
//! ```
//!
//! A process-wide context is left to the application, typically a
//! `thread_local!` holding a `MetaContext` and a `global()` accessor cloning it.
//!
//! # Invariants
//!
//! 1. `get()` returns the innermost active override, else the default bundle.
//! 2. Guards must drop in LIFO order; debug builds assert it.
//! 3. Clones of a `MetaContext` share the default bundle and the override stack.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

use tracing::trace;

type Factory<T> = Rc<dyn Fn() -> T>;

/// Default bundle plus scoped overrides.
pub struct MetaContext<T: Clone> {
    factory: Factory<T>,
    base: T,
    overrides: Rc<RefCell<Vec<(u64, T)>>>,
    next_token: Rc<Cell<u64>>,
}

impl<T: Clone> Clone for MetaContext<T> {
    fn clone(&self) -> Self {
        Self {
            factory: Rc::clone(&self.factory),
            base: self.base.clone(),
            overrides: Rc::clone(&self.overrides),
            next_token: Rc::clone(&self.next_token),
        }
    }
}

impl<T: Clone + 'static> MetaContext<T> {
    /// Build the default bundle with `factory` and keep the factory for
    /// later [`provide`](Self::provide) calls.
    #[must_use]
    pub fn new(factory: impl Fn() -> T + 'static) -> Self {
        let base = factory();
        Self {
            factory: Rc::new(factory),
            base,
            overrides: Rc::new(RefCell::new(Vec::new())),
            next_token: Rc::new(Cell::new(0)),
        }
    }

    /// Active bundle, honoring any scoped override.
    #[must_use]
    pub fn get(&self) -> T {
        self.overrides
            .borrow()
            .last()
            .map_or_else(|| self.base.clone(), |(_, bundle)| bundle.clone())
    }

    /// Default bundle without considering overrides.
    #[must_use]
    pub fn base(&self) -> T {
        self.base.clone()
    }

    /// Number of active overrides.
    #[must_use]
    pub fn depth(&self) -> usize {
        self.overrides.borrow().len()
    }

    /// A freshly built bundle, not installed anywhere.
    #[must_use]
    pub fn fresh(&self) -> T {
        (self.factory)()
    }

    /// Push an override derived from a freshly built bundle.
    ///
    /// `merge` receives the new bundle and returns the one to install, which
    /// lets a subtree keep some of the outer channels while isolating others.
    #[must_use = "dropping this guard removes the override"]
    pub fn provide(&self, merge: impl FnOnce(T) -> T) -> ProvideGuard<T> {
        let bundle = merge(self.fresh());
        self.provide_value(bundle)
    }

    /// Push a ready-made bundle as an override.
    #[must_use = "dropping this guard removes the override"]
    pub fn provide_value(&self, bundle: T) -> ProvideGuard<T> {
        let token = self.next_token.get() + 1;
        self.next_token.set(token);
        self.overrides.borrow_mut().push((token, bundle));
        trace!(depth = self.depth(), "meta context override pushed");
        ProvideGuard {
            stack: Rc::clone(&self.overrides),
            token,
        }
    }
}

impl<T: Clone> fmt::Debug for MetaContext<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MetaContext")
            .field("depth", &self.overrides.borrow().len())
            .finish_non_exhaustive()
    }
}

/// RAII guard for a scoped override pushed by [`MetaContext::provide`].
#[must_use = "dropping this guard removes the override"]
pub struct ProvideGuard<T> {
    stack: Rc<RefCell<Vec<(u64, T)>>>,
    token: u64,
}

impl<T> Drop for ProvideGuard<T> {
    fn drop(&mut self) {
        let popped = self.stack.borrow_mut().pop();
        if let Some((token, _)) = popped {
            debug_assert_eq!(token, self.token, "meta context overrides dropped out of order");
        }
        trace!(depth = self.stack.borrow().len(), "meta context override popped");
    }
}

impl<T> fmt::Debug for ProvideGuard<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProvideGuard")
            .field("token", &self.token)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use metastate_core::{Channel, state_schema};

    state_schema! {
        struct Session(key = SessionKey, entry = SessionEntry, fields = session) {
            user / User: String,
        }
    }

    state_schema! {
        struct Layout(key = LayoutKey, entry = LayoutEntry, fields = layout) {
            columns / Columns: u8,
        }
    }

    #[derive(Clone)]
    struct Meta {
        session: Channel<Session>,
        layout: Channel<Layout>,
    }

    fn context() -> MetaContext<Meta> {
        MetaContext::new(|| Meta {
            session: Channel::new(),
            layout: Channel::new(),
        })
    }

    #[test]
    fn get_returns_base_without_overrides() {
        let ctx = context();
        assert_eq!(ctx.depth(), 0);
        assert!(ctx.get().session.ptr_eq(&ctx.base().session));
    }

    #[test]
    fn clones_share_state() {
        let ctx = context();
        let other = ctx.clone();
        other.get().session.dispatch(session::User, "ada".into());
        assert_eq!(ctx.get().session.get_value(session::User).as_deref(), Some("ada"));

        let _guard = other.provide(|fresh| fresh);
        assert_eq!(ctx.depth(), 1);
    }

    #[test]
    fn provide_installs_fresh_bundle() {
        let ctx = context();
        ctx.base().session.dispatch(session::User, "outer".into());

        let guard = ctx.provide(|fresh| fresh);
        let inner = ctx.get();
        assert!(!inner.session.ptr_eq(&ctx.base().session));
        assert_eq!(inner.session.get_value(session::User), None);

        drop(guard);
        assert!(ctx.get().session.ptr_eq(&ctx.base().session));
    }

    #[test]
    fn provide_can_keep_outer_channels() {
        let ctx = context();
        let outer = ctx.get();
        let _guard = ctx.provide(|fresh| Meta {
            layout: outer.layout.clone(),
            ..fresh
        });

        let inner = ctx.get();
        assert!(inner.layout.ptr_eq(&outer.layout));
        assert!(!inner.session.ptr_eq(&outer.session));

        inner.layout.dispatch(layout::Columns, 3);
        assert_eq!(outer.layout.get_value(layout::Columns), Some(3));
    }

    #[test]
    fn overrides_are_lifo() {
        let ctx = context();
        let first = ctx.fresh();
        let second = ctx.fresh();

        let _outer = ctx.provide_value(first.clone());
        assert!(ctx.get().session.ptr_eq(&first.session));
        {
            let _inner = ctx.provide_value(second.clone());
            assert_eq!(ctx.depth(), 2);
            assert!(ctx.get().session.ptr_eq(&second.session));
        }
        assert_eq!(ctx.depth(), 1);
        assert!(ctx.get().session.ptr_eq(&first.session));
    }

    #[test]
    fn debug_reports_depth() {
        let ctx = context();
        let _guard = ctx.provide(|fresh| fresh);
        assert!(format!("{ctx:?}").contains("depth: 1"));
    }
}
