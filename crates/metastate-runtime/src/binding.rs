#![forbid(unsafe_code)]

//! Lifecycle-aware bindings between a [`Channel`] and a UI component.
//!
//! The channel knows nothing about components. A host framework adapter
//! drives bindings through the [`Attach`] contract:
//!
//! 1. construct the binding (first synchronous read of the value);
//! 2. [`attach`](Attach::attach) when the component mounts: the binding
//!    re-reads the channel, covering writes that happened since construction,
//!    then subscribes;
//! 3. [`detach`](Attach::detach) exactly once when the component unmounts.
//!
//! While attached, every notification updates the cached value and calls the
//! binding's `on_change` hook, which is where an adapter schedules a
//! re-render.
//!
//! # Usage
//!
//! ```ignore
//! let mut count = ValueBinding::new(&channel, app::Count)
//!     .on_change(|v| request_redraw(v));
//! let reader = count.reader();
//! count.attach();
//!
//! channel.dispatch(app::Count, 3);
//! assert_eq!(reader.get(), Some(3));
//! ```
//!
//! # Invariants
//!
//! 1. A binding holds at most one subscription; `attach` on an attached
//!    binding is a no-op.
//! 2. `on_change` fires only when the cached value actually changes
//!    (`PartialEq`), whether the change comes from a notification or from
//!    the re-sync performed by `attach`.
//! 3. After `detach` (or drop) no callback from the binding fires.
//! 4. A [`BindingScope`] releases subscriptions and bindings together, in
//!    reverse registration order.
//!
//! # Failure Modes
//!
//! - Map or hook panic inside a notification: caught and logged by the
//!   channel; the cached value keeps whatever the map last produced.
//! - Channel dropped while attached: the binding keeps its last value and
//!   `detach` becomes a no-op.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use metastate_core::{Channel, Field, Schema, Subscription, WeakChannel};

// ---------------------------------------------------------------------------
// Attach: lifecycle contract
// ---------------------------------------------------------------------------

/// Lifecycle contract implemented by anything that subscribes on behalf of a
/// component.
pub trait Attach {
    /// Re-synchronize and start listening. Idempotent.
    fn attach(&mut self);

    /// Stop listening. Idempotent.
    fn detach(&mut self);

    /// Whether the binding currently holds a subscription.
    fn is_attached(&self) -> bool;
}

// ---------------------------------------------------------------------------
// Binding<T>: shared read handle
// ---------------------------------------------------------------------------

type Hook<T> = Rc<dyn Fn(&T)>;

/// Cloneable read handle onto a binding's cached value.
pub struct Binding<T> {
    cell: Rc<RefCell<T>>,
}

impl<T> Clone for Binding<T> {
    fn clone(&self) -> Self {
        Self {
            cell: Rc::clone(&self.cell),
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for Binding<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Binding")
            .field("value", &*self.cell.borrow())
            .finish()
    }
}

impl<T: Clone> Binding<T> {
    /// Clone of the cached value.
    #[must_use]
    pub fn get(&self) -> T {
        self.cell.borrow().clone()
    }
}

impl<T> Binding<T> {
    fn new(value: T) -> Self {
        Self {
            cell: Rc::new(RefCell::new(value)),
        }
    }

    /// Borrow the cached value.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        f(&self.cell.borrow())
    }
}

impl<T: PartialEq> Binding<T> {
    /// Store `next`; returns `true` when it differs from the cached value.
    fn replace(&self, next: T) -> bool {
        let mut cell = self.cell.borrow_mut();
        if *cell == next {
            return false;
        }
        *cell = next;
        true
    }
}

fn store_and_notify<T: Clone + PartialEq>(binding: &Binding<T>, hook: Option<&Hook<T>>, next: T) {
    if binding.replace(next) {
        if let Some(hook) = hook {
            let value = binding.get();
            hook(&value);
        }
    }
}

// ---------------------------------------------------------------------------
// ValueBinding: one key, optionally mapped
// ---------------------------------------------------------------------------

/// Binding to a single key of a channel, optionally mapped.
///
/// The map receives `None` while the key is absent.
pub struct ValueBinding<S: Schema, F: Field<S>, T> {
    channel: WeakChannel<S>,
    field: F,
    map: Rc<dyn Fn(Option<&F::Value>) -> T>,
    value: Binding<T>,
    hook: Option<Hook<T>>,
    subscription: Option<Subscription>,
}

impl<S: Schema, F: Field<S>> ValueBinding<S, F, Option<F::Value>>
where
    F::Value: PartialEq,
{
    /// Bind the raw value of `field`.
    #[must_use]
    pub fn new(channel: &Channel<S>, field: F) -> Self {
        Self::mapped(channel, field, |value| value.cloned())
    }
}

impl<S: Schema, F: Field<S>, T: Clone + PartialEq + 'static> ValueBinding<S, F, T> {
    /// Bind `field` through `map`.
    #[must_use]
    pub fn mapped(
        channel: &Channel<S>,
        field: F,
        map: impl Fn(Option<&F::Value>) -> T + 'static,
    ) -> Self {
        let initial = channel.with_value(field, &map);
        Self {
            channel: channel.downgrade(),
            field,
            map: Rc::new(map),
            value: Binding::new(initial),
            hook: None,
            subscription: None,
        }
    }

    /// Call `hook` with the new value whenever the cached value changes.
    #[must_use]
    pub fn on_change(mut self, hook: impl Fn(&T) + 'static) -> Self {
        self.hook = Some(Rc::new(hook));
        self
    }

    /// Shared read handle onto the cached value.
    #[must_use]
    pub fn reader(&self) -> Binding<T> {
        self.value.clone()
    }

    /// Clone of the cached value.
    #[must_use]
    pub fn get(&self) -> T {
        self.value.get()
    }
}

impl<S: Schema, F: Field<S>, T: Clone + PartialEq + 'static> Attach for ValueBinding<S, F, T> {
    fn attach(&mut self) {
        if self.subscription.is_some() {
            return;
        }
        let Some(channel) = self.channel.upgrade() else {
            return;
        };

        let resynced = channel.with_value(self.field, |value| (self.map)(value));
        store_and_notify(&self.value, self.hook.as_ref(), resynced);

        let map = Rc::clone(&self.map);
        let value = self.value.clone();
        let hook = self.hook.clone();
        self.subscription = Some(channel.subscribe(self.field, move |next| {
            store_and_notify(&value, hook.as_ref(), map(Some(next)));
        }));
    }

    fn detach(&mut self) {
        if let Some(mut subscription) = self.subscription.take() {
            subscription.unsubscribe();
        }
    }

    fn is_attached(&self) -> bool {
        self.subscription.is_some()
    }
}

impl<S: Schema, F: Field<S>, T: fmt::Debug> fmt::Debug for ValueBinding<S, F, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ValueBinding")
            .field("key", &S::key_name(F::KEY))
            .field("value", &self.value)
            .field("attached", &self.subscription.is_some())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// SelectBinding: whole-store selector
// ---------------------------------------------------------------------------

/// Binding that derives a value from the whole store.
///
/// Recomputes on every successful dispatch of any key.
pub struct SelectBinding<S: Schema, T> {
    channel: WeakChannel<S>,
    select: Rc<dyn Fn(&S) -> T>,
    value: Binding<T>,
    hook: Option<Hook<T>>,
    subscription: Option<Subscription>,
}

impl<S: Schema, T: Clone + PartialEq + 'static> SelectBinding<S, T> {
    /// Bind the result of `select` over the store.
    #[must_use]
    pub fn new(channel: &Channel<S>, select: impl Fn(&S) -> T + 'static) -> Self {
        let initial = channel.with_snapshot(&select);
        Self {
            channel: channel.downgrade(),
            select: Rc::new(select),
            value: Binding::new(initial),
            hook: None,
            subscription: None,
        }
    }

    /// Call `hook` with the new value whenever the selection changes.
    #[must_use]
    pub fn on_change(mut self, hook: impl Fn(&T) + 'static) -> Self {
        self.hook = Some(Rc::new(hook));
        self
    }

    /// Shared read handle onto the cached selection.
    #[must_use]
    pub fn reader(&self) -> Binding<T> {
        self.value.clone()
    }

    /// Clone of the cached selection.
    #[must_use]
    pub fn get(&self) -> T {
        self.value.get()
    }
}

impl<S: Schema, T: Clone + PartialEq + 'static> Attach for SelectBinding<S, T> {
    fn attach(&mut self) {
        if self.subscription.is_some() {
            return;
        }
        let Some(channel) = self.channel.upgrade() else {
            return;
        };

        let resynced = channel.with_snapshot(|store| (self.select)(store));
        store_and_notify(&self.value, self.hook.as_ref(), resynced);

        let weak = self.channel.clone();
        let select = Rc::clone(&self.select);
        let value = self.value.clone();
        let hook = self.hook.clone();
        self.subscription = Some(channel.subscribe_all(move |_| {
            if let Some(channel) = weak.upgrade() {
                let next = channel.with_snapshot(|store| select(store));
                store_and_notify(&value, hook.as_ref(), next);
            }
        }));
    }

    fn detach(&mut self) {
        if let Some(mut subscription) = self.subscription.take() {
            subscription.unsubscribe();
        }
    }

    fn is_attached(&self) -> bool {
        self.subscription.is_some()
    }
}

impl<S: Schema, T: fmt::Debug> fmt::Debug for SelectBinding<S, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SelectBinding")
            .field("value", &self.value)
            .field("attached", &self.subscription.is_some())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// BindingScope: lifecycle management
// ---------------------------------------------------------------------------

/// Collects subscriptions and bindings for a logical scope (e.g., a component).
///
/// When the scope is dropped, everything it holds is released, cleanly
/// disconnecting all reactive bindings associated with that scope.
///
/// # Usage
///
/// ```ignore
/// let mut scope = BindingScope::new();
/// scope.subscribe(&channel, app::Count, |v| println!("count: {v}"));
/// let label = scope.adopt(ValueBinding::mapped(&channel, app::Count, |v| {
///     format!("count: {}", v.copied().unwrap_or(0))
/// }));
/// // label.get() follows the channel until the scope drops.
/// ```
#[derive(Default)]
pub struct BindingScope {
    held: Vec<Held>,
}

/// One item owned by a [`BindingScope`], in registration order.
enum Held {
    Subscription(Subscription),
    Binding(Box<dyn Attach>),
}

impl Held {
    fn release(self) {
        match self {
            Self::Subscription(mut sub) => sub.unsubscribe(),
            Self::Binding(mut binding) => binding.detach(),
        }
    }
}

impl BindingScope {
    /// Create an empty binding scope.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Keep `sub` alive until the scope is dropped or cleared.
    pub fn hold(&mut self, sub: Subscription) {
        self.held.push(Held::Subscription(sub));
    }

    /// Subscribe to one key within this scope.
    ///
    /// Returns a reference to the scope for chaining.
    pub fn subscribe<S: Schema, F: Field<S>>(
        &mut self,
        channel: &Channel<S>,
        field: F,
        callback: impl Fn(&F::Value) + 'static,
    ) -> &mut Self {
        self.hold(channel.subscribe(field, callback));
        self
    }

    /// Subscribe to every key within this scope.
    pub fn subscribe_all<S: Schema>(
        &mut self,
        channel: &Channel<S>,
        callback: impl Fn(&S::Entry) + 'static,
    ) -> &mut Self {
        self.hold(channel.subscribe_all(callback));
        self
    }

    /// Attach any [`Attach`] implementor and keep it for the scope's lifetime.
    pub fn keep(&mut self, mut binding: impl Attach + 'static) {
        binding.attach();
        self.held.push(Held::Binding(Box::new(binding)));
    }

    /// Attach a [`ValueBinding`] and keep it for the scope's lifetime.
    ///
    /// Returns the binding's read handle.
    pub fn adopt<S, F, T>(&mut self, binding: ValueBinding<S, F, T>) -> Binding<T>
    where
        S: Schema,
        F: Field<S>,
        T: Clone + PartialEq + 'static,
    {
        let reader = binding.reader();
        self.keep(binding);
        reader
    }

    /// Attach a [`SelectBinding`] and keep it for the scope's lifetime.
    pub fn adopt_select<S, T>(&mut self, binding: SelectBinding<S, T>) -> Binding<T>
    where
        S: Schema,
        T: Clone + PartialEq + 'static,
    {
        let reader = binding.reader();
        self.keep(binding);
        reader
    }

    /// Number of subscriptions and bindings held by the scope.
    #[must_use]
    pub fn binding_count(&self) -> usize {
        self.held.len()
    }

    /// Whether the scope holds nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.held.is_empty()
    }

    /// Release everything immediately, newest first (scope stays reusable).
    pub fn clear(&mut self) {
        while let Some(item) = self.held.pop() {
            item.release();
        }
    }
}

impl Drop for BindingScope {
    fn drop(&mut self) {
        self.clear();
    }
}

impl fmt::Debug for BindingScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BindingScope")
            .field("binding_count", &self.binding_count())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
