#![forbid(unsafe_code)]

//! The keyed observable state channel.
//!
//! A [`Channel<S>`] owns a sparse store shaped by schema `S`, an ordered list
//! of global subscribers, and per-key subscriber lists. Cloning a channel
//! yields another handle to the same state.
//!
//! # Invariants
//!
//! 1. A slot changes only through `dispatch*`.
//! 2. A dispatch notifies only when the new value is not [`SameValue`] as the
//!    previous one; absent → present always notifies.
//! 3. All global subscribers run, in registration order, before any per-key
//!    subscriber of the same dispatch.
//! 4. Both the global list and the key's list are snapshotted before any
//!    callback of the pass runs, so callbacks added or removed during a pass
//!    take effect from the next dispatch.
//! 5. A panicking subscriber is logged and skipped; the fan-out continues and
//!    `dispatch` returns normally.
//! 6. No internal borrow is held while user code runs, so callbacks may read,
//!    subscribe, unsubscribe and dispatch re-entrantly.
//!
//! # Re-entrancy
//!
//! A subscriber that dispatches runs a nested notification pass to
//! completion before the outer pass resumes. The stored value is
//! last-write-wins; the outer pass keeps delivering the value it was started
//! with, while [`Channel::get_value`] always reports the latest write.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::rc::{Rc, Weak};

use futures::channel::oneshot;
use tracing::{debug, debug_span, error, trace};

use crate::config::ChannelConfig;
use crate::error::ChannelError;
use crate::schema::{EntryVisitor, Field, SameValue, Schema};
use crate::subscription::{SubscriberId, Subscription};
use crate::wait::AnyValue;

type Callback<S> = Rc<dyn Fn(&<S as Schema>::Entry)>;

struct Registered<S: Schema> {
    id: SubscriberId,
    callback: Callback<S>,
}

struct ChannelInner<S: Schema> {
    config: ChannelConfig,
    store: RefCell<S>,
    version: Cell<u64>,
    next_id: Cell<u64>,
    global: RefCell<Vec<Registered<S>>>,
    by_key: RefCell<HashMap<S::Key, Vec<Registered<S>>>>,
}

impl<S: Schema> ChannelInner<S> {
    fn allocate_id(&self) -> SubscriberId {
        let id = self.next_id.get();
        self.next_id.set(id + 1);
        SubscriberId(id)
    }

    fn remove_global(&self, id: SubscriberId) -> bool {
        remove_by_id(&mut self.global.borrow_mut(), id)
    }

    fn remove_keyed(&self, key: S::Key, id: SubscriberId) -> bool {
        self.by_key
            .borrow_mut()
            .get_mut(&key)
            .is_some_and(|list| remove_by_id(list, id))
    }

    fn snapshot_global(&self) -> Vec<Callback<S>> {
        self.global
            .borrow()
            .iter()
            .map(|registered| Rc::clone(&registered.callback))
            .collect()
    }

    fn snapshot_keyed(&self, key: S::Key) -> Vec<Callback<S>> {
        self.by_key
            .borrow()
            .get(&key)
            .map(|list| {
                list.iter()
                    .map(|registered| Rc::clone(&registered.callback))
                    .collect()
            })
            .unwrap_or_default()
    }

    fn keyed_len(&self, key: S::Key) -> usize {
        self.by_key.borrow().get(&key).map_or(0, Vec::len)
    }
}

/// Remove the entry registered under `id`. Absent ids are ignored.
fn remove_by_id<S: Schema>(list: &mut Vec<Registered<S>>, id: SubscriberId) -> bool {
    match list.iter().position(|registered| registered.id == id) {
        Some(index) => {
            list.remove(index);
            true
        }
        None => false,
    }
}

/// Keyed observable state container.
///
/// See the [module documentation](self) for the notification contract.
pub struct Channel<S: Schema> {
    inner: Rc<ChannelInner<S>>,
}

impl<S: Schema> Clone for Channel<S> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<S: Schema> Default for Channel<S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: Schema> fmt::Debug for Channel<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut dbg = f.debug_struct("Channel");
        dbg.field("name", &self.inner.config.name)
            .field("version", &self.inner.version.get());
        match self.inner.store.try_borrow() {
            Ok(store) => dbg.field("store", &*store),
            Err(_) => dbg.field("store", &"<borrowed>"),
        };
        dbg.field("subscribers", &self.subscriber_count()).finish()
    }
}

impl<S: Schema> Channel<S> {
    /// Create an empty channel.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(S::default(), ChannelConfig::default())
    }

    /// Create a channel seeded with a partial snapshot.
    ///
    /// Seeding does not notify anyone; present slots simply start out present.
    #[must_use]
    pub fn with_initial(initial: S) -> Self {
        Self::with_config(initial, ChannelConfig::default())
    }

    /// Create a channel with explicit diagnostics settings.
    #[must_use]
    pub fn with_config(initial: S, config: ChannelConfig) -> Self {
        Self {
            inner: Rc::new(ChannelInner {
                config,
                store: RefCell::new(initial),
                version: Cell::new(0),
                next_id: Cell::new(0),
                global: RefCell::new(Vec::new()),
                by_key: RefCell::new(HashMap::new()),
            }),
        }
    }

    /// Diagnostic name of the channel.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.inner.config.name
    }

    /// Configuration the channel was built with.
    #[must_use]
    pub fn config(&self) -> &ChannelConfig {
        &self.inner.config
    }

    /// Number of successful dispatches so far.
    #[must_use]
    pub fn version(&self) -> u64 {
        self.inner.version.get()
    }

    /// A non-owning handle to this channel.
    #[must_use]
    pub fn downgrade(&self) -> WeakChannel<S> {
        WeakChannel {
            inner: Rc::downgrade(&self.inner),
        }
    }

    /// Whether two handles share the same state.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    // ---- reads ----

    /// Current value of a slot, or `None` while the key is absent.
    #[must_use]
    pub fn get_value<F: Field<S>>(&self, _field: F) -> Option<F::Value> {
        F::slot(&self.inner.store.borrow()).clone()
    }

    /// Borrow the current value of a slot without cloning.
    ///
    /// # Panics
    ///
    /// Panics if `f` dispatches to this channel.
    pub fn with_value<F: Field<S>, R>(
        &self,
        _field: F,
        f: impl FnOnce(Option<&F::Value>) -> R,
    ) -> R {
        f(F::slot(&self.inner.store.borrow()).as_ref())
    }

    /// Whether the key has been dispatched (or seeded) at least once.
    #[must_use]
    pub fn contains<F: Field<S>>(&self, _field: F) -> bool {
        F::slot(&self.inner.store.borrow()).is_some()
    }

    /// Clone of the whole store.
    #[must_use]
    pub fn snapshot(&self) -> S {
        self.inner.store.borrow().clone()
    }

    /// Borrow the whole store without cloning.
    ///
    /// # Panics
    ///
    /// Panics if `f` dispatches to this channel.
    pub fn with_snapshot<R>(&self, f: impl FnOnce(&S) -> R) -> R {
        f(&self.inner.store.borrow())
    }

    // ---- subscriptions ----

    /// Register `callback` for every successful dispatch of every key.
    pub fn subscribe_all(&self, callback: impl Fn(&S::Entry) + 'static) -> Subscription {
        let id = self.inner.allocate_id();
        self.inner.global.borrow_mut().push(Registered {
            id,
            callback: Rc::new(callback),
        });
        trace!(channel = %self.inner.config.name, id = id.get(), "global subscriber added");

        let weak = Rc::downgrade(&self.inner);
        Subscription::new(id, move || {
            if let Some(inner) = weak.upgrade() {
                if inner.remove_global(id) {
                    trace!(channel = %inner.config.name, id = id.get(), "global subscriber removed");
                }
            }
        })
    }

    /// Register `callback` for successful dispatches of one key.
    pub fn subscribe<F: Field<S>>(
        &self,
        _field: F,
        callback: impl Fn(&F::Value) + 'static,
    ) -> Subscription {
        let id = self.inner.allocate_id();
        self.register_keyed::<F>(id, callback);
        trace!(
            channel = %self.inner.config.name,
            key = S::key_name(F::KEY),
            id = id.get(),
            "key subscriber added"
        );

        let weak = Rc::downgrade(&self.inner);
        Subscription::new(id, move || {
            if let Some(inner) = weak.upgrade() {
                if inner.remove_keyed(F::KEY, id) {
                    trace!(
                        channel = %inner.config.name,
                        key = S::key_name(F::KEY),
                        id = id.get(),
                        "key subscriber removed"
                    );
                }
            }
        })
    }

    fn register_keyed<F: Field<S>>(
        &self,
        id: SubscriberId,
        callback: impl Fn(&F::Value) + 'static,
    ) {
        let wrapped: Callback<S> = Rc::new(move |entry: &S::Entry| {
            if let Some(value) = F::project(entry) {
                callback(value);
            }
        });
        self.inner
            .by_key
            .borrow_mut()
            .entry(F::KEY)
            .or_default()
            .push(Registered {
                id,
                callback: wrapped,
            });
    }

    /// Number of global subscribers.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.inner.global.borrow().len()
    }

    /// Number of subscribers registered for one key, including pending waits.
    #[must_use]
    pub fn key_subscriber_count<F: Field<S>>(&self, _field: F) -> usize {
        self.inner.keyed_len(F::KEY)
    }

    // ---- one-shot waits ----

    /// Wait for the first value of a key.
    ///
    /// Resolves with the current value when the key is present, otherwise with
    /// the value of the first later successful dispatch of the key.
    pub fn any_value<F: Field<S>>(&self, field: F) -> AnyValue<F::Value> {
        self.any_value_with(field, |_| {})
    }

    /// Like [`any_value`](Self::any_value), additionally handing the value to
    /// `consumer`.
    ///
    /// When the key is present, `consumer` runs before this call returns.
    /// Otherwise it runs inside the dispatch that supplies the key, after the
    /// pending registration has removed itself.
    pub fn any_value_with<F: Field<S>>(
        &self,
        field: F,
        consumer: impl FnOnce(&F::Value) + 'static,
    ) -> AnyValue<F::Value> {
        let key = S::key_name(F::KEY);
        let (tx, rx) = oneshot::channel();

        if let Some(value) = self.get_value(field) {
            consumer(&value);
            // The receiver is still in hand, so this cannot fail.
            let _ = tx.send(value);
            return AnyValue::new(key, rx);
        }

        let pending = RefCell::new(Some((tx, consumer)));
        let weak = Rc::downgrade(&self.inner);
        let id = self.inner.allocate_id();
        self.register_keyed::<F>(id, move |value| {
            if let Some(inner) = weak.upgrade() {
                inner.remove_keyed(F::KEY, id);
            }
            let taken = pending.borrow_mut().take();
            let Some((tx, consumer)) = taken else {
                return;
            };
            consumer(value);
            // The caller may have dropped the future; nothing to deliver then.
            let _ = tx.send(value.clone());
        });
        trace!(channel = %self.inner.config.name, key, id = id.get(), "waiting for first value");

        AnyValue::new(key, rx)
    }

    // ---- writes ----

    /// Store `value` under `field` and notify if it differs from the previous value.
    pub fn dispatch<F: Field<S>>(&self, _field: F, value: F::Value) {
        let changed = {
            let mut store = self.inner.store.borrow_mut();
            let previous = F::slot_mut(&mut store).replace(value.clone());
            !matches!(previous, Some(ref prev) if prev.same_value(&value))
        };
        if !changed {
            return;
        }
        self.inner.version.set(self.inner.version.get() + 1);
        self.notify(F::KEY, F::wrap(value));
    }

    /// Compute the next value from the current one and dispatch it.
    ///
    /// `update` receives `None` while the key is absent.
    pub fn dispatch_with<F: Field<S>>(
        &self,
        field: F,
        update: impl FnOnce(Option<&F::Value>) -> F::Value,
    ) {
        let current = self.get_value(field);
        let next = update(current.as_ref());
        self.dispatch(field, next);
    }

    /// Dispatch a single key/value entry.
    pub fn dispatch_entry(&self, entry: S::Entry) {
        S::visit_entry(entry, &mut Dispatcher { channel: self });
    }

    /// Dispatch entries one by one, in iteration order.
    ///
    /// Each entry is gated and notified independently.
    pub fn dispatch_entries(&self, entries: impl IntoIterator<Item = S::Entry>) {
        for entry in entries {
            self.dispatch_entry(entry);
        }
    }

    /// Dispatch every present slot of `partial`, in declaration order.
    pub fn dispatch_partial(&self, partial: S) {
        self.dispatch_entries(partial.into_entries());
    }

    fn notify(&self, key: S::Key, entry: S::Entry) {
        let name = S::key_name(key);
        let _span = self.inner.config.trace_dispatch.then(|| {
            debug_span!("dispatch", channel = %self.inner.config.name, key = name).entered()
        });
        if self.inner.config.trace_dispatch {
            debug!(
                value = ?entry,
                global = self.inner.global.borrow().len(),
                keyed = self.inner.keyed_len(key),
                "start"
            );
        }

        let global = self.inner.snapshot_global();
        let keyed = self.inner.snapshot_keyed(key);
        for callback in global.iter().chain(&keyed) {
            self.invoke(name, &entry, callback);
        }

        if self.inner.config.trace_dispatch {
            debug!(
                global = self.inner.global.borrow().len(),
                keyed = self.inner.keyed_len(key),
                "after"
            );
        }
    }

    fn invoke(&self, key: &'static str, entry: &S::Entry, callback: &Callback<S>) {
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| callback(entry)));
        if let Err(payload) = outcome {
            let err = ChannelError::from_panic(key, payload.as_ref());
            error!(
                channel = %self.inner.config.name,
                key,
                value = ?entry,
                error = %err,
                "subscriber panicked during dispatch"
            );
        }
    }
}

struct Dispatcher<'a, S: Schema> {
    channel: &'a Channel<S>,
}

impl<S: Schema> EntryVisitor<S> for Dispatcher<'_, S> {
    fn visit<F: Field<S>>(&mut self, field: F, value: F::Value) {
        self.channel.dispatch(field, value);
    }
}

/// Non-owning handle to a [`Channel`].
///
/// Useful inside callbacks registered on the same channel, where a strong
/// handle would keep the channel alive through its own subscriber list.
pub struct WeakChannel<S: Schema> {
    inner: Weak<ChannelInner<S>>,
}

impl<S: Schema> WeakChannel<S> {
    /// Recover a strong handle if the channel is still alive.
    #[must_use]
    pub fn upgrade(&self) -> Option<Channel<S>> {
        self.inner.upgrade().map(|inner| Channel { inner })
    }
}

impl<S: Schema> Clone for WeakChannel<S> {
    fn clone(&self) -> Self {
        Self {
            inner: Weak::clone(&self.inner),
        }
    }
}

impl<S: Schema> fmt::Debug for WeakChannel<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WeakChannel")
            .field("alive", &(self.inner.strong_count() > 0))
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
