//! The store engine.
//!
//! A [`Store`] composes slices into one [`RootState`], routes each
//! dispatched action to the slice named by its type prefix, commits the
//! result as a new snapshot and notifies listeners.
//!
//! Lifecycle of a dispatch:
//! 1. derive the slice key from the action type;
//! 2. look the slice up (`UnknownSlice` if absent);
//! 3. run the slice reducer on the current sub-state;
//! 4. build the next root state, sharing every untouched slice;
//! 5. commit it and bump the version;
//! 6. call every listener, then publish to watch streams.
//!
//! Failures in steps 1-3 leave the store untouched.

use parking_lot::{Mutex, MutexGuard, RwLock};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::any::Any;
use std::collections::{BTreeMap, VecDeque};
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Weak};
use std::thread::{self, ThreadId};
use tracing::{debug, error, info, warn};

use crate::action::{Action, IntoAction};
use crate::config::{ReentrancyPolicy, StoreConfig};
use crate::error::{Result, StoreError};
use crate::slice::Slice;
use crate::state::{json_kind, RootState};
use crate::watch::{changed_slices, ChangeKind, StateChange, WatchSender, WatchStream};

/// A change callback. Listeners receive no arguments and re-read state
/// through the store.
pub type Listener = Arc<dyn Fn() + Send + Sync>;

#[derive(Default)]
struct ListenerRegistry {
    next_id: u64,
    listeners: BTreeMap<u64, Listener>,
}

struct Committed {
    state: Arc<RootState>,
    version: u64,
}

struct Inner {
    slices: BTreeMap<String, Slice>,
    initial_state: Arc<RootState>,
    current: RwLock<Committed>,
    listeners: Arc<Mutex<ListenerRegistry>>,
    config: StoreConfig,
    /// Serializes commits across threads.
    serial: Mutex<()>,
    /// Thread currently inside a dispatch, if any.
    in_flight: Mutex<Option<ThreadId>>,
    /// Nested dispatches waiting under `ReentrancyPolicy::Queue`.
    pending: Mutex<VecDeque<Action>>,
    watcher: WatchSender,
}

/// Handle to a shared state container.
///
/// Cloning is cheap; every clone refers to the same store.
#[derive(Clone)]
pub struct Store {
    inner: Arc<Inner>,
}

/// Returned by [`Store::subscribe`]. Removes exactly that listener.
///
/// Dropping the handle does not unsubscribe.
#[derive(Debug, Clone)]
pub struct Unsubscribe {
    registry: Weak<Mutex<ListenerRegistry>>,
    id: u64,
}

impl Unsubscribe {
    /// Remove the listener. Calling this more than once is a no-op.
    pub fn unsubscribe(&self) {
        if let Some(registry) = self.registry.upgrade() {
            registry.lock().listeners.remove(&self.id);
        }
    }
}

enum Entry<'a> {
    Acquired(DispatchGuard<'a>),
    Nested,
}

/// Held for the whole Dispatching phase. Returns the store to Idle on
/// drop, including when a reducer fails or panics.
struct DispatchGuard<'a> {
    inner: &'a Inner,
    _serial: MutexGuard<'a, ()>,
}

impl Drop for DispatchGuard<'_> {
    fn drop(&mut self) {
        *self.inner.in_flight.lock() = None;
        self.inner.pending.lock().clear();
    }
}

impl Store {
    /// Compose the given slices into a store with default configuration.
    pub fn new(slices: impl IntoIterator<Item = Slice>) -> Result<Self> {
        Self::with_config(slices, StoreConfig::default())
    }

    /// Compose slices given as a name-to-slice mapping.
    ///
    /// Every key must equal its slice's name, since routing uses the name
    /// baked into each action type.
    pub fn from_named<K>(slices: impl IntoIterator<Item = (K, Slice)>) -> Result<Self>
    where
        K: AsRef<str>,
    {
        let mut ordered = Vec::new();
        for (key, slice) in slices {
            if key.as_ref() != slice.name() {
                return Err(StoreError::config(format!(
                    "slice `{}` registered under key `{}`",
                    slice.name(),
                    key.as_ref()
                )));
            }
            ordered.push(slice);
        }
        Self::new(ordered)
    }

    /// Compose the given slices into a store.
    pub fn with_config(
        slices: impl IntoIterator<Item = Slice>,
        config: StoreConfig,
    ) -> Result<Self> {
        let mut by_name = BTreeMap::new();
        for slice in slices {
            if by_name.contains_key(slice.name()) {
                return Err(StoreError::config(format!(
                    "duplicate slice name `{}`",
                    slice.name()
                )));
            }
            by_name.insert(slice.name().to_string(), slice);
        }

        let initial_state = Arc::new(RootState::from_slices(
            by_name
                .iter()
                .map(|(name, slice)| (name.clone(), Arc::clone(slice.initial_state())))
                .collect(),
        ));

        info!(
            slices = by_name.len(),
            reentrancy = ?config.reentrancy,
            "store created"
        );

        Ok(Self {
            inner: Arc::new(Inner {
                slices: by_name,
                current: RwLock::new(Committed {
                    state: Arc::clone(&initial_state),
                    version: 0,
                }),
                initial_state,
                listeners: Arc::new(Mutex::new(ListenerRegistry::default())),
                watcher: WatchSender::new(config.watch_capacity),
                config,
                serial: Mutex::new(()),
                in_flight: Mutex::new(None),
                pending: Mutex::new(VecDeque::new()),
            }),
        })
    }

    /// The current committed state.
    pub fn get_state(&self) -> Arc<RootState> {
        Arc::clone(&self.inner.current.read().state)
    }

    /// Apply a projection to the current state.
    pub fn get_state_by_selector<R, F>(&self, selector: F) -> R
    where
        F: FnOnce(&RootState) -> R,
    {
        selector(&self.get_state())
    }

    /// Decode one slice's current sub-state.
    pub fn select_json<T: DeserializeOwned>(&self, slice: &str) -> Result<T> {
        self.get_state()
            .get_json(slice)?
            .ok_or_else(|| StoreError::UnknownSlice {
                slice: slice.to_string(),
            })
    }

    /// The state captured at construction.
    pub fn get_initial_state(&self) -> Arc<RootState> {
        Arc::clone(&self.inner.initial_state)
    }

    /// Number of commits since construction.
    pub fn version(&self) -> u64 {
        self.inner.current.read().version
    }

    pub fn config(&self) -> &StoreConfig {
        &self.inner.config
    }

    pub fn slice(&self, name: &str) -> Option<&Slice> {
        self.inner.slices.get(name)
    }

    pub fn slice_names(&self) -> impl Iterator<Item = &str> {
        self.inner.slices.keys().map(String::as_str)
    }

    pub fn listener_count(&self) -> usize {
        self.inner.listeners.lock().listeners.len()
    }

    /// Register a listener, called after every dispatch.
    ///
    /// Listeners run while the store holds its commit lock. A listener may
    /// hand a dispatch to another thread but must not wait for it: the
    /// other thread blocks until the current dispatch returns.
    pub fn subscribe<F>(&self, listener: F) -> Unsubscribe
    where
        F: Fn() + Send + Sync + 'static,
    {
        let mut registry = self.inner.listeners.lock();
        let id = registry.next_id;
        registry.next_id += 1;
        registry.listeners.insert(id, Arc::new(listener));
        Unsubscribe {
            registry: Arc::downgrade(&self.inner.listeners),
            id,
        }
    }

    /// Stream every commit.
    pub fn watch(&self) -> WatchStream {
        self.inner.watcher.subscribe(None)
    }

    /// Stream the commits that replaced one slice's sub-state.
    pub fn watch_slice(&self, slice: &str) -> Result<WatchStream> {
        if !self.inner.slices.contains_key(slice) {
            return Err(StoreError::UnknownSlice {
                slice: slice.to_string(),
            });
        }
        Ok(self.inner.watcher.subscribe(Some(slice.to_string())))
    }

    /// Route an action to its slice, commit the result and notify.
    pub fn dispatch(&self, action: impl IntoAction) -> Result<()> {
        let action = action.into_action()?;
        let _guard = match self.enter() {
            Entry::Acquired(guard) => guard,
            Entry::Nested => return self.dispatch_nested(action),
        };

        self.apply(action)?;
        self.drain_pending()
    }

    /// Replace the whole state, for hydration.
    ///
    /// The new state must contain exactly the slices this store was built
    /// with. Listeners are only notified when `notify_on_set_state` is set.
    pub fn set_state(&self, state: RootState) -> Result<()> {
        let _guard = self.enter_exclusive("set_state")?;
        if !state.same_shape(&self.inner.initial_state) {
            return Err(StoreError::InvalidState(format!(
                "expected slices [{}], got [{}]",
                self.slice_names().collect::<Vec<_>>().join(", "),
                state.slice_names().collect::<Vec<_>>().join(", ")
            )));
        }
        self.replace(Arc::new(state), ChangeKind::Replace);
        self.drain_pending()
    }

    /// Merge externally supplied sub-states into the current state.
    ///
    /// `snapshot` is a JSON object keyed by slice name; slices it does not
    /// mention keep their current sub-state.
    pub fn hydrate(&self, snapshot: Value) -> Result<()> {
        let entries = match snapshot {
            Value::Object(entries) => entries,
            other => {
                return Err(StoreError::InvalidState(format!(
                    "hydration snapshot must be a JSON object, got {}",
                    json_kind(&other)
                )))
            }
        };
        let _guard = self.enter_exclusive("hydrate")?;
        if let Some(unknown) = entries.keys().find(|k| !self.inner.slices.contains_key(*k)) {
            return Err(StoreError::UnknownSlice {
                slice: unknown.clone(),
            });
        }

        let mut next = RootState::clone(&self.get_state());
        for (slice, value) in entries {
            next.set_slice(&slice, value);
        }
        self.replace(Arc::new(next), ChangeKind::Replace);
        self.drain_pending()
    }

    /// Reinstall the initial state and notify listeners.
    pub fn reset(&self) -> Result<()> {
        let _guard = self.enter_exclusive("reset")?;
        self.replace(Arc::clone(&self.inner.initial_state), ChangeKind::Reset);
        self.drain_pending()
    }

    fn enter(&self) -> Entry<'_> {
        let me = thread::current().id();
        if *self.inner.in_flight.lock() == Some(me) {
            return Entry::Nested;
        }
        let serial = self.inner.serial.lock();
        *self.inner.in_flight.lock() = Some(me);
        Entry::Acquired(DispatchGuard {
            inner: &*self.inner,
            _serial: serial,
        })
    }

    fn enter_exclusive(&self, operation: &str) -> Result<DispatchGuard<'_>> {
        match self.enter() {
            Entry::Acquired(guard) => Ok(guard),
            Entry::Nested => {
                warn!(operation, "rejected state replacement during dispatch");
                Err(StoreError::ReentrantDispatch {
                    action_type: operation.to_string(),
                })
            }
        }
    }

    fn dispatch_nested(&self, action: Action) -> Result<()> {
        match self.inner.config.reentrancy {
            ReentrancyPolicy::Reject => {
                warn!(action_type = %action.action_type, "rejected nested dispatch");
                Err(StoreError::ReentrantDispatch {
                    action_type: action.action_type,
                })
            }
            ReentrancyPolicy::Queue => {
                debug!(action_type = %action.action_type, "queued nested dispatch");
                self.inner.pending.lock().push_back(action);
                Ok(())
            }
        }
    }

    /// Run actions queued by listeners, in order. The first failure clears
    /// the rest of the queue.
    fn drain_pending(&self) -> Result<()> {
        loop {
            let next = self.inner.pending.lock().pop_front();
            let Some(next) = next else {
                return Ok(());
            };
            self.apply(next)?;
        }
    }

    fn apply(&self, action: Action) -> Result<()> {
        let key = action.slice_key();
        let unknown = || StoreError::UnknownSlice {
            slice: key.to_string(),
        };
        let slice = self.inner.slices.get(key).ok_or_else(unknown)?;

        let current = self.get_state();
        let sub_state = current.get_arc(key).ok_or_else(unknown)?;
        let (next, changed) = match slice.reduce(sub_state, &action)? {
            Some(value) => (Arc::new(current.with_slice(key, value)), vec![key.to_string()]),
            None => (Arc::clone(&current), Vec::new()),
        };

        let version = self.commit(Arc::clone(&next));
        debug!(
            action_type = %action.action_type,
            version,
            changed = !changed.is_empty(),
            "dispatched"
        );

        self.notify();
        self.inner.watcher.send(StateChange {
            kind: ChangeKind::Dispatch,
            version,
            action_type: Some(action.action_type),
            changed_slices: changed,
            state: next,
        });
        Ok(())
    }

    fn replace(&self, next: Arc<RootState>, kind: ChangeKind) {
        let changed = changed_slices(&self.get_state(), &next);
        let version = self.commit(Arc::clone(&next));
        info!(?kind, version, changed = ?changed, "state replaced");

        if kind == ChangeKind::Reset || self.inner.config.notify_on_set_state {
            self.notify();
        }
        self.inner.watcher.send(StateChange {
            kind,
            version,
            action_type: None,
            changed_slices: changed,
            state: next,
        });
    }

    fn commit(&self, next: Arc<RootState>) -> u64 {
        let mut current = self.inner.current.write();
        current.state = next;
        current.version += 1;
        current.version
    }

    fn notify(&self) {
        let snapshot: Vec<(u64, Listener)> = self
            .inner
            .listeners
            .lock()
            .listeners
            .iter()
            .map(|(id, listener)| (*id, Arc::clone(listener)))
            .collect();

        for (id, listener) in snapshot {
            // Skip listeners removed by an earlier listener in this round.
            if !self.inner.listeners.lock().listeners.contains_key(&id) {
                continue;
            }
            if !self.inner.config.isolate_listener_panics {
                listener();
                continue;
            }
            if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| listener())) {
                error!(
                    listener = id,
                    reason = panic_message(payload.as_ref()),
                    "listener panicked"
                );
            }
        }
    }
}

impl fmt::Debug for Store {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Store")
            .field("slices", &self.slice_names().collect::<Vec<_>>())
            .field("version", &self.version())
            .field("listeners", &self.listener_count())
            .field("watchers", &self.inner.watcher.receiver_count())
            .field("config", &self.inner.config)
            .finish()
    }
}

impl fmt::Debug for ListenerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ListenerRegistry")
            .field("next_id", &self.next_id)
            .field("listeners", &self.listeners.len())
            .finish()
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        *msg
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.as_str()
    } else {
        "non-string panic payload"
    }
}
