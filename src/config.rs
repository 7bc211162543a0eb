//! Store configuration.

use serde::{Deserialize, Serialize};

/// Default capacity of the watch broadcast channel.
pub const DEFAULT_WATCH_CAPACITY: usize = 1024;

/// What happens when `dispatch` is called while a dispatch is already in
/// flight on the same thread (from a listener or a reducer).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReentrancyPolicy {
    /// Fail the nested dispatch with `ReentrantDispatch`.
    #[default]
    Reject,
    /// Queue the nested action and run it once the current dispatch has
    /// notified every listener.
    Queue,
}

/// Options for [`Store::with_config`](crate::Store::with_config).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub reentrancy: ReentrancyPolicy,
    /// Notify listeners after `set_state` and `hydrate`. Off by default:
    /// both are meant for seeding state before the store goes live.
    pub notify_on_set_state: bool,
    /// Catch and log a panicking listener so the remaining listeners still
    /// run. When off, the panic propagates out of `dispatch`.
    pub isolate_listener_panics: bool,
    /// Buffer size of the channel behind `Store::watch`.
    pub watch_capacity: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            reentrancy: ReentrancyPolicy::Reject,
            notify_on_set_state: false,
            isolate_listener_panics: true,
            watch_capacity: DEFAULT_WATCH_CAPACITY,
        }
    }
}

impl StoreConfig {
    pub fn with_reentrancy(mut self, policy: ReentrancyPolicy) -> Self {
        self.reentrancy = policy;
        self
    }

    pub fn with_notify_on_set_state(mut self, notify: bool) -> Self {
        self.notify_on_set_state = notify;
        self
    }

    pub fn with_isolate_listener_panics(mut self, isolate: bool) -> Self {
        self.isolate_listener_panics = isolate;
        self
    }

    pub fn with_watch_capacity(mut self, capacity: usize) -> Self {
        self.watch_capacity = capacity;
        self
    }
}
