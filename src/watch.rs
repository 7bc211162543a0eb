//! Async change streams over committed store states.
//!
//! Listeners registered with `Store::subscribe` are the synchronous
//! notification path. Watch streams are the async one: every commit is
//! broadcast as a [`StateChange`] carrying the committed snapshot.

use serde::{Deserialize, Serialize};
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::sync::broadcast;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::Stream;
use tracing::warn;

use crate::state::RootState;

/// What produced a commit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChangeKind {
    /// A dispatched action.
    Dispatch,
    /// `set_state` or `hydrate`.
    Replace,
    /// `reset` back to the initial state.
    Reset,
}

/// One committed state transition.
#[derive(Debug, Clone)]
pub struct StateChange {
    pub kind: ChangeKind,
    /// Store version after the commit.
    pub version: u64,
    /// Type of the dispatched action, for `ChangeKind::Dispatch`.
    pub action_type: Option<String>,
    /// Slices whose sub-state was replaced by this commit.
    pub changed_slices: Vec<String>,
    /// The committed state.
    pub state: Arc<RootState>,
}

impl StateChange {
    /// Whether this commit replaced the given slice's sub-state.
    pub fn touches(&self, slice: &str) -> bool {
        self.changed_slices.iter().any(|s| s == slice)
    }
}

/// Names of the slices whose sub-state handle differs between two states.
pub(crate) fn changed_slices(prev: &RootState, next: &RootState) -> Vec<String> {
    next.slice_names()
        .filter(|name| match (prev.get_arc(name), next.get_arc(name)) {
            (Some(a), Some(b)) => !Arc::ptr_eq(a, b),
            _ => true,
        })
        .map(str::to_string)
        .collect()
}

/// A stream of committed changes, optionally limited to one slice.
pub struct WatchStream {
    inner: BroadcastStream<StateChange>,
    slice: Option<String>,
}

impl WatchStream {
    fn new(receiver: broadcast::Receiver<StateChange>, slice: Option<String>) -> Self {
        Self {
            inner: BroadcastStream::new(receiver),
            slice,
        }
    }

    /// The slice this stream is limited to, if any.
    pub fn slice(&self) -> Option<&str> {
        self.slice.as_deref()
    }

    fn matches(&self, change: &StateChange) -> bool {
        match &self.slice {
            Some(slice) => change.touches(slice),
            None => true,
        }
    }
}

impl Stream for WatchStream {
    type Item = StateChange;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        loop {
            match Pin::new(&mut self.inner).poll_next(cx) {
                Poll::Ready(Some(Ok(change))) => {
                    if self.matches(&change) {
                        return Poll::Ready(Some(change));
                    }
                }
                Poll::Ready(Some(Err(BroadcastStreamRecvError::Lagged(skipped)))) => {
                    warn!(skipped, "watch stream lagged, dropping old changes");
                }
                Poll::Ready(None) => return Poll::Ready(None),
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}

/// Handle for publishing changes to watch streams.
#[derive(Clone)]
pub(crate) struct WatchSender {
    sender: broadcast::Sender<StateChange>,
}

impl WatchSender {
    pub(crate) fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub(crate) fn send(&self, change: StateChange) {
        // No receivers is fine.
        let _ = self.sender.send(change);
    }

    pub(crate) fn subscribe(&self, slice: Option<String>) -> WatchStream {
        WatchStream::new(self.sender.subscribe(), slice)
    }

    pub(crate) fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }
}
