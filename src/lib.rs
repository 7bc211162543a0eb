//! # slice-store
//!
//! A predictable state container. One [`Store`] holds the application's
//! state tree, split into named slices:
//!
//! - **Slices**: a name, an initial sub-state and a set of case reducers
//! - **Namespaced actions**: `{ "type": "<slice>/<case>", "payload": ... }`
//! - **Immutable snapshots**: each commit builds a new root state and
//!   shares every slice it did not touch
//! - **Subscribers**: called synchronously after every dispatch
//!
//! ## Quick Start
//!
//! ```rust
//! use serde_json::json;
//! use slice_store::{Action, Slice, Store};
//!
//! fn main() -> slice_store::Result<()> {
//!     let counter = Slice::builder("counter", json!({ "value": 0 }))
//!         .case("increment", |state, _| {
//!             Some(json!({ "value": state["value"].as_i64().unwrap_or(0) + 1 }))
//!         })
//!         .build()?;
//!     let user = Slice::builder("user", json!({ "name": "" })).build()?;
//!     let increment = counter.action("increment").unwrap().clone();
//!
//!     let store = Store::new([counter, user])?;
//!     store.dispatch(increment.create())?;
//!     store.dispatch(Action::new("counter/increment"))?;
//!
//!     assert_eq!(
//!         store.get_state().to_json(),
//!         json!({ "counter": { "value": 2 }, "user": { "name": "" } })
//!     );
//!     Ok(())
//! }
//! ```
//!
//! ## Typed state
//!
//! ```rust
//! use serde::{Deserialize, Serialize};
//! use slice_store::{Slice, Store};
//!
//! #[derive(Debug, Serialize, Deserialize)]
//! struct Todos {
//!     items: Vec<String>,
//! }
//!
//! fn main() -> slice_store::Result<()> {
//!     let todos = Slice::builder_json("todos", &Todos { items: vec![] })?
//!         .typed_case("add", |todos: &Todos, action| {
//!             let item: String = action.payload_as().ok().flatten()?;
//!             let mut items = todos.items.clone();
//!             items.push(item);
//!             Some(Todos { items })
//!         })
//!         .build()?;
//!     let add = todos.action("add").unwrap().clone();
//!
//!     let store = Store::new([todos])?;
//!     store.dispatch(add.with_payload("write docs"))?;
//!
//!     let loaded: Todos = store.select_json("todos")?;
//!     assert_eq!(loaded.items, vec!["write docs".to_string()]);
//!     Ok(())
//! }
//! ```
//!
//! ## Subscribers
//!
//! ```rust
//! use serde_json::json;
//! use slice_store::{Action, Slice, Store};
//!
//! fn main() -> slice_store::Result<()> {
//!     let flag = Slice::builder("flag", json!(false))
//!         .case("toggle", |state, _| Some(json!(!state.as_bool().unwrap_or(false))))
//!         .build()?;
//!     let store = Store::new([flag])?;
//!
//!     let reader = store.clone();
//!     let handle = store.subscribe(move || {
//!         println!("flag is now {}", reader.get_state().get("flag").unwrap());
//!     });
//!
//!     store.dispatch(Action::new("flag/toggle"))?;
//!     handle.unsubscribe();
//!     Ok(())
//! }
//! ```

pub mod action;
pub mod config;
pub mod error;
pub mod slice;
pub mod state;
pub mod store;
pub mod watch;

// Re-export main types
pub use action::{Action, ActionCreator, IntoAction};
pub use config::{ReentrancyPolicy, StoreConfig};
pub use error::{Result, StoreError};
pub use slice::{Slice, SliceBuilder};
pub use state::RootState;
pub use store::{Listener, Store, Unsubscribe};
pub use watch::{ChangeKind, StateChange, WatchStream};

/// Prelude for convenient imports.
pub mod prelude {
    pub use crate::action::{Action, ActionCreator, IntoAction};
    pub use crate::config::{ReentrancyPolicy, StoreConfig};
    pub use crate::error::{Result, StoreError};
    pub use crate::slice::{Slice, SliceBuilder};
    pub use crate::state::RootState;
    pub use crate::store::{Store, Unsubscribe};
    pub use crate::watch::{ChangeKind, StateChange, WatchStream};
}
