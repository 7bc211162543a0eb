//! Slices: a named partition of the root state and the cases that update it.
//!
//! A slice is built once at setup time and is immutable afterwards:
//!
//! ```rust
//! use serde_json::json;
//! use slice_store::Slice;
//!
//! let counter = Slice::builder("counter", json!({ "value": 0 }))
//!     .case("increment", |state, _action| {
//!         let value = state["value"].as_i64().unwrap_or(0);
//!         Some(json!({ "value": value + 1 }))
//!     })
//!     .build()
//!     .unwrap();
//!
//! let action = counter.action("increment").unwrap().create();
//! assert_eq!(action.action_type, "counter/increment");
//! ```

use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

use crate::action::{action_type, Action, ActionCreator, TYPE_SEPARATOR};
use crate::error::{Result, StoreError};

/// A case reducer after erasure. `Ok(None)` means "no change".
pub(crate) type CaseFn = Arc<dyn Fn(&Value, &Action) -> Result<Option<Value>> + Send + Sync>;

/// A named slice of state with its reducer and action creators.
#[derive(Clone)]
pub struct Slice {
    name: String,
    initial_state: Arc<Value>,
    /// Keyed by full namespaced type.
    cases: HashMap<String, CaseFn>,
    /// Keyed by case name.
    actions: BTreeMap<String, ActionCreator>,
}

impl Slice {
    /// Start building a slice with the given name and initial sub-state.
    pub fn builder(name: impl Into<String>, initial_state: impl Into<Value>) -> SliceBuilder {
        SliceBuilder {
            name: name.into(),
            initial_state: initial_state.into(),
            cases: Vec::new(),
        }
    }

    /// Start building a slice whose initial sub-state is a serde value.
    pub fn builder_json<S: Serialize>(
        name: impl Into<String>,
        initial_state: &S,
    ) -> Result<SliceBuilder> {
        Ok(Self::builder(name, serde_json::to_value(initial_state)?))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn initial_state(&self) -> &Arc<Value> {
        &self.initial_state
    }

    /// Action creators keyed by case name.
    pub fn actions(&self) -> &BTreeMap<String, ActionCreator> {
        &self.actions
    }

    /// The action creator for one case.
    pub fn action(&self, case: &str) -> Option<&ActionCreator> {
        self.actions.get(case)
    }

    /// Whether this slice handles the given full action type.
    pub fn handles(&self, action_type: &str) -> bool {
        self.cases.contains_key(action_type)
    }

    /// Run the case reducer registered for `action.action_type`.
    ///
    /// Returns `Ok(None)` when the case left the sub-state unchanged.
    /// Fails with [`StoreError::ActionNotFound`] when no case matches.
    pub fn reduce(&self, state: &Value, action: &Action) -> Result<Option<Value>> {
        let case = self
            .cases
            .get(&action.action_type)
            .ok_or_else(|| StoreError::ActionNotFound {
                action_type: action.action_type.clone(),
            })?;
        case(state, action)
    }
}

impl fmt::Debug for Slice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Slice")
            .field("name", &self.name)
            .field("initial_state", &self.initial_state)
            .field("cases", &self.actions.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Builder returned by [`Slice::builder`].
pub struct SliceBuilder {
    name: String,
    initial_state: Value,
    cases: Vec<(String, CaseFn)>,
}

impl SliceBuilder {
    /// Register a case reducer. Returning `None` leaves the sub-state as is.
    pub fn case<F>(self, case: impl Into<String>, reducer: F) -> Self
    where
        F: Fn(&Value, &Action) -> Option<Value> + Send + Sync + 'static,
    {
        self.push(
            case.into(),
            Arc::new(move |state: &Value, action: &Action| -> Result<Option<Value>> {
                Ok(reducer(state, action))
            }),
        )
    }

    /// Register a case reducer that can fail, for example while decoding
    /// its payload.
    pub fn try_case<F>(self, case: impl Into<String>, reducer: F) -> Self
    where
        F: Fn(&Value, &Action) -> Result<Option<Value>> + Send + Sync + 'static,
    {
        self.push(case.into(), Arc::new(reducer))
    }

    /// Register a case reducer over a typed sub-state.
    ///
    /// The sub-state is decoded into `S` before the call and encoded back
    /// afterwards; decoding failures surface as serialization errors.
    pub fn typed_case<S, F>(self, case: impl Into<String>, reducer: F) -> Self
    where
        S: Serialize + DeserializeOwned + 'static,
        F: Fn(&S, &Action) -> Option<S> + Send + Sync + 'static,
    {
        self.push(
            case.into(),
            Arc::new(move |state: &Value, action: &Action| -> Result<Option<Value>> {
                let current = S::deserialize(state)?;
                match reducer(&current, action) {
                    Some(next) => Ok(Some(serde_json::to_value(next)?)),
                    None => Ok(None),
                }
            }),
        )
    }

    fn push(mut self, case: String, reducer: CaseFn) -> Self {
        self.cases.push((case, reducer));
        self
    }

    /// Validate and build the slice.
    pub fn build(self) -> Result<Slice> {
        validate_slice_name(&self.name)?;

        let mut cases = HashMap::with_capacity(self.cases.len());
        let mut actions = BTreeMap::new();
        for (case, reducer) in self.cases {
            if case.is_empty() {
                return Err(StoreError::config(format!(
                    "slice `{}` has a case with an empty name",
                    self.name
                )));
            }
            if actions.contains_key(&case) {
                return Err(StoreError::config(format!(
                    "slice `{}` registers case `{}` twice",
                    self.name, case
                )));
            }
            let full_type = action_type(&self.name, &case);
            actions.insert(case, ActionCreator::new(full_type.clone()));
            cases.insert(full_type, reducer);
        }

        Ok(Slice {
            name: self.name,
            initial_state: Arc::new(self.initial_state),
            cases,
            actions,
        })
    }
}

/// Validate that a slice name is usable as a routing key.
pub fn validate_slice_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(StoreError::config("`name` is a required option for a slice"));
    }
    if name.contains(TYPE_SEPARATOR) {
        return Err(StoreError::config(format!(
            "slice name `{name}` must not contain '{TYPE_SEPARATOR}'"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::json;

    fn counter() -> Slice {
        Slice::builder("counter", json!({ "value": 0 }))
            .case("increment", |state, _| {
                Some(json!({ "value": state["value"].as_i64().unwrap_or(0) + 1 }))
            })
            .case("noop", |_, _| None)
            .build()
            .unwrap()
    }

    #[test]
    fn test_build_derives_types_and_creators() {
        let slice = counter();
        assert_eq!(slice.name(), "counter");
        assert_eq!(
            slice.actions().keys().collect::<Vec<_>>(),
            vec!["increment", "noop"]
        );
        assert_eq!(
            slice.action("increment").unwrap().action_type(),
            "counter/increment"
        );
        assert!(slice.handles("counter/noop"));
        assert!(!slice.handles("noop"));
    }

    #[test]
    fn test_reduce_runs_case() {
        let slice = counter();
        let next = slice
            .reduce(&json!({ "value": 41 }), &Action::new("counter/increment"))
            .unwrap();
        assert_eq!(next, Some(json!({ "value": 42 })));
    }

    #[test]
    fn test_reduce_no_change() {
        let slice = counter();
        let next = slice
            .reduce(&json!({ "value": 1 }), &Action::new("counter/noop"))
            .unwrap();
        assert!(next.is_none());
    }

    #[test]
    fn test_reduce_unknown_case() {
        let slice = counter();
        let err = slice
            .reduce(&json!({ "value": 1 }), &Action::new("counter/decrement"))
            .unwrap_err();
        assert!(matches!(
            err,
            StoreError::ActionNotFound { ref action_type } if action_type == "counter/decrement"
        ));
    }

    #[test]
    fn test_empty_name_rejected() {
        let err = Slice::builder("", json!(null)).build().unwrap_err();
        assert!(matches!(err, StoreError::Configuration(_)));
    }

    #[test]
    fn test_separator_in_name_rejected() {
        let err = Slice::builder("a/b", json!(null)).build().unwrap_err();
        assert!(matches!(err, StoreError::Configuration(_)));
    }

    #[test]
    fn test_duplicate_and_empty_case_rejected() {
        let err = Slice::builder("s", json!(0))
            .case("x", |_, _| None)
            .case("x", |_, _| None)
            .build()
            .unwrap_err();
        assert!(matches!(err, StoreError::Configuration(_)));

        let err = Slice::builder("s", json!(0))
            .case("", |_, _| None)
            .build()
            .unwrap_err();
        assert!(matches!(err, StoreError::Configuration(_)));
    }

    #[test]
    fn test_typed_case() {
        #[derive(Debug, Serialize, Deserialize, PartialEq)]
        struct User {
            name: String,
        }

        let slice = Slice::builder_json(
            "user",
            &User {
                name: String::new(),
            },
        )
        .unwrap()
        .typed_case("rename", |_: &User, action| {
            let name: String = action.payload_as().ok().flatten()?;
            Some(User { name })
        })
        .build()
        .unwrap();

        let next = slice
            .reduce(
                slice.initial_state(),
                &slice.action("rename").unwrap().with_payload("ada"),
            )
            .unwrap();
        assert_eq!(next, Some(json!({ "name": "ada" })));

        // Sub-state that does not decode as `User`.
        let err = slice
            .reduce(&json!(7), &Action::new("user/rename").with_payload("x"))
            .unwrap_err();
        assert!(matches!(err, StoreError::Serialization(_)));
    }

    #[test]
    fn test_try_case_propagates() {
        let slice = Slice::builder("counter", json!(0))
            .try_case("add", |state, action| {
                let by: i64 = action.payload_as()?.unwrap_or(1);
                Ok(Some(json!(state.as_i64().unwrap_or(0) + by)))
            })
            .build()
            .unwrap();

        let ok = slice
            .reduce(&json!(1), &Action::new("counter/add").with_payload(4))
            .unwrap();
        assert_eq!(ok, Some(json!(5)));

        let err = slice
            .reduce(&json!(1), &Action::new("counter/add").with_payload("four"))
            .unwrap_err();
        assert!(matches!(err, StoreError::Serialization(_)));
    }
}
