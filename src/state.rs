//! The composed root state.
//!
//! A [`RootState`] maps slice names to sub-states. Sub-states are held in
//! `Arc`s so a commit can replace one slice and share the rest; a snapshot
//! handed out by the store is never written to again.

use serde::de::DeserializeOwned;
use serde::ser::{Serialize, SerializeMap, Serializer};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::error::{Result, StoreError};

/// Mapping from slice name to that slice's current sub-state.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RootState {
    slices: BTreeMap<String, Arc<Value>>,
}

impl RootState {
    pub(crate) fn from_slices(slices: BTreeMap<String, Arc<Value>>) -> Self {
        Self { slices }
    }

    /// Build a root state from a JSON object keyed by slice name.
    pub fn from_json(value: Value) -> Result<Self> {
        match value {
            Value::Object(map) => Ok(Self {
                slices: map.into_iter().map(|(k, v)| (k, Arc::new(v))).collect(),
            }),
            other => Err(StoreError::InvalidState(format!(
                "root state must be a JSON object, got {}",
                json_kind(&other)
            ))),
        }
    }

    /// The sub-state of one slice.
    pub fn get(&self, slice: &str) -> Option<&Value> {
        self.slices.get(slice).map(Arc::as_ref)
    }

    /// The shared handle to one slice's sub-state.
    pub fn get_arc(&self, slice: &str) -> Option<&Arc<Value>> {
        self.slices.get(slice)
    }

    /// Decode one slice's sub-state.
    pub fn get_json<T: DeserializeOwned>(&self, slice: &str) -> Result<Option<T>> {
        match self.get(slice) {
            Some(value) => Ok(Some(T::deserialize(value)?)),
            None => Ok(None),
        }
    }

    pub fn contains(&self, slice: &str) -> bool {
        self.slices.contains_key(slice)
    }

    /// Slice names in lexicographic order.
    pub fn slice_names(&self) -> impl Iterator<Item = &str> {
        self.slices.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.slices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slices.is_empty()
    }

    /// A copy of this state with one slice replaced. Other slices are shared.
    pub(crate) fn with_slice(&self, slice: &str, value: Value) -> Self {
        let mut next = self.clone();
        next.set_slice(slice, value);
        next
    }

    pub(crate) fn set_slice(&mut self, slice: &str, value: Value) {
        self.slices.insert(slice.to_string(), Arc::new(value));
    }

    /// Whether both states have exactly the same slice names.
    pub(crate) fn same_shape(&self, other: &RootState) -> bool {
        self.slices.len() == other.slices.len()
            && self.slices.keys().all(|k| other.slices.contains_key(k))
    }

    /// Render as a JSON object.
    pub fn to_json(&self) -> Value {
        let map: Map<String, Value> = self
            .slices
            .iter()
            .map(|(k, v)| (k.clone(), v.as_ref().clone()))
            .collect();
        Value::Object(map)
    }
}

impl Serialize for RootState {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.slices.len()))?;
        for (name, value) in &self.slices {
            map.serialize_entry(name, value.as_ref())?;
        }
        map.end()
    }
}

pub(crate) fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> RootState {
        RootState::from_json(json!({
            "counter": { "value": 0 },
            "user": { "name": "" },
        }))
        .unwrap()
    }

    #[test]
    fn test_from_json_and_get() {
        let state = sample();
        assert_eq!(state.len(), 2);
        assert_eq!(state.get("counter"), Some(&json!({ "value": 0 })));
        assert!(state.get("ghost").is_none());
        assert_eq!(state.slice_names().collect::<Vec<_>>(), vec!["counter", "user"]);
    }

    #[test]
    fn test_from_json_rejects_non_object() {
        let err = RootState::from_json(json!([1, 2])).unwrap_err();
        assert!(matches!(err, StoreError::InvalidState(_)));
        assert!(err.to_string().contains("an array"));
    }

    #[test]
    fn test_with_slice_shares_untouched() {
        let state = sample();
        let next = state.with_slice("counter", json!({ "value": 1 }));

        assert_eq!(next.get("counter"), Some(&json!({ "value": 1 })));
        assert_eq!(state.get("counter"), Some(&json!({ "value": 0 })));
        assert!(Arc::ptr_eq(
            state.get_arc("user").unwrap(),
            next.get_arc("user").unwrap()
        ));
    }

    #[test]
    fn test_same_shape() {
        let state = sample();
        assert!(state.same_shape(&state.with_slice("user", json!(null))));
        let other = RootState::from_json(json!({ "counter": 1 })).unwrap();
        assert!(!state.same_shape(&other));
    }

    #[test]
    fn test_serialize_matches_to_json() {
        let state = sample();
        assert_eq!(serde_json::to_value(&state).unwrap(), state.to_json());
    }

    #[test]
    fn test_get_json() {
        #[derive(serde::Deserialize)]
        struct Counter {
            value: i64,
        }

        let counter: Counter = sample().get_json("counter").unwrap().unwrap();
        assert_eq!(counter.value, 0);
        assert!(sample().get_json::<Counter>("ghost").unwrap().is_none());
    }
}
