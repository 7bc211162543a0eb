//! Actions and action creators.
//!
//! An action is `{ "type": "<slice>/<case>", "payload": ... }`. The type
//! string is the routing key: the part before the first `/` names the
//! owning slice, the full string names the case inside it.

use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;

use crate::error::Result;

/// Separator between the slice name and the case name in an action type.
pub const TYPE_SEPARATOR: char = '/';

/// A dispatched intent to change state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Action {
    /// Namespaced type, `"<slice>/<case>"`.
    #[serde(rename = "type")]
    pub action_type: String,
    /// Optional payload.
    #[serde(
        default,
        deserialize_with = "present",
        skip_serializing_if = "Option::is_none"
    )]
    pub payload: Option<Value>,
}

/// A `payload` key that is present, even as `null`, is `Some`. Only a
/// missing key yields `None`.
fn present<'de, D>(deserializer: D) -> std::result::Result<Option<Value>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Value::deserialize(deserializer).map(Some)
}

impl Action {
    /// Create an action with no payload.
    pub fn new(action_type: impl Into<String>) -> Self {
        Self {
            action_type: action_type.into(),
            payload: None,
        }
    }

    /// Attach a payload.
    pub fn with_payload(mut self, payload: impl Into<Value>) -> Self {
        self.payload = Some(payload.into());
        self
    }

    /// Attach a JSON-encoded payload.
    pub fn with_json<T: Serialize>(mut self, payload: &T) -> Result<Self> {
        self.payload = Some(serde_json::to_value(payload)?);
        Ok(self)
    }

    /// The slice this action routes to.
    pub fn slice_key(&self) -> &str {
        slice_key(&self.action_type)
    }

    /// Decode the payload. `None` when the action carries no payload.
    pub fn payload_as<T: DeserializeOwned>(&self) -> Result<Option<T>> {
        match &self.payload {
            Some(value) => Ok(Some(T::deserialize(value)?)),
            None => Ok(None),
        }
    }
}

/// Build the namespaced type for a case of a slice.
pub fn action_type(slice: &str, case: &str) -> String {
    format!("{slice}{TYPE_SEPARATOR}{case}")
}

/// Extract the slice key: everything before the first separator, or the
/// whole string if there is none.
pub fn slice_key(action_type: &str) -> &str {
    action_type
        .split_once(TYPE_SEPARATOR)
        .map(|(slice, _)| slice)
        .unwrap_or(action_type)
}

/// Builds actions of one fixed type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionCreator {
    action_type: String,
}

impl ActionCreator {
    pub(crate) fn new(action_type: String) -> Self {
        Self { action_type }
    }

    /// The type every action from this creator carries.
    pub fn action_type(&self) -> &str {
        &self.action_type
    }

    /// Build an action without payload.
    pub fn create(&self) -> Action {
        Action::new(self.action_type.clone())
    }

    /// Build an action with an optional payload.
    pub fn call(&self, payload: Option<Value>) -> Action {
        Action {
            action_type: self.action_type.clone(),
            payload,
        }
    }

    /// Build an action carrying `payload`.
    pub fn with_payload(&self, payload: impl Into<Value>) -> Action {
        self.create().with_payload(payload)
    }

    /// Build an action carrying a JSON-encoded payload.
    pub fn with_json<T: Serialize>(&self, payload: &T) -> Result<Action> {
        self.create().with_json(payload)
    }
}

/// Conversion into a dispatchable [`Action`].
///
/// Implement this on an application enum to get one variant per
/// slice-case pair while keeping the `{type, payload}` shape on the store
/// boundary.
pub trait IntoAction {
    fn into_action(self) -> Result<Action>;
}

impl IntoAction for Action {
    fn into_action(self) -> Result<Action> {
        Ok(self)
    }
}

impl IntoAction for &Action {
    fn into_action(self) -> Result<Action> {
        Ok(self.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_slice_key() {
        assert_eq!(slice_key("counter/increment"), "counter");
        assert_eq!(slice_key("todos/items/add"), "todos");
        assert_eq!(slice_key("bare"), "bare");
        assert_eq!(slice_key("/leading"), "");
    }

    #[test]
    fn test_action_type() {
        assert_eq!(action_type("counter", "increment"), "counter/increment");
    }

    #[test]
    fn test_wire_shape_without_payload() {
        let action = Action::new("counter/increment");
        let json = serde_json::to_value(&action).unwrap();
        assert_eq!(json, json!({ "type": "counter/increment" }));
    }

    #[test]
    fn test_wire_shape_with_payload() {
        let action = Action::new("counter/add").with_payload(5);
        let json = serde_json::to_value(&action).unwrap();
        assert_eq!(json, json!({ "type": "counter/add", "payload": 5 }));

        let parsed: Action = serde_json::from_value(json!({ "type": "user/rename" })).unwrap();
        assert_eq!(parsed, Action::new("user/rename"));
    }

    #[test]
    fn test_null_payload_survives_round_trip() {
        let action = Action::new("user/rename").with_payload(Value::Null);
        let json = serde_json::to_value(&action).unwrap();
        assert_eq!(json, json!({ "type": "user/rename", "payload": null }));

        let parsed: Action = serde_json::from_value(json).unwrap();
        assert_eq!(parsed, action);
        assert_eq!(parsed.payload, Some(Value::Null));
        assert_eq!(parsed.payload_as::<Option<String>>().unwrap(), Some(None));

        let missing: Action = serde_json::from_value(json!({ "type": "user/rename" })).unwrap();
        assert!(missing.payload.is_none());
        assert_eq!(missing.payload_as::<Option<String>>().unwrap(), None);
    }

    #[test]
    fn test_creator_matches_hand_built() {
        let creator = ActionCreator::new("counter/increment".to_string());
        assert_eq!(creator.create(), Action::new("counter/increment"));
        assert_eq!(creator.call(None), Action::new("counter/increment"));
        assert_eq!(
            creator.with_payload("x"),
            Action::new("counter/increment").with_payload("x")
        );
    }

    #[test]
    fn test_payload_as() {
        #[derive(Debug, Serialize, Deserialize, PartialEq)]
        struct Rename {
            name: String,
        }

        let action = Action::new("user/rename")
            .with_json(&Rename {
                name: "ada".to_string(),
            })
            .unwrap();
        let decoded: Rename = action.payload_as().unwrap().unwrap();
        assert_eq!(decoded.name, "ada");

        assert!(Action::new("user/clear")
            .payload_as::<Rename>()
            .unwrap()
            .is_none());
        assert!(Action::new("user/rename")
            .with_payload(3)
            .payload_as::<Rename>()
            .is_err());
    }
}
