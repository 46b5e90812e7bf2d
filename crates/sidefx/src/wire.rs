//! JSON wire format for effects.
//!
//! | Effect | Shape |
//! |---|---|
//! | `None` | `{"type": "none"}` |
//! | `DispatchAction` | `{"type": "dispatchAction", "actions": [...]}` |
//! | `Multiple` | `{"type": "multiple", "sideEffects": [...], "serial": bool}` |
//! | `Custom(e)` | whatever `e` serializes to; `Opaque` is `{"type": tag, ...payload}` |
//!
//! Decoding dispatches on `"type"`: the three built-in tags are decoded by
//! sidefx, every other tag is handed to the custom effect type. A decoded
//! `multiple` goes through [`SideEffect::multiple`], so an empty or
//! singleton list collapses like it does in code. A missing `serial` is
//! `false`.

use serde::de::{DeserializeOwned, Deserializer, Error as _};
use serde::ser::{SerializeMap, Serializer};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::effect::{SideEffect, DISPATCH_ACTION_TAG, MULTIPLE_TAG, NONE_TAG};
use crate::error::SideFxError;

#[derive(Deserialize)]
#[serde(bound = "A: DeserializeOwned")]
struct DispatchActionWire<A> {
    actions: Vec<A>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
#[serde(bound = "A: DeserializeOwned, E: DeserializeOwned")]
struct MultipleWire<A, E> {
    side_effects: Vec<SideEffect<A, E>>,
    #[serde(default)]
    serial: bool,
}

impl<A, E> Serialize for SideEffect<A, E>
where
    A: Serialize,
    E: Serialize,
{
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            SideEffect::None => {
                let mut map = serializer.serialize_map(Some(1))?;
                map.serialize_entry("type", NONE_TAG)?;
                map.end()
            }
            SideEffect::DispatchAction(actions) => {
                let mut map = serializer.serialize_map(Some(2))?;
                map.serialize_entry("type", DISPATCH_ACTION_TAG)?;
                map.serialize_entry("actions", actions)?;
                map.end()
            }
            SideEffect::Multiple(batch) => {
                let mut map = serializer.serialize_map(Some(3))?;
                map.serialize_entry("type", MULTIPLE_TAG)?;
                map.serialize_entry("sideEffects", batch.effects())?;
                map.serialize_entry("serial", &batch.is_serial())?;
                map.end()
            }
            SideEffect::Custom(effect) => effect.serialize(serializer),
        }
    }
}

impl<'de, A, E> Deserialize<'de> for SideEffect<A, E>
where
    A: DeserializeOwned,
    E: DeserializeOwned,
{
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        decode(value).map_err(D::Error::custom)
    }
}

fn decode<A, E>(value: Value) -> Result<SideEffect<A, E>, SideFxError>
where
    A: DeserializeOwned,
    E: DeserializeOwned,
{
    let Some(tag) = value.get("type").and_then(Value::as_str).map(str::to_owned) else {
        return Err(SideFxError::InvalidWireFormat(
            "missing string \"type\" field".into(),
        ));
    };

    match tag.as_str() {
        NONE_TAG => Ok(SideEffect::None),
        DISPATCH_ACTION_TAG => {
            let wire: DispatchActionWire<A> = serde_json::from_value(value).map_err(invalid)?;
            Ok(SideEffect::DispatchAction(wire.actions))
        }
        MULTIPLE_TAG => {
            let wire: MultipleWire<A, E> = serde_json::from_value(value).map_err(invalid)?;
            Ok(SideEffect::multiple(wire.side_effects, wire.serial))
        }
        _ => serde_json::from_value(value)
            .map(SideEffect::Custom)
            .map_err(invalid),
    }
}

fn invalid(err: serde_json::Error) -> SideFxError {
    SideFxError::InvalidWireFormat(err.to_string())
}

/// Encode an effect as JSON.
pub fn to_value<A, E>(effect: &SideEffect<A, E>) -> Result<Value, SideFxError>
where
    A: Serialize,
    E: Serialize,
{
    serde_json::to_value(effect).map_err(invalid)
}

/// Decode an effect from JSON.
pub fn from_value<A, E>(value: Value) -> Result<SideEffect<A, E>, SideFxError>
where
    A: DeserializeOwned,
    E: DeserializeOwned,
{
    decode(value)
}

/// Decode an effect from a JSON string.
pub fn from_str<A, E>(json: &str) -> Result<SideEffect<A, E>, SideFxError>
where
    A: DeserializeOwned,
    E: DeserializeOwned,
{
    let value: Value = serde_json::from_str(json).map_err(invalid)?;
    decode(value)
}
