//! Entity contract and record serializers.

use std::fmt::Debug;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::Result;

/// A value stored in the log and materialized into views.
///
/// Entities are immutable snapshots: an update replaces the whole value.
/// `key` must be stable and unique; it is both the log record key and the view key.
pub trait Entity: Serialize + DeserializeOwned + Clone + PartialEq + Debug + Send + Sync + 'static {
    /// Key of this entity.
    fn key(&self) -> String;
}

/// Turns a value into a log payload. `None` means "write a tombstone".
pub trait RecordSerializer<T: ?Sized>: Send + Sync {
    /// Serialize `value` into a payload.
    fn serialize(&self, value: &T) -> Result<Option<Vec<u8>>>;
}

/// JSON payloads via serde_json.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonSerializer;

impl<T: Serialize + ?Sized> RecordSerializer<T> for JsonSerializer {
    fn serialize(&self, value: &T) -> Result<Option<Vec<u8>>> {
        Ok(Some(serde_json::to_vec(value)?))
    }
}

/// Ignores its input and always produces the tombstone marker.
///
/// Any placeholder value can be handed to a tombstone publish.
#[derive(Debug, Clone, Copy, Default)]
pub struct TombstoneSerializer;

impl<T: ?Sized> RecordSerializer<T> for TombstoneSerializer {
    fn serialize(&self, _value: &T) -> Result<Option<Vec<u8>>> {
        Ok(None)
    }
}

/// Decodes a view payload into an entity.
pub fn decode<V: DeserializeOwned>(payload: &[u8]) -> Result<V> {
    Ok(serde_json::from_slice(payload)?)
}
