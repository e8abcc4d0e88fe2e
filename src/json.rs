//! Ordered JSON objects built from result sequences

use serde::ser::{Serialize, SerializeMap, Serializer};

/// An entry that becomes one member of a JSON object; the entry itself serializes as the value.
pub trait JsonEntry {
    /// Member name
    fn json_key(&self) -> &str;
}

/// Serializes a slice of entries as a JSON object.
///
/// Members keep the slice order, and repeated keys are written as-is (a pixel format with
/// several discrete sizes yields one member per size).
pub struct JsonObject<'a, T>(pub &'a [T]);

impl<T: JsonEntry + Serialize> Serialize for JsonObject<'_, T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for entry in self.0 {
            map.serialize_entry(entry.json_key(), entry)?;
        }
        map.end()
    }
}

/// Render entries as a JSON object followed by a newline.
pub fn to_body<T: JsonEntry + Serialize>(entries: &[T]) -> serde_json::Result<Vec<u8>> {
    let mut body = serde_json::to_vec(&JsonObject(entries))?;
    body.push(b'\n');
    Ok(body)
}
