//! Encoding for list and map values stored as JSON text columns.
//!
//! Decoding never fails: absent or malformed text reads back as an empty
//! collection.

use std::collections::BTreeMap;

pub fn encode_list(items: &[String]) -> String {
    serde_json::to_string(items).unwrap_or_else(|_| "[]".to_string())
}

pub fn decode_list(raw: Option<&str>) -> Vec<String> {
    decode_or_default(raw, "list")
}

pub fn encode_map(map: &BTreeMap<String, String>) -> String {
    serde_json::to_string(map).unwrap_or_else(|_| "{}".to_string())
}

pub fn decode_map(raw: Option<&str>) -> BTreeMap<String, String> {
    decode_or_default(raw, "map")
}

fn decode_or_default<T>(raw: Option<&str>, kind: &str) -> T
where
    T: serde::de::DeserializeOwned + Default,
{
    let Some(text) = raw.map(str::trim).filter(|t| !t.is_empty()) else {
        return T::default();
    };
    match serde_json::from_str::<Option<T>>(text) {
        Ok(value) => value.unwrap_or_default(),
        Err(e) => {
            tracing::warn!("Discarding malformed {} column {:?}: {}", kind, text, e);
            T::default()
        }
    }
}
