//! The versioned record type backing every entity in the coordination store.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{StoreError, StoreResult};

/// A generic record persisted in the coordination store.
///
/// Every Meson entity is one of these: a stable identifier plus maps of
/// scalar, list and map fields. Typed model wrappers in `crate::model` give
/// the fields meaning; the record itself is schema-free so that old and new
/// software versions can coexist against the same store.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Record {
    /// The record's stable identifier.
    pub id: String,
    /// Scalar fields.
    #[serde(default)]
    pub simple_fields: BTreeMap<String, String>,
    /// List-valued fields.
    #[serde(default)]
    pub list_fields: BTreeMap<String, Vec<String>>,
    /// Map-valued fields.
    #[serde(default)]
    pub map_fields: BTreeMap<String, BTreeMap<String, String>>,
}

impl Record {
    /// Create a new empty record with the given id.
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into(), ..Default::default() }
    }

    /// Serialize this record as JSON bytes for storage.
    pub fn to_bytes(&self) -> Vec<u8> {
        // Serialization of string maps cannot fail.
        serde_json::to_vec(self).unwrap_or_default()
    }

    /// Deserialize a record from JSON bytes read at the given path.
    pub fn from_bytes(path: &str, data: &[u8]) -> StoreResult<Self> {
        serde_json::from_slice(data).map_err(|err| StoreError::MalformedData { path: path.to_string(), source: err })
    }

    /// Get a simple field as a string slice.
    pub fn get_simple(&self, key: &str) -> Option<&str> {
        self.simple_fields.get(key).map(String::as_str)
    }

    /// Set a simple field.
    pub fn set_simple(&mut self, key: impl Into<String>, val: impl Into<String>) {
        self.simple_fields.insert(key.into(), val.into());
    }

    /// Get a simple field parsed as a bool, defaulting when absent or unparsable.
    pub fn get_bool(&self, key: &str, default: bool) -> bool {
        self.get_simple(key).and_then(|val| val.parse().ok()).unwrap_or(default)
    }

    /// Set a simple field from a bool.
    pub fn set_bool(&mut self, key: impl Into<String>, val: bool) {
        self.set_simple(key, val.to_string());
    }

    /// Get a simple field parsed as an i64.
    pub fn get_i64(&self, key: &str) -> Option<i64> {
        self.get_simple(key).and_then(|val| val.parse().ok())
    }

    /// Set a simple field from an i64.
    pub fn set_i64(&mut self, key: impl Into<String>, val: i64) {
        self.set_simple(key, val.to_string());
    }

    /// Get a list field.
    pub fn get_list(&self, key: &str) -> Option<&Vec<String>> {
        self.list_fields.get(key)
    }

    /// Set a list field.
    pub fn set_list(&mut self, key: impl Into<String>, val: Vec<String>) {
        self.list_fields.insert(key.into(), val);
    }

    /// Get a map field.
    pub fn get_map(&self, key: &str) -> Option<&BTreeMap<String, String>> {
        self.map_fields.get(key)
    }

    /// Get a mutable map field, creating it when absent.
    pub fn map_mut(&mut self, key: impl Into<String>) -> &mut BTreeMap<String, String> {
        self.map_fields.entry(key.into()).or_default()
    }

    /// Set a map field.
    pub fn set_map(&mut self, key: impl Into<String>, val: BTreeMap<String, String>) {
        self.map_fields.insert(key.into(), val);
    }
}
