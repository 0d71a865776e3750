//! Keyed projections over JSON values.
//!
//! Resources holding a [`serde_json::Value`] can derive children by object
//! key or array index instead of a closure. A missing key or index yields
//! `null`; projecting out of `null` is a projection error.

use std::fmt;

use serde_json::Value;

use crate::error::{Error, FetchError};

use super::Resource;

/// Object key or array index to project a JSON value by.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Key {
    Name(String),
    Index(usize),
}

impl Key {
    /// Apply the projection to `value`.
    pub fn project(&self, value: &Value) -> Result<Value, FetchError> {
        let found = match (value, self) {
            (Value::Null, _) => {
                return Err(FetchError::projection(format!(
                    "cannot read {} of null",
                    self
                )))
            }
            (Value::Object(map), Key::Name(name)) => map.get(name),
            (Value::Array(items), Key::Index(index)) => items.get(*index),
            _ => None,
        };
        Ok(found.cloned().unwrap_or(Value::Null))
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Key::Name(name) => write!(f, "`{}`", name),
            Key::Index(index) => write!(f, "[{}]", index),
        }
    }
}

impl From<&str> for Key {
    fn from(name: &str) -> Self {
        Key::Name(name.to_owned())
    }
}

impl From<String> for Key {
    fn from(name: String) -> Self {
        Key::Name(name)
    }
}

impl From<usize> for Key {
    fn from(index: usize) -> Self {
        Key::Index(index)
    }
}

impl Resource<Value> {
    /// Derive a child holding `self.value[key]`.
    pub fn field(&self, key: impl Into<Key>) -> Result<Resource<Value>, Error> {
        let key = key.into();
        self.child(move |value: &Value| key.project(value))
    }
}
