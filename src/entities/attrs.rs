//! Generic parameter storage for graph nodes.
//!
//! Every node carries an `Attrs` map: parameter name → literal value.
//! A parameter whose name matches an unlinked input socket overrides that
//! socket's declared default; other parameters are read by the node's compute
//! step directly (e.g. `operation`, `path`, `backend`).

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Literal parameter value. Stored as a bare JSON literal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttrValue {
    Bool(bool),
    Str(String),
    Int(i32),
    Float(f32),
}

impl From<bool> for AttrValue {
    fn from(v: bool) -> Self {
        AttrValue::Bool(v)
    }
}

impl From<i32> for AttrValue {
    fn from(v: i32) -> Self {
        AttrValue::Int(v)
    }
}

impl From<f32> for AttrValue {
    fn from(v: f32) -> Self {
        AttrValue::Float(v)
    }
}

impl From<&str> for AttrValue {
    fn from(v: &str) -> Self {
        AttrValue::Str(v.to_string())
    }
}

impl From<String> for AttrValue {
    fn from(v: String) -> Self {
        AttrValue::Str(v)
    }
}

/// Parameter container: string key → typed value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Attrs {
    map: HashMap<String, AttrValue>,
}

impl Attrs {
    pub fn new() -> Self {
        Self {
            map: HashMap::new(),
        }
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<AttrValue>) {
        self.map.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&AttrValue> {
        self.map.get(key)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        match self.map.get(key) {
            Some(AttrValue::Str(s)) => Some(s),
            _ => None,
        }
    }

    pub fn get_i32(&self, key: &str) -> Option<i32> {
        match self.map.get(key) {
            Some(AttrValue::Int(v)) => Some(*v),
            _ => None,
        }
    }

    /// Float lookup; integer literals widen.
    pub fn get_float(&self, key: &str) -> Option<f32> {
        match self.map.get(key) {
            Some(AttrValue::Float(v)) => Some(*v),
            Some(AttrValue::Int(v)) => Some(*v as f32),
            _ => None,
        }
    }

    pub fn get_bool(&self, key: &str) -> Option<bool> {
        match self.map.get(key) {
            Some(AttrValue::Bool(v)) => Some(*v),
            _ => None,
        }
    }

    /// Get string value with custom default
    pub fn get_str_or<'a>(&'a self, key: &str, default: &'a str) -> &'a str {
        self.get_str(key).unwrap_or(default)
    }

    /// Get i32 value with custom default
    pub fn get_i32_or(&self, key: &str, default: i32) -> i32 {
        self.get_i32(key).unwrap_or(default)
    }

    /// Remove attribute by key
    pub fn remove(&mut self, key: &str) -> Option<AttrValue> {
        self.map.remove(key)
    }

    /// Iterate over all attributes (key, value)
    pub fn iter(&self) -> impl Iterator<Item = (&String, &AttrValue)> {
        self.map.iter()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.map.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_typed_getters() {
        let mut attrs = Attrs::new();
        attrs.set("steps", 25);
        attrs.set("cfg_scale", 7.5f32);
        attrs.set("prompt", "a castle");

        assert_eq!(attrs.get_i32("steps"), Some(25));
        assert_eq!(attrs.get_float("cfg_scale"), Some(7.5));
        // Int widens to float
        assert_eq!(attrs.get_float("steps"), Some(25.0));
        assert_eq!(attrs.get_str("prompt"), Some("a castle"));
        assert_eq!(attrs.get_bool("prompt"), None);
        assert_eq!(attrs.get_i32_or("missing", 3), 3);
    }

    #[test]
    fn test_json_literals() {
        let attrs: Attrs = serde_json::from_str(r#"{"steps": 20, "cfg_scale": 7.5, "prompt": "x", "tiled": false}"#).unwrap();
        assert_eq!(attrs.get("steps"), Some(&AttrValue::Int(20)));
        assert_eq!(attrs.get("cfg_scale"), Some(&AttrValue::Float(7.5)));
        assert_eq!(attrs.get_str("prompt"), Some("x"));
        assert_eq!(attrs.get_bool("tiled"), Some(false));

        let json = serde_json::to_string(&attrs).unwrap();
        assert_eq!(serde_json::from_str::<Attrs>(&json).unwrap(), attrs);
    }
}
