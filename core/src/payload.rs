//! Request payloads built from named and free-form fields.
//!
//! # Design
//! `FieldMap` is an ordered key/value container over a small tagged union, so
//! a payload can mix well-known fields (`title`, `email`, ...) with arbitrary
//! keys without resorting to `serde_json::Value` at call sites. The named
//! setters are thin aliases for [`FieldMap::set`]; a payload built either way
//! serializes to the same bytes.

use serde::ser::{Serialize, SerializeMap, Serializer};

/// A single payload value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldValue {
    String(String),
    Integer(i64),
    Boolean(bool),
    Null,
}

impl Serialize for FieldValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            FieldValue::String(s) => serializer.serialize_str(s),
            FieldValue::Integer(i) => serializer.serialize_i64(*i),
            FieldValue::Boolean(b) => serializer.serialize_bool(*b),
            FieldValue::Null => serializer.serialize_unit(),
        }
    }
}

impl From<&str> for FieldValue {
    fn from(v: &str) -> Self {
        FieldValue::String(v.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(v: String) -> Self {
        FieldValue::String(v)
    }
}

impl From<&String> for FieldValue {
    fn from(v: &String) -> Self {
        FieldValue::String(v.clone())
    }
}

impl From<i64> for FieldValue {
    fn from(v: i64) -> Self {
        FieldValue::Integer(v)
    }
}

impl From<i32> for FieldValue {
    fn from(v: i32) -> Self {
        FieldValue::Integer(i64::from(v))
    }
}

impl From<u64> for FieldValue {
    fn from(v: u64) -> Self {
        FieldValue::Integer(i64::try_from(v).unwrap_or(i64::MAX))
    }
}

impl From<bool> for FieldValue {
    fn from(v: bool) -> Self {
        FieldValue::Boolean(v)
    }
}

impl<T: Into<FieldValue>> From<Option<T>> for FieldValue {
    fn from(v: Option<T>) -> Self {
        v.map_or(FieldValue::Null, Into::into)
    }
}

/// Ordered request payload. Keys are unique; re-setting a key keeps its
/// original position.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldMap {
    entries: Vec<(String, FieldValue)>,
}

impl FieldMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or overwrite `key`.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<FieldValue>) -> &mut Self {
        let key = key.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some((_, slot)) => *slot = value,
            None => self.entries.push((key, value)),
        }
        self
    }

    /// Emit `key` with an explicit JSON `null`.
    pub fn set_null(&mut self, key: impl Into<String>) -> &mut Self {
        self.set(key, FieldValue::Null)
    }

    pub fn title(&mut self, v: impl Into<FieldValue>) -> &mut Self {
        self.set("title", v)
    }

    pub fn body(&mut self, v: impl Into<FieldValue>) -> &mut Self {
        self.set("body", v)
    }

    pub fn name(&mut self, v: impl Into<FieldValue>) -> &mut Self {
        self.set("name", v)
    }

    pub fn email(&mut self, v: impl Into<FieldValue>) -> &mut Self {
        self.set("email", v)
    }

    pub fn gender(&mut self, v: impl Into<FieldValue>) -> &mut Self {
        self.set("gender", v)
    }

    pub fn status(&mut self, v: impl Into<FieldValue>) -> &mut Self {
        self.set("status", v)
    }

    pub fn due_on(&mut self, v: impl Into<FieldValue>) -> &mut Self {
        self.set("due_on", v)
    }

    pub fn post_id(&mut self, v: impl Into<FieldValue>) -> &mut Self {
        self.set("post_id", v)
    }

    pub fn user_id(&mut self, v: impl Into<FieldValue>) -> &mut Self {
        self.set("user_id", v)
    }

    pub fn get(&self, key: &str) -> Option<&FieldValue> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// JSON object bytes, keys in insertion order.
    pub fn serialize(&self) -> Vec<u8> {
        // Plain strings, integers and booleans always serialize.
        serde_json::to_vec(self).unwrap_or_else(|_| b"{}".to_vec())
    }
}

impl Serialize for FieldMap {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (k, v) in &self.entries {
            map.serialize_entry(k, v)?;
        }
        map.end()
    }
}

impl<K: Into<String>, V: Into<FieldValue>> FromIterator<(K, V)> for FieldMap {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut map = FieldMap::new();
        for (k, v) in iter {
            map.set(k, v);
        }
        map
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn as_json(map: &FieldMap) -> serde_json::Value {
        serde_json::from_slice(&map.serialize()).unwrap()
    }

    #[test]
    fn named_setters_match_generic_set() {
        let mut named = FieldMap::new();
        named.title("This is a Post title").body("Post body");

        let mut generic = FieldMap::new();
        generic.set("title", "This is a Post title").set("body", "Post body");

        assert_eq!(named.serialize(), generic.serialize());
    }

    #[test]
    fn serializes_in_insertion_order() {
        let mut map = FieldMap::new();
        map.name("Mark").email("m@example.com").gender("male").status("active");
        assert_eq!(
            String::from_utf8(map.serialize()).unwrap(),
            r#"{"name":"Mark","email":"m@example.com","gender":"male","status":"active"}"#
        );
    }

    #[test]
    fn overwrite_keeps_position() {
        let mut map = FieldMap::new();
        map.set("a", 1).set("b", 2).set("a", 3);
        assert_eq!(String::from_utf8(map.serialize()).unwrap(), r#"{"a":3,"b":2}"#);
        assert_eq!(map.len(), 2);
    }

    #[test]
    fn unset_keys_are_omitted_and_null_is_explicit() {
        let mut map = FieldMap::new();
        map.body("only body").set_null("post_id");
        let json = as_json(&map);
        assert!(json.get("title").is_none());
        assert_eq!(json["post_id"], serde_json::Value::Null);
        assert!(json.as_object().unwrap().contains_key("post_id"));
    }

    #[test]
    fn option_none_becomes_null() {
        let mut map = FieldMap::new();
        map.post_id(None::<i64>).user_id(Some(42));
        assert_eq!(
            String::from_utf8(map.serialize()).unwrap(),
            r#"{"post_id":null,"user_id":42}"#
        );
    }

    #[test]
    fn empty_map_serializes_to_empty_object() {
        assert_eq!(FieldMap::new().serialize(), b"{}");
    }

    #[test]
    fn collects_from_pairs() {
        let map: FieldMap = [("title", "t"), ("body", "b")].into_iter().collect();
        assert_eq!(map.keys().collect::<Vec<_>>(), ["title", "body"]);
        assert_eq!(map.get("body"), Some(&FieldValue::String("b".into())));
    }

    fn value_strategy() -> impl Strategy<Value = FieldValue> {
        prop_oneof![
            ".{0,12}".prop_map(FieldValue::String),
            any::<i64>().prop_map(FieldValue::Integer),
            any::<bool>().prop_map(FieldValue::Boolean),
            Just(FieldValue::Null),
        ]
    }

    fn to_json(value: &FieldValue) -> serde_json::Value {
        serde_json::to_value(value).unwrap()
    }

    proptest! {
        #[test]
        fn set_key_is_present_and_nothing_else(
            base in proptest::collection::vec(("[a-z]{1,6}", value_strategy()), 0..8),
            key in "[a-z]{1,6}",
            value in value_strategy(),
        ) {
            let mut map: FieldMap = base.iter().cloned().collect();
            map.set(key.clone(), value.clone());
            let json = as_json(&map);
            let object = json.as_object().unwrap();

            prop_assert_eq!(&object[&key], &to_json(&value));
            for k in object.keys() {
                prop_assert!(*k == key || base.iter().any(|(b, _)| b == k));
            }
        }
    }
}
