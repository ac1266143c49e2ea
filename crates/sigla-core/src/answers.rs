//! Ordered answer-key → answer-value mapping carried by every variable.

use std::fmt;

use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Key used when a variable has a single, unlabelled answer column.
pub const DEFAULT_ANSWER_KEY: &str = "default";

/// Answers keyed by answer label, in the order the sheet declares them.
///
/// Keys are unique. Two maps are equal when they hold the same key set with
/// the same value per key; order does not take part in equality.
#[derive(Debug, Clone, Default)]
pub struct AnswerMap {
    entries: Vec<(String, String)>,
}

impl AnswerMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// A map holding one answer under [`DEFAULT_ANSWER_KEY`].
    pub fn single(value: impl Into<String>) -> Self {
        let mut map = Self::new();
        map.insert(DEFAULT_ANSWER_KEY, value);
        map
    }

    /// Insert or replace. A replaced key keeps its original position.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) -> Option<String> {
        let key = key.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some((_, existing)) => Some(std::mem::replace(existing, value)),
            None => {
                self.entries.push((key, value));
                None
            }
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    /// Append every key of `other` that this map lacks, in `other`'s order.
    /// Keys present on both sides keep this map's value.
    pub fn merge(&mut self, other: &AnswerMap) {
        for (key, value) in other.iter() {
            if !self.contains_key(key) {
                self.entries.push((key.to_string(), value.to_string()));
            }
        }
    }
}

impl PartialEq for AnswerMap {
    fn eq(&self, other: &Self) -> bool {
        self.len() == other.len() && self.iter().all(|(k, v)| other.get(k) == Some(v))
    }
}

impl Eq for AnswerMap {}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for AnswerMap {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut map = Self::new();
        for (k, v) in iter {
            map.insert(k, v);
        }
        map
    }
}

impl Serialize for AnswerMap {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.len()))?;
        for (k, v) in self.iter() {
            map.serialize_entry(k, v)?;
        }
        map.end()
    }
}

struct AnswerMapVisitor;

impl<'de> Visitor<'de> for AnswerMapVisitor {
    type Value = AnswerMap;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a map of answer keys to answer values")
    }

    fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<AnswerMap, A::Error> {
        let mut map = AnswerMap::new();
        while let Some((key, value)) = access.next_entry::<String, String>()? {
            map.insert(key, value);
        }
        Ok(map)
    }
}

impl<'de> Deserialize<'de> for AnswerMap {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_map(AnswerMapVisitor)
    }
}
