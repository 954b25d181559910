//! Insertion-ordered document: a mapping from unique string keys to `Value`.

use crate::Value;
use hashbrown::HashMap;
use serde::{Deserialize, Serialize};

/// An ordered mapping from field name to `Value`, with unique keys.
///
/// Field order is preserved across insert/remove so that re-serializing a
/// document round-trips its original layout. Lookup is O(1) via a side
/// index rebuilt on deserialization, mirroring the catalog's name-index
/// caching pattern.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Document {
    fields: Vec<(String, Value)>,
    #[serde(skip)]
    #[serde(default)]
    index: HashMap<String, usize>,
}

impl Document {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a field, preserving its original position on replace.
    pub fn insert(&mut self, key: impl Into<String>, value: Value) {
        let key = key.into();
        if let Some(&pos) = self.index.get(&key) {
            self.fields[pos].1 = value;
            return;
        }
        self.index.insert(key.clone(), self.fields.len());
        self.fields.push((key, value));
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.index.get(key).map(|&pos| &self.fields[pos].1)
    }

    /// Case-insensitive lookup preferring an exact-case match, per the
    /// evaluator's member-access rule. Returns the matched key name too.
    pub fn get_ci(&self, key: &str) -> Option<(&str, &Value)> {
        if let Some(&pos) = self.index.get(key) {
            let (k, v) = &self.fields[pos];
            return Some((k.as_str(), v));
        }
        self.fields
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(k, v)| (k.as_str(), v))
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        let pos = self.index.remove(key)?;
        let (_, value) = self.fields.remove(pos);
        self.reindex_from(pos);
        Some(value)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.index.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|(k, _)| k.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }

    fn reindex_from(&mut self, start: usize) {
        for (pos, (key, _)) in self.fields.iter().enumerate().skip(start) {
            self.index.insert(key.clone(), pos);
        }
    }

    /// Rebuild the lookup index after a decode that skipped it (bincode's
    /// serde bridge honors `#[serde(skip, default)]` but never calls back
    /// into the type, so callers that decode a `Document` off disk must
    /// invoke this once before looking anything up).
    pub fn rebuild_index(&mut self) {
        self.index.clear();
        for (pos, (key, _)) in self.fields.iter().enumerate() {
            self.index.insert(key.clone(), pos);
        }
    }
}

impl FromIterator<(String, Value)> for Document {
    fn from_iter<T: IntoIterator<Item = (String, Value)>>(iter: T) -> Self {
        let mut doc = Document::new();
        for (k, v) in iter {
            doc.insert(k, v);
        }
        doc
    }
}

impl PartialEq for Document {
    fn eq(&self, other: &Self) -> bool {
        self.fields == other.fields
    }
}
