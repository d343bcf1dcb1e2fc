//! In-memory index backend.
//!
//! Keeps whole documents as JSON values in a concurrent map and implements
//! the same upsert-merge contract a remote document store would provide.

use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde_json::Value;

use super::{Index, IndexError};

pub struct MemoryIndex {
    name: String,
    docs: DashMap<String, Value>,
}

impl MemoryIndex {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            docs: DashMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.docs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.docs.is_empty()
    }
}

/// Union of two reference arrays, unique by `(parent_hash, name)`.
fn merge_references(existing: Option<&Value>, incoming: Option<&Value>) -> Value {
    let mut merged: Vec<Value> = Vec::new();
    for source in [existing, incoming].into_iter().flatten() {
        if let Some(items) = source.as_array() {
            for item in items {
                let key = (item.get("parent_hash"), item.get("name"));
                let duplicate = merged
                    .iter()
                    .any(|m| (m.get("parent_hash"), m.get("name")) == key);
                if !duplicate {
                    merged.push(item.clone());
                }
            }
        }
    }
    Value::Array(merged)
}

#[async_trait]
impl Index for MemoryIndex {
    fn name(&self) -> &str {
        &self.name
    }

    async fn index(&self, id: &str, doc: Value) -> Result<(), IndexError> {
        match self.docs.entry(id.to_string()) {
            Entry::Vacant(slot) => {
                slot.insert(doc);
            }
            Entry::Occupied(mut slot) => {
                let existing = slot.get();
                let references =
                    merge_references(existing.get("references"), doc.get("references"));
                let first_seen = existing.get("first-seen").cloned();

                let mut merged = doc;
                if let Some(obj) = merged.as_object_mut() {
                    obj.insert("references".to_string(), references);
                    if let Some(first_seen) = first_seen {
                        obj.insert("first-seen".to_string(), first_seen);
                    }
                }
                slot.insert(merged);
            }
        }
        Ok(())
    }

    async fn update(&self, id: &str, doc: Value) -> Result<(), IndexError> {
        let mut slot = self
            .docs
            .entry(id.to_string())
            .or_insert_with(|| Value::Object(serde_json::Map::new()));
        if let (Some(target), Some(fields)) = (slot.as_object_mut(), doc.as_object()) {
            for (key, value) in fields {
                target.insert(key.clone(), value.clone());
            }
        }
        Ok(())
    }

    async fn get(&self, id: &str, fields: &[&str]) -> Result<Option<Value>, IndexError> {
        let Some(doc) = self.docs.get(id) else {
            return Ok(None);
        };
        if fields.is_empty() {
            return Ok(Some(doc.clone()));
        }

        let mut projection = serde_json::Map::new();
        if let Some(obj) = doc.as_object() {
            for field in fields {
                if let Some(value) = obj.get(*field) {
                    projection.insert(field.to_string(), value.clone());
                }
            }
        }
        Ok(Some(Value::Object(projection)))
    }
}
