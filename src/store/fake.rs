use super::{EsLikeStore, NestedArrayOp};
use crate::error::{Result, SyncError};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Mutex;

/// An in-memory stand-in for an Elasticsearch-compatible store, used by
/// tests that exercise C3/C4 convergence behavior without a live cluster.
/// Applies the same upsert-by-id / remove-by-id semantics the real
/// scripted update performs, just as plain Rust instead of Painless.
#[derive(Default)]
pub struct FakeStore {
    docs: Mutex<HashMap<(String, String), (Value, i64)>>,
}

impl FakeStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, index: &str, id: &str) -> Option<Value> {
        self.docs.lock().unwrap().get(&(index.to_string(), id.to_string())).map(|(v, _)| v.clone())
    }
}

#[async_trait]
impl EsLikeStore for FakeStore {
    async fn get_with_version(&self, index: &str, id: &str) -> Result<Option<(Value, i64)>> {
        Ok(self.docs.lock().unwrap().get(&(index.to_string(), id.to_string())).cloned())
    }

    async fn upsert(&self, index: &str, id: &str, doc: &Value) -> Result<()> {
        let mut docs = self.docs.lock().unwrap();
        let key = (index.to_string(), id.to_string());
        let entry = docs.entry(key).or_insert((Value::Object(Default::default()), 0));
        merge_object(&mut entry.0, doc);
        entry.1 += 1;
        Ok(())
    }

    async fn delete(&self, index: &str, id: &str) -> Result<()> {
        self.docs.lock().unwrap().remove(&(index.to_string(), id.to_string()));
        Ok(())
    }

    async fn scripted_update(&self, index: &str, id: &str, version: i64, op: &NestedArrayOp) -> Result<()> {
        let mut docs = self.docs.lock().unwrap();
        let key = (index.to_string(), id.to_string());
        let Some((doc, current_version)) = docs.get_mut(&key) else {
            return Err(SyncError::MissingDocument { doc_id: id.to_string() });
        };
        if *current_version != version {
            return Err(SyncError::VersionConflict { doc_id: id.to_string() });
        }
        apply_nested_op(doc, op);
        *current_version += 1;
        Ok(())
    }

    async fn search(&self, index: &str, _query: &Value) -> Result<Vec<Value>> {
        Ok(self
            .docs
            .lock()
            .unwrap()
            .iter()
            .filter(|((idx, _), _)| idx == index)
            .map(|(_, (doc, _))| doc.clone())
            .collect())
    }
}

fn merge_object(target: &mut Value, patch: &Value) {
    if let (Value::Object(target_map), Value::Object(patch_map)) = (target, patch) {
        for (k, v) in patch_map {
            target_map.insert(k.clone(), v.clone());
        }
    }
}

fn apply_nested_op(doc: &mut Value, op: &NestedArrayOp) {
    let obj = match doc {
        Value::Object(m) => m,
        _ => return,
    };
    match op {
        NestedArrayOp::UpsertById { field, entry } => {
            let arr = obj.entry(field.clone()).or_insert(Value::Array(Vec::new()));
            let Value::Array(items) = arr else { return };
            let entry_id = entry.get("Id").cloned();
            if let Some(existing) = items.iter_mut().find(|item| item.get("Id").cloned() == entry_id) {
                *existing = entry.clone();
            } else {
                items.push(entry.clone());
            }
        }
        NestedArrayOp::RemoveById { field, entry_id } => {
            if let Some(Value::Array(items)) = obj.get_mut(field.as_str()) {
                items.retain(|item| item.get("Id").and_then(Value::as_str) != Some(entry_id.as_str()));
            }
        }
    }
}
