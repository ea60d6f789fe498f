//! Update Executor (C3): turns a projected row plus an action (insert,
//! update, delete) into document-store calls, using the optimistic retry
//! loop (C4) for every fetch-then-mutate path.

use crate::error::{Result, SyncError};
use crate::projector::{Projected, Target};
use crate::retry::{with_retry, RetryPolicy};
use crate::store::{EsLikeStore, NestedArrayOp};
use serde_json::{Map, Value};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Insert,
    Update,
    Delete,
}

pub struct Executor<S: EsLikeStore> {
    store: Arc<S>,
    master_index: String,
    operating_index: String,
    config_index: String,
    policy: RetryPolicy,
}

impl<S: EsLikeStore> Executor<S> {
    pub fn new(store: Arc<S>, master_index: String, operating_index: String, config_index: String) -> Self {
        Self { store, master_index, operating_index, config_index, policy: RetryPolicy::default() }
    }

    pub async fn apply(&self, action: Action, projected: Projected) -> Result<()> {
        match projected.spec.target {
            Target::Master => self.apply_master(action, projected).await,
            Target::Nested(field) => self.apply_nested(action, field, projected).await,
            Target::OperatingSide => {
                let index = self.operating_index.clone();
                self.apply_side(action, &index, projected).await
            }
            Target::ConfigSide => {
                let index = self.config_index.clone();
                self.apply_side(action, &index, projected).await
            }
        }
    }

    /// Primary insert/update: doc_as_upsert onto the master document.
    /// Primary delete: delete the whole document.
    async fn apply_master(&self, action: Action, projected: Projected) -> Result<()> {
        let id = projected.id.clone();
        match action {
            Action::Insert | Action::Update => {
                let doc = fields_to_doc(&projected.fields, &id, Some(&id));
                self.store.upsert(&self.master_index, &id, &doc).await
            }
            Action::Delete => self.store.delete(&self.master_index, &id).await,
        }
    }

    /// Satellite insert/update: scripted upsert-by-id into the nested
    /// array field, retried on version conflict, falling back to
    /// creating the parent work order (carrying just this entry) if the
    /// parent document doesn't exist yet.
    /// Satellite delete: scripted remove-by-id, missing parent treated
    /// as already-converged success.
    async fn apply_nested(&self, action: Action, field: &'static str, projected: Projected) -> Result<()> {
        let work_order_id = projected
            .work_order_id
            .clone()
            .ok_or_else(|| SyncError::MalformedValue(format!("{field} row missing WorkOrderId")))?;
        let entry_id = projected.id.clone();

        match action {
            Action::Insert | Action::Update => {
                let entry = fields_to_doc(&projected.fields, &entry_id, Some(&work_order_id));
                let op = NestedArrayOp::UpsertById { field: field.to_string(), entry: entry.clone() };
                with_retry(
                    &self.policy,
                    || self.attempt_scripted(&work_order_id, &op),
                    || self.create_parent_with_entry(&work_order_id, field, &entry),
                )
                .await
            }
            Action::Delete => {
                let op = NestedArrayOp::RemoveById { field: field.to_string(), entry_id: entry_id.clone() };
                with_retry(
                    &self.policy,
                    || self.attempt_scripted(&work_order_id, &op),
                    || async { Ok(()) },
                )
                .await
            }
        }
    }

    async fn attempt_scripted(&self, work_order_id: &str, op: &NestedArrayOp) -> Result<()> {
        let Some((_, version)) = self.store.get_with_version(&self.master_index, work_order_id).await? else {
            return Err(SyncError::MissingDocument { doc_id: work_order_id.to_string() });
        };
        self.store.scripted_update(&self.master_index, work_order_id, version, op).await
    }

    async fn create_parent_with_entry(&self, work_order_id: &str, field: &'static str, entry: &Value) -> Result<()> {
        let doc = serde_json::json!({
            "WorkOrderId": work_order_id,
            field: [entry],
        });
        self.store.upsert(&self.master_index, work_order_id, &doc).await
    }

    /// Side entities (operating, custspecialconfig) are independent
    /// documents keyed by their own id; no fetch-then-mutate is needed,
    /// a plain upsert/delete converges them.
    async fn apply_side(&self, action: Action, index: &str, projected: Projected) -> Result<()> {
        let id = projected.id.clone();
        match action {
            Action::Insert | Action::Update => {
                let doc = fields_to_doc(&projected.fields, &id, projected.work_order_id.as_deref());
                self.store.upsert(index, &id, &doc).await
            }
            Action::Delete => self.store.delete(index, &id).await,
        }
    }
}

/// Builds a document from whitelist-projected fields, always stringifying
/// `Id` and, when present, `WorkOrderId`. The whitelist commonly carries
/// both as raw integer columns, which would otherwise clobber these two
/// identity keys with JSON numbers instead of the strings callers expect.
fn fields_to_doc(fields: &std::collections::BTreeMap<String, Value>, id: &str, work_order_id: Option<&str>) -> Value {
    let mut map = Map::new();
    map.insert("Id".to_string(), Value::String(id.to_string()));
    if let Some(wo_id) = work_order_id {
        map.insert("WorkOrderId".to_string(), Value::String(wo_id.to_string()));
    }
    for (k, v) in fields {
        if k == "Id" || k == "WorkOrderId" {
            continue;
        }
        map.insert(k.clone(), v.clone());
    }
    Value::Object(map)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::projector::project;
    use crate::normalize::RawValue;
    use crate::store::fake::FakeStore;
    use std::collections::BTreeMap;

    fn row(pairs: &[(&str, RawValue)]) -> BTreeMap<String, RawValue> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
    }

    #[tokio::test]
    async fn master_insert_then_satellite_upsert_converges() {
        let store = Arc::new(FakeStore::new());
        let executor = Executor::new(store.clone(), "workorder".into(), "operating".into(), "custspecialconfig".into());

        let master_row = row(&[("Id", RawValue::Int(1)), ("Remark", RawValue::Str("hello".into()))]);
        let projected = project("tb_workorderinfo", &master_row).unwrap();
        executor.apply(Action::Insert, projected).await.unwrap();

        let status_row = row(&[
            ("Id", RawValue::Int(10)),
            ("WorkOrderId", RawValue::Int(1)),
            ("WorkStatus", RawValue::Str("open".into())),
        ]);
        let projected = project("tb_workorderstatus", &status_row).unwrap();
        executor.apply(Action::Insert, projected).await.unwrap();

        let doc = store.get("workorder", "1").unwrap();
        assert_eq!(doc["StatusInfo"].as_array().unwrap().len(), 1);
        assert_eq!(doc["StatusInfo"][0]["WorkStatus"], "open");
    }

    #[tokio::test]
    async fn satellite_upsert_without_parent_bootstraps_parent() {
        let store = Arc::new(FakeStore::new());
        let executor = Executor::new(store.clone(), "workorder".into(), "operating".into(), "custspecialconfig".into());

        let status_row = row(&[
            ("Id", RawValue::Int(10)),
            ("WorkOrderId", RawValue::Int(1)),
            ("WorkStatus", RawValue::Str("open".into())),
        ]);
        let projected = project("tb_workorderstatus", &status_row).unwrap();
        executor.apply(Action::Insert, projected).await.unwrap();

        let doc = store.get("workorder", "1").unwrap();
        assert_eq!(doc["StatusInfo"].as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn two_concurrent_satellite_ids_converge_to_two_entries() {
        let store = Arc::new(FakeStore::new());
        let executor = Executor::new(store.clone(), "workorder".into(), "operating".into(), "custspecialconfig".into());

        let master_row = row(&[("Id", RawValue::Int(1))]);
        executor.apply(Action::Insert, project("tb_workorderinfo", &master_row).unwrap()).await.unwrap();

        for entry_id in [10, 11] {
            let status_row = row(&[
                ("Id", RawValue::Int(entry_id)),
                ("WorkOrderId", RawValue::Int(1)),
                ("WorkStatus", RawValue::Str("open".into())),
            ]);
            executor
                .apply(Action::Insert, project("tb_workorderstatus", &status_row).unwrap())
                .await
                .unwrap();
        }

        let doc = store.get("workorder", "1").unwrap();
        assert_eq!(doc["StatusInfo"].as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn delete_on_missing_parent_is_success() {
        let store = Arc::new(FakeStore::new());
        let executor = Executor::new(store.clone(), "workorder".into(), "operating".into(), "custspecialconfig".into());

        let status_row = row(&[("Id", RawValue::Int(10)), ("WorkOrderId", RawValue::Int(99))]);
        let result = executor.apply(Action::Delete, project("tb_workorderstatus", &status_row).unwrap()).await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn side_entity_indexes_independently() {
        let store = Arc::new(FakeStore::new());
        let executor = Executor::new(store.clone(), "workorder".into(), "operating".into(), "custspecialconfig".into());

        let op_row = row(&[
            ("Id", RawValue::Int(5)),
            ("WorkOrderId", RawValue::Int(1)),
            ("OperatorName", RawValue::Str("Alice".into())),
        ]);
        executor.apply(Action::Insert, project("tb_operatinginfo", &op_row).unwrap()).await.unwrap();

        assert!(store.get("workorder", "1").is_none());
        let doc = store.get("operating", "5").unwrap();
        assert_eq!(doc["OperatorName"], "Alice");
        assert_eq!(doc["WorkOrderId"], "1");
    }
}
