//! Multi-event convergence scenarios driven through the full
//! dispatch -> project -> execute path against the in-memory store.

use std::sync::Arc;
use wos_sync::dispatch::{dispatch, RawEvent};
use wos_sync::executor::{Action, Executor};
use wos_sync::normalize::RawValue;
use wos_sync::projector::RawRow;
use wos_sync::store::fake::FakeStore;

fn row(pairs: &[(&str, RawValue)]) -> RawRow {
    pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
}

fn new_executor() -> (Arc<FakeStore>, Arc<Executor<FakeStore>>) {
    let store = Arc::new(FakeStore::new());
    let executor = Arc::new(Executor::new(store.clone(), "workorder".into(), "operating".into(), "custspecialconfig".into()));
    (store, executor)
}

#[tokio::test]
async fn replaying_the_same_insert_is_idempotent() {
    let (store, executor) = new_executor();
    let master_row = row(&[("Id", RawValue::Int(1)), ("Remark", RawValue::Str("hello".into()))]);

    for _ in 0..3 {
        dispatch(&executor, RawEvent { table: "tb_workorderinfo".into(), action: Action::Update, row: master_row.clone() }).await;
    }

    let doc = store.get("workorder", "1").unwrap();
    assert_eq!(doc["Remark"], "hello");
    assert_eq!(doc["Id"], "1");
}

#[tokio::test]
async fn single_satellite_event_replayed_converges_to_one_entry() {
    let (store, executor) = new_executor();
    let master_row = row(&[("Id", RawValue::Int(1))]);
    dispatch(&executor, RawEvent { table: "tb_workorderinfo".into(), action: Action::Update, row: master_row }).await;

    let status_row = row(&[
        ("Id", RawValue::Int(10)),
        ("WorkOrderId", RawValue::Int(1)),
        ("WorkStatus", RawValue::Str("open".into())),
    ]);
    for _ in 0..3 {
        dispatch(&executor, RawEvent { table: "tb_workorderstatus".into(), action: Action::Update, row: status_row.clone() }).await;
    }

    let doc = store.get("workorder", "1").unwrap();
    let entries = doc["StatusInfo"].as_array().unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0]["Id"], "10");
    assert_eq!(entries[0]["WorkOrderId"], "1");
}

#[tokio::test]
async fn insert_then_update_then_delete_removes_the_satellite_entry() {
    let (store, executor) = new_executor();
    let master_row = row(&[("Id", RawValue::Int(1))]);
    dispatch(&executor, RawEvent { table: "tb_workorderinfo".into(), action: Action::Update, row: master_row }).await;

    let insert_row = row(&[
        ("Id", RawValue::Int(10)),
        ("WorkOrderId", RawValue::Int(1)),
        ("WorkStatus", RawValue::Str("open".into())),
    ]);
    dispatch(&executor, RawEvent { table: "tb_workorderstatus".into(), action: Action::Insert, row: insert_row }).await;

    let update_row = row(&[
        ("Id", RawValue::Int(10)),
        ("WorkOrderId", RawValue::Int(1)),
        ("WorkStatus", RawValue::Str("closed".into())),
    ]);
    dispatch(&executor, RawEvent { table: "tb_workorderstatus".into(), action: Action::Update, row: update_row }).await;

    let doc = store.get("workorder", "1").unwrap();
    assert_eq!(doc["StatusInfo"].as_array().unwrap().len(), 1);

    let delete_row = row(&[("Id", RawValue::Int(10)), ("WorkOrderId", RawValue::Int(1))]);
    dispatch(&executor, RawEvent { table: "tb_workorderstatus".into(), action: Action::Delete, row: delete_row }).await;

    let doc = store.get("workorder", "1").unwrap();
    assert!(doc["StatusInfo"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn master_delete_then_satellite_insert_bootstraps_a_fresh_parent() {
    let (store, executor) = new_executor();
    let master_row = row(&[("Id", RawValue::Int(1)), ("Remark", RawValue::Str("hello".into()))]);
    dispatch(&executor, RawEvent { table: "tb_workorderinfo".into(), action: Action::Update, row: master_row }).await;
    assert!(store.get("workorder", "1").is_some());

    let delete_row = row(&[("Id", RawValue::Int(1))]);
    dispatch(&executor, RawEvent { table: "tb_workorderinfo".into(), action: Action::Delete, row: delete_row }).await;
    assert!(store.get("workorder", "1").is_none());

    let status_row = row(&[
        ("Id", RawValue::Int(10)),
        ("WorkOrderId", RawValue::Int(1)),
        ("WorkStatus", RawValue::Str("open".into())),
    ]);
    dispatch(&executor, RawEvent { table: "tb_workorderstatus".into(), action: Action::Insert, row: status_row }).await;

    let doc = store.get("workorder", "1").unwrap();
    assert_eq!(doc["StatusInfo"].as_array().unwrap().len(), 1);
    assert!(doc.get("Remark").is_none());
}

#[tokio::test]
async fn two_satellite_tables_fan_into_distinct_nested_fields() {
    let (store, executor) = new_executor();
    let master_row = row(&[("Id", RawValue::Int(1))]);
    dispatch(&executor, RawEvent { table: "tb_workorderinfo".into(), action: Action::Update, row: master_row }).await;

    let status_row = row(&[("Id", RawValue::Int(10)), ("WorkOrderId", RawValue::Int(1)), ("WorkStatus", RawValue::Str("open".into()))]);
    dispatch(&executor, RawEvent { table: "tb_workorderstatus".into(), action: Action::Insert, row: status_row }).await;

    let car_row = row(&[("Id", RawValue::Int(20)), ("WorkOrderId", RawValue::Int(1)), ("PlateNumber", RawValue::Str("ABC123".into()))]);
    dispatch(&executor, RawEvent { table: "tb_workcarinfo".into(), action: Action::Insert, row: car_row }).await;

    let doc = store.get("workorder", "1").unwrap();
    assert_eq!(doc["StatusInfo"].as_array().unwrap().len(), 1);
    assert_eq!(doc["CarInfo"].as_array().unwrap().len(), 1);
    assert_eq!(doc["CarInfo"][0]["Id"], "20");
}
