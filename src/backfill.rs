//! Backfill Engine (C7): selects work-order ids created in a time
//! window, then re-derives every satellite table's rows for those ids in
//! batches, replaying each as a synthesized `update` event through the
//! same dispatcher the live tail uses. Idempotent by construction: an
//! `update` always converges regardless of how many times it replays.

use crate::dispatch::{dispatch, RawEvent};
use crate::executor::{Action, Executor};
use crate::normalize::RawValue;
use crate::projector::REGISTRY;
use crate::projector::Target;
use crate::store::EsLikeStore;
use chrono::{DateTime, Utc};
use mysql_async::prelude::*;
use mysql_async::{Conn, Opts, OptsBuilder, Params, Row, Value};
use std::collections::BTreeMap;
use std::sync::Arc;

pub struct BackfillEngine {
    host: String,
    port: u16,
    user: String,
    password: String,
    database: String,
}

impl BackfillEngine {
    pub fn new(host: String, port: u16, user: String, password: String, database: String) -> Self {
        Self { host, port, user, password, database }
    }

    fn opts(&self) -> Opts {
        OptsBuilder::default()
            .ip_or_hostname(self.host.clone())
            .tcp_port(self.port)
            .user(Some(self.user.clone()))
            .pass(Some(self.password.clone()))
            .db_name(Some(self.database.clone()))
            .into()
    }

    /// Backfills `[start, end)` and returns the replication offset
    /// observed once the backfill completes, for the checkpointer to
    /// persist before the tail takes over.
    pub async fn run<S: EsLikeStore>(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        batch_size: usize,
        executor: Arc<Executor<S>>,
    ) -> anyhow::Result<(String, u64)> {
        let mut conn = Conn::new(self.opts()).await?;

        let total: i64 = conn
            .exec_first(
                "SELECT COUNT(*) FROM tb_workorderinfo WHERE CreatedAt BETWEEN ? AND ?",
                (fmt(start), fmt(end)),
            )
            .await?
            .unwrap_or(0);

        if total == 0 {
            anyhow::bail!("backfill window [{start}, {end}) contains no work orders");
        }
        tracing::info!(total, %start, %end, "starting backfill");

        let mut work_order_ids: Vec<String> = Vec::new();
        let mut offset: usize = 0;
        loop {
            let rows: Vec<Row> = conn
                .exec(
                    "SELECT * FROM tb_workorderinfo WHERE CreatedAt BETWEEN ? AND ? ORDER BY Id LIMIT ? OFFSET ?",
                    (fmt(start), fmt(end), batch_size as u64, offset as u64),
                )
                .await?;
            if rows.is_empty() {
                break;
            }
            for row in &rows {
                let raw_row = row_to_raw_row(row);
                let id = id_of(&raw_row);
                work_order_ids.push(id);
                dispatch(&executor, RawEvent { table: "tb_workorderinfo".into(), action: Action::Update, row: raw_row }).await;
            }
            offset += batch_size;
            if rows.len() < batch_size {
                break;
            }
        }

        for spec in REGISTRY {
            match spec.target {
                Target::Master => continue,
                Target::ConfigSide => {
                    self.backfill_full_table(&mut conn, spec.source_table, batch_size, &executor).await?;
                }
                _ => {
                    self.backfill_satellite(&mut conn, spec.source_table, &work_order_ids, batch_size, &executor).await?;
                }
            }
        }

        let (log_file, log_pos) = current_binlog_position(&mut conn).await?;
        tracing::info!(log_file, log_pos, "backfill complete");
        Ok((log_file, log_pos))
    }

    async fn backfill_satellite<S: EsLikeStore>(
        &self,
        conn: &mut Conn,
        table: &str,
        work_order_ids: &[String],
        batch_size: usize,
        executor: &Executor<S>,
    ) -> anyhow::Result<()> {
        for chunk in work_order_ids.chunks(batch_size) {
            let placeholders = chunk.iter().map(|_| "?").collect::<Vec<_>>().join(",");
            let sql = format!("SELECT * FROM {table} WHERE WorkOrderId IN ({placeholders})");
            let params: Vec<Value> = chunk.iter().map(|id| Value::from(id.clone())).collect();
            let rows: Vec<Row> = conn.exec(sql, Params::Positional(params)).await?;
            for row in rows {
                let raw_row = row_to_raw_row(&row);
                dispatch(executor, RawEvent { table: table.to_string(), action: Action::Update, row: raw_row }).await;
            }
        }
        Ok(())
    }

    /// Loads `table` in its entirety, no `WorkOrderId` filter. Used for
    /// the one side table that isn't scoped to the backfill's time window.
    async fn backfill_full_table<S: EsLikeStore>(
        &self,
        conn: &mut Conn,
        table: &str,
        batch_size: usize,
        executor: &Executor<S>,
    ) -> anyhow::Result<()> {
        let mut offset: usize = 0;
        loop {
            let sql = format!("SELECT * FROM {table} LIMIT ? OFFSET ?");
            let rows: Vec<Row> = conn.exec(sql, (batch_size as u64, offset as u64)).await?;
            if rows.is_empty() {
                break;
            }
            let fetched = rows.len();
            for row in rows {
                let raw_row = row_to_raw_row(&row);
                dispatch(executor, RawEvent { table: table.to_string(), action: Action::Update, row: raw_row }).await;
            }
            offset += batch_size;
            if fetched < batch_size {
                break;
            }
        }
        Ok(())
    }
}

fn fmt(t: DateTime<Utc>) -> String {
    t.format("%Y-%m-%d %H:%M:%S").to_string()
}

fn id_of(row: &BTreeMap<String, RawValue>) -> String {
    match row.get("Id") {
        Some(RawValue::Int(i)) => i.to_string(),
        Some(RawValue::UInt(u)) => u.to_string(),
        Some(RawValue::Str(s)) => s.clone(),
        Some(RawValue::Bytes(b)) => String::from_utf8_lossy(b).into_owned(),
        _ => String::new(),
    }
}

fn row_to_raw_row(row: &Row) -> BTreeMap<String, RawValue> {
    let mut out = BTreeMap::new();
    for (i, column) in row.columns_ref().iter().enumerate() {
        let name = column.name_str().into_owned();
        let value: Value = row.as_ref(i).cloned().unwrap_or(Value::NULL);
        out.insert(name, mysql_value_to_raw(value));
    }
    out
}

fn mysql_value_to_raw(value: Value) -> RawValue {
    match value {
        Value::NULL => RawValue::Null,
        Value::Bytes(b) => RawValue::Bytes(b),
        Value::Int(i) => RawValue::Int(i),
        Value::UInt(u) => RawValue::UInt(u),
        Value::Float(f) => RawValue::Float(f as f64),
        Value::Double(d) => RawValue::Float(d),
        Value::Date(y, mo, d, h, mi, s, _) => match chrono::NaiveDate::from_ymd_opt(y as i32, mo as u32, d as u32)
            .and_then(|date| date.and_hms_opt(h as u32, mi as u32, s as u32))
        {
            Some(dt) => RawValue::DateTime(dt),
            None => RawValue::Null,
        },
        Value::Time(..) => RawValue::Null,
    }
}

async fn current_binlog_position(conn: &mut Conn) -> anyhow::Result<(String, u64)> {
    let row: Option<Row> = conn.query_first("SHOW MASTER STATUS").await?;
    match row {
        Some(row) => {
            let file: String = row.get("File").unwrap_or_default();
            let pos: u64 = row.get("Position").unwrap_or(0);
            Ok((file, pos))
        }
        None => anyhow::bail!("SHOW MASTER STATUS returned no rows"),
    }
}
