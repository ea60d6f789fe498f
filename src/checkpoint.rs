//! Checkpointer (C8): persists `(log_file, log_pos, init_time)` as a
//! single row, always rewritten in full rather than patched in place, so
//! a reader never observes a half-updated offset. Backed by SQLite the
//! way the teacher's config/alert state is, just with a single-row
//! schema instead of dashboards/alerts/SLOs.

use rusqlite::{params, Connection};
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Checkpoint {
    pub log_file: String,
    pub log_pos: u64,
    pub init_time: Option<String>,
}

pub struct CheckpointStore {
    conn: Mutex<Connection>,
}

impl CheckpointStore {
    pub fn open(path: &Path) -> anyhow::Result<Self> {
        let conn = Connection::open(path)?;
        conn.execute_batch(
            "PRAGMA journal_mode=WAL;
             CREATE TABLE IF NOT EXISTS checkpoint (
                 id INTEGER PRIMARY KEY CHECK (id = 0),
                 log_file TEXT NOT NULL,
                 log_pos INTEGER NOT NULL,
                 init_time TEXT
             );",
        )?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    pub fn load(&self) -> anyhow::Result<Option<Checkpoint>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare("SELECT log_file, log_pos, init_time FROM checkpoint WHERE id = 0")?;
        let mut rows = stmt.query([])?;
        if let Some(row) = rows.next()? {
            Ok(Some(Checkpoint {
                log_file: row.get(0)?,
                log_pos: row.get(1)?,
                init_time: row.get(2)?,
            }))
        } else {
            Ok(None)
        }
    }

    /// Rewrites the whole checkpoint row. Readers must tolerate an
    /// atomic replace; this never issues a partial `UPDATE`.
    pub fn save(&self, cp: &Checkpoint) -> anyhow::Result<()> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;
        tx.execute("DELETE FROM checkpoint WHERE id = 0", [])?;
        tx.execute(
            "INSERT INTO checkpoint (id, log_file, log_pos, init_time) VALUES (0, ?1, ?2, ?3)",
            params![cp.log_file, cp.log_pos, cp.init_time],
        )?;
        tx.commit()?;
        Ok(())
    }

    /// Clears `init_time` once a triggered backfill has completed, so a
    /// restart doesn't re-run it.
    pub fn clear_init_time(&self) -> anyhow::Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute("UPDATE checkpoint SET init_time = NULL WHERE id = 0", [])?;
        Ok(())
    }
}

/// Tracks the tailer's current position in memory; the periodic flush
/// task reads it and writes it to the checkpoint store on each tick.
#[derive(Clone, Default)]
pub struct PositionTracker(Arc<Mutex<Option<(String, u64)>>>);

impl PositionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, log_file: String, log_pos: u64) {
        *self.0.lock().unwrap() = Some((log_file, log_pos));
    }

    pub fn get(&self) -> Option<(String, u64)> {
        self.0.lock().unwrap().clone()
    }
}

/// Spawns the periodic checkpoint flush task (default every 5 minutes),
/// mirroring the teacher's `tokio::time::interval` background-engine
/// shape.
pub fn spawn_periodic_flush(store: Arc<CheckpointStore>, position: PositionTracker, interval_secs: u64) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_secs(interval_secs));
        loop {
            ticker.tick().await;
            let Some((log_file, log_pos)) = position.get() else { continue };
            let cp = Checkpoint { log_file, log_pos, init_time: None };
            if let Err(e) = store.save(&cp) {
                tracing::error!(error = %e, "failed to flush checkpoint");
            } else {
                tracing::debug!(?cp, "checkpoint flushed");
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn save_then_load_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let store = CheckpointStore::open(&dir.path().join("checkpoint.db")).unwrap();
        assert!(store.load().unwrap().is_none());

        let cp = Checkpoint { log_file: "mysql-bin.000001".into(), log_pos: 4, init_time: Some("2024-01-01".into()) };
        store.save(&cp).unwrap();
        assert_eq!(store.load().unwrap(), Some(cp));
    }

    #[test]
    fn save_replaces_rather_than_accumulates() {
        let dir = tempfile::tempdir().unwrap();
        let store = CheckpointStore::open(&dir.path().join("checkpoint.db")).unwrap();
        store.save(&Checkpoint { log_file: "a".into(), log_pos: 1, init_time: None }).unwrap();
        store.save(&Checkpoint { log_file: "b".into(), log_pos: 2, init_time: None }).unwrap();
        let loaded = store.load().unwrap().unwrap();
        assert_eq!(loaded.log_file, "b");
        assert_eq!(loaded.log_pos, 2);
    }

    #[test]
    fn clear_init_time_leaves_position_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let store = CheckpointStore::open(&dir.path().join("checkpoint.db")).unwrap();
        store.save(&Checkpoint { log_file: "a".into(), log_pos: 1, init_time: Some("t".into()) }).unwrap();
        store.clear_init_time().unwrap();
        let loaded = store.load().unwrap().unwrap();
        assert_eq!(loaded.init_time, None);
        assert_eq!(loaded.log_pos, 1);
    }
}
