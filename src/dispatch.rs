//! Event Dispatcher (C5): routes one raw replication row event through
//! projection and the update executor. An event for a table with no
//! registered projector is logged and dropped, not propagated as an
//! error — the source system never fails the whole stream over an
//! unrecognized table.

use crate::executor::{Action, Executor};
use crate::projector::{project, RawRow};
use crate::store::EsLikeStore;

pub struct RawEvent {
    pub table: String,
    pub action: Action,
    pub row: RawRow,
}

pub async fn dispatch<S: EsLikeStore>(executor: &Executor<S>, event: RawEvent) {
    let projected = match project(&event.table, &event.row) {
        Ok(p) => p,
        Err(crate::error::SyncError::UnknownTable { table }) => {
            tracing::warn!(table, "no projector registered for this table, skipping event");
            return;
        }
        Err(e) => {
            tracing::error!(table = event.table, error = %e, "failed to project event");
            return;
        }
    };

    if let Err(e) = executor.apply(event.action, projected).await {
        tracing::error!(table = event.table, error = %e, "failed to apply projected event");
    }
}
