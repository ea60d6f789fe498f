//! The document-store seam (C3's transport). An `EsLikeStore` is anything
//! that speaks the handful of Elasticsearch-shaped operations this
//! pipeline needs: get-with-version, upsert, delete, and a scripted
//! nested-array mutation. The production implementation talks to a real
//! cluster over HTTP; tests substitute an in-memory fake.

pub mod es;
pub mod fake;

use crate::error::Result;
use async_trait::async_trait;
use serde_json::Value;

/// A server-side script operation against a nested array field, mirroring
/// the Painless upsert-by-id / remove-by-id scripts the source system
/// used to mutate satellite arrays without a client-side read-modify-write.
#[derive(Debug, Clone)]
pub enum NestedArrayOp {
    /// Insert `entry` into `field`, replacing any existing element whose
    /// `Id` matches, or appending if none does.
    UpsertById { field: String, entry: Value },
    /// Remove the element of `field` whose `Id` equals `entry_id`.
    RemoveById { field: String, entry_id: String },
}

#[async_trait]
pub trait EsLikeStore: Send + Sync {
    /// Fetches a document and its current sequence/version, if it exists.
    async fn get_with_version(&self, index: &str, id: &str) -> Result<Option<(Value, i64)>>;

    /// Upserts `doc` onto `id` (doc_as_upsert semantics: merges fields
    /// into the document, creating it if absent).
    async fn upsert(&self, index: &str, id: &str, doc: &Value) -> Result<()>;

    /// Deletes a document. Missing document is treated as success.
    async fn delete(&self, index: &str, id: &str) -> Result<()>;

    /// Applies a scripted nested-array mutation, conditioned on the
    /// document still being at `version`. Returns
    /// `SyncError::VersionConflict` if it has moved on, or
    /// `SyncError::MissingDocument` if the document no longer exists.
    async fn scripted_update(&self, index: &str, id: &str, version: i64, op: &NestedArrayOp) -> Result<()>;

    /// Term-filtered, sorted search, used by ad-hoc lookups and tests;
    /// not on the hot path of any of C1-C9.
    async fn search(&self, index: &str, query: &Value) -> Result<Vec<Value>>;
}
