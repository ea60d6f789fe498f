use thiserror::Error;

/// Error kinds the pipeline needs to branch on. Everything else collapses
/// into `Other` via `anyhow`-style `?` at the call sites that don't care.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("document store returned a version conflict for {doc_id}")]
    VersionConflict { doc_id: String },

    #[error("document {doc_id} does not exist")]
    MissingDocument { doc_id: String },

    #[error("no projector registered for source table {table}")]
    UnknownTable { table: String },

    #[error("transport error talking to the document store: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("malformed replication value: {0}")]
    MalformedValue(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("replication subscribe failed: {0}")]
    Subscribe(#[from] mysql_async::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, SyncError>;
