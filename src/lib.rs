pub mod alert;
pub mod backfill;
pub mod checkpoint;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod executor;
pub mod monitor;
pub mod normalize;
pub mod projector;
pub mod retry;
pub mod store;
pub mod tailer;
