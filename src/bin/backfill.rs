use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use wos_sync::backfill::BackfillEngine;
use wos_sync::checkpoint::{Checkpoint, CheckpointStore};
use wos_sync::config::SyncConfig;
use wos_sync::executor::Executor;
use wos_sync::store::es::EsHttpStore;

/// Standalone backfill: re-derives documents for work orders created in
/// `[start, end)` and replays them as update events. `end` defaults to
/// now.
#[derive(Parser)]
struct Args {
    #[arg(long, default_value = "wos-sync.toml")]
    config: PathBuf,
    #[arg(long, default_value = "checkpoint.db")]
    checkpoint_db: PathBuf,
    #[arg(long)]
    start: String,
    #[arg(long)]
    end: Option<String>,
    #[arg(long, default_value_t = 100)]
    batch: usize,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "wos_sync=info".into()))
        .init();

    let args = Args::parse();
    let config = SyncConfig::load(&args.config)?;

    let start = parse_time(&args.start)?;
    let end = match &args.end {
        Some(s) => parse_time(s)?,
        None => chrono::Utc::now(),
    };

    let store = Arc::new(EsHttpStore::new(
        config.store.url.clone(),
        config.store.user.clone().zip(config.store.password.clone()),
    ));
    let executor = Arc::new(Executor::new(
        store,
        config.store.index_name.clone(),
        config.store.operating_index.clone(),
        config.store.custspecialconfig_index.clone(),
    ));

    let backfill = BackfillEngine::new(
        config.source.host.clone(),
        config.source.port,
        config.source.user.clone(),
        config.source.password.clone(),
        config.source.database.clone(),
    );

    let (log_file, log_pos) = backfill.run(start, end, args.batch, executor).await?;

    let checkpoint_store = CheckpointStore::open(&args.checkpoint_db)?;
    checkpoint_store.save(&Checkpoint { log_file, log_pos, init_time: None })?;

    Ok(())
}

fn parse_time(s: &str) -> anyhow::Result<chrono::DateTime<chrono::Utc>> {
    let dt = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")?;
    Ok(dt.and_utc())
}
