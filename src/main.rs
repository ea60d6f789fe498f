use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use wos_sync::alert::{AlertSink, LoggingAlertSink, WebhookAlertSink};
use wos_sync::backfill::BackfillEngine;
use wos_sync::checkpoint::{Checkpoint, CheckpointStore, PositionTracker};
use wos_sync::config::SyncConfig;
use wos_sync::executor::Executor;
use wos_sync::monitor::LagMonitor;
use wos_sync::store::es::EsHttpStore;
use wos_sync::tailer::Tailer;

#[derive(Parser)]
struct Args {
    #[arg(long, default_value = "wos-sync.toml")]
    config: PathBuf,
    #[arg(long, default_value = "checkpoint.db")]
    checkpoint_db: PathBuf,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "wos_sync=info".into()))
        .init();

    let args = Args::parse();
    let config = SyncConfig::load(&args.config)?;

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

    let checkpoint_store = Arc::new(CheckpointStore::open(&args.checkpoint_db)?);
    let persisted = checkpoint_store.load()?;

    let sink: Arc<dyn AlertSink> = match config.alert.webhook_url() {
        Some(url) => Arc::new(WebhookAlertSink::new(url)),
        None => Arc::new(LoggingAlertSink),
    };
    let lag_monitor = Arc::new(LagMonitor::new(
        sink,
        config.monitor.delay_threshold_secs,
        config.alert.to_user.clone(),
    ));
    wos_sync::monitor::spawn(lag_monitor.clone(), config.monitor.check_interval_secs);

    let position = PositionTracker::new();
    wos_sync::checkpoint::spawn_periodic_flush(checkpoint_store.clone(), position.clone(), config.monitor.checkpoint_interval_secs);

    let init_time = config.binlog.init_time.clone().or_else(|| persisted.as_ref().and_then(|c| c.init_time.clone()));

    let (log_file, log_pos) = if let Some(init_time) = init_time {
        tracing::info!(init_time, "init_time configured, running backfill before tailing");
        let start = chrono::DateTime::parse_from_str(&format!("{init_time} +0000"), "%Y-%m-%d %H:%M:%S %z")?.with_timezone(&chrono::Utc);
        let end = chrono::Utc::now();
        let backfill = BackfillEngine::new(
            config.source.host.clone(),
            config.source.port,
            config.source.user.clone(),
            config.source.password.clone(),
            config.source.database.clone(),
        );
        let (log_file, log_pos) = backfill.run(start, end, 100, executor.clone()).await?;
        checkpoint_store.save(&Checkpoint { log_file: log_file.clone(), log_pos, init_time: None })?;
        (log_file, log_pos)
    } else if let Some(cp) = persisted {
        (cp.log_file, cp.log_pos)
    } else {
        let file = config.binlog.log_file.clone().unwrap_or_default();
        let pos = config.binlog.log_pos.unwrap_or(4);
        (file, pos)
    };

    let tailer = Tailer::new(config.source.clone());
    let result = tailer.run(log_file, log_pos, executor, position.clone(), lag_monitor).await;

    if let Some((log_file, log_pos)) = position.get() {
        if let Err(e) = checkpoint_store.save(&Checkpoint { log_file, log_pos, init_time: None }) {
            tracing::error!(error = %e, "failed best-effort checkpoint save on shutdown");
        }
    }

    result
}
