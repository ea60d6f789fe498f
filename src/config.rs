use serde::Deserialize;
use std::path::Path;

/// Top-level configuration tree, loaded from a TOML file. Every section
/// has sane defaults so a minimal file (or even a missing one) still
/// produces something runnable against localhost.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct SyncConfig {
    #[serde(default)]
    pub source: SourceConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub binlog: BinlogConfig,
    #[serde(default)]
    pub log: LogConfig,
    #[serde(default)]
    pub monitor: MonitorConfig,
    #[serde(default)]
    pub alert: AlertConfig,
}

impl SyncConfig {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        if !path.exists() {
            tracing::warn!("config file {} not found, using defaults", path.display());
            return Ok(Self::default());
        }
        let raw = std::fs::read_to_string(path)?;
        let cfg: Self = toml::from_str(&raw)?;
        tracing::info!("loaded config from {}", path.display());
        Ok(cfg)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SourceConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_mysql_port")]
    pub port: u16,
    #[serde(default = "default_user")]
    pub user: String,
    #[serde(default)]
    pub password: String,
    #[serde(default = "default_database")]
    pub database: String,
    /// Source tables this pipeline listens to; empty means "all known tables".
    #[serde(default)]
    pub tables: Vec<String>,
    #[serde(default = "default_charset")]
    pub charset: String,
    /// Unique replication server id this instance presents to the source.
    #[serde(default = "default_server_id")]
    pub server_id: u32,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_mysql_port(),
            user: default_user(),
            password: String::new(),
            database: default_database(),
            tables: Vec::new(),
            charset: default_charset(),
            server_id: default_server_id(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    #[serde(default = "default_store_url")]
    pub url: String,
    #[serde(default)]
    pub user: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default = "default_index_name")]
    pub index_name: String,
    #[serde(default = "default_operating_index")]
    pub operating_index: String,
    #[serde(default = "default_config_index")]
    pub custspecialconfig_index: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            url: default_store_url(),
            user: None,
            password: None,
            index_name: default_index_name(),
            operating_index: default_operating_index(),
            custspecialconfig_index: default_config_index(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct BinlogConfig {
    #[serde(default)]
    pub log_file: Option<String>,
    #[serde(default)]
    pub log_pos: Option<u64>,
    /// If set, triggers a one-time backfill for rows created since this
    /// timestamp before the tailer starts from the persisted offset.
    #[serde(default)]
    pub init_time: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LogConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self { level: default_log_level() }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct MonitorConfig {
    #[serde(default = "default_delay_threshold")]
    pub delay_threshold_secs: u64,
    #[serde(default = "default_check_interval")]
    pub check_interval_secs: u64,
    #[serde(default = "default_checkpoint_interval")]
    pub checkpoint_interval_secs: u64,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            delay_threshold_secs: default_delay_threshold(),
            check_interval_secs: default_check_interval(),
            checkpoint_interval_secs: default_checkpoint_interval(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct AlertConfig {
    /// Group key for the webhook URL (`https://qyapi.weixin.qq.com/cgi-bin/webhook/send?key=...`).
    #[serde(default)]
    pub to_group_key: Option<String>,
    /// Mobile numbers to `@mention` in the alert text, comma-separated in the file.
    #[serde(default)]
    pub to_user: Vec<String>,
}

impl AlertConfig {
    pub fn webhook_url(&self) -> Option<String> {
        self.to_group_key
            .as_ref()
            .map(|key| format!("https://qyapi.weixin.qq.com/cgi-bin/webhook/send?key={key}"))
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}
fn default_mysql_port() -> u16 {
    3306
}
fn default_user() -> String {
    "root".to_string()
}
fn default_database() -> String {
    "orderdb".to_string()
}
fn default_charset() -> String {
    "utf8mb4".to_string()
}
fn default_server_id() -> u32 {
    3
}
fn default_store_url() -> String {
    "http://127.0.0.1:9200".to_string()
}
fn default_index_name() -> String {
    "workorder".to_string()
}
fn default_operating_index() -> String {
    "operating".to_string()
}
fn default_config_index() -> String {
    "custspecialconfig".to_string()
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_delay_threshold() -> u64 {
    300
}
fn default_check_interval() -> u64 {
    60
}
fn default_checkpoint_interval() -> u64 {
    300
}
