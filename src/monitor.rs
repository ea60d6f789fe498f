//! Lag Monitor (C9): watches the wall-clock gap since the last observed
//! replication event and alerts when it exceeds a threshold. Grounded on
//! the source system's `BinlogMonitor` (same message shape, same default
//! thresholds: 300s delay, 60s check interval).

use crate::alert::AlertSink;
use chrono::{DateTime, Utc};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub struct LagMonitor {
    last_event_time: Mutex<DateTime<Utc>>,
    delay_threshold: chrono::Duration,
    mentions: Vec<String>,
    sink: Arc<dyn AlertSink>,
}

impl LagMonitor {
    pub fn new(sink: Arc<dyn AlertSink>, delay_threshold_secs: u64, mentions: Vec<String>) -> Self {
        Self {
            last_event_time: Mutex::new(Utc::now()),
            delay_threshold: chrono::Duration::seconds(delay_threshold_secs as i64),
            mentions,
            sink,
        }
    }

    pub fn record_event(&self) {
        *self.last_event_time.lock().unwrap() = Utc::now();
    }

    pub async fn check_delay(&self) {
        let delay = Utc::now() - *self.last_event_time.lock().unwrap();
        if delay > self.delay_threshold {
            let message = format!(
                "【Binlog延时告警】\n当前binlog接收延时: {}秒\n超过阈值: {}秒",
                delay.num_seconds(),
                self.delay_threshold.num_seconds(),
            );
            if let Err(e) = self.sink.send_alert(&message, &self.mentions).await {
                tracing::error!(error = %e, "failed to deliver lag alert");
            }
        }
    }
}

pub fn spawn(monitor: Arc<LagMonitor>, check_interval_secs: u64) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_secs(check_interval_secs));
        loop {
            ticker.tick().await;
            monitor.check_delay().await;
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex as StdMutex;

    struct RecordingSink {
        calls: StdMutex<Vec<String>>,
        count: AtomicUsize,
    }

    #[async_trait::async_trait]
    impl AlertSink for RecordingSink {
        async fn send_alert(&self, text: &str, _mentions: &[String]) -> anyhow::Result<()> {
            self.count.fetch_add(1, Ordering::SeqCst);
            self.calls.lock().unwrap().push(text.to_string());
            Ok(())
        }
    }

    #[tokio::test]
    async fn no_alert_within_threshold() {
        let sink = Arc::new(RecordingSink { calls: StdMutex::new(vec![]), count: AtomicUsize::new(0) });
        let monitor = LagMonitor::new(sink.clone(), 300, vec![]);
        monitor.check_delay().await;
        assert_eq!(sink.count.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn alerts_once_threshold_exceeded() {
        let sink = Arc::new(RecordingSink { calls: StdMutex::new(vec![]), count: AtomicUsize::new(0) });
        let monitor = LagMonitor::new(sink.clone(), 0, vec![]);
        tokio::time::sleep(Duration::from_millis(5)).await;
        monitor.check_delay().await;
        assert_eq!(sink.count.load(Ordering::SeqCst), 1);
    }
}
