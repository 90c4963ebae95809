//! Heartbeat daemon.
//!
//! Loads the pacer config (`PACER_CONFIG` or the platform default path),
//! opens the state store and daily log, and runs the heartbeat loop until
//! Ctrl-C. Alerts are logged through `tracing` on stderr and appended to the
//! daily log.

use pacer::heartbeat::{self, Heartbeat};
use pacer::{DailyLog, PacerConfig, StateStore};
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::mpsc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("pacer=info")),
        )
        .init();

    let config_path = std::env::var_os("PACER_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(PacerConfig::default_config_path);
    let config = if config_path.exists() {
        PacerConfig::from_file(&config_path)?
    } else {
        tracing::info!("no config at {}, using defaults", config_path.display());
        PacerConfig::default()
    };
    config.validate()?;

    let state = StateStore::open(config.heartbeat.state_file(), serde_json::Map::new())?;
    let log = DailyLog::new(config.logs.dir());

    let heartbeat = Heartbeat::new(state)
        .with_daily_log(log.clone())
        .with_check(heartbeat::daily_log_today(log, Duration::from_secs(3600))?);

    let (report_tx, mut report_rx) = mpsc::unbounded_channel();
    let handle = heartbeat.run(Duration::from_secs(config.heartbeat.tick_secs), report_tx);
    tracing::info!("pacer-heartbeat started");

    loop {
        tokio::select! {
            Some(report) = report_rx.recv() => {
                tracing::warn!("{report}");
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("pacer-heartbeat shutting down");
                break;
            }
        }
    }

    handle.abort();
    Ok(())
}
