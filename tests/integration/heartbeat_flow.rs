//! Heartbeat, state store and daily log working together through the public API.

use pacer::heartbeat::LAST_CHECKS_KEY;
use pacer::{CheckOutcome, DailyLog, Heartbeat, HeartbeatCheck, PacerConfig, StateStore};
use serde_json::{Map, json};
use std::collections::BTreeMap;
use std::time::Duration;

#[tokio::test]
async fn tick_persists_runs_and_logs_alerts() {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut config = PacerConfig::default();
    config.heartbeat.state_file = Some(dir.path().join("state").join("state.json"));
    config.logs.dir = Some(dir.path().join("logs"));

    let mut defaults = Map::new();
    defaults.insert("owner".to_owned(), json!("agent"));
    let state = StateStore::open(config.heartbeat.state_file(), defaults).expect("state");
    let log = DailyLog::new(config.logs.dir());

    let mut heartbeat = Heartbeat::new(state)
        .with_daily_log(log.clone())
        .with_check(HeartbeatCheck::new(
            "quiet",
            Duration::from_secs(600),
            || async { CheckOutcome::Ok },
        )
        .expect("quiet check"))
        .with_check(HeartbeatCheck::new(
            "inbox",
            Duration::from_secs(600),
            || async { CheckOutcome::Alert("2 messages waiting".to_owned()) },
        )
        .expect("inbox check"));

    let report = heartbeat.tick().await;
    assert_eq!(report.ran, vec!["quiet", "inbox"]);
    assert_eq!(report.alerts.len(), 1);

    let second = heartbeat.tick().await;
    assert!(second.ran.is_empty());
    assert!(second.is_quiet());

    let reopened = StateStore::open(config.heartbeat.state_file(), Map::new()).expect("reopen");
    let last: BTreeMap<String, u64> = reopened
        .get_as(LAST_CHECKS_KEY)
        .expect("readable")
        .expect("present");
    assert_eq!(last.len(), 2);
    assert_eq!(reopened.get("owner"), Some(&json!("agent")));

    let logs = log.recent(1).expect("logs");
    assert_eq!(logs.len(), 1);
    assert!(logs[0].1.contains("ALERT inbox: 2 messages waiting"));
    assert!(!logs[0].1.contains("quiet"));
}

#[test]
fn config_file_drives_component_settings() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("config.toml");
    std::fs::write(
        &path,
        r#"
        [limits.slack]
        capacity = 1
        refill_interval_ms = 1000

        [queue]
        concurrency = 2
        "#,
    )
    .expect("write config");

    let config = PacerConfig::from_file(&path).expect("load");
    config.validate().expect("valid");

    let limiters = pacer::RateLimiters::new(&config.limits).expect("limiters");
    assert!(limiters.try_acquire("slack"));
    assert!(!limiters.try_acquire("slack"));
    assert!(limiters.try_acquire("unconfigured"));
    assert_eq!(config.queue.concurrency, 2);
}
