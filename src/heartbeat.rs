//! Periodic checks with persisted last-run times ("heartbeat").
//!
//! Each [`HeartbeatCheck`] has its own interval. On every tick the
//! heartbeat runs the checks that are due, records when they ran in the
//! [`StateStore`] under [`LAST_CHECKS_KEY`], and folds their outcomes into a
//! single [`HeartbeatReport`]. A failing check is recorded as run, so it is
//! retried on its next interval rather than on the next tick.

use crate::daily_log::DailyLog;
use crate::error::{PacerError, Result};
use crate::queue::panic_message;
use crate::state::StateStore;
use futures_util::future::BoxFuture;
use std::collections::BTreeMap;
use std::future::Future;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// State key holding a `name -> epoch seconds` object of last check runs.
pub const LAST_CHECKS_KEY: &str = "heartbeat.last_checks";

const ALERT_PREFIX: &str = "ALERT ";
const FAILED_PREFIX: &str = "FAILED ";

/// Result of running one check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckOutcome {
    /// Nothing needs attention.
    Ok,
    /// Something needs attention.
    Alert(String),
    /// The check itself could not complete.
    Failed(String),
}

/// Boxed check function.
pub type CheckFn = Box<dyn Fn() -> BoxFuture<'static, CheckOutcome> + Send + Sync>;

/// A named check run at most once per `interval`.
pub struct HeartbeatCheck {
    name: String,
    interval: Duration,
    run: CheckFn,
}

impl std::fmt::Debug for HeartbeatCheck {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HeartbeatCheck")
            .field("name", &self.name)
            .field("interval", &self.interval)
            .finish_non_exhaustive()
    }
}

impl HeartbeatCheck {
    /// Create a check from an async function.
    ///
    /// # Errors
    ///
    /// Returns [`PacerError::Config`] if `interval` is not a whole number of
    /// seconds, the resolution at which last-run times are stored.
    pub fn new<F, Fut>(name: impl Into<String>, interval: Duration, check: F) -> Result<Self>
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = CheckOutcome> + Send + 'static,
    {
        let name = name.into();
        if interval.subsec_nanos() != 0 {
            return Err(PacerError::Config(format!(
                "check '{name}': interval {interval:?} is not a whole number of seconds"
            )));
        }
        Ok(Self {
            name,
            interval,
            run: Box::new(move || -> BoxFuture<'static, CheckOutcome> { Box::pin(check()) }),
        })
    }

    /// Check name, unique within a [`Heartbeat`].
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Minimum time between runs.
    #[must_use]
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// `true` if the check has never run or its interval has elapsed.
    #[must_use]
    pub fn is_due(&self, last_run: Option<u64>, now: u64) -> bool {
        match last_run {
            None => true,
            Some(last) => now.saturating_sub(last) >= self.interval.as_secs(),
        }
    }
}

/// Alert or failure raised by a named check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Alert {
    /// Check that raised it.
    pub check: String,
    /// Message from the check.
    pub message: String,
}

/// Aggregated outcome of one heartbeat tick.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeartbeatReport {
    /// Epoch seconds at which the tick ran.
    pub at: u64,
    /// Checks that ran, in registration order.
    pub ran: Vec<String>,
    /// Checks that were not due.
    pub skipped: Vec<String>,
    /// Alerts raised.
    pub alerts: Vec<Alert>,
    /// Checks that failed to complete.
    pub failures: Vec<Alert>,
}

impl HeartbeatReport {
    /// `true` when no check alerted or failed.
    #[must_use]
    pub fn is_quiet(&self) -> bool {
        self.alerts.is_empty() && self.failures.is_empty()
    }
}

impl std::fmt::Display for HeartbeatReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_quiet() {
            return write!(f, "heartbeat ok ({} checks ran)", self.ran.len());
        }
        write!(
            f,
            "{} alerts, {} failures",
            self.alerts.len(),
            self.failures.len()
        )?;
        for alert in &self.alerts {
            write!(f, "; {}: {}", alert.check, alert.message)?;
        }
        for failure in &self.failures {
            write!(f, "; {} failed: {}", failure.check, failure.message)?;
        }
        Ok(())
    }
}

/// Runs registered checks when they are due.
#[derive(Debug)]
pub struct Heartbeat {
    checks: Vec<HeartbeatCheck>,
    state: StateStore,
    log: Option<DailyLog>,
}

impl Heartbeat {
    /// Create a heartbeat with no checks that keeps run times in `state`.
    #[must_use]
    pub fn new(state: StateStore) -> Self {
        Self {
            checks: Vec::new(),
            state,
            log: None,
        }
    }

    /// Register a check (builder form of [`Heartbeat::add_check`]).
    #[must_use]
    pub fn with_check(mut self, check: HeartbeatCheck) -> Self {
        self.add_check(check);
        self
    }

    /// Append every alert and failure to `log`.
    #[must_use]
    pub fn with_daily_log(mut self, log: DailyLog) -> Self {
        self.log = Some(log);
        self
    }

    /// Add (or replace) a check by name.
    pub fn add_check(&mut self, check: HeartbeatCheck) {
        if let Some(existing) = self.checks.iter_mut().find(|c| c.name == check.name) {
            *existing = check;
        } else {
            self.checks.push(check);
        }
    }

    /// Registered check names, in registration order.
    pub fn check_names(&self) -> impl Iterator<Item = &str> {
        self.checks.iter().map(|c| c.name.as_str())
    }

    /// Backing state store.
    #[must_use]
    pub fn state(&self) -> &StateStore {
        &self.state
    }

    /// Epoch seconds of the last run of each check.
    #[must_use]
    pub fn last_checks(&self) -> BTreeMap<String, u64> {
        match self.state.get_as(LAST_CHECKS_KEY) {
            Ok(last) => last.unwrap_or_default(),
            Err(e) => {
                warn!("ignoring unreadable heartbeat state: {e}");
                BTreeMap::new()
            }
        }
    }

    /// Names of checks due at `now` (epoch seconds).
    #[must_use]
    pub fn due_checks(&self, now: u64) -> Vec<&str> {
        let last = self.last_checks();
        self.checks
            .iter()
            .filter(|c| c.is_due(last.get(&c.name).copied(), now))
            .map(|c| c.name.as_str())
            .collect()
    }

    /// Run every due check once and aggregate the results.
    pub async fn tick(&mut self) -> HeartbeatReport {
        self.tick_at(now_epoch_secs()).await
    }

    pub(crate) async fn tick_at(&mut self, now: u64) -> HeartbeatReport {
        let mut last = self.last_checks();
        let mut report = HeartbeatReport {
            at: now,
            ..Default::default()
        };

        for check in &self.checks {
            if !check.is_due(last.get(&check.name).copied(), now) {
                report.skipped.push(check.name.clone());
                continue;
            }

            debug!("running heartbeat check: {}", check.name);
            let outcome = match tokio::spawn((check.run)()).await {
                Ok(outcome) => outcome,
                Err(e) if e.is_panic() => {
                    CheckOutcome::Failed(format!("panicked: {}", panic_message(e.into_panic())))
                }
                Err(e) => CheckOutcome::Failed(e.to_string()),
            };
            last.insert(check.name.clone(), now);
            report.ran.push(check.name.clone());

            match outcome {
                CheckOutcome::Ok => {}
                CheckOutcome::Alert(message) => report.alerts.push(Alert {
                    check: check.name.clone(),
                    message,
                }),
                CheckOutcome::Failed(message) => {
                    warn!("heartbeat check {} failed: {message}", check.name);
                    report.failures.push(Alert {
                        check: check.name.clone(),
                        message,
                    });
                }
            }
        }

        if !report.ran.is_empty() {
            if let Err(e) = self.state.set(LAST_CHECKS_KEY, &last) {
                warn!("cannot persist heartbeat state: {e}");
            }
        }

        self.record_in_log(&report);
        info!(
            ran = report.ran.len(),
            skipped = report.skipped.len(),
            alerts = report.alerts.len(),
            failures = report.failures.len(),
            "heartbeat tick"
        );
        report
    }

    fn record_in_log(&self, report: &HeartbeatReport) {
        let Some(log) = &self.log else {
            return;
        };
        let lines = report
            .alerts
            .iter()
            .map(|a| format!("{ALERT_PREFIX}{}: {}", a.check, a.message))
            .chain(
                report
                    .failures
                    .iter()
                    .map(|f| format!("{FAILED_PREFIX}{}: {}", f.check, f.message)),
            );
        for line in lines {
            if let Err(e) = log.append(&line) {
                warn!("cannot write heartbeat alert to daily log: {e}");
            }
        }
    }

    /// Start the heartbeat loop on the current tokio runtime.
    ///
    /// Ticks immediately and then every `tick_interval`. Reports that carry
    /// alerts or failures are sent on `report_tx`; the loop stops once the
    /// receiver is dropped.
    pub fn run(
        mut self,
        tick_interval: Duration,
        report_tx: mpsc::UnboundedSender<HeartbeatReport>,
    ) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            info!("heartbeat started with {} checks", self.checks.len());
            let mut interval = tokio::time::interval(tick_interval);

            loop {
                interval.tick().await;
                if report_tx.is_closed() {
                    debug!("heartbeat report channel closed, stopping");
                    return;
                }

                let report = self.tick().await;
                if !report.is_quiet() && report_tx.send(report).is_err() {
                    debug!("heartbeat report channel closed, stopping");
                    return;
                }
            }
        })
    }
}

/// `true` for daily-log entries written by a heartbeat's log sink.
#[must_use]
pub fn is_heartbeat_entry(entry: &str) -> bool {
    entry.starts_with(ALERT_PREFIX) || entry.starts_with(FAILED_PREFIX)
}

/// Check that alerts when nothing but heartbeat output was logged today.
///
/// # Errors
///
/// Same as [`HeartbeatCheck::new`].
pub fn daily_log_today(log: DailyLog, interval: Duration) -> Result<HeartbeatCheck> {
    HeartbeatCheck::new("daily_log_today", interval, move || {
        let log = log.clone();
        async move {
            let today = chrono::Local::now().date_naive();
            match log.entries(today) {
                Ok(entries) if entries.iter().any(|e| !is_heartbeat_entry(e)) => CheckOutcome::Ok,
                Ok(_) => CheckOutcome::Alert("nothing logged today".to_owned()),
                Err(e) => CheckOutcome::Failed(e.to_string()),
            }
        }
    })
}

/// Current time as Unix epoch seconds.
#[must_use]
pub fn now_epoch_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
