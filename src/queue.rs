//! Bounded-concurrency FIFO task queue.
//!
//! [`TaskQueue::add`] accepts any `Send + 'static` future and returns a
//! [`TaskHandle`] that resolves with the future's output. At most
//! `concurrency` items run at once and items start in arrival order. Each
//! slot can pause for `inter_delay` after an item completes before it frees
//! up for the next one.
//!
//! Every item runs in its own tokio task, so a panic settles only that
//! item's handle. Domain failures belong in the item's own output type.

use crate::error::{PacerError, Result};
use futures_util::future::BoxFuture;
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::sync::{Notify, oneshot};
use tracing::{debug, trace};

/// Construction-time settings for a [`TaskQueue`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    /// Maximum number of items executing at once.
    pub concurrency: usize,
    /// Pause after each completion before the slot takes the next item.
    pub inter_delay_ms: Option<u64>,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            concurrency: 1,
            inter_delay_ms: None,
        }
    }
}

impl QueueConfig {
    /// Validates this configuration.
    pub fn validate(&self) -> Result<()> {
        if self.concurrency == 0 {
            return Err(PacerError::Config(
                "concurrency must be greater than 0".into(),
            ));
        }
        Ok(())
    }
}

/// Failure of a queued item that did not produce an output.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TaskError {
    /// The work panicked; carries the panic message when it was a string.
    #[error("task panicked: {0}")]
    Panicked(String),
    /// The work was dropped before completing (runtime shutdown).
    #[error("task cancelled before completion")]
    Cancelled,
}

/// Outcome handle for one queued item.
///
/// Dropping the handle does not cancel the item.
#[derive(Debug)]
#[must_use = "the handle is the only way to observe the task's outcome"]
pub struct TaskHandle<T> {
    rx: oneshot::Receiver<std::result::Result<T, TaskError>>,
}

impl<T> Future for TaskHandle<T> {
    type Output = std::result::Result<T, TaskError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx)
            .poll(cx)
            .map(|received| received.unwrap_or(Err(TaskError::Cancelled)))
    }
}

type Job = BoxFuture<'static, ()>;

struct QueueState {
    pending: VecDeque<Job>,
    in_flight: usize,
}

struct Shared {
    concurrency: usize,
    inter_delay: Option<Duration>,
    state: Mutex<QueueState>,
    idle: Notify,
}

/// Concurrency-limited FIFO work queue.
///
/// Cloning yields another handle to the same queue.
#[derive(Clone)]
pub struct TaskQueue {
    shared: Arc<Shared>,
}

impl std::fmt::Debug for TaskQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskQueue")
            .field("concurrency", &self.shared.concurrency)
            .field("inter_delay", &self.shared.inter_delay)
            .field("pending", &self.size())
            .field("in_flight", &self.in_flight())
            .finish()
    }
}

impl TaskQueue {
    /// Create an empty queue.
    ///
    /// # Errors
    ///
    /// Returns [`PacerError::Config`] if `concurrency` is zero.
    pub fn new(config: &QueueConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            shared: Arc::new(Shared {
                concurrency: config.concurrency,
                inter_delay: config.inter_delay_ms.map(Duration::from_millis),
                state: Mutex::new(QueueState {
                    pending: VecDeque::new(),
                    in_flight: 0,
                }),
                idle: Notify::new(),
            }),
        })
    }

    /// Queue `work` and return a handle to its outcome.
    ///
    /// Never waits. If a slot is free the work starts right away.
    /// Must be called from within a tokio runtime.
    pub fn add<F, T>(&self, work: F) -> TaskHandle<T>
    where
        F: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        let job: Job = Box::pin(async move {
            let outcome = match tokio::spawn(work).await {
                Ok(output) => Ok(output),
                Err(e) if e.is_panic() => Err(TaskError::Panicked(panic_message(e.into_panic()))),
                Err(_) => Err(TaskError::Cancelled),
            };
            // The caller may have dropped its handle.
            let _ = tx.send(outcome);
        });

        {
            let mut state = self.shared.lock();
            state.pending.push_back(job);
            trace!(pending = state.pending.len(), "task queued");
        }
        self.shared.schedule();

        TaskHandle { rx }
    }

    /// Number of queued items that have not started.
    #[must_use]
    pub fn size(&self) -> usize {
        self.shared.lock().pending.len()
    }

    /// Number of items currently executing (including their inter-item delay).
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.shared.lock().in_flight
    }

    /// `true` when nothing is pending or executing.
    #[must_use]
    pub fn is_idle(&self) -> bool {
        self.shared.is_idle()
    }

    /// Maximum number of items executing at once.
    #[must_use]
    pub fn concurrency(&self) -> usize {
        self.shared.concurrency
    }

    /// Wait until the queue is idle.
    ///
    /// Items added while waiting are waited for as well.
    pub async fn drain(&self) {
        loop {
            let notified = self.shared.idle.notified();
            tokio::pin!(notified);
            // Register before checking so a completion in between is not lost.
            notified.as_mut().enable();
            if self.shared.is_idle() {
                return;
            }
            notified.await;
        }
    }
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn is_idle(&self) -> bool {
        let state = self.lock();
        state.pending.is_empty() && state.in_flight == 0
    }

    /// Start pending items while slots are free.
    fn schedule(self: &Arc<Self>) {
        let mut state = self.lock();
        while state.in_flight < self.concurrency {
            let Some(job) = state.pending.pop_front() else {
                break;
            };
            state.in_flight += 1;
            debug!(
                in_flight = state.in_flight,
                pending = state.pending.len(),
                "starting queued task"
            );
            let shared = Arc::clone(self);
            tokio::spawn(shared.run_slot(job));
        }
    }

    async fn run_slot(self: Arc<Self>, job: Job) {
        job.await;

        if let Some(delay) = self.inter_delay {
            tokio::time::sleep(delay).await;
        }

        self.lock().in_flight -= 1;
        self.schedule();

        if self.is_idle() {
            trace!("task queue idle");
            self.idle.notify_waiters();
        }
    }
}

pub(crate) fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_owned()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_owned()
    }
}
