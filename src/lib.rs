//! Pacer: scheduling primitives for agents that act on a schedule.
//!
//! # Components
//!
//! - **Rate limiting** ([`rate_limit`]): discrete token bucket with an
//!   optional minimum spacing between admissions.
//! - **Task queue** ([`queue`]): runs at most N futures at once, in arrival
//!   order, with an optional pause between completions.
//! - **State** ([`state`]): JSON key-value store with defaults and atomic
//!   replace on write.
//! - **Heartbeat** ([`heartbeat`]): periodic checks whose last-run times live
//!   in the state store, aggregated into one report per tick.
//! - **Daily logs** ([`daily_log`]): append-only markdown files named by date.
//!
//! The limiter and the queue do not know about each other. Compose them by
//! awaiting [`RateLimiter::acquire`] inside queued work:
//!
//! ```no_run
//! # async fn example() -> pacer::Result<()> {
//! use std::sync::Arc;
//!
//! let limiter = Arc::new(pacer::RateLimiter::new(&pacer::RateLimitConfig {
//!     capacity: 5,
//!     refill_interval_ms: 60_000,
//!     min_spacing_ms: Some(1_000),
//! })?);
//! let queue = pacer::TaskQueue::new(&pacer::QueueConfig {
//!     concurrency: 2,
//!     inter_delay_ms: None,
//! })?;
//!
//! let handle = queue.add({
//!     let limiter = Arc::clone(&limiter);
//!     async move {
//!         limiter.acquire().await;
//!         "sent"
//!     }
//! });
//! assert_eq!(handle.await, Ok("sent"));
//! queue.drain().await;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod daily_log;
pub mod error;
pub mod heartbeat;
pub mod paths;
pub mod queue;
pub mod rate_limit;
pub mod state;

pub use config::PacerConfig;
pub use daily_log::DailyLog;
pub use error::{PacerError, Result};
pub use heartbeat::{Alert, CheckOutcome, Heartbeat, HeartbeatCheck, HeartbeatReport};
pub use queue::{QueueConfig, TaskError, TaskHandle, TaskQueue};
pub use rate_limit::{RateLimitConfig, RateLimiter, RateLimiters};
pub use state::StateStore;
