//! Integration test binary -- all integration tests consolidated into a single
//! binary to reduce link time.

// Allow unwrap/expect in test code
#![allow(clippy::unwrap_used, clippy::expect_used)]

mod heartbeat_flow;
mod limited_queue;
