//! Shared fixtures for the integration tests: an echo server on a random
//! port and a thin awaitable wrapper around the event-driven client.

#![allow(dead_code)]

mod client;
mod server;

pub use client::TestClient;
pub use server::TestServer;

use std::time::Duration;

/// Upper bound for any single wait in the integration tests.
pub const WAIT: Duration = Duration::from_secs(5);

/// Poll `check` until it holds or [`WAIT`] elapses.
pub async fn eventually(mut check: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + WAIT;
    while tokio::time::Instant::now() < deadline {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    check()
}
