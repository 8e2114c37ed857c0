// ABOUTME: Core Transport trait that every backend connection implements.
// ABOUTME: Payloads are opaque JSON objects; typing happens in tdlink-core.

use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;

/// A single raw message exchanged with the backend.
///
/// Transports never look inside it beyond what their framing needs.
pub type Payload = Value;

/// Bidirectional connection to the messaging backend.
///
/// A transport is shared between the consumer loop (which calls `receive`)
/// and any task that sends commands, so implementations must be `Send + Sync`
/// and must tolerate `send` running while a `receive` is pending.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Backend name (e.g., "mock", "process")
    fn name(&self) -> &'static str;

    /// Send one outbound payload
    async fn send(&self, payload: Payload) -> Result<()>;

    /// Wait up to `timeout` for the next inbound payload.
    ///
    /// Returns `Ok(None)` when nothing arrived in time. This future must be
    /// cancel-safe: dropping it before it completes must not lose a payload.
    async fn receive(&self, timeout: Duration) -> Result<Option<Payload>>;

    /// Release the underlying connection
    async fn shutdown(&self) -> Result<()> {
        Ok(())
    }
}
