// ABOUTME: Mock transport for testing - replays scripted inbound payloads.
// ABOUTME: Records every outbound payload and can answer commands by their @type.
//!
//! # Example
//!
//! ```no_run
//! use tdlink_transport::backends::mock::MockTransport;
//! use tdlink_transport::Transport;
//! use serde_json::json;
//! use std::time::Duration;
//!
//! # async fn example() {
//! let mock = MockTransport::new()
//!     .on_send("getAuthorizationState")
//!     .respond_with(vec![json!({
//!         "@type": "updateAuthorizationState",
//!         "authorization_state": {"@type": "authorizationStateWaitTdlibParameters"}
//!     })]);
//! let control = mock.control();
//!
//! mock.send(json!({"@type": "getAuthorizationState"})).await.unwrap();
//! let reply = mock.receive(Duration::from_millis(10)).await.unwrap();
//! assert!(reply.is_some());
//! assert_eq!(control.sent_types(), vec!["getAuthorizationState"]);
//! # }
//! ```

use crate::traits::{Payload, Transport};
use anyhow::{bail, Result};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

/// Mock transport for testing
pub struct MockTransport {
    inbound_tx: mpsc::UnboundedSender<Payload>,
    inbound_rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<Payload>>,
    expectations: Arc<Mutex<VecDeque<Expectation>>>,
    sent: Arc<Mutex<Vec<Payload>>>,
    closed: Arc<AtomicBool>,
}

struct Expectation {
    type_name: String,
    responses: Vec<Payload>,
}

/// Test-side view of a [`MockTransport`] that stays usable after the
/// transport itself has been moved into a client.
#[derive(Clone)]
pub struct MockControl {
    inbound_tx: mpsc::UnboundedSender<Payload>,
    sent: Arc<Mutex<Vec<Payload>>>,
    closed: Arc<AtomicBool>,
}

impl MockTransport {
    /// Create a new mock transport with nothing queued
    pub fn new() -> Self {
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        Self {
            inbound_tx,
            inbound_rx: tokio::sync::Mutex::new(inbound_rx),
            expectations: Arc::new(Mutex::new(VecDeque::new())),
            sent: Arc::new(Mutex::new(Vec::new())),
            closed: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Queue an inbound payload that `receive` will yield in order
    pub fn with_inbound(self, payload: Payload) -> Self {
        let _ = self.inbound_tx.send(payload);
        self
    }

    /// Set up a scripted reply for the next outbound payload with this `@type`
    pub fn on_send(self, type_name: &str) -> ExpectationBuilder {
        ExpectationBuilder {
            transport: self,
            type_name: type_name.to_string(),
        }
    }

    /// Get a control handle for pushing inbound payloads and inspecting sends
    pub fn control(&self) -> MockControl {
        MockControl {
            inbound_tx: self.inbound_tx.clone(),
            sent: Arc::clone(&self.sent),
            closed: Arc::clone(&self.closed),
        }
    }

    /// Factory function for the registry
    pub fn factory() -> crate::registry::TransportFactory {
        Box::new(|_config| Ok(Arc::new(MockTransport::new())))
    }

    fn take_responses(&self, type_name: &str) -> Option<Vec<Payload>> {
        let mut exp = self
            .expectations
            .lock()
            .unwrap_or_else(|e| e.into_inner());
        // Prefer the front of the queue so scripted flows stay ordered
        if exp.front().map(|e| e.type_name == type_name).unwrap_or(false) {
            return exp.pop_front().map(|e| e.responses);
        }
        exp.iter()
            .position(|e| e.type_name == type_name)
            .and_then(|i| exp.remove(i))
            .map(|e| e.responses)
    }
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for a scripted reply
pub struct ExpectationBuilder {
    transport: MockTransport,
    type_name: String,
}

impl ExpectationBuilder {
    /// Enqueue these payloads as inbound once a matching send happens
    pub fn respond_with(self, responses: Vec<Payload>) -> MockTransport {
        self.transport
            .expectations
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push_back(Expectation {
                type_name: self.type_name,
                responses,
            });
        self.transport
    }

    /// Reply with a bare `{"@type": "ok"}`
    pub fn respond_ok(self) -> MockTransport {
        self.respond_with(vec![serde_json::json!({"@type": "ok"})])
    }
}

#[async_trait]
impl Transport for MockTransport {
    fn name(&self) -> &'static str {
        "mock"
    }

    async fn send(&self, payload: Payload) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            bail!("Mock transport closed");
        }
        let type_name = payload
            .get("@type")
            .and_then(|t| t.as_str())
            .unwrap_or_default()
            .to_string();
        self.sent
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(payload);

        if let Some(responses) = self.take_responses(&type_name) {
            for response in responses {
                let _ = self.inbound_tx.send(response);
            }
        }
        Ok(())
    }

    async fn receive(&self, timeout: Duration) -> Result<Option<Payload>> {
        if self.closed.load(Ordering::SeqCst) {
            bail!("Mock transport closed");
        }
        let mut rx = self.inbound_rx.lock().await;
        match tokio::time::timeout(timeout, rx.recv()).await {
            Ok(Some(payload)) => Ok(Some(payload)),
            Ok(None) => bail!("Mock transport closed"),
            Err(_) => Ok(None),
        }
    }

    async fn shutdown(&self) -> Result<()> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

impl MockControl {
    /// Push an inbound payload as if the backend had produced it
    pub fn push(&self, payload: Payload) {
        let _ = self.inbound_tx.send(payload);
    }

    /// All payloads sent so far, in order
    pub fn sent(&self) -> Vec<Payload> {
        self.sent.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// The `@type` of every payload sent so far, in order
    pub fn sent_types(&self) -> Vec<String> {
        self.sent()
            .iter()
            .map(|p| {
                p.get("@type")
                    .and_then(|t| t.as_str())
                    .unwrap_or_default()
                    .to_string()
            })
            .collect()
    }

    /// Whether `shutdown` has been called on the transport
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}
