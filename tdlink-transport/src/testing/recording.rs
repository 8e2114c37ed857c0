// ABOUTME: Recording and replay infrastructure for transcript-based testing.
// ABOUTME: Captures traffic in both directions so a session can be replayed later.

use crate::traits::{Payload, Transport};
use anyhow::{bail, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Which way a recorded payload travelled
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Outbound,
    Inbound,
}

/// A payload recorded during a session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Exchange {
    pub timestamp: std::time::SystemTime,
    pub direction: Direction,
    pub payload: Payload,
}

/// Records all traffic through an inner transport
pub struct RecordingTransport {
    inner: Arc<dyn Transport>,
    transcript: Arc<Mutex<Vec<Exchange>>>,
}

impl RecordingTransport {
    /// Wrap a transport to record all traffic
    pub fn wrap(inner: Arc<dyn Transport>) -> Self {
        Self {
            inner,
            transcript: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Get a copy of the current transcript
    pub fn transcript(&self) -> Vec<Exchange> {
        self.transcript
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Save transcript to a file
    pub async fn save_transcript(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(&self.transcript())?;
        tokio::fs::write(path, json).await?;
        Ok(())
    }

    fn record(&self, direction: Direction, payload: &Payload) {
        self.transcript
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(Exchange {
                timestamp: std::time::SystemTime::now(),
                direction,
                payload: payload.clone(),
            });
    }
}

#[async_trait]
impl Transport for RecordingTransport {
    fn name(&self) -> &'static str {
        "recording"
    }

    async fn send(&self, payload: Payload) -> Result<()> {
        self.record(Direction::Outbound, &payload);
        self.inner.send(payload).await
    }

    async fn receive(&self, timeout: Duration) -> Result<Option<Payload>> {
        let received = self.inner.receive(timeout).await?;
        if let Some(payload) = &received {
            self.record(Direction::Inbound, payload);
        }
        Ok(received)
    }

    async fn shutdown(&self) -> Result<()> {
        self.inner.shutdown().await
    }
}

/// Replays the inbound half of a recorded transcript.
///
/// Outbound payloads are accepted and collected but never validated; the
/// inbound payloads are yielded in their recorded order.
pub struct ReplayTransport {
    inbound: Mutex<VecDeque<Payload>>,
    sent: Mutex<Vec<Payload>>,
}

impl ReplayTransport {
    /// Create a replay transport from a transcript
    pub fn from_transcript(transcript: Vec<Exchange>) -> Self {
        let inbound = transcript
            .into_iter()
            .filter(|e| e.direction == Direction::Inbound)
            .map(|e| e.payload)
            .collect();
        Self {
            inbound: Mutex::new(inbound),
            sent: Mutex::new(Vec::new()),
        }
    }

    /// Load a transcript from a file
    pub async fn load(path: &Path) -> Result<Self> {
        let json = tokio::fs::read_to_string(path).await?;
        let transcript: Vec<Exchange> = serde_json::from_str(&json)?;
        Ok(Self::from_transcript(transcript))
    }

    /// Payloads sent to this transport so far
    pub fn sent(&self) -> Vec<Payload> {
        self.sent.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Number of inbound payloads not yet replayed
    pub fn remaining(&self) -> usize {
        self.inbound.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}

#[async_trait]
impl Transport for ReplayTransport {
    fn name(&self) -> &'static str {
        "replay"
    }

    async fn send(&self, payload: Payload) -> Result<()> {
        self.sent
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(payload);
        Ok(())
    }

    async fn receive(&self, _timeout: Duration) -> Result<Option<Payload>> {
        let next = self
            .inbound
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .pop_front();
        match next {
            Some(payload) => Ok(Some(payload)),
            None => bail!("Replay transcript exhausted"),
        }
    }
}
