// ABOUTME: Process transport - spawns a bridge binary that owns the native client library.
// ABOUTME: Speaks newline-delimited JSON over the child's stdin and stdout.

use crate::traits::{Payload, Transport};
use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout, Command as ProcessCommand};
use tokio::sync::{mpsc, Mutex};

/// Capacity of the inbound line buffer between the reader task and `receive`
const INBOUND_BUFFER: usize = 1024;

/// Configuration for the process transport
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessConfig {
    /// Path to the bridge binary
    pub binary: String,
    /// Extra command-line arguments
    #[serde(default)]
    pub args: Vec<String>,
    /// Extra environment variables
    #[serde(default)]
    pub env: HashMap<String, String>,
    /// Working directory for the bridge
    #[serde(default)]
    pub working_dir: Option<PathBuf>,
}

pub struct ProcessTransport {
    stdin: Mutex<ChildStdin>,
    inbound: Mutex<mpsc::Receiver<Payload>>,
    child: Mutex<Child>,
}

impl ProcessTransport {
    /// Spawn the bridge and start reading its stdout.
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn(config: &ProcessConfig) -> Result<Self> {
        let mut cmd = ProcessCommand::new(&config.binary);
        cmd.args(&config.args)
            .envs(&config.env)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true);
        if let Some(dir) = &config.working_dir {
            cmd.current_dir(dir);
        }

        let mut child = cmd
            .spawn()
            .with_context(|| format!("Failed to spawn bridge binary '{}'", config.binary))?;
        let stdin = child.stdin.take().context("Bridge stdin not captured")?;
        let stdout = child.stdout.take().context("Bridge stdout not captured")?;

        let (tx, rx) = mpsc::channel(INBOUND_BUFFER);
        tokio::spawn(read_lines(stdout, tx));

        tracing::info!(binary = %config.binary, args = ?config.args, "Bridge process started");

        Ok(Self {
            stdin: Mutex::new(stdin),
            inbound: Mutex::new(rx),
            child: Mutex::new(child),
        })
    }

    /// Factory function for the registry
    pub fn factory() -> crate::registry::TransportFactory {
        Box::new(|config| {
            let cfg: ProcessConfig = serde_json::from_value(config.clone())
                .context("Invalid process transport config")?;
            Ok(Arc::new(ProcessTransport::spawn(&cfg)?))
        })
    }
}

/// Forward each JSON line from the bridge into the inbound channel.
async fn read_lines(stdout: ChildStdout, tx: mpsc::Sender<Payload>) {
    let mut lines = BufReader::new(stdout).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                match serde_json::from_str::<Payload>(line) {
                    Ok(payload) => {
                        if tx.send(payload).await.is_err() {
                            tracing::debug!("Inbound receiver dropped, stopping bridge reader");
                            break;
                        }
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, line_len = line.len(), "Skipping malformed bridge line");
                    }
                }
            }
            Ok(None) => {
                tracing::info!("Bridge stdout closed");
                break;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed reading bridge stdout");
                break;
            }
        }
    }
}

#[async_trait]
impl Transport for ProcessTransport {
    fn name(&self) -> &'static str {
        "process"
    }

    async fn send(&self, payload: Payload) -> Result<()> {
        let mut line = serde_json::to_string(&payload).context("Failed to encode payload")?;
        line.push('\n');

        let mut stdin = self.stdin.lock().await;
        stdin
            .write_all(line.as_bytes())
            .await
            .context("Failed to write to bridge stdin")?;
        stdin.flush().await.context("Failed to flush bridge stdin")?;
        Ok(())
    }

    async fn receive(&self, timeout: Duration) -> Result<Option<Payload>> {
        let mut rx = self.inbound.lock().await;
        match tokio::time::timeout(timeout, rx.recv()).await {
            Ok(Some(payload)) => Ok(Some(payload)),
            Ok(None) => bail!("Bridge process exited"),
            Err(_) => Ok(None),
        }
    }

    async fn shutdown(&self) -> Result<()> {
        let mut child = self.child.lock().await;
        if child.try_wait()?.is_none() {
            child.kill().await.context("Failed to stop bridge process")?;
        }
        tracing::info!("Bridge process stopped");
        Ok(())
    }
}
