// ABOUTME: The consumer loop that pulls payloads from a transport and routes them.
// ABOUTME: Authorization updates reach the auth machine first, then every event is dispatched.

use crate::auth::{AuthorizationMachine, AuthorizationState, PromptHandler};
use crate::command::{Command, TdlibParameters};
use crate::dispatcher::{DispatchOutcome, Dispatcher};
use crate::error::{ProtocolViolation, RegistryMisuse};
use crate::event::{decode, Event, EventKind};
use crate::registry::{SubscriptionHandle, SubscriptionRegistry};
use crate::report::{ErrorReporter, TracingReporter};
use crate::value::FieldValue;
use anyhow::{bail, Context, Result};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tdlink_transport::{Payload, Transport};
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;

pub const DEFAULT_POLL_TIMEOUT: Duration = Duration::from_secs(1);
pub const DEFAULT_CHAT_LOAD_LIMIT: i32 = 100;

/// Something queued for the transport by code that cannot await
#[derive(Debug)]
enum Outbound {
    Command(Command),
    Raw(Value),
}

/// Clonable handle for queueing commands from synchronous callbacks.
///
/// Commands are sent by the client loop in the order they were queued.
#[derive(Clone)]
pub struct CommandSender {
    tx: mpsc::UnboundedSender<Outbound>,
}

impl CommandSender {
    pub fn send(&self, command: Command) -> Result<()> {
        self.tx
            .send(Outbound::Command(command))
            .map_err(|_| anyhow::anyhow!("Client loop has stopped"))
    }

    /// Queue an arbitrary JSON command; it must carry a string `@type`
    pub fn send_raw(&self, payload: Value) -> Result<()> {
        check_raw(&payload)?;
        self.tx
            .send(Outbound::Raw(payload))
            .map_err(|_| anyhow::anyhow!("Client loop has stopped"))
    }
}

pub struct ClientBuilder {
    transport: Arc<dyn Transport>,
    reporter: Option<Arc<dyn ErrorReporter>>,
    prompt: Option<Arc<dyn PromptHandler>>,
    parameters: TdlibParameters,
    poll_timeout: Duration,
    verbosity: Option<i32>,
    chat_load_limit: i32,
}

impl ClientBuilder {
    pub fn reporter(mut self, reporter: Arc<dyn ErrorReporter>) -> Self {
        self.reporter = Some(reporter);
        self
    }

    pub fn prompt_handler(mut self, prompt: Arc<dyn PromptHandler>) -> Self {
        self.prompt = Some(prompt);
        self
    }

    pub fn parameters(mut self, parameters: TdlibParameters) -> Self {
        self.parameters = parameters;
        self
    }

    /// How long a single transport receive may wait before the loop checks
    /// its queue and shutdown token again
    pub fn poll_timeout(mut self, timeout: Duration) -> Self {
        self.poll_timeout = timeout;
        self
    }

    /// Backend log verbosity sent before the handshake starts
    pub fn verbosity(mut self, level: i32) -> Self {
        self.verbosity = Some(level);
        self
    }

    pub fn chat_load_limit(mut self, limit: i32) -> Self {
        self.chat_load_limit = limit;
        self
    }

    pub fn build(self) -> Client {
        let reporter = self
            .reporter
            .unwrap_or_else(|| Arc::new(TracingReporter) as Arc<dyn ErrorReporter>);
        let registry = Arc::new(SubscriptionRegistry::new());
        let auth = AuthorizationMachine::new(self.parameters, self.chat_load_limit);
        if let Some(prompt) = self.prompt {
            auth.set_prompt_handler(prompt);
        }
        let (tx, rx) = mpsc::unbounded_channel();
        Client {
            transport: self.transport,
            dispatcher: Dispatcher::new(Arc::clone(&registry), Arc::clone(&reporter)),
            registry,
            auth,
            reporter,
            outbound_tx: tx,
            outbound_rx: Mutex::new(rx),
            poll_timeout: self.poll_timeout,
            verbosity: self.verbosity,
        }
    }
}

/// Owns the transport, the subscription registry, and the authorization
/// machine. Share it behind an `Arc` so prompt handlers and other tasks can
/// subscribe and submit credentials while `run` is looping.
pub struct Client {
    transport: Arc<dyn Transport>,
    registry: Arc<SubscriptionRegistry>,
    dispatcher: Dispatcher,
    auth: AuthorizationMachine,
    reporter: Arc<dyn ErrorReporter>,
    outbound_tx: mpsc::UnboundedSender<Outbound>,
    outbound_rx: Mutex<mpsc::UnboundedReceiver<Outbound>>,
    poll_timeout: Duration,
    verbosity: Option<i32>,
}

impl Client {
    pub fn builder(transport: Arc<dyn Transport>) -> ClientBuilder {
        ClientBuilder {
            transport,
            reporter: None,
            prompt: None,
            parameters: TdlibParameters::default(),
            poll_timeout: DEFAULT_POLL_TIMEOUT,
            verbosity: None,
            chat_load_limit: DEFAULT_CHAT_LOAD_LIMIT,
        }
    }

    pub fn registry(&self) -> &Arc<SubscriptionRegistry> {
        &self.registry
    }

    /// Last state reported by the backend.
    ///
    /// After a protocol violation this keeps the state the handshake stalled
    /// in; check [`authorization_failure`](Self::authorization_failure) to
    /// tell a stalled login from a waiting one.
    pub fn authorization_state(&self) -> AuthorizationState {
        self.auth.state()
    }

    /// The violation that stopped the handshake, if any. Once set, login
    /// cannot progress for the rest of this session.
    pub fn authorization_failure(&self) -> Option<ProtocolViolation> {
        self.auth.failure()
    }

    pub fn is_authorized(&self) -> bool {
        self.auth.is_authorized()
    }

    pub fn set_prompt_handler(&self, prompt: Arc<dyn PromptHandler>) {
        self.auth.set_prompt_handler(prompt);
    }

    pub fn command_sender(&self) -> CommandSender {
        CommandSender {
            tx: self.outbound_tx.clone(),
        }
    }

    pub fn subscribe_all<F>(&self, kind: EventKind, callback: F) -> SubscriptionHandle
    where
        F: Fn(&Event) -> Result<()> + Send + Sync + 'static,
    {
        self.registry.subscribe_all(kind, callback)
    }

    pub fn subscribe_keyed<F, I, K, V>(
        &self,
        kind: EventKind,
        callback: F,
        filter: I,
    ) -> Result<SubscriptionHandle, RegistryMisuse>
    where
        F: Fn(&Event) -> Result<()> + Send + Sync + 'static,
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<FieldValue>,
    {
        self.registry.subscribe_keyed(kind, callback, filter)
    }

    pub fn subscribe_global<F>(&self, callback: F) -> SubscriptionHandle
    where
        F: Fn(&Event) -> Result<()> + Send + Sync + 'static,
    {
        self.registry.subscribe_global(callback)
    }

    /// Run the consumer loop until `shutdown` is cancelled, the handshake
    /// reaches `Closed`, or the transport fails.
    ///
    /// Only one loop may run per client.
    pub async fn run(&self, shutdown: CancellationToken) -> Result<()> {
        let mut outbound = self
            .outbound_rx
            .try_lock()
            .context("Client loop is already running")?;

        tracing::info!(transport = self.transport.name(), "Client loop starting");
        self.start().await?;

        loop {
            if self.auth.state().is_terminal() {
                tracing::info!("Authorization closed, stopping client loop");
                break;
            }

            tokio::select! {
                biased;

                _ = shutdown.cancelled() => {
                    tracing::info!("Shutdown requested, stopping client loop");
                    break;
                }
                Some(queued) = outbound.recv() => {
                    self.send_outbound(queued).await?;
                }
                received = self.transport.receive(self.poll_timeout) => {
                    if let Some(payload) = received.context("Transport receive failed")? {
                        self.handle_payload(payload).await?;
                    }
                }
            }
        }

        if let Err(e) = self.transport.shutdown().await {
            tracing::warn!(error = %e, "Transport shutdown failed");
        }
        tracing::info!("Client loop stopped");
        Ok(())
    }

    /// Announce verbosity if configured, then ask for the current
    /// authorization state
    pub async fn start(&self) -> Result<()> {
        if let Some(level) = self.verbosity {
            self.send(Command::SetLogVerbosityLevel {
                new_verbosity_level: level,
            })
            .await?;
        }
        self.send(Command::GetAuthorizationState).await
    }

    /// Decode one raw payload, feed the authorization machine, and dispatch.
    ///
    /// Decode failures and protocol violations are recovered here. Only a
    /// transport failure while sending a follow-up command is returned, and
    /// only after the event has been dispatched.
    pub async fn handle_payload(&self, raw: Payload) -> Result<Option<DispatchOutcome>> {
        crate::metrics::record_payload_received();
        let event = match decode(raw) {
            Ok(event) => event,
            Err(e) => {
                tracing::warn!(error = %e, "Dropping undecodable payload");
                crate::metrics::record_decode_failure();
                return Ok(None);
            }
        };

        let follow_up = match self.auth.observe(&event) {
            Ok(commands) => commands,
            Err(violation) => {
                self.reporter.report(&violation, "authorization");
                Vec::new()
            }
        };
        let mut sent = Ok(());
        for command in follow_up {
            if let Err(e) = self.send(command).await {
                sent = Err(e);
                break;
            }
        }

        let outcome = self.dispatcher.dispatch(&event);
        sent?;
        Ok(Some(outcome))
    }

    pub async fn send(&self, command: Command) -> Result<()> {
        let type_name = command.type_name();
        let payload = command.to_payload()?;
        self.transport
            .send(payload)
            .await
            .with_context(|| format!("Failed to send {}", type_name))?;
        tracing::debug!(command = type_name, "Command sent");
        crate::metrics::record_command_sent(type_name);
        Ok(())
    }

    /// Send a JSON command that has no typed variant
    pub async fn send_raw(&self, payload: Value) -> Result<()> {
        check_raw(&payload)?;
        self.transport
            .send(payload)
            .await
            .context("Failed to send raw command")?;
        crate::metrics::record_command_sent("raw");
        Ok(())
    }

    /// Answer the prompt for the current authorization state.
    ///
    /// Returns `Ok(false)` when the current state takes no credentials.
    pub async fn submit_credentials(&self, primary: &str, secondary: &str) -> Result<bool> {
        match self.auth.submit_credentials(primary, secondary) {
            Ok(Some(command)) => {
                self.send(command).await?;
                Ok(true)
            }
            Ok(None) => Ok(false),
            Err(violation) => {
                self.reporter.report(&violation, "credentials");
                Err(violation.into())
            }
        }
    }

    async fn send_outbound(&self, queued: Outbound) -> Result<()> {
        match queued {
            Outbound::Command(command) => self.send(command).await,
            Outbound::Raw(payload) => self.send_raw(payload).await,
        }
    }
}

fn check_raw(payload: &Value) -> Result<()> {
    match payload.get("@type") {
        Some(Value::String(_)) => Ok(()),
        _ => bail!("Raw command needs a string @type"),
    }
}
