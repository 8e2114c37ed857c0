// ABOUTME: Console authentication: prompts on the terminal whenever login needs input
// ABOUTME: Answers are submitted back to the client and asked again when they are refused

use anyhow::{Context, Result};
use std::sync::Arc;
use tdlink_core::{
    AuthorizationState, Client, Event, EventKind, PromptHandler, ProtocolViolation,
    SubscriptionHandle,
};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, Lines};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Work handed to the console task
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PromptRequest {
    /// Login is waiting for input in this state
    Input(AuthorizationState),
    /// The backend refused a request, with its error message
    Rejected(String),
}

/// Forwards prompt requests from the client loop to the console task
pub struct ConsolePrompt {
    tx: mpsc::UnboundedSender<PromptRequest>,
}

impl ConsolePrompt {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<PromptRequest>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Forward backend `error` replies so a refused answer can be asked again.
    ///
    /// The backend keeps its state after a wrong code or password, so no new
    /// prompt would otherwise arrive.
    pub fn watch_rejections(&self, client: &Client) -> SubscriptionHandle {
        let tx = self.tx.clone();
        client.subscribe_all(EventKind::Error, move |event: &Event| {
            let message = event
                .field("message")
                .and_then(|v| v.as_str().map(str::to_string))
                .unwrap_or_else(|| "request failed".to_string());
            let _ = tx.send(PromptRequest::Rejected(message));
            Ok(())
        })
    }
}

impl PromptHandler for ConsolePrompt {
    fn on_input_required(&self, state: AuthorizationState) {
        if self.tx.send(PromptRequest::Input(state)).is_err() {
            tracing::warn!(state = %state, "Console prompt is gone, input request dropped");
        }
    }

    fn on_authorization_failed(&self, violation: &ProtocolViolation) {
        tracing::error!(error = %violation, "Login failed, restart to try again");
    }
}

/// What to ask for in a given state: primary label and optional secondary label
fn questions(state: AuthorizationState) -> Option<(&'static str, Option<&'static str>)> {
    match state {
        AuthorizationState::WaitPhoneNumber => Some(("Phone number", None)),
        AuthorizationState::WaitCode => Some(("Login code", None)),
        AuthorizationState::WaitEmailAddress => Some(("Email address", None)),
        AuthorizationState::WaitEmailCode => Some(("Email code", None)),
        AuthorizationState::WaitPassword => Some(("Password", None)),
        AuthorizationState::WaitRegistration => Some(("First name", Some("Last name"))),
        _ => None,
    }
}

/// Reads answers from `input` for every prompt request and submits them.
pub struct ConsoleAuthenticator<R, W> {
    client: Arc<Client>,
    requests: mpsc::UnboundedReceiver<PromptRequest>,
    input: Lines<R>,
    output: W,
    phone: Option<String>,
    /// State whose answer was last sent and not yet superseded
    pending: Option<AuthorizationState>,
}

impl<R, W> ConsoleAuthenticator<R, W>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    pub fn new(
        client: Arc<Client>,
        requests: mpsc::UnboundedReceiver<PromptRequest>,
        input: R,
        output: W,
    ) -> Self {
        Self {
            client,
            requests,
            input: input.lines(),
            output,
            phone: None,
            pending: None,
        }
    }

    /// Answer the first phone number prompt without asking
    pub fn with_phone(mut self, phone: Option<String>) -> Self {
        self.phone = phone;
        self
    }

    /// Serve prompt requests until `shutdown`, the client dropping its
    /// prompt handler, or the input closing.
    pub async fn run(mut self, shutdown: CancellationToken) -> Result<()> {
        loop {
            let request = tokio::select! {
                _ = shutdown.cancelled() => return Ok(()),
                request = self.requests.recv() => match request {
                    Some(request) => request,
                    None => return Ok(()),
                },
            };
            let open = match request {
                PromptRequest::Input(state) => self.answer(state).await?,
                PromptRequest::Rejected(message) => self.retry(&message).await?,
            };
            if !open {
                tracing::info!("Console input closed, no more credentials will be read");
                return Ok(());
            }
        }
    }

    /// Handle one request. Returns `false` once the input is exhausted.
    ///
    /// An answer the client cannot turn into a command (an empty line) is
    /// asked for again right away.
    pub async fn answer(&mut self, state: AuthorizationState) -> Result<bool> {
        self.pending = None;
        if state == AuthorizationState::WaitOtherDeviceConfirmation {
            self.say("Confirm this login from another logged-in device.\n")
                .await?;
            return Ok(true);
        }
        let Some((first, second)) = questions(state) else {
            return Ok(true);
        };

        if state == AuthorizationState::WaitPhoneNumber {
            if let Some(phone) = self.phone.take() {
                tracing::info!("Submitting configured phone number");
                if self.submit(state, &phone, "").await? {
                    return Ok(true);
                }
            }
        }

        loop {
            let Some(primary) = self.ask(first).await? else {
                return Ok(false);
            };
            let secondary = match second {
                Some(label) => match self.ask(label).await? {
                    Some(value) => value,
                    None => return Ok(false),
                },
                None => String::new(),
            };
            if self.submit(state, &primary, &secondary).await? {
                return Ok(true);
            }
        }
    }

    /// Ask again for the last answer if the backend refused it and login is
    /// still waiting in the same state
    async fn retry(&mut self, message: &str) -> Result<bool> {
        let Some(state) = self.pending.take() else {
            return Ok(true);
        };
        if self.client.is_authorized() || self.client.authorization_state() != state {
            return Ok(true);
        }
        tracing::warn!(state = %state, error = %message, "Answer refused by the backend");
        self.say(&format!("Not accepted ({}), try again.\n", message))
            .await?;
        self.answer(state).await
    }

    async fn ask(&mut self, label: &str) -> Result<Option<String>> {
        self.say(&format!("{}: ", label)).await?;
        let line = self
            .input
            .next_line()
            .await
            .context("Failed to read console input")?;
        Ok(line.map(|l| l.trim().to_string()))
    }

    async fn say(&mut self, text: &str) -> Result<()> {
        self.output
            .write_all(text.as_bytes())
            .await
            .context("Failed to write prompt")?;
        self.output.flush().await.context("Failed to flush prompt")
    }

    /// Returns `false` when the answer was refused locally and must be asked
    /// again. Transport failures are returned as errors.
    async fn submit(
        &mut self,
        state: AuthorizationState,
        primary: &str,
        secondary: &str,
    ) -> Result<bool> {
        let submitted = self.client.submit_credentials(primary, secondary).await;
        match submitted {
            Ok(true) => {
                self.pending = Some(state);
                Ok(true)
            }
            Ok(false) => {
                tracing::warn!("Login moved on before the answer arrived, ignoring it");
                Ok(true)
            }
            Err(e) => match e.downcast_ref::<ProtocolViolation>() {
                Some(violation) => {
                    tracing::warn!(error = %violation, "Credentials rejected");
                    self.say("Answer not usable, try again.\n").await?;
                    Ok(false)
                }
                None => Err(e),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registration_asks_two_questions() {
        assert_eq!(
            questions(AuthorizationState::WaitRegistration),
            Some(("First name", Some("Last name")))
        );
        assert_eq!(
            questions(AuthorizationState::WaitCode),
            Some(("Login code", None))
        );
        assert_eq!(questions(AuthorizationState::Ready), None);
    }

    #[test]
    fn test_prompt_forwards_states() {
        let (prompt, mut rx) = ConsolePrompt::channel();
        prompt.on_input_required(AuthorizationState::WaitPassword);
        assert_eq!(
            rx.try_recv().unwrap(),
            PromptRequest::Input(AuthorizationState::WaitPassword)
        );
    }
}
