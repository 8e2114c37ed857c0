// ABOUTME: Authorization handshake state machine driven by authorization-state updates.
// ABOUTME: Emits automatic commands, asks the prompt handler for input, and builds credential commands.

use crate::command::{Command, EmailAddressAuthentication, TdlibParameters};
use crate::error::ProtocolViolation;
use crate::event::Event;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};

/// Where the handshake currently stands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AuthorizationState {
    /// Nothing received yet
    Uninitialized,
    WaitParameters,
    WaitPhoneNumber,
    WaitEmailAddress,
    WaitEmailCode,
    WaitCode,
    /// Login link must be confirmed on another device; no credentials needed
    WaitOtherDeviceConfirmation,
    WaitRegistration,
    WaitPassword,
    Ready,
    LoggingOut,
    Closing,
    Closed,
}

impl AuthorizationState {
    /// Map a backend `authorizationState*` type name
    pub fn from_type_name(name: &str) -> Option<Self> {
        let state = match name {
            "authorizationStateWaitTdlibParameters" => Self::WaitParameters,
            "authorizationStateWaitPhoneNumber" => Self::WaitPhoneNumber,
            "authorizationStateWaitEmailAddress" => Self::WaitEmailAddress,
            "authorizationStateWaitEmailCode" => Self::WaitEmailCode,
            "authorizationStateWaitCode" => Self::WaitCode,
            "authorizationStateWaitOtherDeviceConfirmation" => Self::WaitOtherDeviceConfirmation,
            "authorizationStateWaitRegistration" => Self::WaitRegistration,
            "authorizationStateWaitPassword" => Self::WaitPassword,
            "authorizationStateReady" => Self::Ready,
            "authorizationStateLoggingOut" => Self::LoggingOut,
            "authorizationStateClosing" => Self::Closing,
            "authorizationStateClosed" => Self::Closed,
            _ => return None,
        };
        Some(state)
    }

    /// States that wait for the prompt handler
    pub fn needs_input(&self) -> bool {
        matches!(
            self,
            Self::WaitPhoneNumber
                | Self::WaitEmailAddress
                | Self::WaitEmailCode
                | Self::WaitCode
                | Self::WaitOtherDeviceConfirmation
                | Self::WaitRegistration
                | Self::WaitPassword
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Closed)
    }

    /// Stable number for the state gauge
    pub fn ordinal(&self) -> u8 {
        match self {
            Self::Uninitialized => 0,
            Self::WaitParameters => 1,
            Self::WaitPhoneNumber => 2,
            Self::WaitEmailAddress => 3,
            Self::WaitEmailCode => 4,
            Self::WaitCode => 5,
            Self::WaitOtherDeviceConfirmation => 6,
            Self::WaitRegistration => 7,
            Self::WaitPassword => 8,
            Self::Ready => 9,
            Self::LoggingOut => 10,
            Self::Closing => 11,
            Self::Closed => 12,
        }
    }

    /// Whether `next` is a step the handshake normally takes from `self`.
    ///
    /// Closing down is reachable from anywhere; a state may always repeat.
    pub fn leads_to(&self, next: AuthorizationState) -> bool {
        use AuthorizationState::*;
        if *self == next || matches!(next, LoggingOut | Closing | Closed) {
            return true;
        }
        match self {
            Uninitialized => true,
            WaitParameters => matches!(next, WaitPhoneNumber | WaitEmailAddress | WaitOtherDeviceConfirmation | Ready),
            WaitPhoneNumber => matches!(next, WaitEmailAddress | WaitCode | WaitOtherDeviceConfirmation | WaitRegistration | WaitPassword | Ready),
            WaitEmailAddress => matches!(next, WaitEmailCode),
            WaitEmailCode => matches!(next, WaitCode | WaitRegistration | WaitPassword | Ready),
            WaitCode => matches!(next, WaitRegistration | WaitPassword | WaitEmailAddress | WaitPhoneNumber | Ready),
            WaitOtherDeviceConfirmation => matches!(next, WaitRegistration | WaitPassword | WaitPhoneNumber | Ready),
            WaitRegistration => matches!(next, WaitPassword | WaitEmailCode | Ready),
            WaitPassword => matches!(next, WaitEmailCode | WaitEmailAddress | WaitPhoneNumber | Ready),
            Ready => false,
            LoggingOut => false,
            Closing => false,
            Closed => false,
        }
    }
}

impl fmt::Display for AuthorizationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// External collaborator asked for credentials whenever the handshake
/// stalls on user input.
pub trait PromptHandler: Send + Sync {
    /// Called once per entry into a state that needs input. The answer comes
    /// back later through `submit_credentials`.
    fn on_input_required(&self, state: AuthorizationState);

    /// Called when the backend broke the handshake protocol
    fn on_authorization_failed(&self, violation: &ProtocolViolation) {
        tracing::error!(error = %violation, "Authorization failed");
    }
}

impl<F> PromptHandler for F
where
    F: Fn(AuthorizationState) + Send + Sync,
{
    fn on_input_required(&self, state: AuthorizationState) {
        self(state)
    }
}

/// Drives the authorization handshake.
///
/// The consumer loop is the only writer; credential submission from other
/// tasks reads the state under the same lock, so it never sees a transition
/// half-applied.
pub struct AuthorizationMachine {
    state: RwLock<AuthorizationState>,
    authorized: AtomicBool,
    failure: Mutex<Option<ProtocolViolation>>,
    prompt: RwLock<Option<Arc<dyn PromptHandler>>>,
    parameters: TdlibParameters,
    chat_load_limit: i32,
}

impl AuthorizationMachine {
    pub fn new(parameters: TdlibParameters, chat_load_limit: i32) -> Self {
        Self {
            state: RwLock::new(AuthorizationState::Uninitialized),
            authorized: AtomicBool::new(false),
            failure: Mutex::new(None),
            prompt: RwLock::new(None),
            parameters,
            chat_load_limit,
        }
    }

    /// Register the single prompt handler, replacing any previous one
    pub fn set_prompt_handler(&self, handler: Arc<dyn PromptHandler>) {
        *self.prompt.write().unwrap_or_else(|e| e.into_inner()) = Some(handler);
    }

    /// Current state snapshot
    pub fn state(&self) -> AuthorizationState {
        *self.state.read().unwrap_or_else(|e| e.into_inner())
    }

    /// Whether `Ready` has been reached at least once
    pub fn is_authorized(&self) -> bool {
        self.authorized.load(Ordering::Acquire)
    }

    /// The violation that stopped the handshake, if any
    pub fn failure(&self) -> Option<ProtocolViolation> {
        self.failure
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Feed a decoded event. Non-authorization events are ignored.
    ///
    /// Returns the commands to send, in order. An unknown or missing state is
    /// a protocol violation: it stops the handshake for good, and later
    /// authorization updates are ignored.
    pub fn observe(&self, event: &Event) -> Result<Vec<Command>, ProtocolViolation> {
        let Some(parsed) = event.authorization_state() else {
            return Ok(Vec::new());
        };
        if let Some(failure) = self.failure() {
            tracing::warn!(error = %failure, "Ignoring authorization update after failure");
            return Ok(Vec::new());
        }
        match parsed {
            Ok(next) => Ok(self.transition(next)),
            Err(violation) => {
                self.fail(violation.clone());
                Err(violation)
            }
        }
    }

    /// Replace the current state and run the entry action of the new one.
    pub fn transition(&self, next: AuthorizationState) -> Vec<Command> {
        let previous = {
            let mut state = self.state.write().unwrap_or_else(|e| e.into_inner());
            std::mem::replace(&mut *state, next)
        };
        crate::metrics::set_authorization_state(next.ordinal());

        if previous == next && next != AuthorizationState::Ready {
            tracing::debug!(state = %next, "Authorization state repeated");
            return Vec::new();
        }
        if !previous.leads_to(next) {
            tracing::warn!(from = %previous, to = %next, "Unexpected authorization transition");
        }
        tracing::info!(from = %previous, to = %next, "Authorization state changed");

        match next {
            AuthorizationState::WaitParameters => {
                vec![Command::SetTdlibParameters(self.parameters.clone())]
            }
            AuthorizationState::Ready => {
                if self.authorized.swap(true, Ordering::AcqRel) {
                    return Vec::new();
                }
                tracing::info!("User authorized");
                vec![Command::load_main_chats(self.chat_load_limit)]
            }
            state if state.needs_input() => {
                self.notify_prompt(state);
                Vec::new()
            }
            _ => Vec::new(),
        }
    }

    /// Build the credential command the current state expects.
    ///
    /// `primary` is the phone number, code, email address, password, or first
    /// name; `secondary` is only read for registration (last name). Returns
    /// `Ok(None)` when the current state does not take credentials, so late
    /// answers to an old prompt are harmless.
    pub fn submit_credentials(
        &self,
        primary: &str,
        secondary: &str,
    ) -> Result<Option<Command>, ProtocolViolation> {
        if self.failure().is_some() {
            return Ok(None);
        }
        let state = self.state();
        let command = match state {
            AuthorizationState::WaitPhoneNumber => Command::SetAuthenticationPhoneNumber {
                phone_number: required(state, "setAuthenticationPhoneNumber", primary)?,
            },
            AuthorizationState::WaitCode => Command::CheckAuthenticationCode {
                code: required(state, "checkAuthenticationCode", primary)?,
            },
            AuthorizationState::WaitRegistration => Command::RegisterUser {
                first_name: required(state, "registerUser", primary)?,
                last_name: secondary.to_string(),
            },
            AuthorizationState::WaitEmailAddress => Command::SetAuthenticationEmailAddress {
                email_address: required(state, "setAuthenticationEmailAddress", primary)?,
            },
            AuthorizationState::WaitEmailCode => Command::CheckAuthenticationEmailCode {
                code: EmailAddressAuthentication::EmailAddressAuthenticationCode {
                    code: required(state, "checkAuthenticationEmailCode", primary)?,
                },
            },
            AuthorizationState::WaitPassword => Command::CheckAuthenticationPassword {
                password: required(state, "checkAuthenticationPassword", primary)?,
            },
            _ => {
                tracing::debug!(state = %state, "Credentials not expected, ignoring");
                return Ok(None);
            }
        };
        Ok(Some(command))
    }

    fn notify_prompt(&self, state: AuthorizationState) {
        let handler = self
            .prompt
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone();
        match handler {
            Some(handler) => handler.on_input_required(state),
            None => tracing::warn!(state = %state, "Authorization needs input but no prompt handler is set"),
        }
    }

    fn fail(&self, violation: ProtocolViolation) {
        *self.failure.lock().unwrap_or_else(|e| e.into_inner()) = Some(violation.clone());
        let handler = self
            .prompt
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone();
        if let Some(handler) = handler {
            handler.on_authorization_failed(&violation);
        }
    }
}

fn required(
    state: AuthorizationState,
    command: &'static str,
    value: &str,
) -> Result<String, ProtocolViolation> {
    if value.is_empty() {
        return Err(ProtocolViolation::UnbuildableCommand {
            state,
            command,
            reason: "value is empty".to_string(),
        });
    }
    Ok(value.to_string())
}
