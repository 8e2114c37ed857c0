// ABOUTME: Error taxonomy for the dispatch core.
// ABOUTME: Decode, subscriber, protocol, and registry-misuse failures.

use crate::auth::AuthorizationState;
use crate::event::EventKind;
use std::fmt;
use thiserror::Error;

/// A raw payload that could not be turned into an event.
///
/// Recovered locally: the payload is dropped and logged.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("payload is not a JSON object")]
    NotAnObject,
    #[error("payload has no string @type")]
    MissingType,
    #[error("unknown event type '{0}'")]
    UnknownKind(String),
}

/// Which subscriber list a failing callback came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    /// Every event of one kind
    Unconditional(EventKind),
    /// Events of one kind whose fields match a value tuple
    Keyed { kind: EventKind, key: String },
    /// Every event
    Global,
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Route::Unconditional(kind) => write!(f, "{}", kind),
            Route::Keyed { kind, key } => write!(f, "{}{}", kind, key),
            Route::Global => write!(f, "*"),
        }
    }
}

/// A callback failed while an event was being dispatched.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SubscriberError {
    #[error("subscriber {route} failed on {kind}: {message}")]
    Failed {
        kind: EventKind,
        route: Route,
        message: String,
    },
    #[error("subscriber {route} panicked on {kind}: {message}")]
    Panicked {
        kind: EventKind,
        route: Route,
        message: String,
    },
}

/// The backend broke the authorization protocol, or a credential command
/// could not be built.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProtocolViolation {
    #[error("unknown authorization state '{0}'")]
    UnknownState(String),
    #[error("authorization update carries no state")]
    MissingState,
    #[error("cannot build {command} while in {state}: {reason}")]
    UnbuildableCommand {
        state: AuthorizationState,
        command: &'static str,
        reason: String,
    },
}

/// A subscribe call the registry refuses. Nothing is registered.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RegistryMisuse {
    #[error("keyed subscription to {kind} needs at least one field filter")]
    EmptyKeyFilter { kind: EventKind },
    #[error("invalid field name '{field}' in keyed subscription to {kind}")]
    InvalidFieldName { kind: EventKind, field: String },
}
