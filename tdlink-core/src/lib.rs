// ABOUTME: Event dispatch and authorization engine for a Telegram backend client.
// ABOUTME: Decodes payloads, routes events to subscribers, and drives the login handshake.

pub mod auth;
pub mod client;
pub mod command;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod event;
pub mod metrics;
pub mod paths;
pub mod registry;
pub mod report;
pub mod value;

pub use auth::{AuthorizationMachine, AuthorizationState, PromptHandler};
pub use client::{Client, ClientBuilder, CommandSender};
pub use command::{Command, TdlibParameters};
pub use config::Config;
pub use dispatcher::{DispatchOutcome, Dispatcher};
pub use error::{DecodeError, ProtocolViolation, RegistryMisuse, Route, SubscriberError};
pub use event::{decode, Event, EventKind};
pub use registry::{SubscriptionHandle, SubscriptionRegistry};
pub use report::{ErrorReporter, TracingReporter};
pub use value::FieldValue;

pub use tdlink_transport as transport;
