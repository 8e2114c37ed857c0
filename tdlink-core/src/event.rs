// ABOUTME: Decoded backend events: a closed set of kinds plus named JSON fields.
// ABOUTME: Also hosts the decoder that turns raw payloads into events.

use crate::auth::AuthorizationState;
use crate::error::{DecodeError, ProtocolViolation};
use crate::value::FieldValue;
use serde_json::{Map, Value};
use std::fmt;

macro_rules! event_kinds {
    ($($variant:ident => $name:literal),+ $(,)?) => {
        /// Discriminant of a decoded event, named after the backend's `@type`.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub enum EventKind {
            $($variant),+
        }

        impl EventKind {
            /// Every known kind, in declaration order
            pub const ALL: &'static [EventKind] = &[$(EventKind::$variant),+];

            /// The backend `@type` name for this kind
            pub fn type_name(&self) -> &'static str {
                match self {
                    $(EventKind::$variant => $name),+
                }
            }

            /// Resolve a backend `@type` name
            pub fn from_type_name(name: &str) -> Option<Self> {
                match name {
                    $($name => Some(EventKind::$variant),)+
                    _ => None,
                }
            }
        }
    };
}

event_kinds! {
    // Authorization
    UpdateAuthorizationState => "updateAuthorizationState",
    // Messages
    UpdateNewMessage => "updateNewMessage",
    UpdateMessageSendSucceeded => "updateMessageSendSucceeded",
    UpdateMessageSendFailed => "updateMessageSendFailed",
    UpdateMessageContent => "updateMessageContent",
    UpdateMessageEdited => "updateMessageEdited",
    UpdateMessageInteractionInfo => "updateMessageInteractionInfo",
    UpdateDeleteMessages => "updateDeleteMessages",
    // Chats
    UpdateNewChat => "updateNewChat",
    UpdateChatTitle => "updateChatTitle",
    UpdateChatPhoto => "updateChatPhoto",
    UpdateChatLastMessage => "updateChatLastMessage",
    UpdateChatPosition => "updateChatPosition",
    UpdateChatReadInbox => "updateChatReadInbox",
    UpdateChatReadOutbox => "updateChatReadOutbox",
    UpdateChatUnreadMentionCount => "updateChatUnreadMentionCount",
    UpdateChatUnreadReactionCount => "updateChatUnreadReactionCount",
    UpdateChatAction => "updateChatAction",
    UpdateChatFolders => "updateChatFolders",
    UpdateUnreadMessageCount => "updateUnreadMessageCount",
    UpdateUnreadChatCount => "updateUnreadChatCount",
    // Users and groups
    UpdateUser => "updateUser",
    UpdateUserStatus => "updateUserStatus",
    UpdateBasicGroup => "updateBasicGroup",
    UpdateSupergroup => "updateSupergroup",
    UpdateSupergroupFullInfo => "updateSupergroupFullInfo",
    // Files
    UpdateFile => "updateFile",
    UpdateFileDownload => "updateFileDownload",
    // Session
    UpdateConnectionState => "updateConnectionState",
    UpdateOption => "updateOption",
    // Responses
    Ok => "ok",
    Error => "error",
    Message => "message",
    Messages => "messages",
    Chat => "chat",
    Chats => "chats",
    User => "user",
    UserFullInfo => "userFullInfo",
    File => "file",
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.type_name())
    }
}

/// Prefix shared by every bare authorization state object
const AUTH_STATE_PREFIX: &str = "authorizationState";

/// An immutable decoded event.
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    kind: EventKind,
    fields: Map<String, Value>,
    extra: Option<Value>,
}

impl Event {
    /// Build an event directly; fields must not include `@type`.
    pub fn new(kind: EventKind, fields: Map<String, Value>) -> Self {
        Self {
            kind,
            fields,
            extra: None,
        }
    }

    /// Build an event from a JSON object literal (handy in tests)
    pub fn with_fields(kind: EventKind, fields: Value) -> Self {
        match fields {
            Value::Object(map) => Self::new(kind, map),
            _ => Self::new(kind, Map::new()),
        }
    }

    pub fn kind(&self) -> EventKind {
        self.kind
    }

    /// Raw named fields of this event
    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }

    /// The request correlation value echoed back by the backend, if any
    pub fn extra(&self) -> Option<&Value> {
        self.extra.as_ref()
    }

    /// Raw JSON for a field. Dotted names descend into nested objects.
    pub fn raw_field(&self, name: &str) -> Option<&Value> {
        let mut parts = name.split('.');
        let first = parts.next()?;
        let mut current = self.fields.get(first)?;
        for part in parts {
            current = current.as_object()?.get(part)?;
        }
        Some(current)
    }

    /// Structural value of a field, or `None` when it is absent
    pub fn field(&self, name: &str) -> Option<FieldValue> {
        self.raw_field(name).map(FieldValue::from)
    }

    /// Parse the nested state of an `updateAuthorizationState` event.
    ///
    /// Returns `None` for any other kind.
    pub fn authorization_state(&self) -> Option<Result<AuthorizationState, ProtocolViolation>> {
        if self.kind != EventKind::UpdateAuthorizationState {
            return None;
        }
        let parsed = match self
            .raw_field("authorization_state")
            .and_then(|s| s.get("@type"))
            .and_then(|t| t.as_str())
        {
            Some(name) => AuthorizationState::from_type_name(name)
                .ok_or_else(|| ProtocolViolation::UnknownState(name.to_string())),
            None => Err(ProtocolViolation::MissingState),
        };
        Some(parsed)
    }
}

/// Convert a raw payload into an event.
///
/// A bare `authorizationState*` object (the answer to `getAuthorizationState`)
/// is wrapped into an `updateAuthorizationState` event so both paths feed the
/// authorization machine the same way.
pub fn decode(raw: Value) -> Result<Event, DecodeError> {
    let Value::Object(mut fields) = raw else {
        return Err(DecodeError::NotAnObject);
    };
    let type_name = match fields.remove("@type") {
        Some(Value::String(name)) => name,
        _ => return Err(DecodeError::MissingType),
    };
    let extra = fields.remove("@extra");

    if type_name.starts_with(AUTH_STATE_PREFIX) {
        let mut state = fields;
        state.insert("@type".to_string(), Value::String(type_name));
        let mut wrapped = Map::new();
        wrapped.insert("authorization_state".to_string(), Value::Object(state));
        return Ok(Event {
            kind: EventKind::UpdateAuthorizationState,
            fields: wrapped,
            extra,
        });
    }

    let kind =
        EventKind::from_type_name(&type_name).ok_or(DecodeError::UnknownKind(type_name))?;
    Ok(Event {
        kind,
        fields,
        extra,
    })
}
