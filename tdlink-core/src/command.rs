// ABOUTME: Outbound commands sent to the backend, serialized with an @type tag.
// ABOUTME: Includes the client parameters sent during the authorization handshake.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Client parameters announced while the backend waits for them
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TdlibParameters {
    pub use_test_dc: bool,
    pub database_directory: String,
    pub files_directory: String,
    pub database_encryption_key: String,
    pub use_file_database: bool,
    pub use_chat_info_database: bool,
    pub use_message_database: bool,
    pub use_secret_chats: bool,
    pub api_id: i32,
    pub api_hash: String,
    pub system_language_code: String,
    pub device_model: String,
    pub system_version: String,
    pub application_version: String,
}

impl fmt::Debug for TdlibParameters {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TdlibParameters")
            .field("use_test_dc", &self.use_test_dc)
            .field("database_directory", &self.database_directory)
            .field("files_directory", &self.files_directory)
            .field("database_encryption_key", &"[REDACTED]")
            .field("use_file_database", &self.use_file_database)
            .field("use_chat_info_database", &self.use_chat_info_database)
            .field("use_message_database", &self.use_message_database)
            .field("use_secret_chats", &self.use_secret_chats)
            .field("api_id", &self.api_id)
            .field("api_hash", &"[REDACTED]")
            .field("system_language_code", &self.system_language_code)
            .field("device_model", &self.device_model)
            .field("system_version", &self.system_version)
            .field("application_version", &self.application_version)
            .finish()
    }
}

/// Which chat list a list command applies to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "@type", rename_all = "camelCase")]
pub enum ChatList {
    ChatListMain,
    ChatListArchive,
    ChatListFolder { chat_folder_id: i32 },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "@type", rename_all = "camelCase")]
pub enum EmailAddressAuthentication {
    EmailAddressAuthenticationCode { code: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormattedText {
    pub text: String,
    #[serde(default)]
    pub entities: Vec<Value>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "@type", rename_all = "camelCase")]
pub enum InputMessageContent {
    InputMessageText {
        text: FormattedText,
        clear_draft: bool,
    },
}

impl InputMessageContent {
    /// Plain text message content with no entities
    pub fn text(text: impl Into<String>) -> Self {
        Self::InputMessageText {
            text: FormattedText {
                text: text.into(),
                entities: Vec::new(),
            },
            clear_draft: true,
        }
    }
}

/// A typed request to the backend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "@type", rename_all = "camelCase")]
pub enum Command {
    GetAuthorizationState,
    SetTdlibParameters(TdlibParameters),
    SetAuthenticationPhoneNumber {
        phone_number: String,
    },
    CheckAuthenticationCode {
        code: String,
    },
    RegisterUser {
        first_name: String,
        last_name: String,
    },
    SetAuthenticationEmailAddress {
        email_address: String,
    },
    CheckAuthenticationEmailCode {
        code: EmailAddressAuthentication,
    },
    CheckAuthenticationPassword {
        password: String,
    },
    LoadChats {
        chat_list: ChatList,
        limit: i32,
    },
    GetChats {
        chat_list: ChatList,
        limit: i32,
    },
    GetChat {
        chat_id: i64,
    },
    GetChatHistory {
        chat_id: i64,
        from_message_id: i64,
        offset: i32,
        limit: i32,
        only_local: bool,
    },
    SendMessage {
        chat_id: i64,
        message_thread_id: i64,
        input_message_content: InputMessageContent,
    },
    ViewMessages {
        chat_id: i64,
        message_ids: Vec<i64>,
        force_read: bool,
    },
    SetLogVerbosityLevel {
        new_verbosity_level: i32,
    },
    LogOut,
    Close,
}

impl Command {
    /// The `@type` tag this command serializes with
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::GetAuthorizationState => "getAuthorizationState",
            Self::SetTdlibParameters(_) => "setTdlibParameters",
            Self::SetAuthenticationPhoneNumber { .. } => "setAuthenticationPhoneNumber",
            Self::CheckAuthenticationCode { .. } => "checkAuthenticationCode",
            Self::RegisterUser { .. } => "registerUser",
            Self::SetAuthenticationEmailAddress { .. } => "setAuthenticationEmailAddress",
            Self::CheckAuthenticationEmailCode { .. } => "checkAuthenticationEmailCode",
            Self::CheckAuthenticationPassword { .. } => "checkAuthenticationPassword",
            Self::LoadChats { .. } => "loadChats",
            Self::GetChats { .. } => "getChats",
            Self::GetChat { .. } => "getChat",
            Self::GetChatHistory { .. } => "getChatHistory",
            Self::SendMessage { .. } => "sendMessage",
            Self::ViewMessages { .. } => "viewMessages",
            Self::SetLogVerbosityLevel { .. } => "setLogVerbosityLevel",
            Self::LogOut => "logOut",
            Self::Close => "close",
        }
    }

    /// Load every chat of the main list, in pages of `limit`
    pub fn load_main_chats(limit: i32) -> Self {
        Self::LoadChats {
            chat_list: ChatList::ChatListMain,
            limit,
        }
    }

    /// Send a plain text message to a chat
    pub fn send_text(chat_id: i64, text: impl Into<String>) -> Self {
        Self::SendMessage {
            chat_id,
            message_thread_id: 0,
            input_message_content: InputMessageContent::text(text),
        }
    }

    /// Wire form of this command
    pub fn to_payload(&self) -> Result<Value> {
        serde_json::to_value(self)
            .with_context(|| format!("Failed to encode {} command", self.type_name()))
    }
}
