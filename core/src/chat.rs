use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::ids::TempId;

/// Summary row of the chat list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chat {
    pub id: String,
    /// Display title (other participant's name, or group name)
    pub title: String,
    /// Preview of the most recent message, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_message_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub unread_count: u32,
}

/// A message as stored by the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Canonical server id
    pub id: String,
    pub text: String,
    /// Server time the message was accepted
    pub sent_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender_id: Option<String>,
}

/// Body of a send request. The idempotency key is derived from the user
/// action, so an explicit retry of the same action cannot create a second message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendMessageRequest {
    pub text: String,
    pub idempotency_key: String,
}

impl SendMessageRequest {
    /// `session` is generated once per client process; `temp_id` identifies
    /// the action within it.
    pub fn for_action(session: Uuid, temp_id: TempId, text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            idempotency_key: format!("{session}:{temp_id}"),
        }
    }
}
