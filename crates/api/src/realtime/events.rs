use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::models::{MentorshipRequest, Message, Notification};

/// Events received from WebSocket clients.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientEvent {
    Ping,
    JoinConversation {
        conversation_id: String,
    },
    LeaveConversation {
        conversation_id: String,
    },
    SendMessage {
        conversation_id: String,
        content: String,
    },
    TypingStart {
        conversation_id: String,
    },
    TypingStop {
        conversation_id: String,
    },
    GoalCompleted {
        goal_id: String,
    },
    AvailabilityUpdated {
        availability: Value,
    },
    WebrtcOffer {
        target_user_id: String,
        payload: Value,
    },
    WebrtcAnswer {
        target_user_id: String,
        payload: Value,
    },
    WebrtcIceCandidate {
        target_user_id: String,
        payload: Value,
    },
    MarkRead {
        conversation_id: String,
        #[serde(default)]
        message_id: Option<String>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalKind {
    Offer,
    Answer,
    IceCandidate,
}

/// Events pushed to WebSocket clients.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerEvent {
    Hello {
        version: String,
        user_id: String,
        online_users: Vec<String>,
    },
    Pong,
    Joined {
        conversation_id: String,
    },
    Left {
        conversation_id: String,
    },
    NewMessage {
        conversation_id: String,
        message: Message,
    },
    Typing {
        conversation_id: String,
        user_id: String,
        is_typing: bool,
    },
    ReadReceipt {
        conversation_id: String,
        user_id: String,
        message_id: String,
    },
    UserOnline {
        user_id: String,
    },
    UserOffline {
        user_id: String,
        last_seen: String,
    },
    Notification {
        notification: Notification,
    },
    GoalCompleted {
        goal_id: String,
        title: String,
        points_awarded: i64,
    },
    AvailabilityUpdated {
        user_id: String,
        availability: Value,
    },
    WebrtcSignal {
        from_user_id: String,
        kind: SignalKind,
        payload: Value,
    },
    MentorshipRequest {
        request: MentorshipRequest,
    },
    MentorshipResponse {
        request: MentorshipRequest,
    },
    Error {
        message: String,
    },
}

impl ServerEvent {
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
        }
    }
}
