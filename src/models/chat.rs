use chrono::{ DateTime, Utc };
use serde::{ Deserialize, Serialize };
use std::fmt;

pub const TITLE_MAX_CHARS: usize = 50;
pub const TITLE_ELLIPSIS: &str = "...";
pub const NO_REASONING_PROVIDED: &str = "No reasoning provided";
pub const USER_MESSAGE_SUFFIX: &str = "-user";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::User => write!(f, "User"),
            Role::Assistant => write!(f, "Assistant"),
        }
    }
}

/// Lifecycle of an assistant message.
///
/// `thinking -> critiquing -> judging -> complete`, with `error` reachable only
/// from `thinking`. Both `complete` and `error` are terminal.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageStatus {
    Thinking,
    Critiquing,
    Judging,
    Complete,
    Error,
}

impl MessageStatus {
    pub fn is_terminal(self) -> bool {
        match self {
            MessageStatus::Complete | MessageStatus::Error => true,
            MessageStatus::Thinking | MessageStatus::Critiquing | MessageStatus::Judging => false,
        }
    }

    pub fn can_transition_to(self, next: MessageStatus) -> bool {
        match (self, next) {
            (MessageStatus::Thinking, MessageStatus::Critiquing) => true,
            (MessageStatus::Thinking, MessageStatus::Error) => true,
            (MessageStatus::Critiquing, MessageStatus::Judging) => true,
            (MessageStatus::Judging, MessageStatus::Complete) => true,
            (MessageStatus::Thinking, _) => false,
            (MessageStatus::Critiquing, _) => false,
            (MessageStatus::Judging, _) => false,
            (MessageStatus::Complete, _) => false,
            (MessageStatus::Error, _) => false,
        }
    }
}

impl fmt::Display for MessageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            MessageStatus::Thinking => "thinking",
            MessageStatus::Critiquing => "critiquing",
            MessageStatus::Judging => "judging",
            MessageStatus::Complete => "complete",
            MessageStatus::Error => "error",
        };
        write!(f, "{}", label)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReasoningType {
    Deductive,
    Causal,
    Probabilistic,
    Mathematical,
    Commonsense,
}

pub const DEFAULT_REASONING_TYPE: ReasoningType = ReasoningType::Commonsense;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ThinkerRecord {
    pub internal: bool,
    pub reasoning_type: ReasoningType,
    pub raw: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CriticRecord {
    pub internal: bool,
    pub raw: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct JudgeRecord {
    pub final_answer: String,
    pub judge_reasoning: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Per-stage output slots, filled in as each stage finishes.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct InternalStages {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thinker: Option<ThinkerRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub critic: Option<CriticRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub judge: Option<JudgeRecord>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ResponseMetadata {
    pub timestamp: String,
    pub elapsed_ms: u64,
}

/// Composite record attached to an assistant message on completion.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StructuredResponse {
    pub id: String,
    pub prompt: String,
    pub metadata: ResponseMetadata,
    pub thinker: ThinkerRecord,
    pub critic: CriticRecord,
    pub judge: JudgeRecord,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Conversation {
    pub id: String,
    pub title: String,
    pub created_at: DateTime<Utc>,
    pub timestamp: String,
}

impl Conversation {
    pub fn new(id: String, first_query: &str, now: DateTime<Utc>) -> Self {
        Self {
            id,
            title: derive_title(first_query),
            created_at: now,
            timestamp: now.format("%b %d, %Y %H:%M").to_string(),
        }
    }
}

pub fn derive_title(query: &str) -> String {
    let trimmed = query.trim();
    if trimmed.chars().count() > TITLE_MAX_CHARS {
        let head: String = trimmed.chars().take(TITLE_MAX_CHARS).collect();
        format!("{}{}", head, TITLE_ELLIPSIS)
    } else {
        trimmed.to_string()
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: String,
    pub role: Role,
    pub conversation_id: String,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<MessageStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub internal: Option<InternalStages>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub structured_response: Option<StructuredResponse>,
    #[serde(default)]
    pub show_internal: bool,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub seq: u64,
}

impl Message {
    pub fn user(
        query_id: &str,
        conversation_id: &str,
        query: &str,
        timestamp: DateTime<Utc>,
        seq: u64
    ) -> Self {
        Self {
            id: format!("{}{}", query_id, USER_MESSAGE_SUFFIX),
            role: Role::User,
            conversation_id: conversation_id.to_string(),
            content: query.to_string(),
            status: None,
            internal: None,
            structured_response: None,
            show_internal: false,
            timestamp,
            seq,
        }
    }

    pub fn assistant_placeholder(
        query_id: &str,
        conversation_id: &str,
        timestamp: DateTime<Utc>,
        seq: u64
    ) -> Self {
        Self {
            id: query_id.to_string(),
            role: Role::Assistant,
            conversation_id: conversation_id.to_string(),
            content: String::new(),
            status: Some(MessageStatus::Thinking),
            internal: Some(InternalStages::default()),
            structured_response: None,
            show_internal: false,
            timestamp,
            seq,
        }
    }

    pub fn is_in_flight(&self) -> bool {
        matches!(self.status, Some(status) if !status.is_terminal())
    }

    /// Text used when this message is replayed as conversation history.
    pub fn history_text(&self) -> &str {
        match &self.structured_response {
            Some(response) if !response.judge.final_answer.is_empty() =>
                response.judge.final_answer.as_str(),
            _ => self.content.as_str(),
        }
    }
}

/// Everything that is persisted: conversations, messages and the active id.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    #[serde(default)]
    pub conversations: Vec<Conversation>,
    #[serde(default)]
    pub messages: Vec<Message>,
    #[serde(default)]
    pub current_conversation_id: Option<String>,
}

impl SessionSnapshot {
    pub fn is_empty(&self) -> bool {
        self.conversations.is_empty() && self.messages.is_empty()
    }
}

/// What a display surface renders for the active conversation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionView {
    pub conversations: Vec<Conversation>,
    pub current_conversation_id: Option<String>,
    pub messages: Vec<Message>,
    pub show_internal: bool,
    pub include_history: bool,
    pub busy: bool,
}
