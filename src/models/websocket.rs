use serde::{ Serialize, Deserialize };

use super::chat::{ Message, SessionView };

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "type")]
pub enum ClientMessage {
    #[serde(rename = "chat")] Chat {
        content: String,
    },
    #[serde(rename = "new_conversation")]
    NewConversation,
    #[serde(rename = "switch")] Switch {
        conversation_id: String,
    },
    #[serde(rename = "delete")] Delete {
        conversation_id: String,
    },
    /// Without a message id the global visibility flag is flipped.
    #[serde(rename = "toggle_reasoning")] ToggleReasoning {
        #[serde(default)]
        message_id: Option<String>,
    },
    #[serde(rename = "set_history")] SetHistory {
        enabled: bool,
    },
    #[serde(rename = "reload")]
    Reload,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "type")]
pub enum ServerMessage {
    #[serde(rename = "session")] Session {
        view: SessionView,
    },
    #[serde(rename = "message")] Message {
        message: Message,
    },
    #[serde(rename = "error")] Error {
        message: String,
    },
}
