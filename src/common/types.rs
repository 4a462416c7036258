use serde::{Deserialize, Serialize};

/// A stored chat message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: String,
    pub user: String,
    pub content: String,
    /// Unix milliseconds, assigned by the store at insertion.
    pub timestamp: i64,
    /// Store-assigned insertion sequence; breaks ties between messages
    /// written in the same millisecond.
    pub seq: i64,
}

/// Body of a `POST /api/chat` request.
#[derive(Debug, Clone, Deserialize)]
pub struct NewMessage {
    pub content: String,
    pub user: Option<String>,
}
