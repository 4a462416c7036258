use crate::common::types::ChatMessage;

/// What a poll loop hands to its stream connection.
#[derive(Debug, Clone)]
pub enum StreamEvent {
    Message(ChatMessage),
    /// Empty poll cycle; gives the publisher something to write so a dead
    /// peer is noticed even when nobody is posting.
    Keepalive,
}
