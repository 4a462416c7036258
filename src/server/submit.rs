use crate::common::NewMessage;
use crate::storage::MessageStore;

/// Handle a `POST /api/chat` body: append to the store and return the
/// status code plus JSON payload for the response.
///
/// The stored message (including its assigned id) is the write
/// acknowledgment. Content is not validated beyond deserialization; an
/// empty string is accepted.
pub fn handle_submit(store: &MessageStore, body: &str) -> (u16, String) {
    let new_message: NewMessage = match serde_json::from_str(body) {
        Ok(parsed) => parsed,
        Err(err) => return (400, error_body(&err.to_string())),
    };

    match store.append(&new_message.content, new_message.user.as_deref()) {
        Ok(message) => match serde_json::to_string(&message) {
            Ok(json) => (200, json),
            Err(err) => (500, error_body(&err.to_string())),
        },
        Err(err) => {
            log::error!("Append failed: {err}");
            (500, error_body(&err.to_string()))
        }
    }
}

/// JSON error envelope shared by all failure responses.
pub fn error_body(message: &str) -> String {
    serde_json::json!({ "error": message }).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::common::ChatMessage;
    use crate::storage::DEFAULT_USER;

    #[test]
    fn accepts_content_and_user() {
        let store = MessageStore::in_memory().unwrap();
        let (status, body) = handle_submit(&store, r#"{"content":"hi","user":"alice"}"#);
        assert_eq!(status, 200);

        let message: ChatMessage = serde_json::from_str(&body).unwrap();
        assert!(!message.id.is_empty());
        assert!(message.timestamp > 0);
        assert_eq!(message.content, "hi");
        assert_eq!(message.user, "alice");
    }

    #[test]
    fn missing_user_gets_the_placeholder() {
        let store = MessageStore::in_memory().unwrap();
        let (status, body) = handle_submit(&store, r#"{"content":"hi"}"#);
        assert_eq!(status, 200);

        let message: ChatMessage = serde_json::from_str(&body).unwrap();
        assert_eq!(message.user, DEFAULT_USER);
    }

    #[test]
    fn empty_content_is_accepted() {
        let store = MessageStore::in_memory().unwrap();
        let (status, _) = handle_submit(&store, r#"{"content":""}"#);
        assert_eq!(status, 200);
        assert_eq!(store.message_count().unwrap(), 1);
    }

    #[test]
    fn undeserializable_body_is_rejected() {
        let store = MessageStore::in_memory().unwrap();
        let (status, body) = handle_submit(&store, "not json");
        assert_eq!(status, 400);

        let err: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert!(err["error"].is_string());
        assert_eq!(store.message_count().unwrap(), 0);
    }
}
