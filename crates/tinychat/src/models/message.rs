use super::role::Role;

/// One turn in a conversation
///
/// Messages are ordered and append-only for the duration of a page session;
/// they carry no identifier beyond their position in the sequence.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    /// Create a new user message
    pub fn user<S: Into<String>>(content: S) -> Self {
        Message {
            role: Role::User,
            content: content.into(),
        }
    }

    /// Create a new assistant message
    pub fn assistant<S: Into<String>>(content: S) -> Self {
        Message {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}
