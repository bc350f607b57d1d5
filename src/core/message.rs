use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::System => "system",
        }
    }

    pub fn is_assistant(self) -> bool {
        self == Role::Assistant
    }
}

impl AsRef<str> for Role {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

/// One transcript entry. Content is mutable only while `finalized` is false,
/// which is true solely for the active streaming placeholder.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
    pub finalized: bool,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
            finalized: true,
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
            finalized: true,
        }
    }

    /// The empty, unfinalized assistant message a turn streams into.
    pub fn assistant_placeholder() -> Self {
        Self {
            role: Role::Assistant,
            content: String::new(),
            finalized: false,
        }
    }

    pub fn is_placeholder(&self) -> bool {
        self.role.is_assistant() && !self.finalized
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constructors_set_finality() {
        assert!(Message::user("hi").finalized);
        assert!(Message::system("ctx").finalized);
        let placeholder = Message::assistant_placeholder();
        assert!(placeholder.is_placeholder());
        assert!(placeholder.content.is_empty());
    }

    #[test]
    fn role_strings_round_trip() {
        assert_eq!(Role::User.as_str(), "user");
        assert_eq!(Role::Assistant.as_str(), "assistant");
        assert_eq!(Role::System.as_str(), "system");
    }
}
