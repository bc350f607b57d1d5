//! Ordered per-mode message store.
//!
//! The store is the only shared mutable resource in the engine; every writer
//! goes through the turn engine's staleness gate first. Placeholder updates
//! locate the target by role from the back, never by index, because
//! informational messages can be interposed after the placeholder was
//! appended.

use std::collections::VecDeque;

use super::message::{Message, Role};

/// Logical conversation modes. Each keeps its own independent transcript;
/// switching modes never touches the others.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ChatMode {
    #[default]
    General,
    Debugging,
    Integration,
}

impl ChatMode {
    pub fn as_str(self) -> &'static str {
        match self {
            ChatMode::General => "general",
            ChatMode::Debugging => "debugging",
            ChatMode::Integration => "integration",
        }
    }
}

impl std::str::FromStr for ChatMode {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_ascii_lowercase().as_str() {
            "general" => Ok(ChatMode::General),
            "debugging" | "debug" => Ok(ChatMode::Debugging),
            "integration" => Ok(ChatMode::Integration),
            other => Err(format!("unknown chat mode: {other}")),
        }
    }
}

#[derive(Default)]
pub struct ConversationStore {
    general: VecDeque<Message>,
    debugging: VecDeque<Message>,
    integration: VecDeque<Message>,
    active_mode: ChatMode,
}

impl ConversationStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn active_mode(&self) -> ChatMode {
        self.active_mode
    }

    pub fn set_mode(&mut self, mode: ChatMode) {
        self.active_mode = mode;
    }

    /// Read-only view of the active mode's transcript.
    pub fn messages(&self) -> impl Iterator<Item = &Message> {
        self.active(self.active_mode).iter()
    }

    pub fn len(&self) -> usize {
        self.active(self.active_mode).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn append(&mut self, message: Message) {
        self.active_mut(self.active_mode).push_back(message);
    }

    /// Overwrite the trailing assistant message's content (full-replacement
    /// semantics). Only an unfinalized placeholder accepts writes.
    pub fn replace_last_assistant(&mut self, content: &str) {
        if let Some(message) = self.last_assistant_mut() {
            if !message.finalized {
                message.content = content.to_string();
            }
        }
    }

    /// Commit the trailing placeholder with its final content. A transcript
    /// without a placeholder is left untouched, which makes repeated
    /// finalization harmless.
    pub fn finalize_last_assistant(&mut self, content: &str) {
        if let Some(message) = self.last_assistant_mut() {
            if !message.finalized {
                message.content = content.to_string();
                message.finalized = true;
            }
        }
    }

    /// Seal a leftover placeholder as-is (e.g. after cancellation), keeping
    /// whatever partial content it holds.
    pub fn seal_trailing_placeholder(&mut self) {
        if let Some(message) = self.last_assistant_mut() {
            message.finalized = true;
        }
    }

    pub fn has_trailing_placeholder(&self) -> bool {
        self.active(self.active_mode)
            .iter()
            .rev()
            .find(|message| message.role.is_assistant())
            .is_some_and(Message::is_placeholder)
    }

    /// Drop the active mode's transcript; other modes are untouched.
    pub fn clear(&mut self) {
        self.active_mut(self.active_mode).clear();
    }

    fn last_assistant_mut(&mut self) -> Option<&mut Message> {
        self.active_mut(self.active_mode)
            .iter_mut()
            .rev()
            .find(|message| message.role.is_assistant())
    }

    fn active(&self, mode: ChatMode) -> &VecDeque<Message> {
        match mode {
            ChatMode::General => &self.general,
            ChatMode::Debugging => &self.debugging,
            ChatMode::Integration => &self.integration,
        }
    }

    fn active_mut(&mut self, mode: ChatMode) -> &mut VecDeque<Message> {
        match mode {
            ChatMode::General => &mut self.general,
            ChatMode::Debugging => &mut self.debugging,
            ChatMode::Integration => &mut self.integration,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn replace_targets_assistant_by_role_not_index() {
        let mut store = ConversationStore::new();
        store.append(Message::user("question"));
        store.append(Message::assistant_placeholder());
        // An interposed informational message must not steal the update.
        store.append(Message::system("ran 1 tool"));

        store.replace_last_assistant("partial answer");
        let contents: Vec<_> = store.messages().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["question", "partial answer", "ran 1 tool"]);
    }

    #[test]
    fn finalized_messages_reject_writes() {
        let mut store = ConversationStore::new();
        store.append(Message::assistant_placeholder());
        store.finalize_last_assistant("done");
        store.replace_last_assistant("overwritten");
        assert_eq!(store.messages().next().unwrap().content, "done");
        assert!(!store.has_trailing_placeholder());
    }

    #[test]
    fn repeated_finalize_keeps_one_assistant_message() {
        let mut store = ConversationStore::new();
        store.append(Message::user("q"));
        store.append(Message::assistant_placeholder());
        store.finalize_last_assistant("answer");
        store.finalize_last_assistant("answer again");

        let assistants: Vec<_> = store
            .messages()
            .filter(|m| m.role == Role::Assistant)
            .collect();
        assert_eq!(assistants.len(), 1);
        assert_eq!(assistants[0].content, "answer");
    }

    #[test]
    fn modes_are_isolated() {
        let mut store = ConversationStore::new();
        store.append(Message::user("general question"));

        store.set_mode(ChatMode::Debugging);
        assert!(store.is_empty());
        store.append(Message::user("debug question"));
        store.clear();
        assert!(store.is_empty());

        store.set_mode(ChatMode::General);
        assert_eq!(store.len(), 1);
        assert_eq!(store.messages().next().unwrap().content, "general question");
    }

    #[test]
    fn seal_preserves_partial_content() {
        let mut store = ConversationStore::new();
        store.append(Message::assistant_placeholder());
        store.replace_last_assistant("partial");
        store.seal_trailing_placeholder();
        let message = store.messages().next().unwrap();
        assert!(message.finalized);
        assert_eq!(message.content, "partial");
    }

    #[test]
    fn mode_names_parse() {
        assert_eq!("debug".parse(), Ok(ChatMode::Debugging));
        assert_eq!("General".parse(), Ok(ChatMode::General));
        assert!("other".parse::<ChatMode>().is_err());
    }
}
