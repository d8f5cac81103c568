use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    /// Label used when the transcript is flattened into a prompt.
    pub fn label(self) -> &'static str {
        match self {
            Self::User => "User",
            Self::Assistant => "Assistant",
        }
    }
}

/// An image attached to a user message, already encoded for the generation API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageAttachment {
    pub path: String,
    pub mime_type: String,
    /// Base64 payload. Never serialized into logs.
    #[serde(skip_serializing, default)]
    pub data: String,
    pub sha256: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    pub role: Role,
    pub content: String,
    pub image: Option<ImageAttachment>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TranscriptError {
    #[error("assistant message must follow a user message")]
    OrphanAssistant,
}

/// Ordered, append-only log of one session's exchanges. Messages are never
/// edited or reordered; `clear` drops all of them at once.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Transcript {
    messages: Vec<Message>,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }

    pub fn push_user(
        &mut self,
        content: impl Into<String>,
        image: Option<ImageAttachment>,
    ) -> &Message {
        self.push(Role::User, content.into(), image)
    }

    pub fn push_assistant(
        &mut self,
        content: impl Into<String>,
    ) -> Result<&Message, TranscriptError> {
        if self.last().map(|message| message.role) != Some(Role::User) {
            return Err(TranscriptError::OrphanAssistant);
        }
        Ok(self.push(Role::Assistant, content.into(), None))
    }

    pub fn clear(&mut self) {
        self.messages.clear();
    }

    /// Flattens the transcript plus a new utterance into a single prompt:
    /// one `Role: content` line per prior message, then the utterance and an
    /// open `Assistant:` turn.
    pub fn running_context(&self, utterance: &str) -> String {
        let mut context = String::new();
        for message in &self.messages {
            context.push_str(message.role.label());
            context.push_str(": ");
            context.push_str(&message.content);
            context.push('\n');
        }
        context.push_str("User: ");
        context.push_str(utterance);
        context.push_str("\nAssistant:");
        context
    }

    fn push(&mut self, role: Role, content: String, image: Option<ImageAttachment>) -> &Message {
        self.messages.push(Message {
            role,
            content,
            image,
            created_at: Utc::now(),
        });
        &self.messages[self.messages.len() - 1]
    }
}

#[cfg(test)]
mod tests {
    use super::{ImageAttachment, Role, Transcript, TranscriptError};

    fn attachment() -> ImageAttachment {
        ImageAttachment {
            path: "cat.png".to_string(),
            mime_type: "image/jpeg".to_string(),
            data: "AAAA".to_string(),
            sha256: "00ff".to_string(),
        }
    }

    #[test]
    fn messages_keep_arrival_order() {
        let mut transcript = Transcript::new();
        transcript.push_user("hi", None);
        transcript.push_assistant("hello").unwrap();
        transcript.push_user("look", Some(attachment()));

        let roles: Vec<Role> = transcript.messages().iter().map(|m| m.role).collect();
        assert_eq!(roles, vec![Role::User, Role::Assistant, Role::User]);
        assert_eq!(transcript.messages()[2].image.as_ref().map(|i| i.path.as_str()), Some("cat.png"));
    }

    #[test]
    fn assistant_requires_preceding_user() {
        let mut transcript = Transcript::new();
        assert_eq!(
            transcript.push_assistant("nobody asked").err(),
            Some(TranscriptError::OrphanAssistant)
        );
        transcript.push_user("q", None);
        transcript.push_assistant("a").unwrap();
        assert_eq!(
            transcript.push_assistant("again").err(),
            Some(TranscriptError::OrphanAssistant)
        );
        assert_eq!(transcript.len(), 2);
    }

    #[test]
    fn clear_empties_the_log() {
        let mut transcript = Transcript::new();
        transcript.push_user("q", None);
        transcript.push_assistant("a").unwrap();
        transcript.clear();
        assert!(transcript.is_empty());
        assert!(transcript.last().is_none());
    }

    #[test]
    fn running_context_labels_roles() {
        let mut transcript = Transcript::new();
        transcript.push_user("What is Rust?", None);
        transcript.push_assistant("A language.").unwrap();
        assert_eq!(
            transcript.running_context("Who made it?"),
            "User: What is Rust?\nAssistant: A language.\nUser: Who made it?\nAssistant:"
        );
        assert_eq!(Transcript::new().running_context("hi"), "User: hi\nAssistant:");
    }

    #[test]
    fn image_data_is_not_serialized() -> anyhow::Result<()> {
        let value = serde_json::to_value(attachment())?;
        assert!(value.get("data").is_none());
        assert_eq!(value["sha256"], serde_json::json!("00ff"));
        Ok(())
    }
}
