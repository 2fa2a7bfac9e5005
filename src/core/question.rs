//! Inbound question types, shell-agnostic.
//!
//! The chat and HTTP shells translate their own event shapes into these
//! types before calling the pipeline.

use serde::{Deserialize, Serialize};

/// Kind of channel the question arrived in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelKind {
    /// Direct message.
    Dm,
    /// Shared channel.
    Channel,
}

/// A user-uploaded file, already abstracted to text by the shell.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Attachment {
    /// Original file name.
    pub name: String,
    /// Abstracted text content.
    pub text: String,
}

/// Who wrote a thread message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThreadRole {
    /// A human participant.
    User,
    /// The bot's own prior reply.
    Assistant,
}

/// One message of prior thread context.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThreadMessage {
    /// Author role.
    pub role: ThreadRole,
    /// Message text.
    pub text: String,
}

impl ThreadMessage {
    /// Convenience constructor for a user message.
    #[must_use]
    pub fn user(text: &str) -> Self {
        Self {
            role: ThreadRole::User,
            text: text.to_string(),
        }
    }

    /// Convenience constructor for an assistant message.
    #[must_use]
    pub fn assistant(text: &str) -> Self {
        Self {
            role: ThreadRole::Assistant,
            text: text.to_string(),
        }
    }
}

/// A question as delivered by a shell, mention prefix already stripped.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuestionInput {
    /// Question text.
    pub text: String,
    /// Asking user's id.
    pub user_id: String,
    /// Channel the question was asked in.
    pub channel_id: String,
    /// Thread parent timestamp, when asked inside a thread.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thread_ts: Option<String>,
    /// Timestamp of the question message itself.
    pub message_ts: String,
    /// Kind of channel.
    pub channel_kind: ChannelKind,
    /// Uploaded files, abstracted to text.
    #[serde(default)]
    pub attachments: Vec<Attachment>,
}

impl QuestionInput {
    /// Builds a bare question with no channel context, for the CLI and
    /// HTTP shells.
    #[must_use]
    pub fn bare(text: &str) -> Self {
        Self {
            text: text.to_string(),
            user_id: "api".to_string(),
            channel_id: "api".to_string(),
            thread_ts: None,
            message_ts: String::new(),
            channel_kind: ChannelKind::Dm,
            attachments: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bare_question() {
        let input = QuestionInput::bare("How does billing work?");
        assert_eq!(input.text, "How does billing work?");
        assert!(input.attachments.is_empty());
        assert_eq!(input.channel_kind, ChannelKind::Dm);
    }

    #[test]
    fn test_thread_message_constructors() {
        let msg = ThreadMessage::user("hi");
        assert_eq!(msg.role, ThreadRole::User);
        let msg = ThreadMessage::assistant("hello");
        assert_eq!(msg.role, ThreadRole::Assistant);
    }

    #[test]
    fn test_question_input_deserializes_without_optionals() {
        let json = r#"{
            "text": "Can Light handle multi-currency invoicing?",
            "user_id": "U1",
            "channel_id": "C1",
            "message_ts": "1700000000.000100",
            "channel_kind": "channel"
        }"#;
        let input: Result<QuestionInput, _> = serde_json::from_str(json);
        let input = input.unwrap_or_else(|_| QuestionInput::bare(""));
        assert_eq!(input.channel_kind, ChannelKind::Channel);
        assert!(input.thread_ts.is_none());
    }
}
