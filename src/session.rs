use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::{
    client::StructuredClient,
    error::{FlowError, Result},
    flows,
    models::{ChatTurnRequest, DiagnosisResult, Message, Role},
};

/// Languages offered by the chat assistant.
pub const SUPPORTED_LANGUAGES: &[&str] = &[
    "English", "Spanish", "French", "German", "Chinese", "Japanese", "Arabic", "Hindi",
];

/// Reply shown in place of a model answer when a turn fails.
pub const ERROR_REPLY: &str = "Sorry, I encountered an error. Please try again.";

/// Classification for session history entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EntryKind {
    /// The opening message seeded when a language is picked.
    Greeting,
    Conversation,
    /// Stand-in reply recorded after a failed turn.
    ErrorReply,
}

/// History entry with the metadata a chat UI renders.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionEntry {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub kind: EntryKind,
    pub message: Message,
}

impl SessionEntry {
    fn new(kind: EntryKind, message: Message) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            kind,
            message,
        }
    }

    pub fn new_chat(role: Role, text: impl Into<String>) -> Self {
        let message = match role {
            Role::User => Message::user(text),
            Role::Model => Message::model(text),
        };
        Self::new(EntryKind::Conversation, message)
    }

    pub fn greeting(language: &str) -> Self {
        Self::new(
            EntryKind::Greeting,
            Message::model(format!(
                "Great! I'll chat with you in {language}. How can I help you with your agricultural questions today?"
            )),
        )
    }

    pub fn error_reply() -> Self {
        Self::new(EntryKind::ErrorReply, Message::model(ERROR_REPLY))
    }
}

/// Caller-side state of one chat conversation.
///
/// The chat flow itself is stateless; this type owns the history and threads it into each
/// turn. Turns are serialized by `&mut self`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChatSession {
    language: Option<String>,
    diagnosis: Option<DiagnosisResult>,
    history: Vec<SessionEntry>,
}

impl ChatSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn language(&self) -> Option<&str> {
        self.language.as_deref()
    }

    /// Pick the conversation language. Clears the history and seeds the greeting.
    pub fn select_language(&mut self, language: &str) -> Result<()> {
        let language = SUPPORTED_LANGUAGES
            .iter()
            .find(|l| l.eq_ignore_ascii_case(language.trim()))
            .ok_or_else(|| {
                FlowError::invalid_input(format!(
                    "unsupported language '{language}', expected one of: {}",
                    SUPPORTED_LANGUAGES.join(", ")
                ))
            })?;

        self.language = Some(language.to_string());
        self.history.clear();
        self.history.push(SessionEntry::greeting(language));
        Ok(())
    }

    /// Go back to the language picker. History is dropped.
    pub fn reset_language(&mut self) {
        self.language = None;
        self.history.clear();
    }

    /// Attach (or clear) the diagnosis the assistant should take into account.
    pub fn set_diagnosis(&mut self, diagnosis: Option<DiagnosisResult>) {
        self.diagnosis = diagnosis;
    }

    pub fn diagnosis(&self) -> Option<&DiagnosisResult> {
        self.diagnosis.as_ref()
    }

    pub fn history(&self) -> &[SessionEntry] {
        &self.history
    }

    /// History as plain messages, oldest first.
    pub fn messages(&self) -> Vec<Message> {
        self.history.iter().map(|e| e.message.clone()).collect()
    }

    /// Build the request for `message` from the current history. Does not modify the session.
    pub fn turn_request(&self, message: &str) -> Result<ChatTurnRequest> {
        let language = self
            .language
            .clone()
            .ok_or_else(|| FlowError::invalid_input("select a language before chatting"))?;
        Ok(ChatTurnRequest {
            language,
            history: self.messages(),
            message: message.to_string(),
            diagnosis: self.diagnosis.clone(),
        })
    }

    /// Send one message and record both sides of the turn.
    ///
    /// Blank messages are ignored and return `Ok(None)`. On failure the user message and
    /// an apology are still recorded, and the error is returned.
    pub async fn send(
        &mut self,
        client: &StructuredClient,
        message: &str,
    ) -> Result<Option<String>> {
        let message = message.trim();
        if message.is_empty() {
            return Ok(None);
        }
        let request = self.turn_request(message)?;
        self.history.push(SessionEntry::new_chat(Role::User, message));

        match flows::chat(client, &request).await {
            Ok(reply) => {
                debug!(history_len = self.history.len(), "Chat turn completed");
                self.history
                    .push(SessionEntry::new_chat(Role::Model, reply.response.clone()));
                Ok(Some(reply.response))
            }
            Err(err) => {
                warn!(error = %err, "Chat turn failed");
                self.history.push(SessionEntry::error_reply());
                Err(err)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn selecting_a_language_seeds_the_greeting() {
        let mut session = ChatSession::new();
        session.select_language("spanish").unwrap();

        assert_eq!(session.language(), Some("Spanish"));
        assert_eq!(session.history().len(), 1);
        assert_eq!(session.history()[0].kind, EntryKind::Greeting);
        assert!(session.history()[0].message.content.contains("in Spanish"));
    }

    #[test]
    fn unknown_language_is_rejected() {
        let mut session = ChatSession::new();
        assert!(session.select_language("Klingon").unwrap_err().is_validation());
        assert!(session.language().is_none());
    }

    #[test]
    fn turn_request_excludes_the_new_message() {
        let mut session = ChatSession::new();
        session.select_language("English").unwrap();
        let request = session.turn_request("What is blight?").unwrap();

        assert_eq!(request.history.len(), 1);
        assert_eq!(request.history[0].role, Role::Model);
        assert_eq!(request.message, "What is blight?");
    }

    #[test]
    fn turn_request_needs_a_language() {
        let session = ChatSession::new();
        assert!(session.turn_request("hi").unwrap_err().is_validation());
    }
}
