mod settings;
mod transcript;

use chrono::{DateTime, Utc};
use uuid::Uuid;

pub use settings::{
    autofill, clamp_max_output_tokens, clamp_temperature, find_template, Autofill,
    GenerationConfig, Persona, PromptTemplate, SettingsError, DEFAULT_MAX_OUTPUT_TOKENS,
    DEFAULT_TEMPERATURE, MAX_OUTPUT_TOKENS_RANGE, PLACEHOLDER_WARNING, PROMPT_TEMPLATES,
    TEMPERATURE_RANGE,
};
pub use transcript::{ImageAttachment, Message, Role, Transcript, TranscriptError};

/// One user's conversation. Owned by the caller and handed to the engine by
/// `&mut`; nothing about it is global.
#[derive(Debug, Clone, PartialEq)]
pub struct Session {
    id: String,
    started_at: DateTime<Utc>,
    transcript: Transcript,
}

impl Session {
    pub fn new() -> Self {
        Self::with_id(Uuid::new_v4().to_string())
    }

    pub fn with_id(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            started_at: Utc::now(),
            transcript: Transcript::new(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    pub fn transcript_mut(&mut self) -> &mut Transcript {
        &mut self.transcript
    }

    /// Drops every message; the session id is kept.
    pub fn reset(&mut self) {
        self.transcript.clear();
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}
