use std::fmt;
use std::ops::RangeInclusive;
use std::str::FromStr;

use thiserror::Error;

use super::transcript::Transcript;

pub const DEFAULT_TEMPERATURE: f32 = 0.7;
pub const DEFAULT_MAX_OUTPUT_TOKENS: u32 = 512;
pub const TEMPERATURE_RANGE: RangeInclusive<f32> = 0.0..=1.0;
pub const MAX_OUTPUT_TOKENS_RANGE: RangeInclusive<u32> = 50..=2048;

pub const PLACEHOLDER_WARNING: &str =
    "Remember to replace the [placeholders] in the template with your specific values before sending.";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SettingsError {
    #[error("unknown persona '{0}' (expected one of: {})", Persona::labels().join(", "))]
    UnknownPersona(String),
    #[error("unknown template '{0}' (see /templates)")]
    UnknownTemplate(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Persona {
    CreativeWriter,
    TechnicalExpert,
    WittyHistorian,
}

impl Persona {
    pub const ALL: [Persona; 3] = [
        Persona::CreativeWriter,
        Persona::TechnicalExpert,
        Persona::WittyHistorian,
    ];

    pub fn label(self) -> &'static str {
        match self {
            Self::CreativeWriter => "Creative Writer",
            Self::TechnicalExpert => "Technical Expert",
            Self::WittyHistorian => "Witty Historian",
        }
    }

    pub fn labels() -> Vec<&'static str> {
        Self::ALL.iter().map(|persona| persona.label()).collect()
    }
}

impl fmt::Display for Persona {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for Persona {
    type Err = SettingsError;

    /// Accepts the label in any case, with `-`/`_` in place of spaces, or a
    /// 1-based index.
    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let normalized = raw.trim().to_ascii_lowercase().replace(['-', '_'], " ");
        if let Ok(index) = normalized.parse::<usize>() {
            if let Some(persona) = index.checked_sub(1).and_then(|idx| Self::ALL.get(idx)) {
                return Ok(*persona);
            }
        }
        Self::ALL
            .into_iter()
            .find(|persona| persona.label().to_ascii_lowercase() == normalized)
            .ok_or_else(|| SettingsError::UnknownPersona(raw.trim().to_string()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PromptTemplate {
    pub key: &'static str,
    pub body: &'static str,
}

pub const PROMPT_TEMPLATES: &[PromptTemplate] = &[
    PromptTemplate {
        key: "Write a story...",
        body: "Write a compelling story, approximately [# of words] words, about [topic or situation]. Focus on developing [character(s)] and include a clear [plot point/conflict] and a [resolution/theme].",
    },
    PromptTemplate {
        key: "Summarize text...",
        body: "Read the following text and provide a concise, objective summary, no longer than 150 words. Focus on the main arguments and key takeaways, avoiding personal opinions:\n\n[insert text here]",
    },
    PromptTemplate {
        key: "Explain a concept...",
        body: "Explain [concept] in simple, accessible terms for a complete beginner, assuming no prior knowledge. Use analogies or examples to clarify complex ideas.",
    },
    PromptTemplate {
        key: "Write an email...",
        body: "Compose a [professional, polite, formal] email to [recipient] regarding [topic]. The purpose of this email is to [specific goal, e.g., request information, confirm attendance, propose a meeting]. Include a clear call to action if necessary.",
    },
    PromptTemplate {
        key: "Generate a caption...",
        body: "Create a concise and engaging social media caption for [image or post context]. The tone should be [e.g., humorous, inspiring, informative], and it should encourage [desired user action, e.g., likes, comments, clicks].",
    },
    PromptTemplate {
        key: "Describe an image...",
        body: "As an objective observer, describe the key elements and overall scene depicted in the image related to [brief image description]. Focus on visual details, actions, and potential interpretations without making assumptions.",
    },
    PromptTemplate {
        key: "Create a product pitch...",
        body: "Write a persuasive, 60-second product pitch for [product/service], specifically targeting [audience]. Highlight the core benefit, unique selling points, and a clear call to action.",
    },
    PromptTemplate {
        key: "List pros and cons...",
        body: "Analyze [idea, decision, or product] and provide a balanced list of its top [#] pros and top [#] cons. For each point, briefly explain your reasoning.",
    },
];

/// Looks a template up by 1-based number or by key; the key match ignores case
/// and the trailing ellipsis.
pub fn find_template(query: &str) -> Result<&'static PromptTemplate, SettingsError> {
    let trimmed = query.trim();
    if let Ok(index) = trimmed.parse::<usize>() {
        if let Some(template) = index.checked_sub(1).and_then(|idx| PROMPT_TEMPLATES.get(idx)) {
            return Ok(template);
        }
    }
    let wanted = normalize_template_key(trimmed);
    PROMPT_TEMPLATES
        .iter()
        .find(|template| normalize_template_key(template.key) == wanted)
        .ok_or_else(|| SettingsError::UnknownTemplate(trimmed.to_string()))
}

fn normalize_template_key(raw: &str) -> String {
    raw.trim()
        .trim_end_matches('.')
        .trim()
        .to_ascii_lowercase()
}

pub fn clamp_temperature(value: f32) -> f32 {
    if value.is_nan() {
        return DEFAULT_TEMPERATURE;
    }
    value.clamp(*TEMPERATURE_RANGE.start(), *TEMPERATURE_RANGE.end())
}

pub fn clamp_max_output_tokens(value: u64) -> u32 {
    let low = u64::from(*MAX_OUTPUT_TOKENS_RANGE.start());
    let high = u64::from(*MAX_OUTPUT_TOKENS_RANGE.end());
    value.clamp(low, high) as u32
}

/// Generation parameters for one submission. Built fresh from the current form
/// state every time; the numeric fields are always within range.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationConfig {
    pub temperature: f32,
    pub max_output_tokens: u32,
    pub persona: Option<Persona>,
    pub template: Option<&'static PromptTemplate>,
    pub decompose: bool,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            temperature: DEFAULT_TEMPERATURE,
            max_output_tokens: DEFAULT_MAX_OUTPUT_TOKENS,
            persona: None,
            template: None,
            decompose: false,
        }
    }
}

impl GenerationConfig {
    pub fn new(temperature: f32, max_output_tokens: u64) -> Self {
        Self {
            temperature: clamp_temperature(temperature),
            max_output_tokens: clamp_max_output_tokens(max_output_tokens),
            ..Self::default()
        }
    }

    pub fn with_persona(mut self, persona: Option<Persona>) -> Self {
        self.persona = persona;
        self
    }

    pub fn with_template(mut self, template: Option<&'static PromptTemplate>) -> Self {
        self.template = template;
        self
    }

    pub fn with_decompose(mut self, decompose: bool) -> Self {
        self.decompose = decompose;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Autofill {
    pub text: String,
    pub has_placeholders: bool,
}

/// Composed persona/template text for pre-filling the input line. Only offered
/// before the conversation starts and only when both are chosen.
pub fn autofill(config: &GenerationConfig, transcript: &Transcript) -> Option<Autofill> {
    if !transcript.is_empty() {
        return None;
    }
    let persona = config.persona?;
    let template = config.template?;
    let text = format!("Act as a {} to {}", persona.label(), template.body);
    let has_placeholders = text.contains('[') && text.contains(']');
    Some(Autofill {
        text,
        has_placeholders,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_clamps_out_of_range_values() {
        let config = GenerationConfig::new(1.7, 10);
        assert_eq!(config.temperature, 1.0);
        assert_eq!(config.max_output_tokens, 50);

        let config = GenerationConfig::new(-0.2, 100_000);
        assert_eq!(config.temperature, 0.0);
        assert_eq!(config.max_output_tokens, 2048);

        assert_eq!(clamp_temperature(f32::NAN), DEFAULT_TEMPERATURE);
        assert_eq!(GenerationConfig::new(0.3, 700).max_output_tokens, 700);
    }

    #[test]
    fn persona_parses_labels_and_indexes() {
        assert_eq!("technical expert".parse::<Persona>(), Ok(Persona::TechnicalExpert));
        assert_eq!("witty_historian".parse::<Persona>(), Ok(Persona::WittyHistorian));
        assert_eq!("1".parse::<Persona>(), Ok(Persona::CreativeWriter));
        assert_eq!(
            "pirate".parse::<Persona>(),
            Err(SettingsError::UnknownPersona("pirate".to_string()))
        );
        assert!("0".parse::<Persona>().is_err());
    }

    #[test]
    fn template_lookup_by_key_or_number() {
        assert_eq!(find_template("2").map(|t| t.key), Ok("Summarize text..."));
        assert_eq!(find_template("write an email").map(|t| t.key), Ok("Write an email..."));
        assert_eq!(
            find_template("List pros and cons...").map(|t| t.key),
            Ok("List pros and cons...")
        );
        assert!(find_template("9").is_err());
        assert!(find_template("haiku").is_err());
    }

    #[test]
    fn autofill_requires_persona_and_template() {
        let transcript = Transcript::new();
        let config = GenerationConfig::default().with_persona(Some(Persona::CreativeWriter));
        assert!(autofill(&config, &transcript).is_none());

        let template = find_template("Explain a concept...").ok();
        let config = config.with_template(template);
        let fill = autofill(&config, &transcript).unwrap();
        assert!(fill.text.starts_with("Act as a Creative Writer to Explain [concept]"));
        assert!(fill.has_placeholders);
    }

    #[test]
    fn autofill_is_disabled_once_conversation_started() {
        let mut transcript = Transcript::new();
        transcript.push_user("hello", None);
        let config = GenerationConfig::default()
            .with_persona(Some(Persona::WittyHistorian))
            .with_template(find_template("1").ok());
        assert!(autofill(&config, &transcript).is_none());
    }

    #[test]
    fn every_template_has_placeholders() {
        for template in PROMPT_TEMPLATES {
            assert!(template.body.contains('[') && template.body.contains(']'), "{}", template.key);
        }
    }
}
