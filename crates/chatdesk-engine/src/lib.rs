mod attachments;
mod dryrun;
mod gemini;
mod newsapi;

use std::collections::BTreeMap;
use std::time::Duration;

use anyhow::{bail, Result};
use chatdesk_contracts::chat::prompts::{
    decompose_execute_prompt, decompose_plan_prompt, news_extraction_prompt, news_summary_prompt,
};
use chatdesk_contracts::chat::{classify_route, Route};
use chatdesk_contracts::events::EventWriter;
use chatdesk_contracts::models::{ModelRegistry, ModelSelection, ModelSelector, ModelSpec};
use chatdesk_contracts::news::{
    headline_failure_text, parse_news_query, Extraction, HeadlineResult,
};
use chatdesk_contracts::session::{GenerationConfig, ImageAttachment, Session};
use serde_json::{json, Map, Value};
use tracing::{debug, info, warn};

pub use attachments::{load_image_attachment, MAX_IMAGE_DIM};
pub use dryrun::{DryrunHeadlines, DryrunProvider};
pub use gemini::{GeminiProvider, DEFAULT_GEMINI_API_BASE};
pub use newsapi::{NewsApiSource, DEFAULT_NEWS_API_BASE};

pub const EMPTY_PROMPT_WARNING: &str = "Prompt can't be empty.";
const ERROR_TEXT_LIMIT: usize = 600;

#[derive(Debug, Clone)]
pub struct GenerateRequest {
    pub model: String,
    pub prompt: String,
    pub image: Option<ImageAttachment>,
    pub temperature: f32,
    pub max_output_tokens: u32,
}

/// Text deltas in generation order. Finite; dropping it abandons the request.
pub type TextStream = Box<dyn Iterator<Item = Result<String>> + Send>;

pub trait TextProvider: Send + Sync {
    fn name(&self) -> &str;
    fn generate(&self, request: &GenerateRequest) -> Result<String>;
    fn generate_stream(&self, request: &GenerateRequest) -> Result<TextStream>;
}

#[derive(Default)]
pub struct TextProviderRegistry {
    providers: BTreeMap<String, Box<dyn TextProvider>>,
}

impl TextProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<P: TextProvider + 'static>(&mut self, provider: P) {
        self.providers
            .insert(provider.name().to_string(), Box::new(provider));
    }

    pub fn get(&self, name: &str) -> Option<&dyn TextProvider> {
        self.providers.get(name).map(|provider| provider.as_ref())
    }
}

pub trait HeadlineSource: Send + Sync {
    fn name(&self) -> &str;
    /// `Ok` covers both article lists and provider error envelopes; `Err` is
    /// reserved for transport and decode failures.
    fn fetch(&self, country: &str, category: &str) -> Result<HeadlineResult>;
}

/// Presentation hooks for one turn. Every method defaults to doing nothing.
pub trait ChatObserver {
    fn status(&mut self, _label: &str) {}
    fn status_done(&mut self, _label: &str) {}
    fn detail(&mut self, _text: &str) {}
    fn warning(&mut self, _text: &str) {}
    fn delta(&mut self, _text: &str) {}
    fn error(&mut self, _text: &str) {}
}

pub struct NullObserver;

impl ChatObserver for NullObserver {}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurnOutcome {
    Rejected {
        warning: String,
    },
    Answered {
        route: Route,
        reply: String,
        failed: bool,
    },
}

#[derive(Debug, Clone, Default)]
pub struct EngineSettings {
    pub model: Option<String>,
    pub gemini_api_key: Option<String>,
    pub gemini_api_base: Option<String>,
    pub news_api_key: Option<String>,
    pub news_api_base: Option<String>,
    pub request_timeout: Option<Duration>,
    /// Use the dryrun provider and headlines; no network.
    pub offline: bool,
}

pub struct ChatEngine {
    providers: TextProviderRegistry,
    headlines: Box<dyn HeadlineSource>,
    model_selector: ModelSelector,
    model: ModelSpec,
    events: EventWriter,
    last_fallback_reason: Option<String>,
}

/// Reply text of one answered turn; `error` is set when generation failed.
struct Answer {
    text: String,
    error: Option<String>,
}

impl Answer {
    fn failed(partial: String, err: &anyhow::Error) -> Self {
        Self {
            text: partial,
            error: Some(error_chain_text(err, ERROR_TEXT_LIMIT)),
        }
    }

    /// Final transcript text plus the `Error: ...` line when generation failed.
    fn into_reply(self) -> (String, Option<String>) {
        let Some(error) = self.error else {
            return (self.text, None);
        };
        let error_line = format!("Error: {error}");
        if self.text.is_empty() {
            return (error_line.clone(), Some(error_line));
        }
        (format!("{}\n\n{error_line}", self.text), Some(error_line))
    }
}

impl ChatEngine {
    pub fn new(
        providers: TextProviderRegistry,
        headlines: Box<dyn HeadlineSource>,
        model: Option<&str>,
        events: EventWriter,
    ) -> Result<Self> {
        let model_selector = ModelSelector::new(ModelRegistry::default());
        let ModelSelection {
            model,
            fallback_reason: last_fallback_reason,
        } = resolve_model(&model_selector, &providers, model)?;
        events.emit(
            "session_started",
            map_object(json!({
                "model": model.name,
                "provider": model.provider,
                "headline_source": headlines.name(),
                "fallback_reason": last_fallback_reason,
            })),
        )?;
        info!(model = %model.name, headlines = headlines.name(), "chat engine ready");
        Ok(Self {
            providers,
            headlines,
            model_selector,
            model,
            events,
            last_fallback_reason,
        })
    }

    pub fn from_settings(settings: &EngineSettings, events: EventWriter) -> Result<Self> {
        let mut providers = TextProviderRegistry::new();
        providers.register(DryrunProvider);
        if settings.offline {
            return Self::new(
                providers,
                Box::new(DryrunHeadlines),
                Some("dryrun-text-1"),
                events,
            );
        }
        providers.register(GeminiProvider::new(
            settings.gemini_api_key.clone(),
            settings.gemini_api_base.clone(),
            settings.request_timeout,
        )?);
        let headlines = NewsApiSource::new(
            settings.news_api_key.clone(),
            settings.news_api_base.clone(),
            settings.request_timeout,
        )?;
        Self::new(
            providers,
            Box::new(headlines),
            settings.model.as_deref(),
            events,
        )
    }

    /// Switches the text model. Returns the fallback reason when the requested
    /// name was unknown and the default was picked instead. A known model whose
    /// provider is not registered is refused and the current model is kept.
    pub fn set_model(&mut self, requested: Option<&str>) -> Result<Option<&str>> {
        let selection = resolve_model(&self.model_selector, &self.providers, requested)?;
        debug!(model = %selection.model.name, fallback_reason = ?selection.fallback_reason, "model selected");
        self.model = selection.model;
        self.last_fallback_reason = selection.fallback_reason;
        Ok(self.last_fallback_reason.as_deref())
    }

    pub fn model(&self) -> &ModelSpec {
        &self.model
    }

    pub fn last_fallback_reason(&self) -> Option<&str> {
        self.last_fallback_reason.as_deref()
    }

    pub fn headline_source(&self) -> &str {
        self.headlines.name()
    }

    pub fn clear(&self, session: &mut Session) {
        let dropped = session.transcript().len();
        session.reset();
        self.record("transcript_cleared", json!({ "messages_dropped": dropped }));
        info!(dropped, "transcript cleared");
    }

    /// Runs one turn. Generation, headline and event log failures never end
    /// the turn; `Err` only means the transcript refused the reply.
    pub fn submit(
        &self,
        session: &mut Session,
        utterance: &str,
        config: &GenerationConfig,
        images: &[ImageAttachment],
        observer: &mut dyn ChatObserver,
    ) -> Result<TurnOutcome> {
        if utterance.trim().is_empty() {
            observer.warning(EMPTY_PROMPT_WARNING);
            self.record("turn_rejected", json!({ "reason": EMPTY_PROMPT_WARNING }));
            return Ok(TurnOutcome::Rejected {
                warning: EMPTY_PROMPT_WARNING.to_string(),
            });
        }

        let image = images.first().cloned();
        let context = session.transcript().running_context(utterance);
        session
            .transcript_mut()
            .push_user(utterance, image.clone());
        self.record(
            "user_message",
            json!({
                "content": utterance,
                "image_path": image.as_ref().map(|item| item.path.as_str()),
                "image_sha256": image.as_ref().map(|item| item.sha256.as_str()),
            }),
        );

        let route = classify_route(utterance);
        self.record(
            "route_selected",
            json!({ "route": route.as_str(), "model": self.model.name }),
        );
        info!(route = route.as_str(), model = %self.model.name, "turn started");

        let answer = match route {
            Route::Headlines => self.answer_headlines(utterance, config, observer),
            Route::Direct => self.answer_direct(&context, image, config, observer),
        };
        let (reply, error_line) = answer.into_reply();
        let failed = error_line.is_some();
        if let Some(error_line) = error_line.as_deref() {
            warn!(route = route.as_str(), "{error_line}");
            observer.error(error_line);
            self.record(
                "generation_failed",
                json!({ "route": route.as_str(), "error": error_line }),
            );
        }
        session.transcript_mut().push_assistant(reply.clone())?;
        self.record(
            "assistant_message",
            json!({
                "route": route.as_str(),
                "content": reply,
                "failed": failed,
            }),
        );
        Ok(TurnOutcome::Answered {
            route,
            reply,
            failed,
        })
    }

    fn answer_headlines(
        &self,
        utterance: &str,
        config: &GenerationConfig,
        observer: &mut dyn ChatObserver,
    ) -> Answer {
        let provider = match self.provider() {
            Ok(provider) => provider,
            Err(err) => return Answer::failed(String::new(), &err),
        };

        observer.status("Extracting news topic and country...");
        let extraction_request = self.request(news_extraction_prompt(utterance), None, config);
        let extraction = match provider.generate(&extraction_request) {
            Ok(reply) => parse_news_query(&reply),
            Err(err) => Extraction::defaulted(error_chain_text(&err, ERROR_TEXT_LIMIT)),
        };
        if let Some(message) = extraction.warning.as_deref() {
            warn!("{message}");
            observer.warning(message);
        }
        let query = extraction.query;
        observer.detail(&format!(
            "**Inputs:** Country: `{}` | Category: `{}`",
            query.country.to_uppercase(),
            query.category
        ));
        observer.status_done("Tool inputs ready");
        self.record(
            "news_inputs",
            json!({
                "country": query.country,
                "category": query.category,
                "warning": extraction.warning,
            }),
        );

        observer.status("Fetching news...");
        let (headlines, ok) = match self.headlines.fetch(&query.country, &query.category) {
            Ok(result) => (result.render(), result.is_ok()),
            Err(err) => {
                warn!(source = self.headlines.name(), "headline fetch failed: {err:#}");
                (
                    headline_failure_text(error_chain_text(&err, ERROR_TEXT_LIMIT)),
                    false,
                )
            }
        };
        observer.detail(&headlines);
        observer.status_done("News fetched");
        self.record(
            "headlines_fetched",
            json!({
                "source": self.headlines.name(),
                "country": query.country,
                "category": query.category,
                "ok": ok,
                "text": headlines,
            }),
        );

        let summary_prompt = news_summary_prompt(&query.country, &query.category, &headlines);
        observer.status("Generating response...");
        self.stream_answer(provider, &self.request(summary_prompt, None, config), observer)
    }

    fn answer_direct(
        &self,
        context: &str,
        image: Option<ImageAttachment>,
        config: &GenerationConfig,
        observer: &mut dyn ChatObserver,
    ) -> Answer {
        let provider = match self.provider() {
            Ok(provider) => provider,
            Err(err) => return Answer::failed(String::new(), &err),
        };
        let image = match image {
            Some(image) if !self.model.accepts_images() => {
                let message = format!(
                    "{} does not accept images; sending text only.",
                    self.model.name
                );
                warn!(path = %image.path, "{message}");
                observer.warning(&message);
                None
            }
            other => other,
        };

        let prompt = if config.decompose {
            observer.status("Planning subtasks...");
            let plan_request = self.request(decompose_plan_prompt(context), image.clone(), config);
            let plan = match provider.generate(&plan_request) {
                Ok(plan) => plan.trim().to_string(),
                Err(err) => return Answer::failed(String::new(), &err),
            };
            observer.detail(&format!("**Plan:**\n{plan}"));
            observer.status_done("Plan ready");
            self.record("plan_created", json!({ "plan": plan }));
            decompose_execute_prompt(context, &plan)
        } else {
            context.to_string()
        };

        observer.status("Generating response...");
        self.stream_answer(provider, &self.request(prompt, image, config), observer)
    }

    fn stream_answer(
        &self,
        provider: &dyn TextProvider,
        request: &GenerateRequest,
        observer: &mut dyn ChatObserver,
    ) -> Answer {
        let stream = match provider.generate_stream(request) {
            Ok(stream) => stream,
            Err(err) => return Answer::failed(String::new(), &err),
        };
        let mut text = String::new();
        for item in stream {
            match item {
                Ok(delta) => {
                    observer.delta(&delta);
                    text.push_str(&delta);
                }
                Err(err) => return Answer::failed(text, &err),
            }
        }
        debug!(chars = text.chars().count(), "stream finished");
        Answer { text, error: None }
    }

    fn provider(&self) -> Result<&dyn TextProvider> {
        match self.providers.get(&self.model.provider) {
            Some(provider) => Ok(provider),
            None => bail!(
                "provider '{}' for model '{}' is not registered",
                self.model.provider,
                self.model.name
            ),
        }
    }

    /// Event log failures are logged and never end the turn.
    fn record(&self, event_type: &str, payload: Value) {
        if let Err(err) = self.events.emit(event_type, map_object(payload)) {
            warn!(event_type, "event log write failed: {err:#}");
        }
    }

    fn request(
        &self,
        prompt: String,
        image: Option<ImageAttachment>,
        config: &GenerationConfig,
    ) -> GenerateRequest {
        GenerateRequest {
            model: self.model.name.clone(),
            prompt,
            image,
            temperature: config.temperature,
            max_output_tokens: config.max_output_tokens,
        }
    }
}

fn resolve_model(
    selector: &ModelSelector,
    providers: &TextProviderRegistry,
    requested: Option<&str>,
) -> Result<ModelSelection> {
    Ok(selector.select(requested, |model| providers.get(&model.provider).is_some())?)
}

fn error_chain_text(err: &anyhow::Error, max_chars: usize) -> String {
    let mut parts = Vec::new();
    for cause in err.chain() {
        let text = cause.to_string();
        let trimmed = text.trim();
        if trimmed.is_empty() {
            continue;
        }
        if parts
            .last()
            .map(|existing| existing == trimmed)
            .unwrap_or(false)
        {
            continue;
        }
        parts.push(trimmed.to_string());
    }
    if parts.is_empty() {
        return truncate_text(&err.to_string(), max_chars);
    }
    truncate_text(&parts.join(" | caused by: "), max_chars)
}

pub(crate) fn truncate_text(value: &str, max_chars: usize) -> String {
    if value.chars().count() <= max_chars {
        return value.to_string();
    }
    value.chars().take(max_chars).collect::<String>() + "…"
}

fn map_object(value: Value) -> Map<String, Value> {
    value.as_object().cloned().unwrap_or_default()
}
