mod config;

use std::collections::BTreeMap;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chatdesk_contracts::chat::{parse_intent, CHAT_HELP_COMMANDS};
use chatdesk_contracts::events::EventWriter;
use chatdesk_contracts::session::{
    autofill, clamp_max_output_tokens, clamp_temperature, find_template, GenerationConfig,
    ImageAttachment, Persona, PromptTemplate, Session, PLACEHOLDER_WARNING, PROMPT_TEMPLATES,
};
use chatdesk_engine::{load_image_attachment, ChatEngine, ChatObserver, EngineSettings, TurnOutcome};
use clap::{Args, Parser, Subcommand};
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use serde_json::Value;
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

use crate::config::{load_config, process_env, Config, GenerationDefaults, LoggingConfig, Secrets};

#[derive(Debug, Parser)]
#[command(name = "chatdesk", version, about = "Terminal chat over Gemini with a news-headline tool")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Interactive chat session.
    Chat(SessionArgs),
    /// Send one message and print the reply.
    Ask(AskArgs),
    /// List personas and prompt templates.
    Templates,
}

#[derive(Debug, Clone, Args)]
struct SessionArgs {
    /// Config file (defaults to ./chatdesk.toml when present).
    #[arg(long)]
    config: Option<PathBuf>,
    /// Secrets file with GOOGLE_API_KEY / NEWS_API_KEY (defaults to ./secrets.toml when present).
    #[arg(long)]
    secrets: Option<PathBuf>,
    #[arg(long)]
    model: Option<String>,
    #[arg(long)]
    temperature: Option<f32>,
    #[arg(long)]
    max_tokens: Option<u64>,
    #[arg(long)]
    persona: Option<String>,
    #[arg(long)]
    template: Option<String>,
    #[arg(long = "image")]
    images: Vec<PathBuf>,
    #[arg(long)]
    decompose: bool,
    /// Append session events as JSONL to this file.
    #[arg(long)]
    events: Option<PathBuf>,
    /// Use the built-in dryrun model and headlines; no network access.
    #[arg(long)]
    offline: bool,
}

#[derive(Debug, Clone, Args)]
struct AskArgs {
    #[arg(long)]
    prompt: String,
    #[command(flatten)]
    session: SessionArgs,
}

fn main() {
    match run() {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("chatdesk error: {err:#}");
            std::process::exit(1);
        }
    }
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    match cli.command {
        Command::Chat(args) => {
            run_chat(args)?;
            Ok(0)
        }
        Command::Ask(args) => run_ask(args),
        Command::Templates => {
            print_templates();
            Ok(0)
        }
    }
}

/// Form values that feed every submission. Numeric fields are kept clamped.
#[derive(Debug, Clone, PartialEq)]
struct FormState {
    temperature: f32,
    max_output_tokens: u32,
    persona: Option<Persona>,
    template: Option<&'static PromptTemplate>,
    decompose: bool,
    images: Vec<ImageAttachment>,
}

impl FormState {
    fn new(defaults: &GenerationDefaults, args: &SessionArgs) -> Result<Self> {
        let persona = args.persona.as_deref().or(defaults.persona.as_deref());
        let template = args.template.as_deref().or(defaults.template.as_deref());
        let images = args
            .images
            .iter()
            .map(|path| load_image_attachment(path))
            .collect::<Result<Vec<ImageAttachment>>>()?;
        Ok(Self {
            temperature: clamp_temperature(args.temperature.unwrap_or(defaults.temperature)),
            max_output_tokens: clamp_max_output_tokens(
                args.max_tokens.unwrap_or(defaults.max_output_tokens),
            ),
            persona: parse_persona_choice(persona.unwrap_or_default())?,
            template: parse_template_choice(template.unwrap_or_default())?,
            decompose: args.decompose || defaults.decompose,
            images,
        })
    }

    fn generation_config(&self) -> GenerationConfig {
        GenerationConfig::new(self.temperature, u64::from(self.max_output_tokens))
            .with_persona(self.persona)
            .with_template(self.template)
            .with_decompose(self.decompose)
    }

    /// Applies `/temperature`, `/tokens` and `/decompose` updates and returns
    /// one confirmation line per applied key.
    fn apply_settings(&mut self, update: &BTreeMap<String, Value>) -> Vec<String> {
        let mut applied = Vec::new();
        for (key, value) in update {
            match key.as_str() {
                "temperature" => {
                    if let Some(raw) = value.as_f64() {
                        self.temperature = clamp_temperature(raw as f32);
                        applied.push(format!("Temperature set to {}", self.temperature));
                    }
                }
                "max_output_tokens" => {
                    if let Some(raw) = value.as_u64() {
                        self.max_output_tokens = clamp_max_output_tokens(raw);
                        applied.push(format!("Max output tokens set to {}", self.max_output_tokens));
                    }
                }
                "decompose" => {
                    if let Some(flag) = value.as_bool() {
                        self.decompose = flag;
                        applied.push(format!("Decompose mode {}", on_off(flag)));
                    }
                }
                _ => {}
            }
        }
        applied
    }
}

fn parse_persona_choice(raw: &str) -> Result<Option<Persona>> {
    let trimmed = raw.trim();
    if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("none") {
        return Ok(None);
    }
    Ok(Some(trimmed.parse::<Persona>()?))
}

fn parse_template_choice(raw: &str) -> Result<Option<&'static PromptTemplate>> {
    let trimmed = raw.trim();
    if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("none") {
        return Ok(None);
    }
    Ok(Some(find_template(trimmed)?))
}

/// Everything a session needs, built from config, secrets and flags.
struct ChatRuntime {
    engine: ChatEngine,
    session: Session,
    form: FormState,
    _log_guard: Option<WorkerGuard>,
}

fn prepare_runtime(args: &SessionArgs) -> Result<ChatRuntime> {
    let config = load_config(args.config.as_deref())?;
    let log_guard = init_tracing(&config.logging)?;
    let secrets = Secrets::load(args.secrets.as_deref())?;
    let keys = secrets.resolve(process_env);

    let session = Session::new();
    let events = match args.events.as_ref() {
        Some(path) => EventWriter::new(path, session.id()),
        None => EventWriter::disabled(session.id()),
    };
    let settings = engine_settings(&config, args, keys.gemini, keys.news);
    let engine = ChatEngine::from_settings(&settings, events)?;
    if let Some(reason) = engine.last_fallback_reason() {
        eprintln!("Warning: {reason}");
    }
    let form = FormState::new(&config.generation, args)?;
    info!(session = session.id(), model = %engine.model().name, "session started");
    Ok(ChatRuntime {
        engine,
        session,
        form,
        _log_guard: log_guard,
    })
}

fn engine_settings(
    config: &Config,
    args: &SessionArgs,
    gemini_api_key: Option<String>,
    news_api_key: Option<String>,
) -> EngineSettings {
    EngineSettings {
        model: Some(args.model.clone().unwrap_or_else(|| config.api.model.clone())),
        gemini_api_key,
        gemini_api_base: config.api.api_base.clone(),
        news_api_key,
        news_api_base: config.news.api_base.clone(),
        request_timeout: config.api.request_timeout(),
        offline: args.offline,
    }
}

fn init_tracing(logging: &LoggingConfig) -> Result<Option<WorkerGuard>> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(&logging.level)
            .with_context(|| format!("invalid [logging] level '{}'", logging.level))?,
    };
    let Some(file) = logging.file.as_ref() else {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(io::stderr)
            .with_target(false)
            .try_init();
        return Ok(None);
    };

    let dir = file
        .parent()
        .filter(|parent| !parent.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let name = file
        .file_name()
        .with_context(|| format!("[logging] file has no file name: {}", file.display()))?;
    fs::create_dir_all(dir).with_context(|| format!("failed creating {}", dir.display()))?;
    let (writer, guard) = tracing_appender::non_blocking(tracing_appender::rolling::never(dir, name));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(writer)
        .with_ansi(false)
        .try_init();
    Ok(Some(guard))
}

/// Streams replies to stdout; progress and warnings go to stderr.
#[derive(Default)]
struct TerminalObserver {
    streaming: bool,
}

impl TerminalObserver {
    fn finish_turn(&mut self) {
        if self.streaming {
            println!();
            self.streaming = false;
        }
    }
}

impl ChatObserver for TerminalObserver {
    fn status(&mut self, label: &str) {
        eprintln!("[{label}]");
    }

    fn status_done(&mut self, label: &str) {
        eprintln!("[done] {label}");
    }

    fn detail(&mut self, text: &str) {
        eprintln!("{text}");
    }

    fn warning(&mut self, text: &str) {
        eprintln!("Warning: {text}");
    }

    fn delta(&mut self, text: &str) {
        print!("{text}");
        let _ = io::stdout().flush();
        self.streaming = true;
    }

    fn error(&mut self, text: &str) {
        if self.streaming {
            println!("\n");
            self.streaming = false;
        }
        println!("{text}");
    }
}

fn run_ask(args: AskArgs) -> Result<i32> {
    let ChatRuntime {
        engine,
        mut session,
        form,
        _log_guard,
    } = prepare_runtime(&args.session)?;
    let mut observer = TerminalObserver::default();
    let outcome = engine.submit(
        &mut session,
        &args.prompt,
        &form.generation_config(),
        &form.images,
        &mut observer,
    )?;
    observer.finish_turn();
    Ok(match outcome {
        TurnOutcome::Answered { failed: false, .. } => 0,
        _ => 1,
    })
}

fn run_chat(args: SessionArgs) -> Result<()> {
    let ChatRuntime {
        mut engine,
        mut session,
        mut form,
        _log_guard,
    } = prepare_runtime(&args)?;
    let mut editor = DefaultEditor::new()?;
    let mut observer = TerminalObserver::default();
    let mut last_autofill: Option<String> = None;

    println!(
        "chatdesk ({}). Type /help for commands.",
        engine.model().name
    );

    loop {
        let prefill = autofill(&form.generation_config(), session.transcript());
        if let Some(fill) = prefill.as_ref() {
            if fill.has_placeholders && last_autofill.as_deref() != Some(fill.text.as_str()) {
                println!("{PLACEHOLDER_WARNING}");
            }
        }
        last_autofill = prefill.as_ref().map(|fill| fill.text.clone());

        let read = match prefill.as_ref() {
            Some(fill) => editor.readline_with_initial("> ", (fill.text.as_str(), "")),
            None => editor.readline("> "),
        };
        let line = match read {
            Ok(line) => line,
            Err(ReadlineError::Interrupted) => continue,
            Err(ReadlineError::Eof) => break,
            Err(err) => return Err(err.into()),
        };
        if !line.trim().is_empty() {
            let _ = editor.add_history_entry(line.as_str());
        }

        let intent = parse_intent(&line);
        match intent.action.as_str() {
            "chat" => {
                let prompt = intent.prompt.as_deref().unwrap_or_default();
                let outcome = engine.submit(
                    &mut session,
                    prompt,
                    &form.generation_config(),
                    &form.images,
                    &mut observer,
                );
                observer.finish_turn();
                if let Err(err) = outcome {
                    warn!("turn failed: {err:#}");
                    eprintln!("Turn failed: {err:#}");
                }
            }
            "help" => {
                println!("Commands: {}", CHAT_HELP_COMMANDS.join(" "));
                println!("Anything else is sent as a message. Mention \"news\" or \"headlines\" to fetch top stories.");
            }
            "clear_chat" => {
                engine.clear(&mut session);
                println!("Chat cleared.");
            }
            "history" => print_history(&session),
            "settings" => print_settings(&engine, &form),
            "templates" => print_templates(),
            "update_settings" => {
                for line in form.apply_settings(&intent.settings_update) {
                    println!("{line}");
                }
            }
            "invalid_setting" => {
                let command = value_text(intent.command_args.get("command"));
                let arg = value_text(intent.command_args.get("arg"));
                println!("Invalid value for /{command}: '{arg}'");
            }
            "set_persona" => {
                let raw = value_text(intent.command_args.get("persona"));
                match parse_persona_choice(&raw) {
                    Ok(persona) => {
                        form.persona = persona;
                        println!("Persona: {}", persona.map(Persona::label).unwrap_or("none"));
                    }
                    Err(err) => println!("{err}"),
                }
            }
            "set_template" => {
                let raw = value_text(intent.command_args.get("template"));
                match parse_template_choice(&raw) {
                    Ok(template) => {
                        form.template = template;
                        println!(
                            "Template: {}",
                            template.map(|item| item.key).unwrap_or("none")
                        );
                    }
                    Err(err) => println!("{err}"),
                }
            }
            "set_images" => {
                let paths = intent
                    .command_args
                    .get("paths")
                    .and_then(Value::as_array)
                    .map(|items| {
                        items
                            .iter()
                            .filter_map(Value::as_str)
                            .map(str::to_string)
                            .collect::<Vec<String>>()
                    })
                    .unwrap_or_default();
                match paths
                    .iter()
                    .map(|path| load_image_attachment(path))
                    .collect::<Result<Vec<ImageAttachment>>>()
                {
                    Ok(images) => {
                        form.images = images;
                        if form.images.is_empty() {
                            println!("Images cleared.");
                        } else {
                            if form.images.len() > 1 {
                                println!("Only the first image is sent with a message.");
                            }
                            println!("Attached: {}", image_list(&form.images));
                        }
                    }
                    Err(err) => println!("Image not attached: {err:#}"),
                }
            }
            "set_model" => {
                let requested = value_text(intent.command_args.get("model"));
                if requested.trim().is_empty() {
                    println!("Model: {}", engine.model().name);
                    continue;
                }
                let switched = engine
                    .set_model(Some(requested.as_str()))
                    .map(|reason| reason.map(str::to_string));
                match switched {
                    Ok(Some(reason)) => println!("{reason}"),
                    Ok(None) => println!("Model: {}", engine.model().name),
                    Err(err) => println!("Model unchanged: {err:#}"),
                }
            }
            "quit" => break,
            "unknown" => {
                let command = value_text(intent.command_args.get("command"));
                println!("Unknown command: /{command}. Type /help for commands.");
            }
            other => warn!(action = other, "unhandled intent"),
        }
    }

    info!(messages = session.transcript().len(), "session ended");
    Ok(())
}

fn print_history(session: &Session) {
    for line in history_lines(session) {
        println!("{line}");
    }
}

fn history_lines(session: &Session) -> Vec<String> {
    let mut lines = vec![format!(
        "Session {} started {}",
        session.id(),
        session.started_at().format("%Y-%m-%d %H:%M:%S UTC")
    )];
    if session.transcript().is_empty() {
        lines.push("(no messages yet)".to_string());
    }
    for message in session.transcript().messages() {
        lines.push(format!(
            "[{}] {}: {}",
            message.created_at.format("%H:%M:%S"),
            message.role.label(),
            message.content
        ));
        if let Some(image) = message.image.as_ref() {
            lines.push(format!("  [image: {}]", image.path));
        }
    }
    lines
}

fn print_settings(engine: &ChatEngine, form: &FormState) {
    println!(
        "Model: {} (headlines: {})",
        engine.model().name,
        engine.headline_source()
    );
    println!("Temperature: {}", form.temperature);
    println!("Max output tokens: {}", form.max_output_tokens);
    println!(
        "Persona: {}",
        form.persona.map(Persona::label).unwrap_or("none")
    );
    println!(
        "Template: {}",
        form.template.map(|item| item.key).unwrap_or("none")
    );
    println!("Decompose: {}", on_off(form.decompose));
    if form.images.is_empty() {
        println!("Images: none");
    } else {
        println!("Images: {}", image_list(&form.images));
    }
}

fn print_templates() {
    println!("Personas:");
    for (idx, persona) in Persona::ALL.iter().enumerate() {
        println!("  {}. {}", idx + 1, persona.label());
    }
    println!("Templates:");
    for (idx, template) in PROMPT_TEMPLATES.iter().enumerate() {
        println!("  {}. {}", idx + 1, template.key);
    }
}

fn image_list(images: &[ImageAttachment]) -> String {
    images
        .iter()
        .map(|image| image.path.as_str())
        .collect::<Vec<&str>>()
        .join(", ")
}

fn on_off(flag: bool) -> &'static str {
    if flag {
        "on"
    } else {
        "off"
    }
}

fn value_text(value: Option<&Value>) -> String {
    value
        .and_then(Value::as_str)
        .map(str::trim)
        .unwrap_or_default()
        .to_string()
}
