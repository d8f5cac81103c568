use std::collections::BTreeMap;

use serde_json::Value;

use super::command_registry::{
    CommandSpec, SettingKind, MULTI_PATH_COMMANDS, NO_ARG_COMMANDS, RAW_ARG_COMMANDS,
    SETTING_COMMANDS,
};

#[derive(Debug, Clone, PartialEq)]
pub struct Intent {
    pub action: String,
    pub raw: String,
    pub prompt: Option<String>,
    pub settings_update: BTreeMap<String, Value>,
    pub command_args: BTreeMap<String, Value>,
}

impl Intent {
    fn new(action: &str, raw: &str) -> Self {
        Self {
            action: action.to_string(),
            raw: raw.to_string(),
            prompt: None,
            settings_update: BTreeMap::new(),
            command_args: BTreeMap::new(),
        }
    }
}

/// Which branch of the orchestrator an utterance takes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    Headlines,
    Direct,
}

impl Route {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Headlines => "headlines",
            Self::Direct => "direct",
        }
    }
}

/// Plain substring test on the lowercased utterance. "What's the news about my
/// health" is routed to headlines too.
pub fn classify_route(utterance: &str) -> Route {
    let lowered = utterance.to_lowercase();
    if lowered.contains("news") || lowered.contains("headlines") {
        Route::Headlines
    } else {
        Route::Direct
    }
}

fn find_action(command: &str, specs: &[CommandSpec]) -> Option<&'static str> {
    specs
        .iter()
        .find(|spec| spec.command == command)
        .map(|spec| spec.action)
}

fn parse_path_args(arg: &str) -> Vec<String> {
    if arg.trim().is_empty() {
        return Vec::new();
    }
    match shell_words::split(arg) {
        Ok(parts) => parts
            .into_iter()
            .filter(|value| !value.is_empty())
            .collect(),
        Err(_) => arg
            .split_whitespace()
            .map(str::to_string)
            .filter(|value| !value.is_empty())
            .collect(),
    }
}

fn parse_toggle(arg: &str) -> Option<bool> {
    match arg.trim().to_ascii_lowercase().as_str() {
        "on" | "true" | "yes" | "1" => Some(true),
        "off" | "false" | "no" | "0" => Some(false),
        _ => None,
    }
}

fn parse_setting_value(kind: SettingKind, arg: &str) -> Option<Value> {
    let trimmed = arg.trim();
    match kind {
        SettingKind::Float => trimmed
            .parse::<f64>()
            .ok()
            .filter(|value| value.is_finite())
            .and_then(serde_json::Number::from_f64)
            .map(Value::Number),
        SettingKind::Integer => trimmed
            .parse::<u64>()
            .ok()
            .map(|value| Value::Number(value.into())),
        SettingKind::Toggle => parse_toggle(trimmed).map(Value::Bool),
    }
}

/// Turns one submitted input line into an intent. Anything that is not a known
/// slash command is a chat utterance, including blank input (the orchestrator
/// rejects blank utterances with a warning).
pub fn parse_intent(text: &str) -> Intent {
    let raw_trimmed = text.trim();

    if let Some(slash_tail) = raw_trimmed.strip_prefix('/') {
        let command_len = slash_tail
            .chars()
            .take_while(|ch| ch.is_ascii_alphanumeric() || *ch == '_')
            .count();
        if command_len > 0 {
            let command = slash_tail[..command_len].to_ascii_lowercase();
            let arg = slash_tail[command_len..].trim();

            if let Some(action) = find_action(&command, RAW_ARG_COMMANDS) {
                let key = match action {
                    "set_persona" => "persona",
                    "set_template" => "template",
                    _ => "model",
                };
                let mut intent = Intent::new(action, text);
                intent
                    .command_args
                    .insert(key.to_string(), Value::String(arg.to_string()));
                return intent;
            }

            if let Some((_, key, kind)) = SETTING_COMMANDS
                .iter()
                .find(|(name, _, _)| *name == command)
            {
                let Some(value) = parse_setting_value(*kind, arg) else {
                    let mut intent = Intent::new("invalid_setting", text);
                    intent
                        .command_args
                        .insert("command".to_string(), Value::String(command));
                    intent
                        .command_args
                        .insert("arg".to_string(), Value::String(arg.to_string()));
                    return intent;
                };
                let mut intent = Intent::new("update_settings", text);
                intent.settings_update.insert((*key).to_string(), value);
                return intent;
            }

            if let Some(action) = find_action(&command, MULTI_PATH_COMMANDS) {
                let mut intent = Intent::new(action, text);
                let paths = parse_path_args(arg);
                let clear = paths.is_empty()
                    || (paths.len() == 1 && paths[0].eq_ignore_ascii_case("none"));
                intent.command_args.insert(
                    "paths".to_string(),
                    if clear {
                        Value::Array(Vec::new())
                    } else {
                        Value::Array(paths.into_iter().map(Value::String).collect())
                    },
                );
                return intent;
            }

            if let Some(action) = find_action(&command, NO_ARG_COMMANDS) {
                return Intent::new(action, text);
            }

            let mut intent = Intent::new("unknown", text);
            intent
                .command_args
                .insert("command".to_string(), Value::String(command));
            intent
                .command_args
                .insert("arg".to_string(), Value::String(arg.to_string()));
            return intent;
        }
    }

    let mut intent = Intent::new("chat", text);
    intent.prompt = Some(text.to_string());
    intent
}
