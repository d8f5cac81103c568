#[derive(Clone, Copy, Debug)]
pub(crate) struct CommandSpec {
    pub command: &'static str,
    pub action: &'static str,
}

pub(crate) const RAW_ARG_COMMANDS: &[CommandSpec] = &[
    CommandSpec {
        command: "persona",
        action: "set_persona",
    },
    CommandSpec {
        command: "template",
        action: "set_template",
    },
    CommandSpec {
        command: "model",
        action: "set_model",
    },
];

/// Slash commands that update a single generation setting. The third field is
/// the settings key the parsed value is stored under.
pub(crate) const SETTING_COMMANDS: &[(&str, &str, SettingKind)] = &[
    ("temperature", "temperature", SettingKind::Float),
    ("tokens", "max_output_tokens", SettingKind::Integer),
    ("max_tokens", "max_output_tokens", SettingKind::Integer),
    ("decompose", "decompose", SettingKind::Toggle),
];

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum SettingKind {
    Float,
    Integer,
    Toggle,
}

pub(crate) const MULTI_PATH_COMMANDS: &[CommandSpec] = &[CommandSpec {
    command: "image",
    action: "set_images",
}];

pub(crate) const NO_ARG_COMMANDS: &[CommandSpec] = &[
    CommandSpec {
        command: "clear",
        action: "clear_chat",
    },
    CommandSpec {
        command: "history",
        action: "history",
    },
    CommandSpec {
        command: "settings",
        action: "settings",
    },
    CommandSpec {
        command: "templates",
        action: "templates",
    },
    CommandSpec {
        command: "quit",
        action: "quit",
    },
    CommandSpec {
        command: "exit",
        action: "quit",
    },
    CommandSpec {
        command: "help",
        action: "help",
    },
];

pub const CHAT_HELP_COMMANDS: &[&str] = &[
    "/clear",
    "/history",
    "/settings",
    "/temperature <0..1>",
    "/tokens <50..2048>",
    "/persona <name|none>",
    "/template <key|number|none>",
    "/templates",
    "/image <path...|none>",
    "/decompose <on|off>",
    "/model <name>",
    "/quit",
];
