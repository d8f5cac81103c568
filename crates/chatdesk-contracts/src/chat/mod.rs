mod command_registry;
mod intent_parser;
pub mod prompts;

pub use command_registry::CHAT_HELP_COMMANDS;
pub use intent_parser::{classify_route, parse_intent, Intent, Route};
