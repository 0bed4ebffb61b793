mod command_registry;
mod intent_parser;

pub use command_registry::{CHAT_HELP_COMMANDS, EDIT_PREFIXES, SHOP_KEYWORDS};
pub use intent_parser::{
    classify_message, parse_input, Intent, IntentRule, MessageIntent, INTENT_RULES,
};
