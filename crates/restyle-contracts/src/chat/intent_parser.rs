use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::command_registry::{
    CommandSpec, COMPARE_COMMAND, EDIT_PREFIXES, NO_ARG_COMMANDS, RAW_ARG_COMMANDS, SHOP_KEYWORDS,
    SINGLE_PATH_COMMANDS,
};

/// A parsed line of terminal input.
#[derive(Debug, Clone, PartialEq)]
pub struct Intent {
    pub action: String,
    pub raw: String,
    pub message: Option<String>,
    pub command_args: BTreeMap<String, Value>,
}

impl Intent {
    fn new(action: &str, raw: &str) -> Self {
        Self {
            action: action.to_string(),
            raw: raw.to_string(),
            message: None,
            command_args: BTreeMap::new(),
        }
    }
}

/// Where a chat message is routed once an edited image exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageIntent {
    ShopLookup,
    Refine,
    Converse,
}

impl MessageIntent {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ShopLookup => "shop_lookup",
            Self::Refine => "refine",
            Self::Converse => "converse",
        }
    }
}

/// One predicate of the ordered classification list. Predicates receive the
/// lowercased message.
#[derive(Clone, Copy, Debug)]
pub struct IntentRule {
    pub intent: MessageIntent,
    pub matches: fn(&str) -> bool,
}

/// Evaluated in order; the first matching rule wins and anything unmatched
/// falls through to [`MessageIntent::Converse`].
pub const INTENT_RULES: &[IntentRule] = &[
    IntentRule {
        intent: MessageIntent::ShopLookup,
        matches: mentions_shopping,
    },
    IntentRule {
        intent: MessageIntent::Refine,
        matches: starts_with_edit_verb,
    },
];

fn mentions_shopping(lowered: &str) -> bool {
    SHOP_KEYWORDS
        .iter()
        .any(|keyword| lowered.contains(keyword))
}

fn starts_with_edit_verb(lowered: &str) -> bool {
    EDIT_PREFIXES
        .iter()
        .any(|prefix| lowered.starts_with(prefix))
}

pub fn classify_message(text: &str) -> MessageIntent {
    let lowered = text.to_lowercase();
    INTENT_RULES
        .iter()
        .find(|rule| (rule.matches)(&lowered))
        .map(|rule| rule.intent)
        .unwrap_or(MessageIntent::Converse)
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

fn parse_single_path_arg(arg: &str) -> String {
    parse_path_args(arg).join(" ")
}

fn parse_compare_args(arg: &str) -> (Value, String) {
    let parts = parse_path_args(arg);
    let Some(head) = parts.first() else {
        return (Value::Null, String::new());
    };
    match head.trim_end_matches('%').parse::<f64>() {
        Ok(position) if position.is_finite() => {
            let position = serde_json::Number::from_f64(position)
                .map(Value::Number)
                .unwrap_or(Value::Null);
            (position, parts[1..].join(" "))
        }
        _ => (Value::Null, parts.join(" ")),
    }
}

/// Parses one line of terminal input into a slash command or a chat message.
pub fn parse_input(text: &str) -> Intent {
    let raw_trimmed = text.trim();
    if raw_trimmed.is_empty() {
        return Intent::new("noop", text);
    }

    if let Some(slash_tail) = raw_trimmed.strip_prefix('/') {
        let command_len = slash_tail
            .chars()
            .take_while(|ch| ch.is_ascii_alphanumeric() || *ch == '_')
            .count();
        if command_len > 0 {
            let command = slash_tail[..command_len].to_ascii_lowercase();
            let arg = slash_tail[command_len..].trim();

            if let Some(action) = find_action(&command, RAW_ARG_COMMANDS) {
                let mut intent = Intent::new(action, text);
                intent
                    .command_args
                    .insert("style".to_string(), Value::String(arg.to_string()));
                return intent;
            }

            if let Some(action) = find_action(&command, SINGLE_PATH_COMMANDS) {
                let mut intent = Intent::new(action, text);
                intent.command_args.insert(
                    "path".to_string(),
                    Value::String(parse_single_path_arg(arg)),
                );
                return intent;
            }

            if let Some(action) = find_action(&command, NO_ARG_COMMANDS) {
                return Intent::new(action, text);
            }

            if command == COMPARE_COMMAND.command {
                let (position, path) = parse_compare_args(arg);
                let mut intent = Intent::new(COMPARE_COMMAND.action, text);
                intent.command_args.insert("position".to_string(), position);
                intent
                    .command_args
                    .insert("path".to_string(), Value::String(path));
                return intent;
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

    let mut intent = Intent::new("message", text);
    intent.message = Some(raw_trimmed.to_string());
    intent
}
