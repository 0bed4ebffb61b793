#[derive(Clone, Copy, Debug)]
pub(crate) struct CommandSpec {
    pub command: &'static str,
    pub action: &'static str,
}

/// Substrings that route a chat message to the shoppable-link lookup.
pub const SHOP_KEYWORDS: &[&str] = &["find", "buy", "shop"];

/// Leading words that route a chat message to an image refinement.
pub const EDIT_PREFIXES: &[&str] = &["add", "make", "change", "remove"];

pub(crate) const RAW_ARG_COMMANDS: &[CommandSpec] = &[CommandSpec {
    command: "style",
    action: "select_style",
}];

pub(crate) const SINGLE_PATH_COMMANDS: &[CommandSpec] = &[
    CommandSpec {
        command: "upload",
        action: "upload",
    },
    CommandSpec {
        command: "save",
        action: "save",
    },
];

pub(crate) const NO_ARG_COMMANDS: &[CommandSpec] = &[
    CommandSpec {
        command: "styles",
        action: "list_styles",
    },
    CommandSpec {
        command: "status",
        action: "status",
    },
    CommandSpec {
        command: "help",
        action: "help",
    },
    CommandSpec {
        command: "quit",
        action: "quit",
    },
    CommandSpec {
        command: "exit",
        action: "quit",
    },
];

pub(crate) const COMPARE_COMMAND: CommandSpec = CommandSpec {
    command: "compare",
    action: "compare",
};

pub const CHAT_HELP_COMMANDS: &[&str] = &[
    "/upload <path>",
    "/styles",
    "/style <name|number>",
    "/compare <0-100> <out.png>",
    "/save <out.png>",
    "/status",
    "/help",
    "/quit",
];
