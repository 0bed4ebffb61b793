mod catalog;

pub use catalog::{style_prompt, welcome_message, Style, StyleCatalog};
