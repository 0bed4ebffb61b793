use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Style {
    pub name: String,
    pub image_url: String,
}

/// Read-only decor styles offered by the style picker, in display order.
#[derive(Debug, Clone)]
pub struct StyleCatalog {
    styles: IndexMap<String, Style>,
}

impl Default for StyleCatalog {
    fn default() -> Self {
        Self::new(None)
    }
}

impl StyleCatalog {
    pub fn new(styles: Option<IndexMap<String, Style>>) -> Self {
        Self {
            styles: styles.unwrap_or_else(default_styles),
        }
    }

    pub fn list(&self) -> impl Iterator<Item = &Style> {
        self.styles.values()
    }

    pub fn len(&self) -> usize {
        self.styles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.styles.is_empty()
    }

    /// Looks a style up by case-insensitive name or by 1-based position.
    pub fn resolve(&self, query: &str) -> Option<&Style> {
        let trimmed = query.trim();
        if trimmed.is_empty() {
            return None;
        }
        if let Ok(index) = trimmed.parse::<usize>() {
            return index
                .checked_sub(1)
                .and_then(|idx| self.styles.get_index(idx))
                .map(|(_, style)| style);
        }
        self.styles
            .values()
            .find(|style| style.name.eq_ignore_ascii_case(trimmed))
    }
}

fn default_styles() -> IndexMap<String, Style> {
    let mut map = IndexMap::new();

    let mut insert = |name: &str, seed: &str| {
        map.insert(
            name.to_string(),
            Style {
                name: name.to_string(),
                image_url: format!("https://picsum.photos/seed/{seed}/200/150"),
            },
        );
    };

    insert("Mid-Century Modern", "modern");
    insert("Scandinavian", "scandinavian");
    insert("Bohemian", "bohemian");
    insert("Minimalist", "minimalist");
    insert("Industrial", "industrial");
    insert("Coastal", "coastal");
    insert("Art Deco", "artdeco");
    insert("Japandi", "japandi");

    map
}

/// Instruction sent with the uploaded room for a style transform.
pub fn style_prompt(style_name: &str) -> String {
    format!(
        "Reimagine this room in a {style_name} style. Keep the original room layout and structure."
    )
}

/// The single bot message that opens the transcript after a successful restyle.
pub fn welcome_message(style_name: &str) -> String {
    format!(
        "Here is your room reimagined in the {style_name} style! You can now use the chat to make further refinements or ask for shoppable links."
    )
}

#[cfg(test)]
mod tests {
    use indexmap::IndexMap;

    use super::{style_prompt, welcome_message, Style, StyleCatalog};

    #[test]
    fn default_catalog_keeps_display_order() {
        let catalog = StyleCatalog::default();
        let names: Vec<&str> = catalog.list().map(|style| style.name.as_str()).collect();
        assert_eq!(
            names,
            vec![
                "Mid-Century Modern",
                "Scandinavian",
                "Bohemian",
                "Minimalist",
                "Industrial",
                "Coastal",
                "Art Deco",
                "Japandi",
            ]
        );
        assert_eq!(
            catalog.resolve("Art Deco").map(|style| style.image_url.as_str()),
            Some("https://picsum.photos/seed/artdeco/200/150")
        );
    }

    #[test]
    fn resolve_by_name_or_position() {
        let catalog = StyleCatalog::default();
        assert_eq!(
            catalog.resolve("  bohemian ").map(|style| style.name.as_str()),
            Some("Bohemian")
        );
        assert_eq!(
            catalog.resolve("1").map(|style| style.name.as_str()),
            Some("Mid-Century Modern")
        );
        assert!(catalog.resolve("0").is_none());
        assert!(catalog.resolve("9").is_none());
        assert!(catalog.resolve("Gothic").is_none());
        assert!(catalog.resolve("").is_none());
    }

    #[test]
    fn custom_catalog_replaces_defaults() {
        let mut styles = IndexMap::new();
        styles.insert(
            "Rustic".to_string(),
            Style {
                name: "Rustic".to_string(),
                image_url: "https://example.com/rustic.png".to_string(),
            },
        );
        let catalog = StyleCatalog::new(Some(styles));
        assert_eq!(catalog.len(), 1);
        assert!(catalog.resolve("Bohemian").is_none());
    }

    #[test]
    fn prompt_substitutes_style_verbatim() {
        assert_eq!(
            style_prompt("Art Deco"),
            "Reimagine this room in a Art Deco style. Keep the original room layout and structure."
        );
        assert_eq!(
            style_prompt("  odd {name} "),
            "Reimagine this room in a   odd {name}  style. Keep the original room layout and structure."
        );
        assert!(welcome_message("Bohemian")
            .starts_with("Here is your room reimagined in the Bohemian style! "));
    }
}
