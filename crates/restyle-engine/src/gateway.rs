use std::collections::BTreeMap;
use std::sync::Arc;

use restyle_contracts::media::ImagePayload;
use restyle_contracts::session::{Message, Product};
use serde::Deserialize;

use crate::config::GatewayConfig;
use crate::dryrun::DryrunGateway;
use crate::gemini::GeminiGateway;

#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("image generation failed: {0}")]
    GenerationFailed(String),
    #[error("product lookup failed: {0}")]
    LookupFailed(String),
    #[error("chat failed: {0}")]
    ChatFailed(String),
    #[error("gateway not configured: {0}")]
    Config(String),
}

pub type GatewayResult<T> = Result<T, GatewayError>;

/// The generative backend the studio talks to. Every call is a single
/// attempt; identical inputs may produce different outputs.
pub trait DesignGateway: Send + Sync {
    fn name(&self) -> &str;

    fn style_transform(&self, image: &ImagePayload, instruction: &str)
        -> GatewayResult<ImagePayload>;

    fn refine(&self, image: &ImagePayload, instruction: &str) -> GatewayResult<ImagePayload> {
        self.style_transform(image, instruction)
    }

    fn find_products(&self, image: &ImagePayload, query: &str) -> GatewayResult<Vec<Product>>;

    fn converse(&self, prior: &[Message], text: &str) -> GatewayResult<String>;
}

#[derive(Default)]
pub struct GatewayRegistry {
    gateways: BTreeMap<String, Arc<dyn DesignGateway>>,
}

impl GatewayRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<G: DesignGateway + 'static>(&mut self, gateway: G) {
        self.gateways
            .insert(gateway.name().to_string(), Arc::new(gateway));
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn DesignGateway>> {
        self.gateways.get(name).cloned()
    }

    pub fn names(&self) -> Vec<String> {
        self.gateways.keys().cloned().collect()
    }
}

pub fn default_gateway_registry(config: &GatewayConfig) -> GatewayRegistry {
    let mut gateways = GatewayRegistry::new();
    gateways.register(DryrunGateway);
    gateways.register(GeminiGateway::new(config.clone()));
    gateways
}

/// Prior turns as `sender: text` lines.
pub fn flatten_transcript(prior: &[Message]) -> String {
    prior
        .iter()
        .map(|message| format!("{}: {}", message.sender.as_str(), message.text))
        .collect::<Vec<String>>()
        .join("\n")
}

pub fn conversation_prompt(prior: &[Message], text: &str) -> String {
    format!(
        "Previous conversation: {}\n\nNew user message: {text}",
        flatten_transcript(prior)
    )
}

pub fn product_lookup_prompt(query: &str) -> String {
    format!(
        "Based on the user's request \"{query}\" and the provided image, find similar furniture or decor items. Provide a list of items."
    )
}

#[derive(Debug, Deserialize)]
struct ProductEnvelope {
    products: Vec<Product>,
}

/// Parses the structured lookup output. `None` means the text did not match
/// the `{ products: [{ itemName, url, price }] }` schema.
pub fn parse_products(text: &str) -> Option<Vec<Product>> {
    serde_json::from_str::<ProductEnvelope>(text.trim())
        .ok()
        .map(|envelope| envelope.products)
}

#[cfg(test)]
mod tests {
    use restyle_contracts::session::Message;

    use super::{
        conversation_prompt, default_gateway_registry, flatten_transcript, parse_products,
        product_lookup_prompt,
    };
    use crate::config::GatewayConfig;

    #[test]
    fn registry_lists_builtin_gateways() {
        let registry = default_gateway_registry(&GatewayConfig::default());
        assert_eq!(registry.names(), vec!["dryrun", "gemini"]);
        assert!(registry.get("gemini").is_some());
        assert!(registry.get("openai").is_none());
    }

    #[test]
    fn transcript_flattens_to_sender_lines() {
        let prior = vec![Message::bot("Welcome"), Message::user("what is japandi?")];
        assert_eq!(
            flatten_transcript(&prior),
            "bot: Welcome\nuser: what is japandi?"
        );
        assert_eq!(
            conversation_prompt(&prior, "and wabi-sabi?"),
            "Previous conversation: bot: Welcome\nuser: what is japandi?\n\nNew user message: and wabi-sabi?"
        );
        assert_eq!(
            conversation_prompt(&[], "hi"),
            "Previous conversation: \n\nNew user message: hi"
        );
    }

    #[test]
    fn lookup_prompt_quotes_the_request() {
        assert!(product_lookup_prompt("find a lamp")
            .starts_with("Based on the user's request \"find a lamp\" and the provided image"));
    }

    #[test]
    fn products_parse_in_order() {
        let products = parse_products(
            r#" {"products":[
                {"itemName":"Lamp X","url":"http://a","price":"$40"},
                {"itemName":"Rug Y","url":"http://b","price":"$90"}
            ]} "#,
        )
        .unwrap_or_default();
        assert_eq!(products.len(), 2);
        assert_eq!(products[0].item_name, "Lamp X");
        assert_eq!(products[1].price, "$90");
    }

    #[test]
    fn schema_violations_yield_none() {
        assert!(parse_products("not json").is_none());
        assert!(parse_products(r#"{"items":[]}"#).is_none());
        assert!(parse_products(r#"{"products":[{"itemName":"Lamp","url":"http://a"}]}"#).is_none());
        assert!(
            parse_products(r#"{"products":[{"itemName":"Lamp","url":"http://a","price":40}]}"#)
                .is_none()
        );
        assert_eq!(parse_products(r#"{"products":[]}"#), Some(Vec::new()));
    }
}
