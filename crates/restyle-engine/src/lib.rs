mod config;
mod dryrun;
mod gateway;
mod gemini;
mod studio;

pub use config::{
    GatewayConfig, DEFAULT_API_BASE, DEFAULT_IMAGE_MODEL, DEFAULT_REQUEST_TIMEOUT_S,
    DEFAULT_TEXT_MODEL,
};
pub use dryrun::DryrunGateway;
pub use gateway::{
    conversation_prompt, default_gateway_registry, flatten_transcript, parse_products,
    product_lookup_prompt, DesignGateway, GatewayError, GatewayRegistry, GatewayResult,
};
pub use gemini::GeminiGateway;
pub use studio::{
    DesignStudio, Outcome, RejectReason, CHAT_FAILURE_MESSAGE, PRODUCTS_CAPTION,
    REFINED_MESSAGE, STYLE_FAILURE_MESSAGE,
};
