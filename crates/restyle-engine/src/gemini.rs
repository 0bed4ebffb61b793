use anyhow::{bail, Context, Result};
use reqwest::blocking::{Client as HttpClient, Response as HttpResponse};
use restyle_contracts::media::ImagePayload;
use restyle_contracts::session::{Message, Product};
use serde_json::{json, Value};

use crate::config::GatewayConfig;
use crate::gateway::{
    conversation_prompt, parse_products, product_lookup_prompt, DesignGateway, GatewayError,
    GatewayResult,
};

const SYSTEM_INSTRUCTION: &str = "You are an expert interior design assistant. Your role is to help users understand design styles and provide helpful suggestions based on the conversation and the images they are working with. Be concise and friendly.";

const ERROR_DETAIL_MAX_CHARS: usize = 512;

/// Google Generative Language API transport.
pub struct GeminiGateway {
    config: GatewayConfig,
    http: HttpClient,
}

impl GeminiGateway {
    pub fn new(config: GatewayConfig) -> Self {
        Self {
            config,
            http: HttpClient::new(),
        }
    }

    fn api_key(&self) -> GatewayResult<&str> {
        self.config
            .api_key
            .as_deref()
            .filter(|value| !value.trim().is_empty())
            .ok_or_else(|| {
                GatewayError::Config("GEMINI_API_KEY or GOOGLE_API_KEY not set".to_string())
            })
    }

    fn endpoint_for_model(&self, model: &str) -> String {
        let trimmed = model.trim();
        let model_path = if trimmed.starts_with("models/") {
            trimmed.to_string()
        } else {
            format!("models/{trimmed}")
        };
        format!(
            "{}/{}:generateContent",
            self.config.api_base.trim_end_matches('/'),
            model_path
        )
    }

    fn generate_content(&self, api_key: &str, model: &str, payload: &Value) -> Result<Value> {
        let endpoint = self.endpoint_for_model(model);
        let response = self
            .http
            .post(&endpoint)
            .query(&[("key", api_key)])
            .timeout(self.config.request_timeout())
            .json(payload)
            .send()
            .with_context(|| format!("Gemini request failed ({endpoint})"))?;
        response_json_or_error("Gemini", response)
    }

    fn edit_image(&self, image: &ImagePayload, instruction: &str) -> GatewayResult<ImagePayload> {
        let api_key = self.api_key()?;
        let payload = image_edit_payload(image, instruction);
        let result = self
            .generate_content(api_key, &self.config.image_model, &payload)
            .and_then(|response| {
                first_inline_image(&response)?.context("No image was generated.")
            });
        result.map_err(|err| {
            GatewayError::GenerationFailed(error_chain_text(&err, ERROR_DETAIL_MAX_CHARS))
        })
    }
}

impl DesignGateway for GeminiGateway {
    fn name(&self) -> &str {
        "gemini"
    }

    fn style_transform(
        &self,
        image: &ImagePayload,
        instruction: &str,
    ) -> GatewayResult<ImagePayload> {
        self.edit_image(image, instruction)
    }

    fn find_products(&self, image: &ImagePayload, query: &str) -> GatewayResult<Vec<Product>> {
        let api_key = self.api_key()?;
        let payload = product_lookup_payload(image, query);
        let response = self
            .generate_content(api_key, &self.config.text_model, &payload)
            .map_err(|err| {
                GatewayError::LookupFailed(error_chain_text(&err, ERROR_DETAIL_MAX_CHARS))
            })?;
        Ok(parse_products(&response_text(&response)).unwrap_or_default())
    }

    fn converse(&self, prior: &[Message], text: &str) -> GatewayResult<String> {
        let api_key = self.api_key()?;
        let payload = converse_payload(prior, text);
        let reply = self
            .generate_content(api_key, &self.config.text_model, &payload)
            .and_then(|response| {
                let reply = response_text(&response);
                if reply.trim().is_empty() {
                    bail!("Gemini returned an empty reply");
                }
                Ok(reply)
            });
        reply.map_err(|err| GatewayError::ChatFailed(error_chain_text(&err, ERROR_DETAIL_MAX_CHARS)))
    }
}

fn inline_image_part(image: &ImagePayload) -> Value {
    json!({
        "inlineData": {
            "mimeType": image.mime_type,
            "data": image.to_base64(),
        }
    })
}

pub(crate) fn image_edit_payload(image: &ImagePayload, instruction: &str) -> Value {
    json!({
        "contents": [{
            "role": "user",
            "parts": [inline_image_part(image), { "text": instruction }],
        }],
        "generationConfig": {
            "responseModalities": ["IMAGE"],
        },
    })
}

pub(crate) fn product_lookup_payload(image: &ImagePayload, query: &str) -> Value {
    json!({
        "contents": [{
            "role": "user",
            "parts": [inline_image_part(image), { "text": product_lookup_prompt(query) }],
        }],
        "generationConfig": {
            "responseMimeType": "application/json",
            "responseSchema": product_schema(),
        },
    })
}

fn product_schema() -> Value {
    json!({
        "type": "OBJECT",
        "properties": {
            "products": {
                "type": "ARRAY",
                "items": {
                    "type": "OBJECT",
                    "properties": {
                        "itemName": { "type": "STRING" },
                        "url": { "type": "STRING" },
                        "price": { "type": "STRING" },
                    },
                    "required": ["itemName", "url", "price"],
                },
            },
        },
        "required": ["products"],
    })
}

pub(crate) fn converse_payload(prior: &[Message], text: &str) -> Value {
    json!({
        "systemInstruction": {
            "parts": [{ "text": SYSTEM_INSTRUCTION }],
        },
        "contents": [{
            "role": "user",
            "parts": [{ "text": conversation_prompt(prior, text) }],
        }],
    })
}

fn first_candidate_parts(response: &Value) -> Vec<Value> {
    response
        .get("candidates")
        .and_then(Value::as_array)
        .and_then(|candidates| candidates.first())
        .and_then(|candidate| candidate.get("content"))
        .and_then(|content| content.get("parts"))
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default()
}

/// First inline image of the first candidate, if any.
pub(crate) fn first_inline_image(response: &Value) -> Result<Option<ImagePayload>> {
    for part in first_candidate_parts(response) {
        let Some(inline) = part
            .get("inlineData")
            .or_else(|| part.get("inline_data"))
            .and_then(Value::as_object)
        else {
            continue;
        };
        let data = inline
            .get("data")
            .and_then(Value::as_str)
            .unwrap_or_default();
        if data.is_empty() {
            continue;
        }
        let mime_type = inline
            .get("mimeType")
            .or_else(|| inline.get("mime_type"))
            .and_then(Value::as_str)
            .unwrap_or("image/png");
        let image = ImagePayload::from_base64(mime_type, data)
            .context("Gemini image base64 decode failed")?;
        return Ok(Some(image));
    }
    Ok(None)
}

/// Concatenated text parts of the first candidate.
pub(crate) fn response_text(response: &Value) -> String {
    first_candidate_parts(response)
        .iter()
        .filter_map(|part| part.get("text").and_then(Value::as_str))
        .collect::<Vec<&str>>()
        .join("")
        .trim()
        .to_string()
}

fn response_json_or_error(provider: &str, response: HttpResponse) -> Result<Value> {
    let status = response.status();
    let code = status.as_u16();
    let body = response
        .text()
        .with_context(|| format!("{provider} response body read failed"))?;
    if !status.is_success() {
        bail!(
            "{provider} request failed ({code}): {}",
            truncate_text(&body, ERROR_DETAIL_MAX_CHARS)
        );
    }
    let parsed: Value = serde_json::from_str(&body)
        .with_context(|| format!("{provider} returned invalid JSON payload"))?;
    Ok(parsed)
}

fn error_chain_text(err: &anyhow::Error, max_chars: usize) -> String {
    let mut parts: Vec<String> = Vec::new();
    for cause in err.chain() {
        let text = cause.to_string();
        let trimmed = text.trim();
        if trimmed.is_empty() {
            continue;
        }
        if parts.last().map(|existing| existing == trimmed).unwrap_or(false) {
            continue;
        }
        parts.push(trimmed.to_string());
    }
    if parts.is_empty() {
        return truncate_text(&err.to_string(), max_chars);
    }
    truncate_text(&parts.join(" | caused by: "), max_chars)
}

fn truncate_text(value: &str, max_chars: usize) -> String {
    if value.chars().count() <= max_chars {
        return value.to_string();
    }
    value.chars().take(max_chars).collect::<String>() + "…"
}
