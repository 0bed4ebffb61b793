use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use uuid::Uuid;

use crate::media::ImagePayload;
use crate::styles::welcome_message;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LifecycleState {
    #[default]
    Initial,
    ImageUploaded,
    Generating,
    ImageGenerated,
}

impl LifecycleState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Initial => "INITIAL",
            Self::ImageUploaded => "IMAGE_UPLOADED",
            Self::Generating => "GENERATING",
            Self::ImageGenerated => "IMAGE_GENERATED",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sender {
    User,
    Bot,
}

impl Sender {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Bot => "bot",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    pub item_name: String,
    pub url: String,
    pub price: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub sender: Sender,
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub products: Option<Vec<Product>>,
}

impl Message {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            sender: Sender::User,
            text: text.into(),
            products: None,
        }
    }

    pub fn bot(text: impl Into<String>) -> Self {
        Self {
            sender: Sender::Bot,
            text: text.into(),
            products: None,
        }
    }

    pub fn bot_with_products(text: impl Into<String>, products: Vec<Product>) -> Self {
        Self {
            sender: Sender::Bot,
            text: text.into(),
            products: Some(products),
        }
    }
}

/// Every state change a session accepts. `Session::apply` is the only writer.
#[derive(Debug, Clone)]
pub enum SessionCommand {
    Upload(ImagePayload),
    BeginStyle,
    StyleGenerated { style: String, image: ImagePayload },
    StyleFailed { error: String },
    BeginChat { text: String },
    ImageRefined(ImagePayload),
    AppendBot(Message),
    FinishChat,
}

impl SessionCommand {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Upload(_) => "upload",
            Self::BeginStyle => "begin_style",
            Self::StyleGenerated { .. } => "style_generated",
            Self::StyleFailed { .. } => "style_failed",
            Self::BeginChat { .. } => "begin_chat",
            Self::ImageRefined(_) => "image_refined",
            Self::AppendBot(_) => "append_bot",
            Self::FinishChat => "finish_chat",
        }
    }
}

/// Client-side state of one editing flow.
///
/// Invariants:
/// - a generated image never exists without an original image
/// - `Generating` is only left through `StyleGenerated`, `StyleFailed`,
///   `FinishChat` or a new upload
/// - an upload clears the generated image, the transcript and the error
/// - the transcript only grows, except when a restyle replaces it with the
///   welcome message
#[derive(Debug, Clone)]
pub struct Session {
    id: String,
    original_image: Option<ImagePayload>,
    generated_image: Option<ImagePayload>,
    transcript: Vec<Message>,
    lifecycle: LifecycleState,
    last_error: Option<String>,
    epoch: u64,
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

impl Session {
    pub fn new() -> Self {
        Self::with_id(Uuid::new_v4().to_string())
    }

    pub fn with_id(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            original_image: None,
            generated_image: None,
            transcript: Vec::new(),
            lifecycle: LifecycleState::Initial,
            last_error: None,
            epoch: 0,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn original_image(&self) -> Option<&ImagePayload> {
        self.original_image.as_ref()
    }

    pub fn generated_image(&self) -> Option<&ImagePayload> {
        self.generated_image.as_ref()
    }

    pub fn transcript(&self) -> &[Message] {
        &self.transcript
    }

    pub fn lifecycle(&self) -> LifecycleState {
        self.lifecycle
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// Bumped by every upload; results computed for an older epoch are stale.
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn apply(&mut self, command: SessionCommand) -> Result<()> {
        match command {
            SessionCommand::Upload(image) => {
                if !image.is_image() {
                    bail!("upload rejected: {} is not an image type", image.mime_type);
                }
                self.original_image = Some(image);
                self.generated_image = None;
                self.transcript.clear();
                self.last_error = None;
                self.lifecycle = LifecycleState::ImageUploaded;
                self.epoch += 1;
            }
            SessionCommand::BeginStyle => {
                if self.original_image.is_none() {
                    bail!("begin_style requires an uploaded image");
                }
                self.ensure_idle("begin_style")?;
                self.last_error = None;
                self.lifecycle = LifecycleState::Generating;
            }
            SessionCommand::StyleGenerated { style, image } => {
                self.ensure_generating("style_generated")?;
                self.generated_image = Some(image);
                self.transcript = vec![Message::bot(welcome_message(&style))];
                self.lifecycle = LifecycleState::ImageGenerated;
            }
            SessionCommand::StyleFailed { error } => {
                self.ensure_generating("style_failed")?;
                self.last_error = Some(error);
                self.lifecycle = if self.generated_image.is_some() {
                    LifecycleState::ImageGenerated
                } else {
                    LifecycleState::ImageUploaded
                };
            }
            SessionCommand::BeginChat { text } => {
                if self.original_image.is_none() || self.generated_image.is_none() {
                    bail!("begin_chat requires an uploaded and a generated image");
                }
                self.ensure_idle("begin_chat")?;
                self.transcript.push(Message::user(text));
                self.last_error = None;
                self.lifecycle = LifecycleState::Generating;
            }
            SessionCommand::ImageRefined(image) => {
                self.ensure_generating("image_refined")?;
                if self.generated_image.is_none() {
                    bail!("image_refined requires a generated image");
                }
                self.generated_image = Some(image);
            }
            SessionCommand::AppendBot(message) => {
                if message.sender != Sender::Bot {
                    bail!("append_bot only accepts bot messages");
                }
                self.transcript.push(message);
            }
            SessionCommand::FinishChat => {
                self.ensure_generating("finish_chat")?;
                self.lifecycle = LifecycleState::ImageGenerated;
            }
        }
        Ok(())
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            session_id: self.id.clone(),
            original_image: self.original_image.clone(),
            generated_image: self.generated_image.clone(),
            transcript: self.transcript.clone(),
            lifecycle: self.lifecycle,
            last_error: self.last_error.clone(),
        }
    }

    fn ensure_idle(&self, command: &str) -> Result<()> {
        if self.lifecycle == LifecycleState::Generating {
            bail!("{command} rejected while a generation is in progress");
        }
        Ok(())
    }

    fn ensure_generating(&self, command: &str) -> Result<()> {
        if self.lifecycle != LifecycleState::Generating {
            bail!(
                "{command} requires GENERATING, session is {}",
                self.lifecycle.as_str()
            );
        }
        Ok(())
    }
}

/// Detached read-only copy handed to the presentation layer.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSnapshot {
    pub session_id: String,
    pub original_image: Option<ImagePayload>,
    pub generated_image: Option<ImagePayload>,
    pub transcript: Vec<Message>,
    pub lifecycle: LifecycleState,
    pub last_error: Option<String>,
}

impl SessionSnapshot {
    pub fn status_json(&self) -> Value {
        let image_info = |image: Option<&ImagePayload>| match image {
            Some(image) => json!({
                "mime_type": image.mime_type,
                "bytes": image.len(),
            }),
            None => Value::Null,
        };
        json!({
            "session_id": self.session_id,
            "lifecycle": self.lifecycle,
            "original_image": image_info(self.original_image.as_ref()),
            "generated_image": image_info(self.generated_image.as_ref()),
            "transcript_len": self.transcript.len(),
            "last_error": self.last_error,
        })
    }
}
