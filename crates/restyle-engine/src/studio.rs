use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use anyhow::{anyhow, Result};
use restyle_contracts::chat::{classify_message, MessageIntent};
use restyle_contracts::events::{EventPayload, EventWriter};
use restyle_contracts::media::ImagePayload;
use restyle_contracts::session::{
    Message, Product, Session, SessionCommand, SessionSnapshot,
};
use restyle_contracts::styles::style_prompt;
use serde_json::{json, Map, Value};

use crate::gateway::{DesignGateway, GatewayResult};

pub const STYLE_FAILURE_MESSAGE: &str = "Failed to generate image. Please try again.";
pub const CHAT_FAILURE_MESSAGE: &str = "Sorry, I encountered an error. Please try again.";
pub const PRODUCTS_CAPTION: &str = "Here are some items I found:";
pub const REFINED_MESSAGE: &str = "I've updated the image with your changes.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    NotAnImage,
    NoImage,
    NoGeneratedImage,
    EmptyMessage,
    Busy,
}

impl RejectReason {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::NotAnImage => "not_an_image",
            Self::NoImage => "no_image",
            Self::NoGeneratedImage => "no_generated_image",
            Self::EmptyMessage => "empty_message",
            Self::Busy => "busy",
        }
    }
}

/// What an entry point did to the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// The gateway call succeeded and its result was folded in.
    Completed,
    /// The gateway call failed; the failure is recorded in the session.
    Failed,
    /// Nothing changed and no gateway call was made.
    Rejected(RejectReason),
    /// A newer upload replaced the image while the call was in flight; the
    /// result was dropped.
    Superseded,
}

/// Clears the in-flight flag when dropped.
struct InFlightGuard<'a>(&'a AtomicBool);

impl<'a> InFlightGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

struct ChatTurn {
    text: String,
    generated: ImagePayload,
    prior: Vec<Message>,
}

enum ChatReply {
    Products(Vec<Product>),
    Refined(ImagePayload),
    Text(String),
}

type ChatHandler = fn(&dyn DesignGateway, &ChatTurn) -> GatewayResult<ChatReply>;

/// Handler for each classified intent; classification order lives with the
/// predicates in `restyle_contracts::chat::INTENT_RULES`.
const CHAT_HANDLERS: &[(MessageIntent, ChatHandler)] = &[
    (MessageIntent::ShopLookup, lookup_products),
    (MessageIntent::Refine, refine_image),
    (MessageIntent::Converse, continue_conversation),
];

fn lookup_products(gateway: &dyn DesignGateway, turn: &ChatTurn) -> GatewayResult<ChatReply> {
    gateway
        .find_products(&turn.generated, &turn.text)
        .map(ChatReply::Products)
}

fn refine_image(gateway: &dyn DesignGateway, turn: &ChatTurn) -> GatewayResult<ChatReply> {
    gateway
        .refine(&turn.generated, &turn.text)
        .map(ChatReply::Refined)
}

fn continue_conversation(
    gateway: &dyn DesignGateway,
    turn: &ChatTurn,
) -> GatewayResult<ChatReply> {
    gateway
        .converse(&turn.prior, &turn.text)
        .map(ChatReply::Text)
}

fn handler_for(intent: MessageIntent) -> ChatHandler {
    CHAT_HANDLERS
        .iter()
        .find(|(candidate, _)| *candidate == intent)
        .map(|(_, handler)| *handler)
        .unwrap_or(continue_conversation)
}

/// Owns one editing session and sequences every gateway call against it.
///
/// At most one gateway call is in flight at a time. The session lock is never
/// held across a call, so snapshots and uploads stay responsive while a
/// generation runs.
pub struct DesignStudio {
    session: Mutex<Session>,
    in_flight: AtomicBool,
    gateway: Arc<dyn DesignGateway>,
    events: EventWriter,
    event_failure: Mutex<Option<String>>,
}

impl DesignStudio {
    pub fn new(gateway: Arc<dyn DesignGateway>, events: EventWriter) -> Result<Self> {
        let session = Session::with_id(events.session_id());
        events.emit(
            "session_started",
            json_object(json!({ "gateway": gateway.name() })),
        )?;
        Ok(Self {
            session: Mutex::new(session),
            in_flight: AtomicBool::new(false),
            gateway,
            events,
            event_failure: Mutex::new(None),
        })
    }

    pub fn gateway_name(&self) -> &str {
        self.gateway.name()
    }

    pub fn events(&self) -> &EventWriter {
        &self.events
    }

    /// The most recent event log write error, cleared on read.
    pub fn take_event_failure(&self) -> Option<String> {
        self.event_failure
            .lock()
            .ok()
            .and_then(|mut failure| failure.take())
    }

    pub fn is_busy(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    pub fn snapshot(&self) -> Result<SessionSnapshot> {
        Ok(self.session()?.snapshot())
    }

    /// Replaces the room photo. Accepted in any state; a call still in flight
    /// for the previous photo has its result discarded.
    pub fn submit_image(&self, image: ImagePayload) -> Result<Outcome> {
        if !image.is_image() {
            return Ok(Outcome::Rejected(RejectReason::NotAnImage));
        }
        let mime_type = image.mime_type.clone();
        let bytes = image.len();
        self.session()?.apply(SessionCommand::Upload(image))?;
        self.record(
            "image_uploaded",
            json_object(json!({
                "mime_type": mime_type,
                "bytes": bytes,
                "superseded_in_flight": self.is_busy(),
            })),
        );
        Ok(Outcome::Completed)
    }

    pub fn select_style(&self, style: &str) -> Result<Outcome> {
        let Some(_guard) = InFlightGuard::acquire(&self.in_flight) else {
            return self.reject("select_style", RejectReason::Busy);
        };
        let pending = {
            let session = self.session()?;
            session
                .original_image()
                .cloned()
                .map(|original| (original, session.epoch()))
        };
        let Some((original, epoch)) = pending else {
            return self.reject("select_style", RejectReason::NoImage);
        };

        let prompt = style_prompt(style);
        self.record(
            "style_requested",
            json_object(json!({
                "style": style,
                "prompt": prompt,
                "gateway": self.gateway.name(),
            })),
        );
        if !self.begin(epoch, SessionCommand::BeginStyle)? {
            return self.superseded("select_style");
        }

        let result = self.gateway.style_transform(&original, &prompt);

        let mut session = self.session()?;
        if session.epoch() != epoch {
            drop(session);
            return self.superseded("select_style");
        }
        match result {
            Ok(image) => {
                let bytes = image.len();
                session.apply(SessionCommand::StyleGenerated {
                    style: style.to_string(),
                    image,
                })?;
                drop(session);
                self.record(
                    "style_generated",
                    json_object(json!({ "style": style, "bytes": bytes })),
                );
                Ok(Outcome::Completed)
            }
            Err(err) => {
                session.apply(SessionCommand::StyleFailed {
                    error: STYLE_FAILURE_MESSAGE.to_string(),
                })?;
                drop(session);
                self.record(
                    "style_failed",
                    json_object(json!({ "style": style, "error": err.to_string() })),
                );
                Ok(Outcome::Failed)
            }
        }
    }

    pub fn send_message(&self, text: &str) -> Result<Outcome> {
        let text = text.trim();
        if text.is_empty() {
            return self.reject("send_message", RejectReason::EmptyMessage);
        }
        let Some(_guard) = InFlightGuard::acquire(&self.in_flight) else {
            return self.reject("send_message", RejectReason::Busy);
        };
        let pending = {
            let session = self.session()?;
            match (session.original_image(), session.generated_image()) {
                (Some(_), Some(generated)) => Some((
                    ChatTurn {
                        text: text.to_string(),
                        generated: generated.clone(),
                        prior: session.transcript().to_vec(),
                    },
                    session.epoch(),
                )),
                _ => None,
            }
        };
        let Some((turn, epoch)) = pending else {
            return self.reject("send_message", RejectReason::NoGeneratedImage);
        };

        let intent = classify_message(text);
        self.record(
            "message_sent",
            json_object(json!({ "text": text, "intent": intent.as_str() })),
        );
        let begin = SessionCommand::BeginChat {
            text: text.to_string(),
        };
        if !self.begin(epoch, begin)? {
            return self.superseded("send_message");
        }

        let reply = handler_for(intent)(self.gateway.as_ref(), &turn);

        let mut session = self.session()?;
        if session.epoch() != epoch {
            drop(session);
            return self.superseded("send_message");
        }
        let (outcome, error) = match reply {
            Ok(ChatReply::Products(products)) => {
                session.apply(SessionCommand::AppendBot(Message::bot_with_products(
                    PRODUCTS_CAPTION,
                    products,
                )))?;
                (Outcome::Completed, None)
            }
            Ok(ChatReply::Refined(image)) => {
                session.apply(SessionCommand::ImageRefined(image))?;
                session.apply(SessionCommand::AppendBot(Message::bot(REFINED_MESSAGE)))?;
                (Outcome::Completed, None)
            }
            Ok(ChatReply::Text(reply)) => {
                session.apply(SessionCommand::AppendBot(Message::bot(reply)))?;
                (Outcome::Completed, None)
            }
            Err(err) => {
                session.apply(SessionCommand::AppendBot(Message::bot(CHAT_FAILURE_MESSAGE)))?;
                (Outcome::Failed, Some(err.to_string()))
            }
        };
        session.apply(SessionCommand::FinishChat)?;
        drop(session);

        match error {
            None => self.record(
                "chat_reply",
                json_object(json!({ "intent": intent.as_str() })),
            ),
            Some(error) => self.record(
                "chat_failed",
                json_object(json!({ "intent": intent.as_str(), "error": error })),
            ),
        }
        Ok(outcome)
    }

    fn session(&self) -> Result<MutexGuard<'_, Session>> {
        self.session
            .lock()
            .map_err(|_| anyhow!("session lock poisoned"))
    }

    /// Applies a `Begin*` command unless an upload landed since `epoch` was read.
    fn begin(&self, epoch: u64, command: SessionCommand) -> Result<bool> {
        let mut session = self.session()?;
        if session.epoch() != epoch {
            return Ok(false);
        }
        session.apply(command)?;
        Ok(true)
    }

    /// Writes an event without failing the caller; a sink error is kept for
    /// `take_event_failure` so the session itself is unaffected.
    fn record(&self, event_type: &str, payload: EventPayload) {
        if let Err(err) = self.events.emit(event_type, payload) {
            if let Ok(mut failure) = self.event_failure.lock() {
                *failure = Some(format!("{event_type}: {err:#}"));
            }
        }
    }

    fn reject(&self, entry_point: &str, reason: RejectReason) -> Result<Outcome> {
        self.record(
            "request_rejected",
            json_object(json!({ "entry_point": entry_point, "reason": reason.as_str() })),
        );
        Ok(Outcome::Rejected(reason))
    }

    fn superseded(&self, entry_point: &str) -> Result<Outcome> {
        self.record(
            "stale_result_discarded",
            json_object(json!({ "entry_point": entry_point })),
        );
        Ok(Outcome::Superseded)
    }
}

fn json_object(value: Value) -> EventPayload {
    value.as_object().cloned().unwrap_or_else(Map::new)
}
