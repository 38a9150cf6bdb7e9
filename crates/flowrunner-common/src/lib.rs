//! Shared types for the flow runner: the canonical message shape every
//! component downstream of the Channel Adapter treats as a value, and the
//! outbound intents the Node Identifier hands to a renderer.

use serde::{Deserialize, Serialize};

pub mod logging;

/// Messaging channel an inbound event arrived on, or the synthetic `system`
/// channel used for scheduler-injected `delay_complete` events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    Whatsapp,
    Sms,
    Telegram,
    Email,
    /// Pseudo-channel for synthetic events injected by the Delay Scheduler.
    System,
    /// Anything the engine has no dedicated normalizer for.
    #[serde(other)]
    Unknown,
}

impl Channel {
    /// Inverse of [`Channel::as_str`], used to reconstruct a `Channel` from
    /// the string stored on a `UserStateKey` (e.g. when the Delay Scheduler
    /// replays a synthetic event against a previously-persisted user).
    pub fn parse(s: &str) -> Channel {
        match s {
            "whatsapp" => Channel::Whatsapp,
            "sms" => Channel::Sms,
            "telegram" => Channel::Telegram,
            "email" => Channel::Email,
            "system" => Channel::System,
            _ => Channel::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Channel::Whatsapp => "whatsapp",
            Channel::Sms => "sms",
            Channel::Telegram => "telegram",
            Channel::Email => "email",
            Channel::System => "system",
            Channel::Unknown => "unknown",
        }
    }
}

/// Whether an inbound message carried an interactive reply and, if so,
/// which kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum InteractiveType {
    #[default]
    None,
    ButtonReply,
    ListReply,
}

/// The canonical message shape produced by the Channel Adapter.
///
/// All downstream components (Trigger Matcher, Reply Validator, Internal-Node
/// Processor) treat this as an opaque value and never branch on `Channel`
/// again — channel variance lives entirely in the normalizer that produced it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NormalizedMessage {
    pub text: Option<String>,
    pub subject: Option<String>,
    pub body: Option<String>,
    pub button_text: Option<String>,
    pub button_payload: Option<String>,
    pub interactive_type: InteractiveType,
    pub interactive_value: Option<String>,
    pub media_url: Option<String>,
    pub media_type: Option<String>,
    pub raw: serde_json::Value,
}

impl NormalizedMessage {
    pub fn empty(raw: serde_json::Value) -> Self {
        Self {
            text: None,
            subject: None,
            body: None,
            button_text: None,
            button_payload: None,
            interactive_type: InteractiveType::None,
            interactive_value: None,
            media_url: None,
            media_type: None,
            raw,
        }
    }

    /// The single string that participates in trigger matching and reply
    /// validation. Precedence is fixed at normalization time per channel; by
    /// the time a message reaches this type the choice has already been made
    /// and baked into `text`/`interactive_value` — this just picks whichever
    /// is present.
    pub fn get_text_content(&self) -> String {
        self.interactive_value
            .clone()
            .or_else(|| self.text.clone())
            .unwrap_or_default()
    }
}

/// An outbound rendering instruction emitted by the Node Identifier.
/// Delivery itself is out of scope — see the `Renderer` trait in
/// `flowrunner-core`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutboundIntent {
    pub channel: Channel,
    pub recipient: String,
    pub node_id: String,
    pub fallback_message: Option<String>,
    pub payload: serde_json::Value,
}
