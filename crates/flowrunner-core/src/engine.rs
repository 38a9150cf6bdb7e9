//! Top-level facade bundling the store, the renderer and channel
//! normalization behind one `handle_inbound_webhook` call — the shape the
//! HTTP layer binds to.

use std::sync::Arc;

use flowrunner_common::Channel;
use flowrunner_store::Store;

use crate::error::Result;
use crate::renderer::Renderer;
use crate::user_state_service::{InboundEvent, ProcessOutcome, UserStateService};

pub struct Engine {
    user_state: UserStateService,
}

/// The raw shape an inbound webhook arrives in, before normalization —
/// matches the `{sender, brand_id, user_id, channel, channel_identifier,
/// channel_account_id, message_type, message_body, status}` body named at
/// the engine's external boundary.
pub struct InboundWebhook {
    pub brand_id: String,
    pub user_identifier: String,
    pub channel: Channel,
    pub channel_account_id: String,
    pub message_type: String,
    pub payload: serde_json::Value,
    pub trigger_template_id: Option<String>,
}

impl Engine {
    pub fn new(store: Arc<dyn Store>, renderer: Arc<dyn Renderer>) -> Self {
        Self { user_state: UserStateService::new(store, renderer) }
    }

    pub async fn handle_inbound_webhook(&self, webhook: InboundWebhook) -> Result<ProcessOutcome> {
        let normalized = flowrunner_channel::normalize(webhook.channel, &webhook.message_type, &webhook.payload);
        let event = InboundEvent {
            user_identifier: webhook.user_identifier,
            brand_id: webhook.brand_id,
            channel: webhook.channel,
            channel_account_id: webhook.channel_account_id,
            normalized,
            is_delay_complete: false,
            trigger_template_id: webhook.trigger_template_id,
        };
        self.user_state.process_event(event).await
    }

    /// Entry point for the Delay Scheduler's synthetic `delay_complete`
    /// events — bypasses normalization entirely since there is no payload.
    /// `key.channel` is the user's original channel (reconstructed via
    /// [`Channel::parse`]), not the `system` pseudo-channel the event is
    /// tagged with at the transport level.
    pub async fn handle_delay_complete(&self, key: flowrunner_store::UserStateKey) -> Result<ProcessOutcome> {
        let event = InboundEvent {
            user_identifier: key.user_identifier,
            brand_id: key.brand_id,
            channel: Channel::parse(&key.channel),
            channel_account_id: key.channel_account_id,
            normalized: flowrunner_common::NormalizedMessage::empty(serde_json::Value::Null),
            is_delay_complete: true,
            trigger_template_id: None,
        };
        self.user_state.process_event(event).await
    }
}
