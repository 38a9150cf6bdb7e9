//! Outbound rendering boundary. The engine never speaks a channel's wire
//! format directly — it calls a `Renderer`; channel-specific delivery is out
//! of scope here, so the shipped implementation just logs.

use async_trait::async_trait;
use flowrunner_common::OutboundIntent;
use tracing::info;

#[async_trait]
pub trait Renderer: Send + Sync {
    /// Fire-and-forget from the engine's viewpoint: errors are logged but
    /// never roll back state (see §7 Error Handling Design).
    async fn render(&self, intent: &OutboundIntent);
}

/// Logs the intent instead of delivering it. A real channel connector is a
/// non-goal of this crate.
pub struct LoggingRenderer;

#[async_trait]
impl Renderer for LoggingRenderer {
    async fn render(&self, intent: &OutboundIntent) {
        info!(
            channel = intent.channel.as_str(),
            recipient = %intent.recipient,
            node_id = %intent.node_id,
            fallback = ?intent.fallback_message,
            payload = %intent.payload,
            "rendering outbound intent"
        );
    }
}
