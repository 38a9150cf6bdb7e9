//! Trigger Matcher (C10): resolves an inbound event to a `(flow_id,
//! trigger_node_id)` by reading the denormalized `flow_triggers` read
//! projection rather than scanning every node of every flow.

use std::sync::Arc;

use flowrunner_common::NormalizedMessage;
use flowrunner_store::Store;

use crate::error::Result;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TriggerMatch {
    pub flow_id: String,
    pub trigger_node_id: String,
}

pub struct TriggerMatcher {
    store: Arc<dyn Store>,
}

impl TriggerMatcher {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// `template_id`, when present, is matched against `trigger_template_id`
    /// instead of keyword matching — used when a channel delivers a
    /// quick-reply/template response rather than free text.
    pub async fn match_event(
        &self,
        brand_id: &str,
        normalized: &NormalizedMessage,
        template_id: Option<&str>,
    ) -> Result<Option<TriggerMatch>> {
        let mut candidates = self.store.list_trigger_projections(brand_id).await?;
        candidates.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));

        if let Some(template_id) = template_id {
            return Ok(candidates
                .into_iter()
                .find(|p| p.trigger_template_id.as_deref() == Some(template_id))
                .map(|p| TriggerMatch { flow_id: p.flow_id, trigger_node_id: p.node_id }));
        }

        let text = normalized.get_text_content().trim().to_lowercase();
        if text.is_empty() {
            return Ok(None);
        }
        Ok(candidates
            .into_iter()
            .find(|p| p.trigger_keywords.as_ref().is_some_and(|kws| kws.iter().any(|k| k.trim().to_lowercase() == text)))
            .map(|p| TriggerMatch { flow_id: p.flow_id, trigger_node_id: p.node_id }))
    }
}
