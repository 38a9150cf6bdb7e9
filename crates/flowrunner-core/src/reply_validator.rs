//! Reply Validator (C6): matches an inbound reply against a node's expected
//! answers, with retry, cross-node jump and exit-after-N-failures semantics.
//! Never mutates user state — it only returns a verdict for the User State
//! Service to act on.

use std::sync::Arc;

use flowrunner_common::NormalizedMessage;
use flowrunner_store::{FlowNodeType, Store};

use crate::error::{EngineError, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationVerdict {
    UseDefaultEdge,
    Matched { matched_answer_id: String },
    MatchedOtherNode { matched_node_id: String },
    ValidationExit { fallback_message: Option<String> },
    MismatchRetry { fallback_message: Option<String> },
}

pub struct ReplyValidator {
    store: Arc<dyn Store>,
}

impl ReplyValidator {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    pub async fn validate(
        &self,
        normalized: &NormalizedMessage,
        flow_id: &str,
        current_node_id: &str,
        is_text: bool,
        current_failure_count: u32,
    ) -> Result<ValidationVerdict> {
        let flow = self
            .store
            .get_flow(flow_id)
            .await?
            .ok_or_else(|| EngineError::FlowNotFound(flow_id.to_string()))?;
        let node = flow
            .node(current_node_id)
            .ok_or_else(|| EngineError::CurrentNodeNotFound(current_node_id.to_string()))?;

        if is_text {
            return Ok(ValidationVerdict::UseDefaultEdge);
        }

        let reply = normalized.get_text_content();
        let reply_trimmed_lower = reply.trim().to_lowercase();

        if let Some(answer) = node.expected_answers().iter().find(|a| {
            a.expected_input.trim().to_lowercase() == reply_trimmed_lower
                || normalized.button_payload.as_deref().map(|p| p == a.id).unwrap_or(false)
        }) {
            return Ok(ValidationVerdict::Matched { matched_answer_id: answer.id.clone() });
        }

        for other in flow.nodes.iter().filter(|n| {
            n.id != current_node_id
                && matches!(n.flow_node_type, FlowNodeType::Question | FlowNodeType::Trigger)
                && !n.expected_answers().is_empty()
        }) {
            if other.expected_answers().iter().any(|a| a.expected_input.trim().to_lowercase() == reply_trimmed_lower) {
                return Ok(ValidationVerdict::MatchedOtherNode { matched_node_id: other.id.clone() });
            }
        }

        let fallback_message = node.fallback_message().map(str::to_string);
        let fails_count = node.fails_count();
        let next_failure_count = current_failure_count + 1;

        let exhausted = match fails_count {
            Some(limit) if limit > 0 => next_failure_count as i64 >= limit,
            _ => false,
        };

        if exhausted {
            Ok(ValidationVerdict::ValidationExit { fallback_message })
        } else {
            Ok(ValidationVerdict::MismatchRetry { fallback_message })
        }
    }
}
