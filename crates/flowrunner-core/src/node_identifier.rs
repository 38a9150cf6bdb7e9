//! Node Identifier (C7): resolves the next node to act on, records a
//! transaction for it, and — for actionable nodes — emits the outbound
//! rendering intent. Internal nodes (condition/delay) are handed to the
//! Internal-Node Processor and returned unrendered for the User State
//! Service to chain through.
//!
//! The canonical event table (SPEC_FULL.md §4.7) describes several distinct
//! ways `current_node_id`/`node_id_to_process` get populated (trigger edges,
//! matched-answer `nodeResultId`s, condition/delay branch ids, the literal
//! current node for a retry). This implementation normalizes all of them
//! down to two inputs so the resolution step has one rule, documented in
//! DESIGN.md: whenever the caller already knows the exact target node id
//! (a resolved `nodeResultId`, a delay's `__not_interrupted` target, a
//! cross-node match), it is passed as `node_id_to_process`; `current_node_id`
//! always names the node the user was previously sitting at, and is only
//! walked via its outgoing edge when no resolved target was supplied.

use std::sync::Arc;

use chrono::Utc;
use flowrunner_common::{Channel, NormalizedMessage, OutboundIntent};
use flowrunner_store::{Flow, Node, NodeBody, Store, Transaction, UserStateKey};
use tracing::warn;
use uuid::Uuid;

use crate::error::{EngineError, Result};
use crate::internal_node_processor::{self, InternalResult};
use crate::renderer::Renderer;
use crate::variable_context::VariableContext;

#[derive(Debug, Clone)]
pub enum IdentifyStatus {
    Success { next_node_id: String },
    InternalNode { next_node_id: String, result: InternalResult },
}

/// Everything the resolution step and the actionable-node handler need.
/// Built fresh by the User State Service for every Node Identifier call.
pub struct IdentifyRequest<'a> {
    pub flow_id: &'a str,
    pub user_key: &'a UserStateKey,
    pub channel: Channel,
    pub recipient: &'a str,
    /// Already-resolved target, when the caller knows it (matched answer's
    /// `nodeResultId`, a condition/delay branch, a cross-node match).
    pub node_id_to_process: Option<String>,
    /// The node the user was previously sitting at. Walked via its
    /// outgoing edge when `node_id_to_process` is absent and this call
    /// isn't a validation-exit re-render.
    pub current_node_id: Option<String>,
    pub is_validation_error: bool,
    pub fallback_message: Option<String>,
    /// The inbound reply's text, so that a free-text question's answer can
    /// be persisted into the Variable Context when the identifier advances
    /// past it.
    pub reply_text: Option<String>,
}

pub struct NodeIdentifier {
    store: Arc<dyn Store>,
    renderer: Arc<dyn Renderer>,
    variables: VariableContext,
}

impl NodeIdentifier {
    pub fn new(store: Arc<dyn Store>, renderer: Arc<dyn Renderer>) -> Self {
        let variables = VariableContext::new(store.clone());
        Self { store, renderer, variables }
    }

    pub async fn identify_and_process_node(&self, req: IdentifyRequest<'_>) -> Result<IdentifyStatus> {
        let flow = self
            .store
            .get_flow(req.flow_id)
            .await?
            .ok_or_else(|| EngineError::FlowNotFound(req.flow_id.to_string()))?;

        let target_id = Self::resolve_target(&flow, &req)?;
        let node = flow
            .node(&target_id)
            .ok_or_else(|| EngineError::NextNodeNotFound(target_id.clone()))?;

        if node.is_internal() {
            let vars = self.variables.snapshot(req.flow_id, req.user_key).await?;
            let result = internal_node_processor::process(node, &vars);
            return Ok(IdentifyStatus::InternalNode { next_node_id: node.id.clone(), result });
        }

        self.process_actionable(&flow, node, &req).await?;
        Ok(IdentifyStatus::Success { next_node_id: node.id.clone() })
    }

    fn resolve_target(flow: &Flow, req: &IdentifyRequest<'_>) -> Result<String> {
        if let Some(id) = &req.node_id_to_process {
            return Ok(id.clone());
        }
        if req.is_validation_error {
            return req
                .current_node_id
                .clone()
                .ok_or_else(|| EngineError::CurrentNodeNotFound("<none>".to_string()));
        }
        let current = req
            .current_node_id
            .as_deref()
            .ok_or_else(|| EngineError::CurrentNodeNotFound("<none>".to_string()))?;
        flow.outgoing_edge(current)
            .map(|e| e.target_node_id.clone())
            .ok_or_else(|| EngineError::NoOutgoingEdge(current.to_string()))
    }

    async fn process_actionable(&self, flow: &Flow, node: &Node, req: &IdentifyRequest<'_>) -> Result<()> {
        self.store
            .record_transaction(&Transaction {
                id: Uuid::new_v4().to_string(),
                flow_id: req.flow_id.to_string(),
                node_id: node.id.clone(),
                user_state_key: req.user_key.clone(),
                at: Utc::now(),
            })
            .await?;

        self.persist_previous_reply(flow, node, req).await?;

        if node.user_input_required() || matches!(node.flow_node_type, flowrunner_store::FlowNodeType::Message) {
            let fallback_message = if req.is_validation_error && !matches!(node.body, NodeBody::Message { .. }) {
                req.fallback_message.clone()
            } else {
                None
            };
            let intent = OutboundIntent {
                channel: req.channel,
                recipient: req.recipient.to_string(),
                node_id: node.id.clone(),
                fallback_message,
                payload: Self::render_payload(node),
            };
            self.renderer.render(&intent).await;
        }

        Ok(())
    }

    /// If we just advanced away from a free-text question, its answer is
    /// the reply we were just handed — stash it under the question's
    /// `user_input_variable` before moving on.
    async fn persist_previous_reply(&self, flow: &Flow, target: &Node, req: &IdentifyRequest<'_>) -> Result<()> {
        let Some(prev_id) = req.current_node_id.as_deref() else { return Ok(()) };
        if prev_id == target.id {
            return Ok(());
        }
        let Some(prev_node) = flow.node(prev_id) else {
            warn!(node_id = prev_id, "previous node vanished before reply could be persisted");
            return Ok(());
        };
        let Some(var_name) = prev_node.user_input_variable() else { return Ok(()) };
        let Some(reply) = &req.reply_text else { return Ok(()) };
        self.variables.set(var_name, req.flow_id, req.user_key, reply).await?;
        Ok(())
    }

    fn render_payload(node: &Node) -> serde_json::Value {
        match &node.body {
            NodeBody::Message { flow_replies } => serde_json::json!({ "flow_replies": flow_replies }),
            NodeBody::Question { flow_replies, .. } => serde_json::json!({ "flow_replies": flow_replies }),
            NodeBody::ButtonQuestion { header, body, footer, expected_answers, .. } => serde_json::json!({
                "header": header, "body": body, "footer": footer,
                "buttons": expected_answers.iter().map(|a| &a.expected_input).collect::<Vec<_>>(),
            }),
            NodeBody::ListQuestion { header, body, footer, expected_answers, .. } => serde_json::json!({
                "header": header, "body": body, "footer": footer,
                "items": expected_answers.iter().map(|a| &a.expected_input).collect::<Vec<_>>(),
            }),
            NodeBody::TriggerTemplate { trigger_template_id, .. } => serde_json::json!({ "template_id": trigger_template_id }),
            NodeBody::TriggerKeyword { .. } | NodeBody::Condition { .. } | NodeBody::Delay { .. } => serde_json::Value::Null,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::renderer::LoggingRenderer;
    use chrono::Utc;
    use flowrunner_store::memory::InMemoryStore;
    use flowrunner_store::{AnswerValidation, Edge, ExpectedAnswer, Flow, FlowNodeType, FlowStatus};

    fn key() -> UserStateKey {
        UserStateKey::new("+1555", "brand1", "whatsapp", "acct1")
    }

    fn message_node(id: &str) -> Node {
        Node { id: id.into(), flow_node_type: FlowNodeType::Message, position: None, is_start_node: false, body: NodeBody::Message { flow_replies: vec![] } }
    }

    fn text_question_node(id: &str) -> Node {
        Node {
            id: id.into(),
            flow_node_type: FlowNodeType::Question,
            position: None,
            is_start_node: false,
            body: NodeBody::Question { flow_replies: vec![], user_input_variable: "@name".into(), answer_validation: None, is_media_accepted: false },
        }
    }

    fn flow_with(nodes: Vec<Node>, edges: Vec<Edge>) -> Flow {
        Flow { id: "flow1".into(), name: "t".into(), brand_id: "brand1".into(), user_id: "author1".into(), status: FlowStatus::Published, nodes, edges, created_at: Utc::now(), updated_at: Utc::now(), transform: None }
    }

    fn identifier(store: Arc<InMemoryStore>) -> NodeIdentifier {
        NodeIdentifier::new(store, Arc::new(LoggingRenderer))
    }

    #[tokio::test]
    async fn trigger_walks_its_own_edge_to_first_message() {
        let store = Arc::new(InMemoryStore::new());
        store.seed_flow(flow_with(
            vec![Node { id: "tr".into(), flow_node_type: FlowNodeType::Trigger, position: None, is_start_node: true, body: NodeBody::TriggerKeyword { trigger_keywords: Default::default() } }, message_node("m1")],
            vec![Edge { id: "e1".into(), source_node_id: "tr".into(), target_node_id: "m1".into() }],
        ));
        let ident = identifier(store);
        let req = IdentifyRequest { flow_id: "flow1", user_key: &key(), channel: Channel::Whatsapp, recipient: "+1555", node_id_to_process: None, current_node_id: Some("tr".into()), is_validation_error: false, fallback_message: None, reply_text: None };
        let status = ident.identify_and_process_node(req).await.unwrap();
        match status {
            IdentifyStatus::Success { next_node_id } => assert_eq!(next_node_id, "m1"),
            _ => panic!("expected success"),
        }
    }

    #[tokio::test]
    async fn advancing_past_text_question_persists_its_variable() {
        let store = Arc::new(InMemoryStore::new());
        store.seed_flow(flow_with(
            vec![text_question_node("q1"), message_node("m1")],
            vec![Edge { id: "e1".into(), source_node_id: "q1".into(), target_node_id: "m1".into() }],
        ));
        let ident = identifier(store.clone());
        let req = IdentifyRequest { flow_id: "flow1", user_key: &key(), channel: Channel::Whatsapp, recipient: "+1555", node_id_to_process: None, current_node_id: Some("q1".into()), is_validation_error: false, fallback_message: None, reply_text: Some("Shraddha".into()) };
        ident.identify_and_process_node(req).await.unwrap();
        let vars = store.snapshot_variables(&key(), "flow1").await.unwrap();
        assert_eq!(vars.get("name").map(String::as_str), Some("Shraddha"));
    }

    #[tokio::test]
    async fn validation_exit_re_renders_current_node_with_fallback() {
        let store = Arc::new(InMemoryStore::new());
        let node = Node {
            id: "bq".into(),
            flow_node_type: FlowNodeType::Question,
            position: None,
            is_start_node: false,
            body: NodeBody::ButtonQuestion { header: None, body: Some("pick one".into()), footer: None, expected_answers: vec![ExpectedAnswer { id: "b1".into(), expected_input: "yes".into(), is_default: false, node_result_id: "m1".into() }], default_node_result_id: None },
        };
        store.seed_flow(flow_with(vec![node], vec![]));
        let ident = identifier(store);
        let req = IdentifyRequest { flow_id: "flow1", user_key: &key(), channel: Channel::Whatsapp, recipient: "+1555", node_id_to_process: None, current_node_id: Some("bq".into()), is_validation_error: true, fallback_message: Some("sorry, didn't get that".into()), reply_text: None };
        let status = ident.identify_and_process_node(req).await.unwrap();
        match status {
            IdentifyStatus::Success { next_node_id } => assert_eq!(next_node_id, "bq"),
            _ => panic!("expected success"),
        }
    }

    #[tokio::test]
    async fn condition_node_resolves_internally_without_rendering() {
        let store = Arc::new(InMemoryStore::new());
        let cond = Node {
            id: "c1".into(),
            flow_node_type: FlowNodeType::Condition,
            position: None,
            is_start_node: false,
            body: NodeBody::Condition {
                conditions: vec![flowrunner_store::Condition { id: "x".into(), cond_type: flowrunner_store::CondType::Equal, variable: "@name".into(), value: "John".into() }],
                operator: flowrunner_store::ConditionOperator::None,
                condition_result: vec![
                    flowrunner_store::ConditionResultEntry { id: "c1__true".into(), node_result_id: "myes".into() },
                    flowrunner_store::ConditionResultEntry { id: "c1__false".into(), node_result_id: "mno".into() },
                ],
            },
        };
        store.seed_flow(flow_with(vec![cond, message_node("myes"), message_node("mno")], vec![]));
        store.set_variable(&key(), "flow1", "name", "John").await.unwrap();
        let ident = identifier(store);
        let req = IdentifyRequest { flow_id: "flow1", user_key: &key(), channel: Channel::Whatsapp, recipient: "+1555", node_id_to_process: Some("c1".into()), current_node_id: None, is_validation_error: false, fallback_message: None, reply_text: None };
        let status = ident.identify_and_process_node(req).await.unwrap();
        match status {
            IdentifyStatus::InternalNode { next_node_id, result: InternalResult::Condition { branch_node_id } } => {
                assert_eq!(next_node_id, "c1");
                assert_eq!(branch_node_id.as_deref(), Some("myes"));
            }
            _ => panic!("expected internal node result"),
        }
    }

    #[tokio::test]
    async fn missing_outgoing_edge_is_an_error() {
        let store = Arc::new(InMemoryStore::new());
        store.seed_flow(flow_with(vec![message_node("m1")], vec![]));
        let ident = identifier(store);
        let req = IdentifyRequest { flow_id: "flow1", user_key: &key(), channel: Channel::Whatsapp, recipient: "+1555", node_id_to_process: None, current_node_id: Some("m1".into()), is_validation_error: false, fallback_message: None, reply_text: None };
        let err = ident.identify_and_process_node(req).await.unwrap_err();
        assert!(matches!(err, EngineError::NoOutgoingEdge(_)));
    }
}
