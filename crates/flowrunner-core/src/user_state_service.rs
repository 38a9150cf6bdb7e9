//! User State Service (C8): the single entry point that turns an inbound
//! (or synthetic) event into state transitions, driving Trigger Matcher,
//! Reply Validator and Node Identifier per the canonical event table.

use std::sync::Arc;

use chrono::Utc;
use dashmap::DashMap;
use flowrunner_common::{Channel, NormalizedMessage};
use flowrunner_store::{DelayTimer, Store, UserState, UserStateKey};
use tokio::sync::Mutex as AsyncMutex;
use tracing::warn;
use uuid::Uuid;

use crate::error::{EngineError, Result};
use crate::internal_node_processor::{self, InternalResult};
use crate::node_identifier::{IdentifyRequest, IdentifyStatus, NodeIdentifier};
use crate::renderer::Renderer;
use crate::reply_validator::{ReplyValidator, ValidationVerdict};
use crate::trigger_matcher::TriggerMatcher;
use crate::variable_context::VariableContext;

/// An inbound channel message, or a synthetic `delay_complete` event
/// injected by the Delay Scheduler.
#[derive(Debug, Clone)]
pub struct InboundEvent {
    pub user_identifier: String,
    pub brand_id: String,
    pub channel: Channel,
    pub channel_account_id: String,
    pub normalized: NormalizedMessage,
    pub is_delay_complete: bool,
    pub trigger_template_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessOutcome {
    Processed,
    Dropped { reason: String },
}

#[derive(PartialEq)]
enum VerdictKind {
    MismatchRetry,
}

pub struct UserStateService {
    store: Arc<dyn Store>,
    identifier: NodeIdentifier,
    validator: ReplyValidator,
    trigger_matcher: TriggerMatcher,
    variables: VariableContext,
    locks: DashMap<UserStateKey, Arc<AsyncMutex<()>>>,
}

impl UserStateService {
    pub fn new(store: Arc<dyn Store>, renderer: Arc<dyn Renderer>) -> Self {
        Self {
            identifier: NodeIdentifier::new(store.clone(), renderer),
            validator: ReplyValidator::new(store.clone()),
            trigger_matcher: TriggerMatcher::new(store.clone()),
            variables: VariableContext::new(store.clone()),
            store,
            locks: DashMap::new(),
        }
    }

    fn lock_for(&self, key: &UserStateKey) -> Arc<AsyncMutex<()>> {
        self.locks.entry(key.clone()).or_insert_with(|| Arc::new(AsyncMutex::new(()))).clone()
    }

    /// Acquires the per-user mutex for the duration of the event so two
    /// concurrent events for the same user can never interleave their
    /// reads and writes of `UserState` (§5).
    pub async fn process_event(&self, event: InboundEvent) -> Result<ProcessOutcome> {
        let key = UserStateKey::new(
            event.user_identifier.clone(),
            event.brand_id.clone(),
            event.channel.as_str(),
            event.channel_account_id.clone(),
        );
        let lock = self.lock_for(&key);
        let _guard = lock.lock().await;

        let mut user = self.store.get_user_state(&key).await?.unwrap_or_else(|| UserState::new(key.clone()));

        let outcome = if !user.is_in_automation {
            self.handle_new_trigger(&mut user, &event).await?
        } else if event.is_delay_complete {
            self.handle_delay_complete(&mut user, &event).await?
        } else {
            self.handle_automation_event(&mut user, &event).await?
        };

        self.store.save_user_state(&user).await?;
        Ok(outcome)
    }

    async fn handle_new_trigger(&self, user: &mut UserState, event: &InboundEvent) -> Result<ProcessOutcome> {
        let Some(matched) = self
            .trigger_matcher
            .match_event(&event.brand_id, &event.normalized, event.trigger_template_id.as_deref())
            .await?
        else {
            return Ok(ProcessOutcome::Dropped { reason: "no trigger matched".to_string() });
        };

        let req = IdentifyRequest {
            flow_id: &matched.flow_id,
            user_key: &user.key,
            channel: event.channel,
            recipient: &event.user_identifier,
            node_id_to_process: None,
            current_node_id: Some(matched.trigger_node_id),
            is_validation_error: false,
            fallback_message: None,
            reply_text: None,
        };
        let status = self.identifier.identify_and_process_node(req).await?;
        self.reconcile(user, &matched.flow_id, event, status, None).await
    }

    async fn handle_delay_complete(&self, user: &mut UserState, event: &InboundEvent) -> Result<ProcessOutcome> {
        let Some(delay_node) = user.delay_node_data.clone() else {
            // The timer fired after a real reply already interrupted the
            // wait and cleared delay_node_data — per §5 this is a no-op.
            return Ok(ProcessOutcome::Dropped { reason: "delay already interrupted".to_string() });
        };
        let flow_id = user
            .current_flow_id
            .clone()
            .ok_or_else(|| EngineError::FlowNotFound("<none: delay without current_flow_id>".to_string()))?;

        let vars = self.variables.snapshot(&flow_id, &user.key).await?;
        let InternalResult::Delay(info) = internal_node_processor::process(&delay_node, &vars) else {
            return Err(EngineError::NodeProcessingFailed("delay_node_data did not resolve to a delay result".to_string()));
        };

        self.store.clear_delay_timer_for_user(&user.key).await?;
        user.delay_node_data = None;

        let Some(target) = info.not_interrupted_node_id else {
            warn!(node_id = %delay_node.id, "delay node has no __not_interrupted branch; exiting automation");
            user.exit_automation();
            return Ok(ProcessOutcome::Dropped { reason: "delay node missing __not_interrupted branch".to_string() });
        };

        let req = IdentifyRequest {
            flow_id: &flow_id,
            user_key: &user.key,
            channel: event.channel,
            recipient: &event.user_identifier,
            node_id_to_process: Some(target),
            current_node_id: None,
            is_validation_error: false,
            fallback_message: None,
            reply_text: None,
        };
        let status = self.identifier.identify_and_process_node(req).await?;
        self.reconcile(user, &flow_id, event, status, None).await
    }

    async fn handle_automation_event(&self, user: &mut UserState, event: &InboundEvent) -> Result<ProcessOutcome> {
        let flow_id = user
            .current_flow_id
            .clone()
            .ok_or_else(|| EngineError::FlowNotFound("<none: in automation without current_flow_id>".to_string()))?;
        let current_node_id = user
            .current_node_id
            .clone()
            .ok_or_else(|| EngineError::CurrentNodeNotFound("<none: in automation without current_node_id>".to_string()))?;
        let flow = self.store.get_flow(&flow_id).await?.ok_or_else(|| EngineError::FlowNotFound(flow_id.clone()))?;
        let node = flow.node(&current_node_id).ok_or_else(|| EngineError::CurrentNodeNotFound(current_node_id.clone()))?;

        if !node.user_input_required() {
            warn!(node_id = %current_node_id, "user is parked on a node that expects no reply; dropping event");
            return Ok(ProcessOutcome::Dropped { reason: "current node does not expect a reply".to_string() });
        }

        let is_text = node.is_text_question();
        let verdict = self
            .validator
            .validate(&event.normalized, &flow_id, &current_node_id, is_text, user.validation.failure_count)
            .await?;
        let reply_text = Some(event.normalized.get_text_content());

        match verdict {
            ValidationVerdict::UseDefaultEdge => {
                let req = IdentifyRequest {
                    flow_id: &flow_id,
                    user_key: &user.key,
                    channel: event.channel,
                    recipient: &event.user_identifier,
                    node_id_to_process: None,
                    current_node_id: Some(current_node_id.clone()),
                    is_validation_error: false,
                    fallback_message: None,
                    reply_text,
                };
                let status = self.identifier.identify_and_process_node(req).await?;
                self.reconcile(user, &flow_id, event, status, None).await
            }
            ValidationVerdict::Matched { matched_answer_id } => {
                let target = node
                    .expected_answers()
                    .iter()
                    .find(|a| a.id == matched_answer_id)
                    .map(|a| a.node_result_id.clone())
                    .ok_or_else(|| EngineError::NodeProcessingFailed(format!("unknown expected answer id {matched_answer_id}")))?;
                let req = IdentifyRequest {
                    flow_id: &flow_id,
                    user_key: &user.key,
                    channel: event.channel,
                    recipient: &event.user_identifier,
                    node_id_to_process: Some(target),
                    current_node_id: Some(current_node_id.clone()),
                    is_validation_error: false,
                    fallback_message: None,
                    reply_text,
                };
                let status = self.identifier.identify_and_process_node(req).await?;
                self.reconcile(user, &flow_id, event, status, None).await
            }
            ValidationVerdict::MatchedOtherNode { matched_node_id } => {
                let req = IdentifyRequest {
                    flow_id: &flow_id,
                    user_key: &user.key,
                    channel: event.channel,
                    recipient: &event.user_identifier,
                    node_id_to_process: Some(matched_node_id),
                    current_node_id: Some(current_node_id.clone()),
                    is_validation_error: false,
                    fallback_message: None,
                    reply_text,
                };
                let status = self.identifier.identify_and_process_node(req).await?;
                self.reconcile(user, &flow_id, event, status, None).await
            }
            ValidationVerdict::MismatchRetry { fallback_message } => {
                user.validation.failure_count += 1;
                user.validation.validation_failed = true;
                user.validation.failure_message = fallback_message.clone();
                let req = IdentifyRequest {
                    flow_id: &flow_id,
                    user_key: &user.key,
                    channel: event.channel,
                    recipient: &event.user_identifier,
                    node_id_to_process: Some(current_node_id.clone()),
                    current_node_id: Some(current_node_id.clone()),
                    is_validation_error: true,
                    fallback_message,
                    reply_text: None,
                };
                let status = self.identifier.identify_and_process_node(req).await?;
                self.reconcile(user, &flow_id, event, status, Some(VerdictKind::MismatchRetry)).await
            }
            ValidationVerdict::ValidationExit { fallback_message } => {
                let req = IdentifyRequest {
                    flow_id: &flow_id,
                    user_key: &user.key,
                    channel: event.channel,
                    recipient: &event.user_identifier,
                    node_id_to_process: None,
                    current_node_id: Some(current_node_id.clone()),
                    is_validation_error: true,
                    fallback_message,
                    reply_text: None,
                };
                self.identifier.identify_and_process_node(req).await?;
                user.exit_automation();
                Ok(ProcessOutcome::Processed)
            }
        }
    }

    /// `handle_successful_node_processing`: applies the validation-state
    /// update, then chains through message/condition nodes until it lands
    /// on a user-input node, a delay, or a terminal node.
    async fn reconcile(
        &self,
        user: &mut UserState,
        flow_id: &str,
        event: &InboundEvent,
        mut status: IdentifyStatus,
        verdict_kind: Option<VerdictKind>,
    ) -> Result<ProcessOutcome> {
        if verdict_kind != Some(VerdictKind::MismatchRetry) {
            user.validation.reset();
        }

        loop {
            match status {
                IdentifyStatus::InternalNode { next_node_id, result } => match result {
                    InternalResult::Condition { branch_node_id } => {
                        let Some(target) = branch_node_id else {
                            warn!(node_id = %next_node_id, "condition node matched no branch; exiting automation");
                            user.exit_automation();
                            return Ok(ProcessOutcome::Processed);
                        };
                        let req = IdentifyRequest {
                            flow_id,
                            user_key: &user.key,
                            channel: event.channel,
                            recipient: &event.user_identifier,
                            node_id_to_process: Some(target),
                            current_node_id: Some(next_node_id),
                            is_validation_error: false,
                            fallback_message: None,
                            reply_text: None,
                        };
                        status = self.identifier.identify_and_process_node(req).await?;
                    }
                    InternalResult::Delay(info) => {
                        let flow = self.store.get_flow(flow_id).await?.ok_or_else(|| EngineError::FlowNotFound(flow_id.to_string()))?;
                        let delay_node = flow
                            .node(&next_node_id)
                            .cloned()
                            .ok_or_else(|| EngineError::NextNodeNotFound(next_node_id.clone()))?;
                        let now = Utc::now();
                        let completes_at = now + chrono::Duration::seconds(info.wait_time_seconds.max(0));
                        self.store
                            .create_delay_timer(&DelayTimer {
                                id: Uuid::new_v4().to_string(),
                                user_state_key: user.key.clone(),
                                flow_id: flow_id.to_string(),
                                delay_node_id: next_node_id.clone(),
                                started_at: now,
                                completes_at,
                                processed: false,
                            })
                            .await?;
                        user.is_in_automation = true;
                        user.current_flow_id = Some(flow_id.to_string());
                        user.delay_node_data = Some(delay_node);
                        return Ok(ProcessOutcome::Processed);
                    }
                },
                IdentifyStatus::Success { next_node_id } => {
                    let flow = self.store.get_flow(flow_id).await?.ok_or_else(|| EngineError::FlowNotFound(flow_id.to_string()))?;
                    let node = flow.node(&next_node_id).ok_or_else(|| EngineError::NextNodeNotFound(next_node_id.clone()))?;

                    if node.user_input_required() {
                        user.is_in_automation = true;
                        user.current_flow_id = Some(flow_id.to_string());
                        user.current_node_id = Some(next_node_id);
                        return Ok(ProcessOutcome::Processed);
                    }

                    if flow.outgoing_edge(&next_node_id).is_none() {
                        user.exit_automation();
                        return Ok(ProcessOutcome::Processed);
                    }

                    let req = IdentifyRequest {
                        flow_id,
                        user_key: &user.key,
                        channel: event.channel,
                        recipient: &event.user_identifier,
                        node_id_to_process: None,
                        current_node_id: Some(next_node_id),
                        is_validation_error: false,
                        fallback_message: None,
                        reply_text: None,
                    };
                    status = self.identifier.identify_and_process_node(req).await?;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flowrunner_common::InteractiveType;
    use flowrunner_store::memory::InMemoryStore;
    use flowrunner_store::{
        AnswerValidation, CondType, Condition, ConditionOperator, ConditionResultEntry, DelayUnit, Edge, ExpectedAnswer, Flow,
        FlowNodeType, FlowStatus, Node, NodeBody,
    };

    fn key() -> UserStateKey {
        UserStateKey::new("+1555", "brand1", "whatsapp", "acct1")
    }

    fn event(text: &str) -> InboundEvent {
        let mut normalized = NormalizedMessage::empty(serde_json::json!({}));
        normalized.text = Some(text.to_string());
        normalized.interactive_type = InteractiveType::None;
        InboundEvent {
            user_identifier: "+1555".into(),
            brand_id: "brand1".into(),
            channel: Channel::Whatsapp,
            channel_account_id: "acct1".into(),
            normalized,
            is_delay_complete: false,
            trigger_template_id: None,
        }
    }

    fn delay_complete_event() -> InboundEvent {
        let mut e = event("");
        e.is_delay_complete = true;
        e
    }

    fn trigger_node() -> Node {
        Node {
            id: "tr".into(),
            flow_node_type: FlowNodeType::Trigger,
            position: None,
            is_start_node: true,
            body: NodeBody::TriggerKeyword { trigger_keywords: ["hi".to_string()].into_iter().collect() },
        }
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

    fn flow(nodes: Vec<Node>, edges: Vec<Edge>) -> Flow {
        Flow {
            id: "flow1".into(),
            name: "test".into(),
            brand_id: "brand1".into(),
            user_id: "author1".into(),
            status: FlowStatus::Published,
            nodes,
            edges,
            created_at: Utc::now(),
            updated_at: Utc::now(),
            transform: None,
        }
    }

    fn service(store: Arc<InMemoryStore>) -> UserStateService {
        UserStateService::new(store, Arc::new(crate::renderer::LoggingRenderer))
    }

    #[tokio::test]
    async fn new_trigger_chains_through_messages_to_first_question() {
        let store = Arc::new(InMemoryStore::new());
        store.seed_flow(flow(
            vec![trigger_node(), message_node("m1"), text_question_node("q1")],
            vec![
                Edge { id: "e1".into(), source_node_id: "tr".into(), target_node_id: "m1".into() },
                Edge { id: "e2".into(), source_node_id: "m1".into(), target_node_id: "q1".into() },
            ],
        ));
        let svc = service(store.clone());
        let outcome = svc.process_event(event("hi")).await.unwrap();
        assert_eq!(outcome, ProcessOutcome::Processed);
        let state = store.get_user_state(&key()).await.unwrap().unwrap();
        assert!(state.is_in_automation);
        assert_eq!(state.current_node_id.as_deref(), Some("q1"));
    }

    #[tokio::test]
    async fn unmatched_trigger_is_dropped_without_creating_state() {
        let store = Arc::new(InMemoryStore::new());
        store.seed_flow(flow(vec![trigger_node(), message_node("m1")], vec![Edge { id: "e1".into(), source_node_id: "tr".into(), target_node_id: "m1".into() }]));
        let svc = service(store.clone());
        let outcome = svc.process_event(event("nonsense")).await.unwrap();
        assert_eq!(outcome, ProcessOutcome::Dropped { reason: "no trigger matched".to_string() });
    }

    #[tokio::test]
    async fn text_question_reply_persists_variable_and_advances() {
        let store = Arc::new(InMemoryStore::new());
        store.seed_flow(flow(
            vec![trigger_node(), text_question_node("q1"), message_node("m1")],
            vec![
                Edge { id: "e1".into(), source_node_id: "tr".into(), target_node_id: "q1".into() },
                Edge { id: "e2".into(), source_node_id: "q1".into(), target_node_id: "m1".into() },
            ],
        ));
        let svc = service(store.clone());
        svc.process_event(event("hi")).await.unwrap();
        svc.process_event(event("Shraddha")).await.unwrap();

        let state = store.get_user_state(&key()).await.unwrap().unwrap();
        assert!(!state.is_in_automation);
        let vars = store.snapshot_variables(&key(), "flow1").await.unwrap();
        assert_eq!(vars.get("name").map(String::as_str), Some("Shraddha"));
    }

    #[tokio::test]
    async fn button_mismatch_increments_failure_count_and_retries() {
        let store = Arc::new(InMemoryStore::new());
        let bq = Node {
            id: "bq".into(),
            flow_node_type: FlowNodeType::Question,
            position: None,
            is_start_node: false,
            body: NodeBody::ButtonQuestion {
                header: None,
                body: Some("pick one".into()),
                footer: None,
                expected_answers: vec![ExpectedAnswer { id: "b1".into(), expected_input: "IIT".into(), is_default: false, node_result_id: "m1".into() }],
                default_node_result_id: None,
            },
        };
        store.seed_flow(flow(vec![trigger_node(), bq, message_node("m1")], vec![Edge { id: "e1".into(), source_node_id: "tr".into(), target_node_id: "bq".into() }]));
        let svc = service(store.clone());
        svc.process_event(event("hi")).await.unwrap();

        svc.process_event(event("nope")).await.unwrap();
        let state = store.get_user_state(&key()).await.unwrap().unwrap();
        assert!(state.is_in_automation);
        assert_eq!(state.current_node_id.as_deref(), Some("bq"));
        assert_eq!(state.validation.failure_count, 1);
    }

    #[tokio::test]
    async fn non_text_question_exits_automation_once_fails_count_is_exhausted() {
        let store = Arc::new(InMemoryStore::new());
        let age_question = Node {
            id: "q_age".into(),
            flow_node_type: FlowNodeType::Question,
            position: None,
            is_start_node: false,
            body: NodeBody::Question {
                flow_replies: vec![],
                user_input_variable: "@age".into(),
                answer_validation: Some(AnswerValidation {
                    validation_type: Some("number".into()),
                    fallback: Some("please enter a number".into()),
                    fails_count: Some(1),
                    ..Default::default()
                }),
                is_media_accepted: false,
            },
        };
        store.seed_flow(flow(
            vec![trigger_node(), age_question, message_node("m1")],
            vec![Edge { id: "e1".into(), source_node_id: "tr".into(), target_node_id: "q_age".into() }],
        ));
        let svc = service(store.clone());
        svc.process_event(event("hi")).await.unwrap();

        let outcome = svc.process_event(event("not a number")).await.unwrap();
        assert_eq!(outcome, ProcessOutcome::Processed);
        let state = store.get_user_state(&key()).await.unwrap().unwrap();
        assert!(!state.is_in_automation);
        assert!(state.current_flow_id.is_none());
    }

    #[tokio::test]
    async fn condition_node_branches_to_correct_message_then_exits() {
        let store = Arc::new(InMemoryStore::new());
        let cond = Node {
            id: "c1".into(),
            flow_node_type: FlowNodeType::Condition,
            position: None,
            is_start_node: false,
            body: NodeBody::Condition {
                conditions: vec![Condition { id: "x".into(), cond_type: CondType::Equal, variable: "@name".into(), value: "John".into() }],
                operator: ConditionOperator::None,
                condition_result: vec![
                    ConditionResultEntry { id: "c1__true".into(), node_result_id: "myes".into() },
                    ConditionResultEntry { id: "c1__false".into(), node_result_id: "mno".into() },
                ],
            },
        };
        store.seed_flow(flow(
            vec![trigger_node(), cond, message_node("myes"), message_node("mno")],
            vec![Edge { id: "e1".into(), source_node_id: "tr".into(), target_node_id: "c1".into() }],
        ));
        store.set_variable(&key(), "flow1", "name", "John").await.unwrap();
        let svc = service(store.clone());
        let outcome = svc.process_event(event("hi")).await.unwrap();
        assert_eq!(outcome, ProcessOutcome::Processed);
        let state = store.get_user_state(&key()).await.unwrap().unwrap();
        assert!(!state.is_in_automation);
    }

    #[tokio::test]
    async fn delay_node_suspends_then_resumes_on_delay_complete() {
        let store = Arc::new(InMemoryStore::new());
        let delay = Node {
            id: "d1".into(),
            flow_node_type: FlowNodeType::Delay,
            position: None,
            is_start_node: false,
            body: NodeBody::Delay {
                delay_duration: 1,
                delay_unit: DelayUnit::Seconds,
                wait_for_reply: false,
                delay_interrupt: false,
                delay_result: vec![flowrunner_store::DelayResultEntry { id: "d1__not_interrupted".into(), node_result_id: "m1".into() }],
            },
        };
        store.seed_flow(flow(
            vec![trigger_node(), delay, message_node("m1")],
            vec![Edge { id: "e1".into(), source_node_id: "tr".into(), target_node_id: "d1".into() }],
        ));
        let svc = service(store.clone());
        svc.process_event(event("hi")).await.unwrap();

        let state = store.get_user_state(&key()).await.unwrap().unwrap();
        assert!(state.is_in_automation);
        assert!(state.delay_node_data.is_some());
        assert_eq!(state.current_flow_id.as_deref(), Some("flow1"));

        svc.process_event(delay_complete_event()).await.unwrap();
        let state = store.get_user_state(&key()).await.unwrap().unwrap();
        assert!(!state.is_in_automation);
        assert!(state.delay_node_data.is_none());
    }
}
