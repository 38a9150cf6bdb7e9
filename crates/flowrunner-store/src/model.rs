//! Document shapes for the flow graph, per-user runtime state, and the
//! projections the engine reads instead of scanning every node of every flow.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle status of an authored flow. Only `Published` flows are eligible
/// for trigger matching.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlowStatus {
    Draft,
    Published,
    Stop,
}

impl FlowStatus {
    /// Enforces the transition table from the flow authoring interface:
    /// draft->published, published->stop, stop->published. Any->draft is
    /// rejected.
    pub fn can_transition_to(self, target: FlowStatus) -> bool {
        use FlowStatus::*;
        matches!(
            (self, target),
            (Draft, Published) | (Published, Stop) | (Stop, Published)
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlowNodeType {
    Trigger,
    Message,
    Question,
    Condition,
    Delay,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CondType {
    Equal,
    NotEqual,
    Contains,
    NotContains,
    GreaterThan,
    LessThan,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "PascalCase")]
pub enum ConditionOperator {
    #[default]
    None,
    And,
    Or,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DelayUnit {
    Seconds,
    Minutes,
    Hours,
    Days,
}

impl DelayUnit {
    pub fn seconds_per_unit(self) -> i64 {
        match self {
            DelayUnit::Seconds => 1,
            DelayUnit::Minutes => 60,
            DelayUnit::Hours => 3600,
            DelayUnit::Days => 86_400,
        }
    }
}

/// `{id, expectedInput, isDefault, nodeResultId}` — an interactive choice's
/// target bypasses the edge set entirely.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExpectedAnswer {
    pub id: String,
    #[serde(rename = "expectedInput")]
    pub expected_input: String,
    #[serde(rename = "isDefault", default)]
    pub is_default: bool,
    #[serde(rename = "nodeResultId")]
    pub node_result_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AnswerValidation {
    #[serde(rename = "type", default)]
    pub validation_type: Option<String>,
    #[serde(rename = "minValue", default)]
    pub min_value: Option<f64>,
    #[serde(rename = "maxValue", default)]
    pub max_value: Option<f64>,
    #[serde(default)]
    pub regex: Option<String>,
    #[serde(default)]
    pub fallback: Option<String>,
    #[serde(rename = "failsCount", default)]
    pub fails_count: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Condition {
    pub id: String,
    pub cond_type: CondType,
    pub variable: String,
    pub value: String,
}

/// One of the two entries (`__true` / `__false`) a condition node's result
/// list must carry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConditionResultEntry {
    pub id: String,
    pub node_result_id: String,
}

/// One of the two entries (`__interrupted` / `__not_interrupted`) a delay
/// node's result list must carry. `__interrupted` is unreachable until the
/// delay-interrupt feature ships (see DESIGN.md).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DelayResultEntry {
    pub id: String,
    pub node_result_id: String,
}

/// Node-type-specific payload, internally tagged by `type` the way the
/// source authoring tool serializes it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NodeBody {
    TriggerKeyword {
        #[serde(default)]
        trigger_keywords: BTreeSet<String>,
    },
    TriggerTemplate {
        trigger_template_id: String,
        #[serde(default)]
        expected_answers: Vec<ExpectedAnswer>,
    },
    Message {
        #[serde(default)]
        flow_replies: Vec<serde_json::Value>,
    },
    Question {
        #[serde(default)]
        flow_replies: Vec<serde_json::Value>,
        user_input_variable: String,
        #[serde(default)]
        answer_validation: Option<AnswerValidation>,
        #[serde(default)]
        is_media_accepted: bool,
    },
    ButtonQuestion {
        #[serde(default)]
        header: Option<String>,
        #[serde(default)]
        body: Option<String>,
        #[serde(default)]
        footer: Option<String>,
        #[serde(default)]
        expected_answers: Vec<ExpectedAnswer>,
        #[serde(default)]
        default_node_result_id: Option<String>,
    },
    ListQuestion {
        #[serde(default)]
        header: Option<String>,
        #[serde(default)]
        body: Option<String>,
        #[serde(default)]
        footer: Option<String>,
        #[serde(default)]
        flow_replies: Vec<serde_json::Value>,
        #[serde(default)]
        expected_answers: Vec<ExpectedAnswer>,
    },
    Condition {
        conditions: Vec<Condition>,
        #[serde(default)]
        operator: ConditionOperator,
        condition_result: Vec<ConditionResultEntry>,
    },
    Delay {
        delay_duration: i64,
        delay_unit: DelayUnit,
        #[serde(default)]
        wait_for_reply: bool,
        #[serde(default)]
        delay_interrupt: bool,
        delay_result: Vec<DelayResultEntry>,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node {
    pub id: String,
    pub flow_node_type: FlowNodeType,
    #[serde(default)]
    pub position: Option<(f64, f64)>,
    #[serde(default)]
    pub is_start_node: bool,
    #[serde(flatten)]
    pub body: NodeBody,
}

impl Node {
    /// Whether the engine should hold the user at this node awaiting a
    /// reply. The node-type catalog is a deterministic projection of this.
    pub fn user_input_required(&self) -> bool {
        matches!(
            self.body,
            NodeBody::Question { .. } | NodeBody::ButtonQuestion { .. } | NodeBody::ListQuestion { .. } | NodeBody::TriggerTemplate { .. }
        )
    }

    pub fn is_internal(&self) -> bool {
        matches!(self.flow_node_type, FlowNodeType::Condition | FlowNodeType::Delay)
    }

    /// A free-text question (`answer_validation.type` absent or `"text"`)
    /// has nothing to match against; the Reply Validator skips straight to
    /// `use_default_edge` for these. A question with a non-text validation
    /// type (number/regex/email) still has no `expected_answers`, so it
    /// falls through to the mismatch/retry path on every reply until its
    /// `failsCount` is exhausted.
    pub fn is_text_question(&self) -> bool {
        match &self.body {
            NodeBody::Question { answer_validation, .. } => match answer_validation {
                None => true,
                Some(v) => matches!(v.validation_type.as_deref(), None | Some("text")),
            },
            _ => false,
        }
    }

    pub fn expected_answers(&self) -> &[ExpectedAnswer] {
        match &self.body {
            NodeBody::ButtonQuestion { expected_answers, .. }
            | NodeBody::ListQuestion { expected_answers, .. }
            | NodeBody::TriggerTemplate { expected_answers, .. } => expected_answers,
            _ => &[],
        }
    }

    pub fn fallback_message(&self) -> Option<&str> {
        match &self.body {
            NodeBody::Question { answer_validation: Some(v), .. } => v.fallback.as_deref(),
            _ => None,
        }
    }

    pub fn fails_count(&self) -> Option<i64> {
        match &self.body {
            NodeBody::Question { answer_validation: Some(v), .. } => v.fails_count,
            _ => None,
        }
    }

    pub fn user_input_variable(&self) -> Option<&str> {
        match &self.body {
            NodeBody::Question { user_input_variable, .. } => Some(user_input_variable.as_str()),
            _ => None,
        }
    }

    pub fn trigger_keywords(&self) -> Option<&BTreeSet<String>> {
        match &self.body {
            NodeBody::TriggerKeyword { trigger_keywords } => Some(trigger_keywords),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Edge {
    pub id: String,
    pub source_node_id: String,
    pub target_node_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Flow {
    pub id: String,
    pub name: String,
    pub brand_id: String,
    pub user_id: String,
    pub status: FlowStatus,
    #[serde(default)]
    pub nodes: Vec<Node>,
    #[serde(default)]
    pub edges: Vec<Edge>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub transform: Option<serde_json::Value>,
}

impl Flow {
    pub fn node(&self, node_id: &str) -> Option<&Node> {
        self.nodes.iter().find(|n| n.id == node_id)
    }

    /// The unique outgoing edge for a non-branching node. If more than one
    /// exists the first by stable id order wins (logged by the caller).
    pub fn outgoing_edge(&self, node_id: &str) -> Option<&Edge> {
        let mut matches: Vec<&Edge> = self.edges.iter().filter(|e| e.source_node_id == node_id).collect();
        matches.sort_by(|a, b| a.id.cmp(&b.id));
        matches.into_iter().next()
    }

    pub fn has_multiple_outgoing_edges(&self, node_id: &str) -> bool {
        self.edges.iter().filter(|e| e.source_node_id == node_id).count() > 1
    }
}

/// `(user_identifier, brand_id, channel, channel_account_id)` — uniquely
/// identifies an end user in a channel context.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UserStateKey {
    pub user_identifier: String,
    pub brand_id: String,
    pub channel: String,
    pub channel_account_id: String,
}

impl UserStateKey {
    pub fn new(
        user_identifier: impl Into<String>,
        brand_id: impl Into<String>,
        channel: impl Into<String>,
        channel_account_id: impl Into<String>,
    ) -> Self {
        Self {
            user_identifier: user_identifier.into(),
            brand_id: brand_id.into(),
            channel: channel.into(),
            channel_account_id: channel_account_id.into(),
        }
    }

    /// Stable string form used as a Mongo `_id` and as the `user_state_id`
    /// carried on synthetic `delay_complete` events.
    pub fn as_id(&self) -> String {
        format!("{}:{}:{}:{}", self.brand_id, self.channel, self.channel_account_id, self.user_identifier)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ValidationState {
    pub failure_count: u32,
    pub validation_failed: bool,
    pub failure_message: Option<String>,
}

impl ValidationState {
    pub fn reset(&mut self) {
        self.failure_count = 0;
        self.validation_failed = false;
        self.failure_message = None;
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserState {
    pub key: UserStateKey,
    pub is_in_automation: bool,
    pub current_flow_id: Option<String>,
    pub current_node_id: Option<String>,
    pub delay_node_data: Option<Node>,
    pub validation: ValidationState,
    pub last_event_at: DateTime<Utc>,
}

impl UserState {
    pub fn new(key: UserStateKey) -> Self {
        Self {
            key,
            is_in_automation: false,
            current_flow_id: None,
            current_node_id: None,
            delay_node_data: None,
            validation: ValidationState::default(),
            last_event_at: Utc::now(),
        }
    }

    pub fn exit_automation(&mut self) {
        self.is_in_automation = false;
        self.current_flow_id = None;
        self.current_node_id = None;
        self.validation.reset();
    }
}

/// One unprocessed-or-processed timer. Exactly one unprocessed timer may
/// exist per user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DelayTimer {
    pub id: String,
    pub user_state_key: UserStateKey,
    pub flow_id: String,
    pub delay_node_id: String,
    pub started_at: DateTime<Utc>,
    pub completes_at: DateTime<Utc>,
    pub processed: bool,
}

/// Denormalized row in the `flow_triggers` projection — lets the Trigger
/// Matcher avoid scanning every node of every flow.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TriggerProjection {
    pub node_id: String,
    pub flow_id: String,
    pub brand_id: String,
    pub status: FlowStatus,
    pub updated_at: DateTime<Utc>,
    pub trigger_keywords: Option<BTreeSet<String>>,
    pub trigger_template_id: Option<String>,
}

/// Append-only record written every time a node is entered.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transaction {
    pub id: String,
    pub flow_id: String,
    pub node_id: String,
    pub user_state_key: UserStateKey,
    pub at: DateTime<Utc>,
}
