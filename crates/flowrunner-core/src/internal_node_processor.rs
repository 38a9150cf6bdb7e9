//! Internal-Node Processor (C5): resolves a condition node to a branch node
//! id, or computes a delay node's wait duration. Never mutates state — it
//! only returns data for the Node Identifier / User State Service to act on.

use std::collections::HashMap;

use flowrunner_store::{DelayUnit, Node, NodeBody};

use crate::condition_evaluator;

#[derive(Debug, Clone)]
pub enum InternalResult {
    Condition { branch_node_id: Option<String> },
    Delay(DelayInfo),
}

#[derive(Debug, Clone)]
pub struct DelayInfo {
    pub delay_duration: i64,
    pub delay_unit: DelayUnit,
    pub wait_time_seconds: i64,
    pub wait_for_reply: bool,
    /// `nodeResultId` of the `__not_interrupted` branch — the only reachable
    /// one until delay-interrupt ships (see DESIGN.md).
    pub not_interrupted_node_id: Option<String>,
}

pub fn process(node: &Node, vars: &HashMap<String, String>) -> InternalResult {
    match &node.body {
        NodeBody::Condition { conditions, operator, condition_result } => {
            let outcome = condition_evaluator::evaluate(conditions, *operator, condition_result, vars);
            InternalResult::Condition { branch_node_id: outcome.node_result_id }
        }
        NodeBody::Delay { delay_duration, delay_unit, wait_for_reply, delay_result, .. } => {
            let wait_time_seconds = if *delay_duration > 0 { delay_duration * delay_unit.seconds_per_unit() } else { 0 };
            let not_interrupted_node_id = delay_result.iter().find(|r| r.id.ends_with("__not_interrupted")).map(|r| r.node_result_id.clone());
            InternalResult::Delay(DelayInfo {
                delay_duration: *delay_duration,
                delay_unit: *delay_unit,
                wait_time_seconds,
                wait_for_reply: *wait_for_reply,
                not_interrupted_node_id,
            })
        }
        _ => unreachable!("internal_node_processor only called on condition/delay nodes"),
    }
}
