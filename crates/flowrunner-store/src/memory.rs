//! Deterministic in-process [`Store`] fake. Used by the `flowrunner-core`
//! test suite so the user-state machine can be exercised end-to-end without
//! a MongoDB instance.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::{Result, StoreError};
use crate::model::*;
use crate::Store;

#[derive(Default)]
struct Inner {
    flows: HashMap<String, Flow>,
    user_states: HashMap<UserStateKey, UserState>,
    variables: HashMap<(UserStateKey, String), HashMap<String, String>>,
    delay_timers: Vec<DelayTimer>,
    transactions: Vec<Transaction>,
    trigger_projections: Vec<TriggerProjection>,
}

/// A plain mutex is fine here: this fake only ever serves a single test's
/// worth of traffic, and the real per-user serialization guarantee is
/// provided by `flowrunner-core`'s keyed mutex table, not by the store.
pub struct InMemoryStore {
    inner: Mutex<Inner>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self { inner: Mutex::new(Inner::default()) }
    }

    pub fn seed_flow(&self, flow: Flow) {
        self.inner.lock().unwrap().flows.insert(flow.id.clone(), flow);
    }

    /// Seeds a trigger-projection row directly, for tests exercising the
    /// Trigger Matcher without building a full flow graph. Rows derived
    /// from a seeded flow's own trigger nodes are still returned alongside
    /// these by `list_trigger_projections`.
    pub fn seed_trigger_projection(&self, row: TriggerProjection) {
        self.inner.lock().unwrap().trigger_projections.push(row);
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Store for InMemoryStore {
    async fn get_flow(&self, flow_id: &str) -> Result<Option<Flow>> {
        Ok(self.inner.lock().unwrap().flows.get(flow_id).cloned())
    }

    async fn upsert_flow(&self, flow: &Flow) -> Result<()> {
        self.inner.lock().unwrap().flows.insert(flow.id.clone(), flow.clone());
        Ok(())
    }

    async fn list_flows_by_owner(&self, user_id: &str, brand_id: Option<&str>) -> Result<Vec<Flow>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .flows
            .values()
            .filter(|f| f.user_id == user_id && brand_id.map(|b| b == f.brand_id).unwrap_or(true))
            .cloned()
            .collect())
    }

    async fn set_flow_status(&self, flow_id: &str, status: FlowStatus) -> Result<Flow> {
        let mut inner = self.inner.lock().unwrap();
        let flow = inner
            .flows
            .get_mut(flow_id)
            .ok_or_else(|| StoreError::NotFound { entity: "flow", id: flow_id.to_string() })?;
        if !flow.status.can_transition_to(status) {
            return Err(StoreError::InvalidTransition {
                from: format!("{:?}", flow.status),
                to: format!("{status:?}"),
            });
        }
        flow.status = status;
        flow.updated_at = Utc::now();
        Ok(flow.clone())
    }

    async fn list_trigger_projections(&self, brand_id: &str) -> Result<Vec<TriggerProjection>> {
        let inner = self.inner.lock().unwrap();
        let mut rows = Vec::new();
        for flow in inner.flows.values().filter(|f| f.brand_id == brand_id && f.status == FlowStatus::Published) {
            for node in flow.nodes.iter().filter(|n| n.flow_node_type == FlowNodeType::Trigger) {
                rows.push(TriggerProjection {
                    node_id: node.id.clone(),
                    flow_id: flow.id.clone(),
                    brand_id: flow.brand_id.clone(),
                    status: flow.status,
                    updated_at: flow.updated_at,
                    trigger_keywords: match &node.body {
                        NodeBody::TriggerKeyword { trigger_keywords } => Some(trigger_keywords.clone()),
                        _ => None,
                    },
                    trigger_template_id: match &node.body {
                        NodeBody::TriggerTemplate { trigger_template_id, .. } => Some(trigger_template_id.clone()),
                        _ => None,
                    },
                });
            }
        }
        rows.extend(inner.trigger_projections.iter().filter(|p| p.brand_id == brand_id).cloned());
        Ok(rows)
    }

    async fn get_user_state(&self, key: &UserStateKey) -> Result<Option<UserState>> {
        Ok(self.inner.lock().unwrap().user_states.get(key).cloned())
    }

    async fn save_user_state(&self, state: &UserState) -> Result<()> {
        self.inner.lock().unwrap().user_states.insert(state.key.clone(), state.clone());
        Ok(())
    }

    async fn get_variable(&self, key: &UserStateKey, flow_id: &str, name: &str) -> Result<Option<String>> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .variables
            .get(&(key.clone(), flow_id.to_string()))
            .and_then(|m| m.get(name).cloned()))
    }

    async fn set_variable(&self, key: &UserStateKey, flow_id: &str, name: &str, value: &str) -> Result<()> {
        self.inner
            .lock()
            .unwrap()
            .variables
            .entry((key.clone(), flow_id.to_string()))
            .or_default()
            .insert(name.to_string(), value.to_string());
        Ok(())
    }

    async fn snapshot_variables(&self, key: &UserStateKey, flow_id: &str) -> Result<HashMap<String, String>> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .variables
            .get(&(key.clone(), flow_id.to_string()))
            .cloned()
            .unwrap_or_default())
    }

    async fn create_delay_timer(&self, timer: &DelayTimer) -> Result<()> {
        self.inner.lock().unwrap().delay_timers.push(timer.clone());
        Ok(())
    }

    async fn claim_expired_delay_timers(&self, now: DateTime<Utc>) -> Result<Vec<DelayTimer>> {
        let mut inner = self.inner.lock().unwrap();
        let mut claimed = Vec::new();
        for timer in inner.delay_timers.iter_mut() {
            if !timer.processed && timer.completes_at <= now {
                timer.processed = true;
                claimed.push(timer.clone());
            }
        }
        Ok(claimed)
    }

    async fn clear_delay_timer_for_user(&self, key: &UserStateKey) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        inner.delay_timers.retain(|t| !(t.user_state_key == *key && !t.processed));
        Ok(())
    }

    async fn record_transaction(&self, txn: &Transaction) -> Result<()> {
        self.inner.lock().unwrap().transactions.push(txn.clone());
        Ok(())
    }

    async fn transaction_counts(&self, flow_id: &str) -> Result<HashMap<String, u64>> {
        let inner = self.inner.lock().unwrap();
        let mut counts = HashMap::new();
        for txn in inner.transactions.iter().filter(|t| t.flow_id == flow_id) {
            *counts.entry(txn.node_id.clone()).or_insert(0u64) += 1;
        }
        Ok(counts)
    }
}
