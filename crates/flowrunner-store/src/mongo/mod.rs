//! MongoDB-backed implementation of [`crate::Store`], one repository per
//! aggregate.

mod delay_repository;
mod flow_repository;
mod transaction_repository;
mod trigger_repository;
mod user_state_repository;
mod variable_repository;

pub use delay_repository::DelayTimerRepository;
pub use flow_repository::FlowRepository;
pub use transaction_repository::TransactionRepository;
pub use trigger_repository::TriggerProjectionRepository;
pub use user_state_repository::UserStateRepository;
pub use variable_repository::VariableContextRepository;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use mongodb::Database;
use std::collections::HashMap;

use crate::error::Result;
use crate::model::*;
use crate::Store;

/// Composes the per-aggregate repositories behind the `Store` trait. Holds
/// no state of its own beyond the `Database` handle each repository clones.
pub struct MongoStore {
    flows: FlowRepository,
    user_states: UserStateRepository,
    variables: VariableContextRepository,
    delays: DelayTimerRepository,
    transactions: TransactionRepository,
    triggers: TriggerProjectionRepository,
}

impl MongoStore {
    pub fn new(db: Database) -> Self {
        Self {
            flows: FlowRepository::new(db.clone()),
            user_states: UserStateRepository::new(db.clone()),
            variables: VariableContextRepository::new(db.clone()),
            delays: DelayTimerRepository::new(db.clone()),
            transactions: TransactionRepository::new(db.clone()),
            triggers: TriggerProjectionRepository::new(db),
        }
    }
}

#[async_trait]
impl Store for MongoStore {
    async fn get_flow(&self, flow_id: &str) -> Result<Option<Flow>> {
        self.flows.get(flow_id).await
    }

    async fn upsert_flow(&self, flow: &Flow) -> Result<()> {
        self.flows.upsert(flow).await?;
        self.triggers.rebuild_for_flow(flow).await
    }

    async fn list_flows_by_owner(&self, user_id: &str, brand_id: Option<&str>) -> Result<Vec<Flow>> {
        self.flows.list_by_owner(user_id, brand_id).await
    }

    async fn set_flow_status(&self, flow_id: &str, status: FlowStatus) -> Result<Flow> {
        let flow = self.flows.set_status(flow_id, status).await?;
        self.triggers.update_status_for_flow(flow_id, status).await?;
        Ok(flow)
    }

    async fn list_trigger_projections(&self, brand_id: &str) -> Result<Vec<TriggerProjection>> {
        self.triggers.list_for_brand(brand_id).await
    }

    async fn get_user_state(&self, key: &UserStateKey) -> Result<Option<UserState>> {
        self.user_states.get(key).await
    }

    async fn save_user_state(&self, state: &UserState) -> Result<()> {
        self.user_states.save(state).await
    }

    async fn get_variable(&self, key: &UserStateKey, flow_id: &str, name: &str) -> Result<Option<String>> {
        self.variables.get(key, flow_id, name).await
    }

    async fn set_variable(&self, key: &UserStateKey, flow_id: &str, name: &str, value: &str) -> Result<()> {
        self.variables.set(key, flow_id, name, value).await
    }

    async fn snapshot_variables(&self, key: &UserStateKey, flow_id: &str) -> Result<HashMap<String, String>> {
        self.variables.snapshot(key, flow_id).await
    }

    async fn create_delay_timer(&self, timer: &DelayTimer) -> Result<()> {
        self.delays.insert(timer).await
    }

    async fn claim_expired_delay_timers(&self, now: DateTime<Utc>) -> Result<Vec<DelayTimer>> {
        self.delays.claim_expired(now).await
    }

    async fn clear_delay_timer_for_user(&self, key: &UserStateKey) -> Result<()> {
        self.delays.clear_for_user(key).await
    }

    async fn record_transaction(&self, txn: &Transaction) -> Result<()> {
        self.transactions.insert(txn).await
    }

    async fn transaction_counts(&self, flow_id: &str) -> Result<HashMap<String, u64>> {
        self.transactions.counts_by_node(flow_id).await
    }
}
