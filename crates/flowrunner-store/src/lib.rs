//! Document collections for flows, nodes, triggers, users, user variables,
//! transactions, delays and the node-type catalog.
//!
//! The engine talks to persistence through the [`Store`] trait rather than
//! `mongodb` directly: [`MongoStore`] is the production implementation,
//! [`memory::InMemoryStore`] is a deterministic fake used by the
//! `flowrunner-core` test suite.

pub mod error;
pub mod memory;
pub mod model;
pub mod mongo;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

pub use error::{Result, StoreError};
pub use model::*;

/// Everything the runtime core needs from persistence. One method group per
/// aggregate.
#[async_trait]
pub trait Store: Send + Sync {
    // --- flows -----------------------------------------------------------
    async fn get_flow(&self, flow_id: &str) -> Result<Option<Flow>>;
    async fn upsert_flow(&self, flow: &Flow) -> Result<()>;
    async fn list_flows_by_owner(&self, user_id: &str, brand_id: Option<&str>) -> Result<Vec<Flow>>;
    async fn set_flow_status(&self, flow_id: &str, status: FlowStatus) -> Result<Flow>;

    // --- trigger projection ------------------------------------------------
    async fn list_trigger_projections(&self, brand_id: &str) -> Result<Vec<TriggerProjection>>;

    // --- user state --------------------------------------------------------
    async fn get_user_state(&self, key: &UserStateKey) -> Result<Option<UserState>>;
    async fn save_user_state(&self, state: &UserState) -> Result<()>;

    // --- variable context ----------------------------------------------------
    async fn get_variable(&self, key: &UserStateKey, flow_id: &str, name: &str) -> Result<Option<String>>;
    async fn set_variable(&self, key: &UserStateKey, flow_id: &str, name: &str, value: &str) -> Result<()>;
    async fn snapshot_variables(&self, key: &UserStateKey, flow_id: &str) -> Result<std::collections::HashMap<String, String>>;

    // --- delay timers --------------------------------------------------------
    async fn create_delay_timer(&self, timer: &DelayTimer) -> Result<()>;
    /// Atomically claim every unprocessed timer with `completes_at <= now`,
    /// marking them `processed=true` in the same step so no two ticks can
    /// claim the same row.
    async fn claim_expired_delay_timers(&self, now: DateTime<Utc>) -> Result<Vec<DelayTimer>>;
    async fn clear_delay_timer_for_user(&self, key: &UserStateKey) -> Result<()>;

    // --- transactions & catalog ----------------------------------------------
    async fn record_transaction(&self, txn: &Transaction) -> Result<()>;
    async fn transaction_counts(&self, flow_id: &str) -> Result<std::collections::HashMap<String, u64>>;
}
