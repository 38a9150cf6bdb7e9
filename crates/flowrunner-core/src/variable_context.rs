//! Variable Context (C3): per-`(user, brand, flow)` key→value store for
//! `@variable` references. A thin typed wrapper over the Store so callers
//! never have to remember to strip the leading `@` themselves.

use std::collections::HashMap;
use std::sync::Arc;

use flowrunner_store::{Store, UserStateKey};

use crate::error::Result;

pub struct VariableContext {
    store: Arc<dyn Store>,
}

impl VariableContext {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    fn strip_at(key: &str) -> &str {
        key.strip_prefix('@').unwrap_or(key)
    }

    /// Missing variables compare as the empty string to callers that use
    /// `get` directly for string comparisons; `None` is still returned here
    /// so the Condition Evaluator can tell "unset" apart from "set to
    /// empty" if it ever needs to.
    pub async fn get(&self, key: &str, flow_id: &str, user_key: &UserStateKey) -> Result<Option<String>> {
        Ok(self.store.get_variable(user_key, flow_id, Self::strip_at(key)).await?)
    }

    pub async fn set(&self, key: &str, flow_id: &str, user_key: &UserStateKey, value: &str) -> Result<()> {
        self.store.set_variable(user_key, flow_id, Self::strip_at(key), value).await?;
        Ok(())
    }

    pub async fn snapshot(&self, flow_id: &str, user_key: &UserStateKey) -> Result<HashMap<String, String>> {
        Ok(self.store.snapshot_variables(user_key, flow_id).await?)
    }
}
