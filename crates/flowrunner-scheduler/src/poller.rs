//! Single delay-tick poll: claims expired timers and feeds each through the
//! engine as a synthetic `delay_complete` event. One failing row never
//! blocks the rest of the batch (§7 Error Handling Design).

use std::sync::Arc;

use chrono::Utc;
use flowrunner_core::Engine;
use flowrunner_store::Store;
use tracing::{debug, warn};

use crate::SchedulerError;

#[derive(Clone)]
pub struct DelayTickPoller {
    store: Arc<dyn Store>,
    engine: Arc<Engine>,
}

impl DelayTickPoller {
    pub fn new(store: Arc<dyn Store>, engine: Arc<Engine>) -> Self {
        Self { store, engine }
    }

    /// Claims every `DelayTimer` with `completes_at <= now` and resumes its
    /// user. Returns the number of timers successfully processed.
    pub async fn tick(&self) -> Result<usize, SchedulerError> {
        let claimed = self.store.claim_expired_delay_timers(Utc::now()).await?;
        if claimed.is_empty() {
            debug!("no expired delay timers this tick");
            return Ok(0);
        }

        metrics::gauge!("flowrunner.scheduler.claimed_timers").set(claimed.len() as f64);
        debug!(count = claimed.len(), "claimed expired delay timers");

        let mut processed = 0usize;
        for timer in claimed {
            let key = timer.user_state_key.clone();
            match self.engine.handle_delay_complete(key).await {
                Ok(outcome) => {
                    debug!(user_state_key = %timer.user_state_key.as_id(), flow_id = %timer.flow_id, outcome = ?outcome, "delay_complete processed");
                    metrics::counter!("flowrunner.scheduler.delay_complete_total").increment(1);
                    processed += 1;
                }
                Err(e) => {
                    // The row is already marked processed — a failing
                    // resume does not retry on the next tick, matching the
                    // "at-most-once rendering" acceptance in §5. The user's
                    // next inbound event re-derives state normally.
                    warn!(user_state_key = %timer.user_state_key.as_id(), error = %e, "delay_complete processing failed");
                    metrics::counter!("flowrunner.scheduler.delay_complete_errors_total").increment(1);
                }
            }
        }
        Ok(processed)
    }
}

impl std::fmt::Debug for DelayTickPoller {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DelayTickPoller").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use flowrunner_core::LoggingRenderer;
    use flowrunner_store::memory::InMemoryStore;
    use flowrunner_store::{DelayTimer, Edge, Flow, FlowNodeType, FlowStatus, Node, NodeBody, UserState, UserStateKey};

    fn key() -> UserStateKey {
        UserStateKey::new("+1555", "brand1", "whatsapp", "acct1")
    }

    fn message_node(id: &str) -> Node {
        Node { id: id.into(), flow_node_type: FlowNodeType::Message, position: None, is_start_node: false, body: NodeBody::Message { flow_replies: vec![] } }
    }

    fn delay_node(id: &str) -> Node {
        Node {
            id: id.into(),
            flow_node_type: FlowNodeType::Delay,
            position: None,
            is_start_node: false,
            body: NodeBody::Delay {
                delay_duration: 1,
                delay_unit: flowrunner_store::DelayUnit::Seconds,
                wait_for_reply: false,
                delay_interrupt: false,
                delay_result: vec![flowrunner_store::DelayResultEntry { id: format!("{id}__not_interrupted"), node_result_id: "m1".into() }],
            },
        }
    }

    #[tokio::test]
    async fn tick_resumes_an_expired_timer() {
        let store = Arc::new(InMemoryStore::new());
        store.seed_flow(Flow {
            id: "flow1".into(),
            name: "t".into(),
            brand_id: "brand1".into(),
            user_id: "author1".into(),
            status: FlowStatus::Published,
            nodes: vec![delay_node("d1"), message_node("m1")],
            edges: vec![Edge { id: "e1".into(), source_node_id: "d1".into(), target_node_id: "m1".into() }],
            created_at: Utc::now(),
            updated_at: Utc::now(),
            transform: None,
        });
        let mut user = UserState::new(key());
        user.is_in_automation = true;
        user.current_flow_id = Some("flow1".into());
        user.delay_node_data = Some(delay_node("d1"));
        store.save_user_state(&user).await.unwrap();
        store
            .create_delay_timer(&DelayTimer {
                id: "t1".into(),
                user_state_key: key(),
                flow_id: "flow1".into(),
                delay_node_id: "d1".into(),
                started_at: Utc::now(),
                completes_at: Utc::now() - chrono::Duration::seconds(1),
                processed: false,
            })
            .await
            .unwrap();

        let engine = Arc::new(flowrunner_core::Engine::new(store.clone(), Arc::new(LoggingRenderer)));
        let poller = DelayTickPoller::new(store.clone(), engine);
        let processed = poller.tick().await.unwrap();
        assert_eq!(processed, 1);

        let state = store.get_user_state(&key()).await.unwrap().unwrap();
        assert!(state.delay_node_data.is_none());
        assert!(!state.is_in_automation);
    }

    #[tokio::test]
    async fn tick_is_a_no_op_when_nothing_expired() {
        let store = Arc::new(InMemoryStore::new());
        let engine = Arc::new(flowrunner_core::Engine::new(store.clone(), Arc::new(LoggingRenderer)));
        let poller = DelayTickPoller::new(store, engine);
        assert_eq!(poller.tick().await.unwrap(), 0);
    }
}
