//! Delay Scheduler (C9): a background worker that periodically sweeps
//! expired [`flowrunner_store::DelayTimer`] rows and resumes each user via a
//! synthetic `delay_complete` event, a plain `tokio::time::interval` tick
//! loop driven by `DELAY_TICK_SECONDS`.

pub mod poller;

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::RwLock;
use tokio::time::interval;
use tracing::{error, info, warn};

pub use poller::DelayTickPoller;

#[derive(Error, Debug)]
pub enum SchedulerError {
    #[error("store error: {0}")]
    Store(#[from] flowrunner_store::StoreError),
    #[error("engine error: {0}")]
    Engine(#[from] flowrunner_core::EngineError),
}

#[derive(Debug, Clone)]
pub struct DelaySchedulerConfig {
    pub tick: Duration,
}

impl Default for DelaySchedulerConfig {
    fn default() -> Self {
        Self { tick: Duration::from_secs(20) }
    }
}

impl From<&flowrunner_config::SchedulerConfig> for DelaySchedulerConfig {
    fn from(c: &flowrunner_config::SchedulerConfig) -> Self {
        Self { tick: Duration::from_secs(c.tick_seconds) }
    }
}

/// Owns the tick loop; `start` spawns it and returns immediately.
pub struct DelayScheduler {
    config: DelaySchedulerConfig,
    poller: DelayTickPoller,
    running: Arc<RwLock<bool>>,
}

impl DelayScheduler {
    pub fn new(config: DelaySchedulerConfig, store: Arc<dyn flowrunner_store::Store>, engine: Arc<flowrunner_core::Engine>) -> Self {
        Self { config, poller: DelayTickPoller::new(store, engine), running: Arc::new(RwLock::new(false)) }
    }

    pub async fn start(&self) {
        let mut running = self.running.write().await;
        if *running {
            warn!("delay scheduler already running");
            return;
        }
        *running = true;
        drop(running);

        info!(tick_seconds = self.config.tick.as_secs(), "starting delay scheduler");

        let poller = self.poller.clone();
        let tick = self.config.tick;
        let running_clone = self.running.clone();

        tokio::spawn(async move {
            let mut ticker = interval(tick);
            loop {
                ticker.tick().await;
                if !*running_clone.read().await {
                    break;
                }
                if let Err(e) = poller.tick().await {
                    error!(error = %e, "delay scheduler tick failed; retrying next tick");
                }
            }
        });
    }

    pub async fn stop(&self) {
        let mut running = self.running.write().await;
        *running = false;
        info!("delay scheduler stopped");
    }

    pub async fn is_running(&self) -> bool {
        *self.running.read().await
    }
}
