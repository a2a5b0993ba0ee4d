//! Engine assembly: endpoint pool, worker fleet, controller, burst monitor.

use anyhow::{ensure, Context, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinSet;
use tracing::{debug, info};

use hostprobe_common::{Endpoint, Prober, ResultRecord};

use crate::burst::BurstMonitor;
use crate::controller::Controller;
use crate::pool::AddressPool;
use crate::worker::Worker;

/// Default worker count, tuned for very high concurrency against a small
/// endpoint pool.
pub const DEFAULT_WORKERS: usize = 20_000;
/// Default residual-censorship cooldown applied after an RST.
pub const DEFAULT_RESIDUAL: Duration = Duration::from_secs(180);

/// Engine tuning knobs.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Number of concurrent probe workers.
    pub workers: usize,
    /// Seed endpoints: the full destination IP × port product.
    pub endpoints: Vec<Endpoint>,
    /// Cooldown applied to an endpoint that reset a connection.
    pub residual: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            workers: DEFAULT_WORKERS,
            endpoints: Vec::new(),
            residual: DEFAULT_RESIDUAL,
        }
    }
}

/// Drives every job from the source to a conclusive outcome.
pub struct Engine {
    config: EngineConfig,
    prober: Arc<dyn Prober>,
}

impl Engine {
    #[must_use]
    pub fn new(config: EngineConfig, prober: Arc<dyn Prober>) -> Self {
        Self { config, prober }
    }

    /// Run until the job source is exhausted and every worker has exited.
    ///
    /// Returns an error only for local failures that would corrupt the
    /// measurement, currently the open-file-descriptor ceiling; everything a
    /// target does to a probe is data on `results`, not an error.
    pub async fn run(
        self,
        jobs: mpsc::Receiver<String>,
        results: mpsc::Sender<ResultRecord>,
    ) -> Result<()> {
        ensure!(
            !self.config.endpoints.is_empty(),
            "no destination endpoints configured"
        );
        ensure!(self.config.workers > 0, "worker count must be positive");

        info!(
            workers = self.config.workers,
            endpoints = self.config.endpoints.len(),
            "starting engine"
        );

        let pool = Arc::new(AddressPool::new(self.config.endpoints.clone()));
        let jobs = Arc::new(Mutex::new(jobs));

        let mut control_channels = Vec::with_capacity(self.config.workers);
        let mut control_receivers = Vec::with_capacity(self.config.workers);
        for _ in 0..self.config.workers {
            let (tx, rx) = mpsc::channel(1);
            control_channels.push(tx);
            control_receivers.push(rx);
        }

        let (controller, handle) = Controller::new(control_channels);
        let burst = Arc::new(BurstMonitor::new(handle.clone()));

        let mut workers = JoinSet::new();
        for (id, control) in control_receivers.into_iter().enumerate() {
            let worker = Worker {
                id,
                control,
                jobs: Arc::clone(&jobs),
                pool: Arc::clone(&pool),
                prober: Arc::clone(&self.prober),
                results: results.clone(),
                burst: Arc::clone(&burst),
                residual: self.config.residual,
            };
            workers.spawn(worker.run());
        }
        drop(results);

        // Everything is wired; the controller now performs the one startup
        // broadcast from Paused to Running.
        let controller_task = tokio::spawn(controller.run());
        drop(handle);

        while let Some(joined) = workers.join_next().await {
            joined.context("worker task panicked")??;
        }
        debug!(retired = pool.retired(), "all workers finished");

        // The workers held the last burst-monitor reference and with it the
        // last command handle; dropping ours ends the controller's stream.
        drop(burst);
        controller_task.await.context("controller task panicked")?;
        Ok(())
    }
}
