//! Worker loop: one job at a time against the recycled endpoint pool.

use anyhow::{bail, Result};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use hostprobe_common::{classify, Attempt, Code, Prober, Reinsert, ResultRecord, WorkerState};

use crate::burst::BurstMonitor;
use crate::pool::AddressPool;

/// Job intake shared by every worker; whoever holds the lock takes the next
/// hostname.
pub(crate) type JobQueue = Arc<Mutex<mpsc::Receiver<String>>>;

enum Step {
    Control(Option<WorkerState>),
    Job(Option<String>),
}

pub(crate) struct Worker {
    pub(crate) id: usize,
    pub(crate) control: mpsc::Receiver<WorkerState>,
    pub(crate) jobs: JobQueue,
    pub(crate) pool: Arc<AddressPool>,
    pub(crate) prober: Arc<dyn Prober>,
    pub(crate) results: mpsc::Sender<ResultRecord>,
    pub(crate) burst: Arc<BurstMonitor>,
    pub(crate) residual: Duration,
}

impl Worker {
    /// Run until the job source closes, a Stopped broadcast arrives, or a
    /// fatal classification aborts the engine.
    pub(crate) async fn run(mut self) -> Result<()> {
        let mut state = WorkerState::Paused;
        loop {
            // A pending instruction is always applied before new work.
            match self.control.try_recv() {
                Ok(next) => {
                    self.apply(&mut state, next);
                    continue;
                }
                Err(mpsc::error::TryRecvError::Empty) => {}
                Err(mpsc::error::TryRecvError::Disconnected) => return Ok(()),
            }

            match state {
                WorkerState::Stopped => {
                    debug!(worker = self.id, "stopped");
                    return Ok(());
                }
                WorkerState::Paused => match self.control.recv().await {
                    Some(next) => self.apply(&mut state, next),
                    None => return Ok(()),
                },
                WorkerState::Running => {
                    let step = {
                        let jobs = Arc::clone(&self.jobs);
                        tokio::select! {
                            biased;
                            instruction = self.control.recv() => Step::Control(instruction),
                            job = async { jobs.lock().await.recv().await } => Step::Job(job),
                        }
                    };
                    match step {
                        Step::Control(Some(next)) => self.apply(&mut state, next),
                        Step::Control(None) => return Ok(()),
                        Step::Job(Some(host)) => self.probe_host(host).await?,
                        Step::Job(None) => {
                            debug!(worker = self.id, "job source exhausted");
                            return Ok(());
                        }
                    }
                }
            }
        }
    }

    fn apply(&self, state: &mut WorkerState, next: WorkerState) {
        if *state != next {
            debug!(worker = self.id, from = ?*state, to = ?next, "state change");
        }
        *state = next;
    }

    /// Retry `host` against successive endpoints until a conclusive outcome,
    /// then emit exactly one record.
    ///
    /// Control state is deliberately not re-checked in here; a worker mid-job
    /// finishes on the state it last observed. There is no retry cap, so a
    /// host that never concludes occupies this worker for the rest of the
    /// run.
    async fn probe_host(&self, host: String) -> Result<()> {
        debug!(worker = self.id, host = %host, "took job");
        let mut clock: Option<(DateTime<Utc>, Instant)> = None;
        loop {
            let endpoint = self.pool.acquire().await;
            // The measurement clock starts at the first connect attempt and
            // spans every endpoint retry; pool waits before it don't count.
            let (start_time, started) = *clock.get_or_insert_with(|| (Utc::now(), Instant::now()));

            let attempt = self.prober.probe(endpoint, &host).await;
            let class = classify(&attempt, self.residual);

            match &attempt {
                Attempt::OutOfFiles { stage, source } => {
                    error!(
                        worker = self.id,
                        %endpoint,
                        %stage,
                        error = %source,
                        "open-connection limit reached, aborting"
                    );
                    bail!("too many open connections while probing {endpoint}: {source}");
                }
                Attempt::ConnectFailed(e) => {
                    warn!(worker = self.id, %endpoint, host = %host, error = %e, "unexpected connect error");
                }
                Attempt::ExchangeFailed(e) => {
                    warn!(worker = self.id, %endpoint, host = %host, error = %e, "unexpected exchange error");
                }
                _ => {
                    debug!(worker = self.id, %endpoint, stage = %class.stage, code = %class.code, "attempt classified");
                }
            }

            if class.code == Code::Eof {
                self.burst.record(Instant::now());
            }
            if class.reinsert == Reinsert::Retire {
                info!(%endpoint, "endpoint refused the connection and will not be used again");
            }
            self.pool.release(endpoint, class.reinsert);

            if class.conclusive {
                let record = ResultRecord {
                    start_time,
                    host,
                    stage: class.stage,
                    code: class.code,
                    endpoint,
                    duration: started.elapsed(),
                };
                debug!(worker = self.id, %endpoint, code = %record.code, "conclusive outcome");
                // the sink only disappears during teardown
                let _ = self.results.send(record).await;
                return Ok(());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::ControllerHandle;
    use async_trait::async_trait;
    use hostprobe_common::Endpoint;
    use std::net::{IpAddr, Ipv4Addr};
    use tokio::time::{self, Duration};

    struct AlwaysComplete;

    #[async_trait]
    impl Prober for AlwaysComplete {
        async fn probe(&self, _endpoint: Endpoint, _host: &str) -> Attempt {
            Attempt::ResponseComplete
        }
    }

    struct Harness {
        control: mpsc::Sender<WorkerState>,
        jobs: mpsc::Sender<String>,
        results: mpsc::Receiver<ResultRecord>,
        worker: tokio::task::JoinHandle<Result<()>>,
    }

    fn harness() -> Harness {
        let (control_tx, control_rx) = mpsc::channel(1);
        let (job_tx, job_rx) = mpsc::channel(16);
        let (result_tx, result_rx) = mpsc::channel(16);
        let (command_tx, _command_rx) = mpsc::unbounded_channel();

        let endpoint = Endpoint::new(IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1)), 80);
        let worker = Worker {
            id: 0,
            control: control_rx,
            jobs: Arc::new(Mutex::new(job_rx)),
            pool: Arc::new(AddressPool::new(vec![endpoint])),
            prober: Arc::new(AlwaysComplete),
            results: result_tx,
            burst: Arc::new(BurstMonitor::new(ControllerHandle {
                commands: command_tx,
            })),
            residual: Duration::from_secs(180),
        };

        Harness {
            control: control_tx,
            jobs: job_tx,
            results: result_rx,
            worker: tokio::spawn(worker.run()),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn paused_worker_leaves_jobs_queued() {
        let mut h = harness();
        h.jobs.send("held.example".into()).await.unwrap();

        // never sent Running: the job must stay queued
        let waited = time::timeout(Duration::from_secs(60), h.results.recv()).await;
        assert!(waited.is_err());

        h.control.send(WorkerState::Running).await.unwrap();
        let record = h.results.recv().await.unwrap();
        assert_eq!(record.host, "held.example");
        assert_eq!(record.code, Code::Success);

        drop(h.jobs);
        h.worker.await.unwrap().unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn stop_ends_the_worker() {
        let h = harness();
        h.control.send(WorkerState::Stopped).await.unwrap();
        h.worker.await.unwrap().unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn closed_job_source_ends_a_running_worker() {
        let h = harness();
        h.control.send(WorkerState::Running).await.unwrap();
        drop(h.jobs);
        h.worker.await.unwrap().unwrap();
    }
}
