//! Supervisor broadcasting run-state to every worker.

use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{self, Instant};
use tracing::{debug, info};

use hostprobe_common::WorkerState;

/// Instruction for the controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Command {
    Pause { resume_after: Option<Duration> },
    Resume,
    Stop,
}

/// Cloneable handle used to send controller commands.
#[derive(Clone)]
pub struct ControllerHandle {
    pub(crate) commands: mpsc::UnboundedSender<Command>,
}

impl ControllerHandle {
    /// Pause every worker, resuming automatically after `cooldown`.
    pub fn pause_for(&self, cooldown: Duration) {
        let _ = self.commands.send(Command::Pause {
            resume_after: Some(cooldown),
        });
    }

    /// Pause every worker until an explicit resume.
    pub fn pause(&self) {
        let _ = self.commands.send(Command::Pause { resume_after: None });
    }

    /// Resume every worker, cancelling any scheduled resume.
    pub fn resume(&self) {
        let _ = self.commands.send(Command::Resume);
    }

    /// Stop every worker permanently.
    pub fn stop(&self) {
        let _ = self.commands.send(Command::Stop);
    }
}

/// Owns one single-writer, one-slot control channel per worker and the
/// run-state machine: Running ⇄ Paused, anything → Stopped.
///
/// State reaches workers by message passing only; a worker deep in its
/// retry loop picks the change up at its next control check.
pub struct Controller {
    workers: Vec<mpsc::Sender<WorkerState>>,
    commands: mpsc::UnboundedReceiver<Command>,
}

impl Controller {
    #[must_use]
    pub fn new(workers: Vec<mpsc::Sender<WorkerState>>) -> (Self, ControllerHandle) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                workers,
                commands: rx,
            },
            ControllerHandle { commands: tx },
        )
    }

    /// Broadcast the initial Running state, then serve commands until every
    /// handle is dropped or a Stop arrives.
    pub async fn run(mut self) {
        // Workers all start Paused. This is the single startup transition,
        // sent only once the pool, job source, and every worker exist.
        self.broadcast(WorkerState::Running).await;

        let mut resume_at: Option<Instant> = None;
        loop {
            let command = match resume_at {
                Some(at) => {
                    tokio::select! {
                        command = self.commands.recv() => match command {
                            Some(command) => command,
                            None => break,
                        },
                        _ = time::sleep_until(at) => {
                            info!("pause cooldown elapsed, resuming workers");
                            resume_at = None;
                            self.broadcast(WorkerState::Running).await;
                            continue;
                        }
                    }
                }
                None => match self.commands.recv().await {
                    Some(command) => command,
                    None => break,
                },
            };

            match command {
                Command::Pause { resume_after } => {
                    info!("pausing workers");
                    self.broadcast(WorkerState::Paused).await;
                    resume_at = resume_after.map(|cooldown| Instant::now() + cooldown);
                }
                Command::Resume => {
                    info!("resuming workers");
                    resume_at = None;
                    self.broadcast(WorkerState::Running).await;
                }
                Command::Stop => {
                    info!("stopping workers");
                    self.broadcast(WorkerState::Stopped).await;
                    break;
                }
            }
        }
    }

    async fn broadcast(&self, state: WorkerState) {
        debug!(?state, workers = self.workers.len(), "broadcasting state");
        for worker in &self.workers {
            // a worker that already exited just drops the message
            let _ = worker.send(state).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn initial_broadcast_then_timed_resume() {
        let (tx1, mut rx1) = mpsc::channel(1);
        let (tx2, mut rx2) = mpsc::channel(1);
        let (controller, handle) = Controller::new(vec![tx1, tx2]);
        let task = tokio::spawn(controller.run());

        assert_eq!(rx1.recv().await, Some(WorkerState::Running));
        assert_eq!(rx2.recv().await, Some(WorkerState::Running));

        handle.pause_for(Duration::from_secs(120));
        assert_eq!(rx1.recv().await, Some(WorkerState::Paused));
        assert_eq!(rx2.recv().await, Some(WorkerState::Paused));

        // the scheduled resume fires without further commands
        assert_eq!(rx1.recv().await, Some(WorkerState::Running));
        assert_eq!(rx2.recv().await, Some(WorkerState::Running));

        handle.stop();
        assert_eq!(rx1.recv().await, Some(WorkerState::Stopped));
        assert_eq!(rx2.recv().await, Some(WorkerState::Stopped));
        task.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn explicit_resume_cancels_the_scheduled_one() {
        let (tx, mut rx) = mpsc::channel(1);
        let (controller, handle) = Controller::new(vec![tx]);
        let task = tokio::spawn(controller.run());

        assert_eq!(rx.recv().await, Some(WorkerState::Running));

        handle.pause_for(Duration::from_secs(120));
        assert_eq!(rx.recv().await, Some(WorkerState::Paused));

        handle.resume();
        assert_eq!(rx.recv().await, Some(WorkerState::Running));

        // well past the original cooldown, no duplicate resume arrives
        let extra = time::timeout(Duration::from_secs(300), rx.recv()).await;
        assert!(extra.is_err());

        drop(handle);
        task.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn controller_exits_when_all_handles_drop() {
        let (tx, mut rx) = mpsc::channel(1);
        let (controller, handle) = Controller::new(vec![tx]);
        let task = tokio::spawn(controller.run());

        assert_eq!(rx.recv().await, Some(WorkerState::Running));
        drop(handle);
        task.await.unwrap();
    }
}
