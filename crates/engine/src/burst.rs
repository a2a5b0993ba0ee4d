//! Burst detection over anomalous stream terminations.

use parking_lot::Mutex;
use std::collections::VecDeque;
use std::time::Duration;
use tokio::time::Instant;
use tracing::warn;

use crate::controller::ControllerHandle;

/// Window capacity; a burst is this many EOF classifications in a row.
const WINDOW: usize = 10;
/// Maximum span between the oldest and newest timestamp for a full window to
/// count as a burst.
const BURST_SPAN: Duration = Duration::from_millis(100);
/// How long the engine stays paused after the breaker trips.
pub(crate) const BURST_PAUSE: Duration = Duration::from_secs(120);

/// Shared sliding window of recent EOF timestamps; trips a global pause.
///
/// A full window spanning ≤100ms reads as a systemic disruption producing a
/// storm of false terminations rather than genuine interference, so the
/// monitor pauses every worker and a timer resumes them. A self-resetting
/// circuit breaker; no operator action involved.
pub struct BurstMonitor {
    window: Mutex<VecDeque<Instant>>,
    controller: ControllerHandle,
}

impl BurstMonitor {
    #[must_use]
    pub fn new(controller: ControllerHandle) -> Self {
        Self {
            window: Mutex::new(VecDeque::with_capacity(WINDOW)),
            controller,
        }
    }

    /// Record one EOF classification. Called from the probe path, so the
    /// critical section stays a push and a length check.
    pub fn record(&self, at: Instant) {
        let tripped = {
            let mut window = self.window.lock();
            window.push_back(at);
            if window.len() > WINDOW {
                window.pop_front();
            }
            window.len() == WINDOW && at.duration_since(window[0]) <= BURST_SPAN
        };

        if tripped {
            warn!(
                window = WINDOW,
                span_ms = BURST_SPAN.as_millis() as u64,
                pause_secs = BURST_PAUSE.as_secs(),
                "burst of premature terminations, pausing all workers"
            );
            self.controller.pause_for(BURST_PAUSE);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::Command;
    use tokio::sync::mpsc;

    fn monitor() -> (BurstMonitor, mpsc::UnboundedReceiver<Command>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (BurstMonitor::new(ControllerHandle { commands: tx }), rx)
    }

    #[tokio::test]
    async fn ten_terminations_inside_the_span_trip_the_breaker() {
        let (monitor, mut commands) = monitor();
        let base = Instant::now();

        for _ in 0..9 {
            monitor.record(base);
        }
        assert!(commands.try_recv().is_err());

        monitor.record(base + Duration::from_millis(90));
        assert_eq!(
            commands.try_recv().unwrap(),
            Command::Pause {
                resume_after: Some(BURST_PAUSE)
            }
        );
    }

    #[tokio::test]
    async fn a_slow_trickle_never_trips() {
        let (monitor, mut commands) = monitor();
        let base = Instant::now();

        // 20 terminations, 20ms apart: every full window spans 180ms
        for i in 0..20u64 {
            monitor.record(base + Duration::from_millis(20 * i));
        }
        assert!(commands.try_recv().is_err());
    }

    #[tokio::test]
    async fn the_window_evicts_its_oldest_entry() {
        let (monitor, mut commands) = monitor();
        let base = Instant::now();

        // an old outlier, then ten rapid entries: the outlier must have been
        // evicted for the trip to happen on the eleventh record overall
        monitor.record(base);
        for i in 0..9u64 {
            monitor.record(base + Duration::from_secs(10) + Duration::from_millis(i));
        }
        assert!(commands.try_recv().is_err());

        monitor.record(base + Duration::from_secs(10) + Duration::from_millis(50));
        assert!(commands.try_recv().is_ok());
    }
}
