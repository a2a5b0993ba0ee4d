//! Recycled endpoint pool with a single time-ordered reinsertion scheduler.

use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;
use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};
use tokio::sync::{mpsc, Mutex};
use tokio::time::{self, Instant};
use tracing::{debug, error};

use hostprobe_common::{Endpoint, Reinsert};

/// Bounded pool of destination endpoints.
///
/// Capacity equals the seed count. Every endpoint is in exactly one of
/// available, in-flight, cooling-down, or retired at any instant, so the
/// channel can never overflow and the re-enqueues below are non-blocking.
/// Logical availability shrinks over time as endpoints are retired.
pub struct AddressPool {
    slots: mpsc::Sender<Endpoint>,
    available: Mutex<mpsc::Receiver<Endpoint>>,
    defer: mpsc::Sender<Deferred>,
    capacity: usize,
    retired: AtomicUsize,
}

struct Deferred {
    ready_at: Instant,
    endpoint: Endpoint,
}

impl PartialEq for Deferred {
    fn eq(&self, other: &Self) -> bool {
        self.ready_at == other.ready_at
    }
}

impl Eq for Deferred {}

impl PartialOrd for Deferred {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Deferred {
    fn cmp(&self, other: &Self) -> Ordering {
        self.ready_at.cmp(&other.ready_at)
    }
}

impl AddressPool {
    /// Seed the pool and spawn its reinsertion scheduler. Must be called
    /// from within a tokio runtime.
    #[must_use]
    pub fn new(endpoints: Vec<Endpoint>) -> Self {
        let capacity = endpoints.len();
        assert!(capacity > 0, "address pool needs at least one endpoint");

        let (slots, available) = mpsc::channel(capacity);
        for endpoint in endpoints {
            slots.try_send(endpoint).expect("seed fits the capacity");
        }

        let (defer, deferred) = mpsc::channel(capacity);
        tokio::spawn(reinsert_scheduler(deferred, slots.clone()));

        Self {
            slots,
            available: Mutex::new(available),
            defer,
            capacity,
            retired: AtomicUsize::new(0),
        }
    }

    /// Block until an endpoint is available and take it.
    pub async fn acquire(&self) -> Endpoint {
        let mut available = self.available.lock().await;
        // the pool holds its own sender, so the channel cannot close
        available.recv().await.expect("pool channel open")
    }

    /// Hand an endpoint back after an attempt. Never blocks the caller; a
    /// cooldown wait is served by the scheduler task, not the worker.
    pub fn release(&self, endpoint: Endpoint, reinsert: Reinsert) {
        match reinsert {
            Reinsert::Retire => {
                self.retired.fetch_add(1, AtomicOrdering::Relaxed);
                debug!(%endpoint, "endpoint retired");
            }
            Reinsert::Now => {
                if self.slots.try_send(endpoint).is_err() {
                    error!(%endpoint, "pool rejected an immediate reinsertion");
                }
            }
            Reinsert::After(delay) => {
                let item = Deferred {
                    ready_at: Instant::now() + delay,
                    endpoint,
                };
                if self.defer.try_send(item).is_err() {
                    error!(%endpoint, "reinsertion scheduler rejected an endpoint");
                }
            }
        }
    }

    #[inline]
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Endpoints permanently removed from circulation so far.
    #[inline]
    #[must_use]
    pub fn retired(&self) -> usize {
        self.retired.load(AtomicOrdering::Relaxed)
    }
}

/// Single task owning every pending cooldown, ordered by readiness.
///
/// Bounds the timer population to one heap regardless of how many attempts
/// fail, and exits once the owning pool is dropped.
async fn reinsert_scheduler(mut deferred: mpsc::Receiver<Deferred>, slots: mpsc::Sender<Endpoint>) {
    let mut pending: BinaryHeap<Reverse<Deferred>> = BinaryHeap::new();
    loop {
        let next_ready = pending.peek().map(|Reverse(item)| item.ready_at);
        match next_ready {
            Some(ready_at) => {
                tokio::select! {
                    item = deferred.recv() => match item {
                        Some(item) => pending.push(Reverse(item)),
                        None => break,
                    },
                    _ = time::sleep_until(ready_at) => {
                        let now = Instant::now();
                        while pending
                            .peek()
                            .is_some_and(|Reverse(item)| item.ready_at <= now)
                        {
                            let Reverse(item) = pending.pop().expect("peeked entry");
                            debug!(endpoint = %item.endpoint, "cooldown elapsed");
                            if slots.try_send(item.endpoint).is_err() {
                                error!(endpoint = %item.endpoint, "pool rejected a cooled-down endpoint");
                            }
                        }
                    }
                }
            }
            None => match deferred.recv().await {
                Some(item) => pending.push(Reverse(item)),
                None => break,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{IpAddr, Ipv4Addr};
    use std::time::Duration;

    fn ep(octet: u8) -> Endpoint {
        Endpoint::new(IpAddr::V4(Ipv4Addr::new(10, 0, 0, octet)), 80)
    }

    #[tokio::test(start_paused = true)]
    async fn seeded_endpoints_come_back_out() {
        let pool = AddressPool::new(vec![ep(1), ep(2)]);
        assert_eq!(pool.capacity(), 2);

        let first = pool.acquire().await;
        let second = pool.acquire().await;
        assert_ne!(first, second);
    }

    #[tokio::test(start_paused = true)]
    async fn immediate_release_recycles() {
        let pool = AddressPool::new(vec![ep(1)]);
        let endpoint = pool.acquire().await;
        pool.release(endpoint, Reinsert::Now);
        assert_eq!(pool.acquire().await, endpoint);
    }

    #[tokio::test(start_paused = true)]
    async fn retired_endpoints_never_return() {
        let pool = AddressPool::new(vec![ep(1), ep(2)]);

        let first = pool.acquire().await;
        pool.release(first, Reinsert::Retire);
        assert_eq!(pool.retired(), 1);

        let second = pool.acquire().await;
        assert_ne!(second, first);

        // with one endpoint retired and the other in flight, nothing is left
        let starved = time::timeout(Duration::from_secs(600), pool.acquire()).await;
        assert!(starved.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn cooldown_withholds_endpoint_until_it_elapses() {
        let pool = AddressPool::new(vec![ep(1)]);

        let endpoint = pool.acquire().await;
        pool.release(endpoint, Reinsert::After(Duration::from_secs(30)));

        let early = time::timeout(Duration::from_secs(29), pool.acquire()).await;
        assert!(early.is_err());

        let back = time::timeout(Duration::from_secs(5), pool.acquire())
            .await
            .expect("endpoint available after the cooldown");
        assert_eq!(back, endpoint);
    }

    #[tokio::test(start_paused = true)]
    async fn shorter_cooldown_comes_back_first() {
        let pool = AddressPool::new(vec![ep(1), ep(2)]);

        let first = pool.acquire().await;
        let second = pool.acquire().await;
        pool.release(first, Reinsert::After(Duration::from_secs(60)));
        pool.release(second, Reinsert::After(Duration::from_secs(10)));

        let ready = pool.acquire().await;
        assert_eq!(ready, second);
        pool.release(ready, Reinsert::Retire);

        let later = pool.acquire().await;
        assert_eq!(later, first);
    }

    #[tokio::test(start_paused = true)]
    async fn residual_window_holds_for_its_full_duration() {
        let pool = AddressPool::new(vec![ep(1)]);
        let endpoint = pool.acquire().await;
        pool.release(endpoint, Reinsert::After(Duration::from_secs(180)));

        let early = time::timeout(Duration::from_secs(179), pool.acquire()).await;
        assert!(early.is_err());
        let back = pool.acquire().await;
        assert_eq!(back, endpoint);
    }
}
