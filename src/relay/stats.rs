// Throughput counters and periodic reporting
//
// The core only reports counts through `StatsSink`; what is done with them
// is up to the implementation. `ThroughputStats` keeps atomics and
// `spawn_reporter` logs a rate line at a fixed interval.

use crate::relay::registry::Registry;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Receives throughput counts from the relay core
pub trait StatsSink: Send + Sync {
    /// An authorize, connect or say request arrived
    fn request(&self);
    /// An event was written to a client stream
    fn delivered(&self);
}

/// Sink that discards everything
#[derive(Debug, Default)]
pub struct NoopStats;

impl StatsSink for NoopStats {
    fn request(&self) {}
    fn delivered(&self) {}
}

/// Atomic request/delivery counters
#[derive(Debug, Default)]
pub struct ThroughputStats {
    requests: AtomicU64,
    delivered: AtomicU64,
}

/// Counter values taken by `ThroughputStats::take`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub requests: u64,
    pub delivered: u64,
}

impl StatsSnapshot {
    /// Per-second rates over `elapsed`
    pub fn rates(&self, elapsed: Duration) -> (f64, f64) {
        let secs = elapsed.as_secs_f64();
        if secs <= 0.0 {
            return (0.0, 0.0);
        }
        (self.requests as f64 / secs, self.delivered as f64 / secs)
    }
}

impl ThroughputStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read and reset both counters
    pub fn take(&self) -> StatsSnapshot {
        StatsSnapshot {
            requests: self.requests.swap(0, Ordering::Relaxed),
            delivered: self.delivered.swap(0, Ordering::Relaxed),
        }
    }
}

impl StatsSink for ThroughputStats {
    fn request(&self) {
        self.requests.fetch_add(1, Ordering::Relaxed);
    }

    fn delivered(&self) {
        self.delivered.fetch_add(1, Ordering::Relaxed);
    }
}

/// Log throughput and table sizes every `every` until `shutdown` fires
pub fn spawn_reporter(
    stats: Arc<ThroughputStats>,
    registry: Registry,
    every: Duration,
    shutdown: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval_at(Instant::now() + every, every);
        let mut last = Instant::now();

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {}
            }

            let now = Instant::now();
            let snapshot = stats.take();
            let (ips, ops) = snapshot.rates(now - last);
            last = now;
            let sessions = registry.session_count().await;
            let mailboxes = registry.mailbox_count().await;

            tracing::info!(
                "IN={} OUT={} IPS={:.0} OPS={:.0} auth={} connect={}",
                snapshot.requests,
                snapshot.delivered,
                ips,
                ops,
                sessions,
                mailboxes,
            );
        }

        tracing::debug!("Stats reporter stopped");
    })
}
