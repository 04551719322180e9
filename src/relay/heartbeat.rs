// Idle-stream keepalive

use std::time::Duration;
use tokio::time::{interval_at, Instant, Interval, MissedTickBehavior};

/// Fires once per period of stream inactivity.
///
/// The stream loop calls `touch` after every application event it writes,
/// which pushes the next tick a full period out. A heartbeat is therefore
/// only due when nothing else was written for `period`.
pub struct HeartbeatTicker {
    interval: Interval,
}

impl HeartbeatTicker {
    pub fn new(period: Duration) -> Self {
        let mut interval = interval_at(Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        Self { interval }
    }

    /// Wait until a heartbeat is due
    pub async fn tick(&mut self) {
        self.interval.tick().await;
    }

    /// Record activity on the stream
    pub fn touch(&mut self) {
        self.interval.reset();
    }
}
