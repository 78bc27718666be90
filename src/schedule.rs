//! Periodic tick sources for the sampling and retention loops.

use async_trait::async_trait;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{self, Instant, Interval, MissedTickBehavior};

/// Something that paces a periodic loop.
#[async_trait]
pub trait Ticker: Send {
    /// Wait for the next tick and return when it was scheduled, or `None`
    /// once the ticker is exhausted.
    async fn tick(&mut self) -> Option<Instant>;

    /// Nominal time between ticks.
    fn period(&self) -> Duration;
}

/// Wall-clock ticker built on [`tokio::time::interval`].
///
/// Late ticks are delayed rather than skipped or bunched, so slow work never
/// drops a tick. Runs forever.
#[derive(Debug)]
pub struct IntervalTicker {
    interval: Interval,
    period: Duration,
}

impl IntervalTicker {
    /// Create a ticker whose first tick fires immediately.
    pub fn new(period: Duration) -> Self {
        let mut interval = time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        Self { interval, period }
    }
}

#[async_trait]
impl Ticker for IntervalTicker {
    async fn tick(&mut self) -> Option<Instant> {
        Some(self.interval.tick().await)
    }

    fn period(&self) -> Duration {
        self.period
    }
}

/// A ticker fired by hand through its [`TickTrigger`].
///
/// Ends once every trigger has been dropped and queued ticks are consumed.
#[derive(Debug)]
pub struct ManualTicker {
    rx: mpsc::UnboundedReceiver<()>,
    period: Duration,
}

/// Fires ticks on a [`ManualTicker`].
#[derive(Debug, Clone)]
pub struct TickTrigger {
    tx: mpsc::UnboundedSender<()>,
}

impl ManualTicker {
    /// Create a ticker and its trigger. `period` is the deadline each tick's
    /// work is measured against.
    pub fn new(period: Duration) -> (Self, TickTrigger) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { rx, period }, TickTrigger { tx })
    }
}

#[async_trait]
impl Ticker for ManualTicker {
    async fn tick(&mut self) -> Option<Instant> {
        self.rx.recv().await.map(|()| Instant::now())
    }

    fn period(&self) -> Duration {
        self.period
    }
}

impl TickTrigger {
    /// Queue one tick. Returns `false` if the ticker is gone.
    pub fn fire(&self) -> bool {
        self.tx.send(()).is_ok()
    }

    /// Queue `n` ticks.
    pub fn fire_n(&self, n: usize) -> bool {
        (0..n).all(|_| self.fire())
    }
}
