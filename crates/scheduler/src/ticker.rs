//! What drives the scheduler loop from one cycle to the next.

use async_trait::async_trait;
use std::time::Duration;
use tokio::sync::watch;
use tracing::debug;

/// Decides when the next cycle starts.
#[async_trait]
pub trait Ticker: Send {
    /// Wait for the next cycle. Returns `false` when the loop should stop.
    async fn tick(&mut self) -> bool;
}

/// Fires immediately, then once per `interval` after each cycle completes.
///
/// The wait is measured from the end of a cycle, so slow cycles never
/// overlap or queue up.
pub struct IntervalTicker {
    interval: Duration,
    started: bool,
    shutdown: Option<watch::Receiver<bool>>,
}

impl IntervalTicker {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            started: false,
            shutdown: None,
        }
    }

    /// Stop at the next tick once `true` is sent on the channel. A pending
    /// wait is cut short.
    pub fn with_shutdown(mut self, shutdown: watch::Receiver<bool>) -> Self {
        self.shutdown = Some(shutdown);
        self
    }

    fn shutdown_requested(&self) -> bool {
        self.shutdown.as_ref().is_some_and(|rx| *rx.borrow())
    }
}

#[async_trait]
impl Ticker for IntervalTicker {
    async fn tick(&mut self) -> bool {
        if self.shutdown_requested() {
            return false;
        }
        if !self.started {
            self.started = true;
            return true;
        }

        let sleep = tokio::time::sleep(self.interval);
        tokio::pin!(sleep);

        let Some(rx) = self.shutdown.as_mut() else {
            sleep.await;
            return true;
        };

        let stop = tokio::select! {
            _ = &mut sleep => return true,
            res = rx.wait_for(|stop| *stop) => res.is_ok(),
        };
        if stop {
            debug!("Shutdown requested, stopping ticker");
            return false;
        }

        // Sender dropped: nobody can ask us to stop any more.
        self.shutdown = None;
        sleep.await;
        true
    }
}

/// Fires a fixed number of times without waiting.
#[derive(Debug, Clone)]
pub struct FixedTicks {
    remaining: u64,
}

impl FixedTicks {
    pub fn new(count: u64) -> Self {
        Self { remaining: count }
    }
}

#[async_trait]
impl Ticker for FixedTicks {
    async fn tick(&mut self) -> bool {
        if self.remaining == 0 {
            return false;
        }
        self.remaining -= 1;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::Instant;

    #[tokio::test]
    async fn fixed_ticks_count_down() {
        let mut ticker = FixedTicks::new(2);
        assert!(ticker.tick().await);
        assert!(ticker.tick().await);
        assert!(!ticker.tick().await);
    }

    #[tokio::test(start_paused = true)]
    async fn first_tick_is_immediate_then_waits_interval() {
        let mut ticker = IntervalTicker::new(Duration::from_secs(60));
        let start = Instant::now();

        assert!(ticker.tick().await);
        assert_eq!(start.elapsed(), Duration::ZERO);

        assert!(ticker.tick().await);
        assert!(start.elapsed() >= Duration::from_secs(60));
        assert!(start.elapsed() < Duration::from_secs(61));
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_cuts_the_wait_short() {
        let (tx, rx) = watch::channel(false);
        let mut ticker = IntervalTicker::new(Duration::from_secs(3600)).with_shutdown(rx);
        assert!(ticker.tick().await);

        let start = Instant::now();
        let stopper = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(5)).await;
            tx.send(true).unwrap();
        });

        assert!(!ticker.tick().await);
        assert!(start.elapsed() < Duration::from_secs(3600));
        stopper.await.unwrap();
    }

    #[tokio::test]
    async fn shutdown_before_first_tick() {
        let (tx, rx) = watch::channel(false);
        tx.send(true).unwrap();
        let mut ticker = IntervalTicker::new(Duration::from_secs(1)).with_shutdown(rx);
        assert!(!ticker.tick().await);
    }

    #[tokio::test(start_paused = true)]
    async fn dropped_sender_keeps_ticking() {
        let (tx, rx) = watch::channel(false);
        let mut ticker = IntervalTicker::new(Duration::from_secs(10)).with_shutdown(rx);
        assert!(ticker.tick().await);
        drop(tx);

        assert!(ticker.tick().await);
        assert!(ticker.tick().await);
    }
}
