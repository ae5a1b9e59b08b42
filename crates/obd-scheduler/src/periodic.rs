//! Periodic Task Runner
//!
//! Runs a job forever: one tick, then a sleep of the current poll interval,
//! repeated until stopped. The interval is read after each tick.

use crate::interval::PollInterval;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// Work performed on every tick of a [`PeriodicTask`]
pub trait Periodic: Send + 'static {
    /// Name used in logs
    fn name(&self) -> &'static str;

    /// Run one round
    fn tick(&mut self) -> impl Future<Output = ()> + Send;
}

/// Handle to a running periodic job
pub struct PeriodicTask {
    name: &'static str,
    stop_tx: watch::Sender<bool>,
    ticks: Arc<AtomicU64>,
    handle: JoinHandle<()>,
}

impl PeriodicTask {
    /// Spawn `job`, first ticking after `initial_delay`
    pub fn spawn<P: Periodic>(mut job: P, initial_delay: Duration, interval: PollInterval) -> Self {
        let name = job.name();
        let (stop_tx, mut stop_rx) = watch::channel(false);
        let ticks = Arc::new(AtomicU64::new(0));
        let tick_count = Arc::clone(&ticks);

        let handle = tokio::spawn(async move {
            info!("Starting {} (first tick in {:?})", name, initial_delay);
            let mut delay = initial_delay;
            loop {
                tokio::select! {
                    _ = tokio::time::sleep(delay) => {}
                    _ = stop_rx.changed() => break,
                }

                job.tick().await;
                tick_count.fetch_add(1, Ordering::Relaxed);

                delay = interval.duration();
                debug!("{} next tick in {:?}", name, delay);
            }
            info!("{} stopped", name);
        });

        Self {
            name,
            stop_tx,
            ticks,
            handle,
        }
    }

    /// Completed ticks
    pub fn ticks(&self) -> u64 {
        self.ticks.load(Ordering::Relaxed)
    }

    /// Whether the task loop is still alive
    pub fn is_running(&self) -> bool {
        !self.handle.is_finished()
    }

    /// Stop after the current tick and wait for the loop to exit
    pub async fn stop(self) {
        debug!("Stopping {}", self.name);
        let _ = self.stop_tx.send(true);
        let _ = self.handle.await;
    }
}
