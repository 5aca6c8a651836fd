//! Debounced refresh scheduling

use geowx_store::MapStore;
use std::future::Future;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;
use tokio::time::{interval, sleep, MissedTickBehavior};
use tracing::{debug, info, warn};

const TRIGGER_CAPACITY: usize = 16;

/// Why a refresh was requested
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshTrigger {
    Startup,
    StoreChanged,
    Interval,
    Manual,
}

/// Cloneable sender for refresh requests.
///
/// The scheduler stops once every handle is dropped.
#[derive(Debug, Clone)]
pub struct RefreshHandle {
    tx: mpsc::Sender<RefreshTrigger>,
}

impl RefreshHandle {
    /// Request a pass; `false` once the scheduler has stopped.
    ///
    /// A full queue still counts as delivered since the pending triggers
    /// collapse into the same pass anyway.
    pub fn trigger(&self, reason: RefreshTrigger) -> bool {
        match self.tx.try_send(reason) {
            Ok(()) | Err(TrySendError::Full(_)) => true,
            Err(TrySendError::Closed(_)) => false,
        }
    }
}

/// Runs a refresh pass once triggers have been quiet for `quiesce`.
///
/// Every trigger arriving inside the window restarts it. A pass that is
/// already running is never interrupted: triggers received meanwhile are
/// queued and produce one follow-up pass after it finishes.
pub struct RefreshScheduler {
    quiesce: Duration,
}

impl RefreshScheduler {
    pub fn new(quiesce: Duration) -> Self {
        Self { quiesce }
    }

    pub fn spawn<F, Fut>(self, pass: F) -> (RefreshHandle, JoinHandle<()>)
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let (tx, rx) = mpsc::channel(TRIGGER_CAPACITY);
        let task = tokio::spawn(run(rx, self.quiesce, pass));
        (RefreshHandle { tx }, task)
    }
}

async fn run<F, Fut>(mut rx: mpsc::Receiver<RefreshTrigger>, quiesce: Duration, mut pass: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = ()>,
{
    info!(quiesce_ms = quiesce.as_millis() as u64, "Refresh scheduler started");

    while let Some(first) = rx.recv().await {
        let mut last = first;
        let mut coalesced = 1usize;

        loop {
            tokio::select! {
                next = rx.recv() => match next {
                    Some(reason) => {
                        last = reason;
                        coalesced += 1;
                    }
                    None => {
                        info!("Refresh scheduler stopped, pending pass dropped");
                        return;
                    }
                },
                _ = sleep(quiesce) => break,
            }
        }

        debug!(trigger = ?last, coalesced, "Starting refresh pass");
        pass().await;
    }

    info!("Refresh scheduler stopped");
}

/// Forward store changes that can make the display stale to the scheduler.
///
/// The subscription is taken before this returns, so no change made after
/// the call is missed even if the future is polled later.
pub fn watch_store(
    store: &MapStore,
    handle: RefreshHandle,
) -> impl Future<Output = ()> + Send + 'static {
    let mut events = store.subscribe();
    async move {
        loop {
            let relevant = match events.recv().await {
                Ok(event) => event.triggers_refresh(),
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "store watcher lagged, refreshing");
                    true
                }
                Err(RecvError::Closed) => break,
            };
            if relevant && !handle.trigger(RefreshTrigger::StoreChanged) {
                break;
            }
        }
        debug!("store watcher finished");
    }
}

/// Trigger a refresh every `period`, starting one period from now
pub async fn periodic_trigger(period: Duration, handle: RefreshHandle) {
    let mut ticks = interval(period);
    ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ticks.tick().await;

    loop {
        ticks.tick().await;
        if !handle.trigger(RefreshTrigger::Interval) {
            break;
        }
    }
}
