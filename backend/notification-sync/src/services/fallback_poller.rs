/// Fallback poller: fixed-interval snapshot refresh while push is down
///
/// Runs as its own task and hands each successful snapshot to the engine
/// through `outbox`. A failed tick is logged and skipped; the next tick is an
/// independent retry. Stopping aborts the task, including any fetch in flight.
use super::connection_state::ConnectionState;
use crate::error::AppError;
use crate::metrics;
use crate::store::{Snapshot, SnapshotFetcher, SnapshotOrigin};
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

pub struct FallbackPoller {
    fetcher: SnapshotFetcher,
    connection: watch::Receiver<ConnectionState>,
    outbox: mpsc::UnboundedSender<Snapshot>,
    task: Option<JoinHandle<()>>,
}

impl FallbackPoller {
    pub fn new(
        fetcher: SnapshotFetcher,
        connection: watch::Receiver<ConnectionState>,
        outbox: mpsc::UnboundedSender<Snapshot>,
    ) -> Self {
        Self {
            fetcher,
            connection,
            outbox,
            task: None,
        }
    }

    pub fn is_running(&self) -> bool {
        self.task.as_ref().map_or(false, |task| !task.is_finished())
    }

    /// Begin polling every `period`. No-op when already running or while the
    /// channel reports Connected. Returns whether a poller was started.
    pub fn start(&mut self, period: Duration) -> bool {
        if self.is_running() {
            return false;
        }
        if self.connection.borrow().is_connected() {
            debug!("Channel connected, not starting fallback poller");
            return false;
        }

        let fetcher = self.fetcher.clone();
        let connection = self.connection.clone();
        let outbox = self.outbox.clone();

        self.task = Some(tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                ticker.tick().await;

                if connection.borrow().is_connected() {
                    debug!("Channel connected, skipping poll tick");
                    continue;
                }

                match fetcher.fetch(SnapshotOrigin::Poll).await {
                    Ok(snapshot) => {
                        if outbox.send(snapshot).is_err() {
                            // Engine is gone
                            break;
                        }
                    }
                    Err(e) => {
                        warn!(
                            user_id = %fetcher.user_id(),
                            "Poll tick {}, retrying next interval",
                            AppError::Fetch(e)
                        );
                        metrics::record_snapshot(SnapshotOrigin::Poll.as_str(), "failed");
                    }
                }
            }
        }));

        info!("Fallback poller started ({:?} interval)", period);
        metrics::set_poller_active(true);
        true
    }

    /// Cancel polling. Idempotent. Returns whether a poller was running.
    pub fn stop(&mut self) -> bool {
        let Some(task) = self.task.take() else {
            return false;
        };

        task.abort();
        info!("Fallback poller stopped");
        metrics::set_poller_active(false);
        true
    }
}

impl Drop for FallbackPoller {
    fn drop(&mut self) {
        self.stop();
    }
}
