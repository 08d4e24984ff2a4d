//! TTL sweeper — the singleton background task that deactivates expired
//! relations.
//!
//! Each tick runs one transaction: select the ids of active relations whose
//! deadline has passed, flip them inactive, commit. The predicate
//! (`deadline passed AND active`) is stable, so any row missed by a failed
//! tick is picked up by a later one; the sweep interval doubles as the retry
//! backoff. The sweeper holds no application-level locks — conflicting
//! writes serialize inside the store.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use rusqlite::params;
use segmentator_core::SegmentatorResult;
use segmentator_store::{encode_ts, store_err, Db};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, warn};

pub struct TtlSweeper {
    db: Arc<Db>,
    interval: Duration,
}

/// Handle to a running sweeper. Dropping it does not stop the task;
/// call [`SweeperHandle::shutdown`] for an orderly stop.
pub struct SweeperHandle {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl SweeperHandle {
    /// Signal the loop to stop and wait for it. An in-flight tick finishes
    /// before the task exits.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        let _ = self.task.await;
    }
}

impl TtlSweeper {
    pub fn new(db: Arc<Db>, interval: Duration) -> Self {
        Self { db, interval }
    }

    /// Start the background loop. Called exactly once at process startup.
    pub fn spawn(self) -> SweeperHandle {
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let task = tokio::spawn(async move {
            info!(interval_secs = self.interval.as_secs(), "TTL sweeper running");
            let mut ticker = tokio::time::interval(self.interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        match self.sweep_once(Utc::now()) {
                            Ok(0) => {}
                            Ok(swept) => {
                                info!(swept, "expired relations deactivated");
                                metrics::counter!("sweeper.swept").increment(swept as u64);
                            }
                            Err(e) => {
                                warn!(error = %e, "sweep failed, retrying next tick");
                                metrics::counter!("sweeper.failed_ticks").increment(1);
                            }
                        }
                    }
                    _ = shutdown_rx.changed() => {
                        info!("TTL sweeper stopped");
                        break;
                    }
                }
            }
        });
        SweeperHandle {
            shutdown: shutdown_tx,
            task,
        }
    }

    /// One sweep tick. Public so tests (and operators) can force a sweep at
    /// a chosen clock reading.
    ///
    /// A failure reading candidates aborts the tick. A failure flipping one
    /// row skips the remaining rows of this tick but commits the rows
    /// already flipped; the survivors still satisfy the predicate and are
    /// swept next tick.
    pub fn sweep_once(&self, now: DateTime<Utc>) -> SegmentatorResult<usize> {
        let cutoff = encode_ts(now);
        self.db.with_tx(|tx| {
            let mut stmt = tx
                .prepare(
                    "SELECT id FROM user_segment_relation
                     WHERE is_active = 1
                       AND date_unassigned IS NOT NULL
                       AND date_unassigned <= ?1",
                )
                .map_err(store_err)?;
            let ids = stmt
                .query_map(params![cutoff], |row| row.get::<_, i64>(0))
                .map_err(store_err)?
                .collect::<rusqlite::Result<Vec<_>>>()
                .map_err(store_err)?;
            drop(stmt);

            let mut swept = 0;
            for id in ids {
                match tx.execute(
                    "UPDATE user_segment_relation SET is_active = 0 WHERE id = ?1",
                    params![id],
                ) {
                    Ok(_) => swept += 1,
                    Err(e) => {
                        warn!(error = %e, relation_id = id, "row update failed, skipping rest of tick");
                        break;
                    }
                }
            }
            Ok(swept)
        })
    }
}
