//! Background expiry sweeper
//!
//! One tokio task per store. Every interval it deletes expired rows in a
//! transaction of its own. Failures go to the store's error channel and the
//! loop carries on with the next cycle; only the shutdown signal stops it.

use crate::rows;
use ephemkv_core::{
    error::{EphemkvError, Result},
    now_ms, observe,
};
use parking_lot::Mutex;
use rusqlite::{Connection, TransactionBehavior};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Receiving end of the sweeper's error channel.
///
/// Whether a sweep failure is fatal is up to the process holding this.
pub type SweepErrors = mpsc::Receiver<EphemkvError>;

/// Run one sweep pass on `conn`: delete expired rows and commit
pub fn sweep_pass(conn: &mut Connection) -> Result<usize> {
    let start = Instant::now();

    let txn = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    let deleted = rows::sweep_expired(&txn, now_ms())?;
    txn.commit()?;

    observe::record_sweep(start.elapsed(), deleted as u64);
    Ok(deleted)
}

pub(crate) struct Sweeper {
    conn: Arc<Mutex<Option<Connection>>>,
    interval: Duration,
    errors: mpsc::Sender<EphemkvError>,
}

impl Sweeper {
    pub(crate) fn new(
        conn: Arc<Mutex<Option<Connection>>>,
        interval: Duration,
        errors: mpsc::Sender<EphemkvError>,
    ) -> Self {
        Self {
            conn,
            interval,
            errors,
        }
    }

    pub(crate) fn spawn(
        self,
        runtime: &tokio::runtime::Handle,
        shutdown: watch::Receiver<bool>,
    ) -> JoinHandle<()> {
        runtime.spawn(self.run(shutdown))
    }

    async fn run(self, mut shutdown: watch::Receiver<bool>) {
        info!("Sweeper started, interval {:?}", self.interval);

        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // The first tick completes immediately; nothing can have expired yet
        ticker.tick().await;

        loop {
            tokio::select! {
                biased;

                changed = shutdown.changed() => {
                    // A dropped sender means the store is gone as well
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
                _ = ticker.tick() => {
                    if *shutdown.borrow() {
                        break;
                    }
                    match self.run_once().await {
                        Ok(Some(0)) => {}
                        Ok(Some(deleted)) => debug!("Swept {} expired entries", deleted),
                        Ok(None) => break,
                        Err(e) => self.report(e),
                    }
                }
            }
        }

        info!("Sweeper stopped");
    }

    /// One pass on the blocking pool. `Ok(None)` once the store is closed.
    async fn run_once(&self) -> Result<Option<usize>> {
        let conn = Arc::clone(&self.conn);

        tokio::task::spawn_blocking(move || {
            let mut guard = conn.lock();
            match guard.as_mut() {
                Some(conn) => sweep_pass(conn).map(Some),
                None => Ok(None),
            }
        })
        .await
        .map_err(|e| EphemkvError::Other(anyhow::anyhow!("sweep pass did not complete: {}", e)))?
    }

    fn report(&self, err: EphemkvError) {
        observe::record_sweep_error();
        warn!("Sweep pass failed: {}", err);

        match self.errors.try_send(err) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(dropped)) => {
                warn!("Sweep error channel full, dropping: {}", dropped);
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                debug!("Sweep error receiver dropped");
            }
        }
    }
}
