//! Background order sync.
//!
//! Finalization hands each order to a [`SyncHandle`] and moves on. A
//! dispatcher task runs one push per order, each bounded by a timeout, and
//! forwards the outcome to a reconciler task. The reconciler is the only
//! place that calls [`OrderLedger::mark_synced`], so the durable `synced`
//! flag and the pending count can never disagree.
//!
//! Failed pushes are logged and counted. Nothing here retries them: an order
//! that failed to sync stays pending until it is explicitly resubmitted.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, error, info, warn};

use crate::ledger::OrderLedger;
use crate::order::Order;

/// Reason reported when no remote store is configured.
pub const NO_CONFIG: &str = "no-config";

/// Default bound on a single push attempt.
pub const DEFAULT_PUSH_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    Success,
    Failure(String),
}

impl SyncOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, SyncOutcome::Success)
    }
}

/// Something that can mirror one order to a remote store.
///
/// Implementations report problems as [`SyncOutcome::Failure`]; they never
/// panic or return early with an error.
#[async_trait]
pub trait SyncAgent: Send + Sync {
    fn name(&self) -> &'static str;

    async fn push(&self, order: &Order) -> SyncOutcome;
}

/// Agent used when no remote store is configured. Every push fails
/// immediately with [`NO_CONFIG`].
#[derive(Debug, Clone, Copy, Default)]
pub struct OfflineSyncAgent;

#[async_trait]
impl SyncAgent for OfflineSyncAgent {
    fn name(&self) -> &'static str {
        "offline"
    }

    async fn push(&self, _order: &Order) -> SyncOutcome {
        SyncOutcome::Failure(NO_CONFIG.to_string())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncStats {
    pub attempted: u64,
    pub succeeded: u64,
    pub failed: u64,
    pub last_error: Option<String>,
    pub last_success_at: Option<DateTime<Utc>>,
}

type SharedStats = Arc<Mutex<SyncStats>>;

fn record(stats: &SharedStats, update: impl FnOnce(&mut SyncStats)) {
    match stats.lock() {
        Ok(mut guard) => update(&mut guard),
        Err(poisoned) => update(&mut poisoned.into_inner()),
    }
}

pub struct SyncWorker;

impl SyncWorker {
    /// Spawn the dispatcher and reconciler on the current tokio runtime.
    pub fn start(agent: Arc<dyn SyncAgent>, ledger: OrderLedger, timeout: Duration) -> SyncHandle {
        let (intake_tx, intake_rx) = mpsc::unbounded_channel::<Order>();
        let (outcome_tx, outcome_rx) = mpsc::unbounded_channel::<(String, SyncOutcome)>();
        let stats: SharedStats = Arc::new(Mutex::new(SyncStats::default()));

        info!(agent = agent.name(), timeout_ms = timeout.as_millis() as u64, "Sync worker started");

        let dispatcher = tokio::spawn(dispatch(agent, intake_rx, outcome_tx, timeout));
        let reconciler = tokio::spawn(reconcile(ledger, outcome_rx, stats.clone()));

        SyncHandle {
            intake: intake_tx,
            stats,
            dispatcher,
            reconciler,
        }
    }
}

async fn attempt(agent: Arc<dyn SyncAgent>, order: Order, timeout: Duration) -> (String, SyncOutcome) {
    debug!(order_id = %order.id, "Pushing order");
    let outcome = match tokio::time::timeout(timeout, agent.push(&order)).await {
        Ok(outcome) => outcome,
        Err(_) => SyncOutcome::Failure(format!("push timed out after {}ms", timeout.as_millis())),
    };
    (order.id, outcome)
}

async fn dispatch(
    agent: Arc<dyn SyncAgent>,
    mut intake: mpsc::UnboundedReceiver<Order>,
    outcomes: mpsc::UnboundedSender<(String, SyncOutcome)>,
    timeout: Duration,
) {
    let mut in_flight: JoinSet<(String, SyncOutcome)> = JoinSet::new();

    loop {
        tokio::select! {
            next = intake.recv() => match next {
                Some(order) => {
                    in_flight.spawn(attempt(agent.clone(), order, timeout));
                }
                None => break,
            },
            Some(joined) = in_flight.join_next(), if !in_flight.is_empty() => {
                forward(joined, &outcomes);
            }
        }
    }

    // Intake closed: let running pushes finish and report.
    while let Some(joined) = in_flight.join_next().await {
        forward(joined, &outcomes);
    }
    debug!("Sync dispatcher stopped");
}

fn forward(
    joined: Result<(String, SyncOutcome), tokio::task::JoinError>,
    outcomes: &mpsc::UnboundedSender<(String, SyncOutcome)>,
) {
    match joined {
        Ok(result) => {
            if outcomes.send(result).is_err() {
                warn!("Sync reconciler is gone; dropping push outcome");
            }
        }
        Err(e) => error!(error = %e, "Push task failed"),
    }
}

async fn reconcile(
    ledger: OrderLedger,
    mut outcomes: mpsc::UnboundedReceiver<(String, SyncOutcome)>,
    stats: SharedStats,
) {
    while let Some((order_id, outcome)) = outcomes.recv().await {
        match outcome {
            SyncOutcome::Success => match ledger.mark_synced(&order_id) {
                Ok(changed) => {
                    if !changed {
                        debug!(order_id = %order_id, "Synced order not pending in ledger");
                    }
                    info!(order_id = %order_id, "Order synced");
                    record(&stats, |s| {
                        s.attempted += 1;
                        s.succeeded += 1;
                        s.last_success_at = Some(Utc::now());
                    });
                }
                Err(e) => {
                    error!(order_id = %order_id, error = %e, "Failed to record sync in ledger");
                    record(&stats, |s| {
                        s.attempted += 1;
                        s.failed += 1;
                        s.last_error = Some(e.to_string());
                    });
                }
            },
            SyncOutcome::Failure(reason) => {
                warn!(order_id = %order_id, reason = %reason, "Order sync failed; left pending");
                record(&stats, |s| {
                    s.attempted += 1;
                    s.failed += 1;
                    s.last_error = Some(reason);
                });
            }
        }
    }
    debug!("Sync reconciler stopped");
}

/// Handle to a running [`SyncWorker`].
pub struct SyncHandle {
    intake: mpsc::UnboundedSender<Order>,
    stats: SharedStats,
    dispatcher: JoinHandle<()>,
    reconciler: JoinHandle<()>,
}

impl SyncHandle {
    /// Queue an order for a push. Never waits. Returns `false` if the worker
    /// has stopped, in which case the order simply stays pending.
    pub fn submit(&self, order: Order) -> bool {
        let order_id = order.id.clone();
        match self.intake.send(order) {
            Ok(()) => {
                debug!(order_id = %order_id, "Order queued for sync");
                true
            }
            Err(_) => {
                warn!(order_id = %order_id, "Sync worker stopped; order stays pending");
                false
            }
        }
    }

    pub fn stats(&self) -> SyncStats {
        match self.stats.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Stop taking orders and wait for every queued push and its ledger
    /// update to finish.
    pub async fn shutdown(self) -> SyncStats {
        let SyncHandle {
            intake,
            stats,
            dispatcher,
            reconciler,
        } = self;
        drop(intake);

        if let Err(e) = dispatcher.await {
            error!(error = %e, "Sync dispatcher panicked");
        }
        if let Err(e) = reconciler.await {
            error!(error = %e, "Sync reconciler panicked");
        }

        let snapshot = match stats.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        };
        info!(
            attempted = snapshot.attempted,
            succeeded = snapshot.succeeded,
            failed = snapshot.failed,
            "Sync worker stopped"
        );
        snapshot
    }
}
