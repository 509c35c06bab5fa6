//! Reconciliation loop for converging the fleet.
//!
//! Each tick, in order:
//! 1. Advance every record one lifecycle step (one transaction).
//! 2. Compute the target fleet size from a fresh snapshot.
//! 3. Balance the fleet toward the target.
//!
//! Errors abort the failing phase, are logged, and the loop resumes on the
//! next tick. Only the shutdown signal stops the loop.

use std::sync::Arc;

use chrono::Utc;
use tokio::sync::watch;
use tracing::{debug, error, info};

use partyfleet_store::{StateManager, StoreError};

use crate::balancer::balance;
use crate::cluster::{ClusterId, ClusterMap, ClusterRecord, ClusterStatus, CLUSTER_MAP_NAME};
use crate::config::FleetConfig;
use crate::error::FleetError;
use crate::lifecycle::advance;
use crate::planner::compute_target;
use crate::provisioner::Provisioner;

/// What one reconciliation tick did.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct TickStats {
    /// Records advanced and written back.
    pub advanced: usize,
    /// Records retired (reached Deleted and were removed).
    pub removed: usize,
    /// Records inserted by the balancer.
    pub created: usize,
    /// Records flagged Remove by the balancer.
    pub flagged: usize,
    /// Target the planner computed this tick.
    pub target: usize,
}

/// Periodic driver owning the fleet's lifecycle and sizing.
pub struct FleetReconciler {
    manager: Arc<StateManager>,
    map: ClusterMap,
    provisioner: Arc<dyn Provisioner>,
    config: FleetConfig,
}

impl FleetReconciler {
    pub fn new(
        manager: Arc<StateManager>,
        provisioner: Arc<dyn Provisioner>,
        config: FleetConfig,
    ) -> Result<Self, StoreError> {
        let map = manager.get_or_create::<ClusterId, ClusterRecord>(CLUSTER_MAP_NAME)?;
        Ok(Self {
            manager,
            map,
            provisioner,
            config,
        })
    }

    /// Run the reconciliation loop until shutdown.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!(
            refresh_interval_ms = self.config.refresh_interval.as_millis() as u64,
            minimum_cluster_count = self.config.minimum_cluster_count,
            maximum_cluster_count = self.config.maximum_cluster_count,
            "Starting fleet reconciler"
        );

        let mut interval = tokio::time::interval(self.config.refresh_interval);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    // Cancelling mid-tick drops the in-flight phase; its
                    // transaction aborts, so nothing partial is committed.
                    tokio::select! {
                        result = self.tick() => match result {
                            Ok(stats) => {
                                let quiet =
                                    stats.removed == 0 && stats.created == 0 && stats.flagged == 0;
                                if quiet {
                                    debug!(target = stats.target, "Reconciliation tick: fleet stable");
                                } else {
                                    info!(
                                        advanced = stats.advanced,
                                        removed = stats.removed,
                                        created = stats.created,
                                        flagged = stats.flagged,
                                        target = stats.target,
                                        "Reconciliation tick complete"
                                    );
                                }
                            }
                            Err(e) => {
                                error!(error = %e, "Reconciliation tick failed");
                            }
                        },
                        _ = shutdown.changed() => {
                            if *shutdown.borrow() {
                                info!("Fleet reconciler cancelled mid-tick, shutting down");
                                break;
                            }
                        }
                    }
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("Fleet reconciler shutting down");
                        break;
                    }
                }
            }
        }
    }

    /// One full reconciliation pass: advance-all, compute target, balance.
    pub async fn tick(&self) -> Result<TickStats, FleetError> {
        let mut stats = TickStats::default();

        self.advance_all(&mut stats).await?;

        stats.target = {
            let mut tx = self.manager.begin_transaction();
            let records: Vec<ClusterRecord> = self
                .map
                .enumerate(&mut tx)
                .await?
                .into_iter()
                .map(|(_, record)| record)
                .collect();
            tx.abort();
            compute_target(&records, &self.config)
        };

        let outcome = balance(&self.map, &self.manager, stats.target, &self.config).await?;
        stats.created = outcome.created;
        stats.flagged = outcome.flagged;

        Ok(stats)
    }

    /// Advance every record one step in a single transaction. Records that
    /// reach Deleted are removed in the same transaction.
    async fn advance_all(&self, stats: &mut TickStats) -> Result<(), FleetError> {
        let mut tx = self.manager.begin_transaction();
        let records = self.map.enumerate(&mut tx).await?;
        let now = Utc::now();

        for (id, mut record) in records {
            advance(&mut record, now, self.provisioner.as_ref(), &self.config).await?;
            if record.status == ClusterStatus::Deleted {
                self.map.try_remove(&mut tx, &id).await?;
                stats.removed += 1;
            } else {
                self.map.set(&mut tx, id, record).await?;
                stats.advanced += 1;
            }
        }

        tx.commit()?;
        Ok(())
    }
}
