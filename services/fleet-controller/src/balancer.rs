//! Fleet balancing: reshape the fleet toward a target size.

use std::collections::HashSet;

use tracing::{debug, info};

use partyfleet_store::StateManager;

use crate::cluster::{ClusterId, ClusterMap, ClusterRecord, ClusterStatus};
use crate::config::FleetConfig;
use crate::error::FleetError;

/// What a balancing pass did.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct BalanceOutcome {
    /// New records inserted.
    pub created: usize,
    /// Surplus records flagged Remove.
    pub flagged: usize,
}

/// Reshape the fleet toward `target` active clusters in one transaction.
///
/// The target is clamped to the configured min/max. Growth inserts New
/// records with fresh ids; shrink flags empty active records Remove, never
/// more than would leave the minimum intact, and never a record with users.
/// If only occupied records are left, fewer are flagged and the next
/// reconciliation retries.
pub async fn balance(
    map: &ClusterMap,
    manager: &StateManager,
    target: usize,
    config: &FleetConfig,
) -> Result<BalanceOutcome, FleetError> {
    let target = target.clamp(config.minimum_cluster_count, config.maximum_cluster_count);

    let mut tx = manager.begin_transaction();
    let records = map.enumerate(&mut tx).await?;
    let active = records.iter().filter(|(_, r)| r.is_active()).count();

    let mut outcome = BalanceOutcome::default();

    if active < target {
        let mut existing: HashSet<ClusterId> = records.iter().map(|(id, _)| *id).collect();
        let mut remaining = target - active;
        while remaining > 0 {
            let id = ClusterId::random();
            if !existing.insert(id) {
                continue;
            }
            map.add(&mut tx, id, ClusterRecord::new(id)).await?;
            remaining -= 1;
            outcome.created += 1;
        }
        info!(active, target, created = outcome.created, "Fleet grown");
    } else if active > target {
        // Bounded both by the surplus and by the removal quota above the
        // floor; only empty clusters qualify.
        let quota = active
            .saturating_sub(config.minimum_cluster_count)
            .min(active - target);
        for (id, record) in &records {
            if outcome.flagged == quota {
                break;
            }
            if record.is_active() && record.users.is_empty() {
                let mut flagged = record.clone();
                flagged.status = ClusterStatus::Remove;
                map.set(&mut tx, *id, flagged).await?;
                outcome.flagged += 1;
            }
        }
        info!(active, target, flagged = outcome.flagged, "Fleet shrunk");
    } else {
        debug!(active, target, "Fleet already at target");
    }

    tx.commit()?;
    Ok(outcome)
}
