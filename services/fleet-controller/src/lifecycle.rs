//! Per-record cluster lifecycle state machine.
//!
//! `advance` moves one record a single step, driven by the provisioner's
//! observed status rather than local assumptions. Replaying the step after a
//! restart therefore converges to whatever the platform actually did.
//!
//! ```text
//! New -> Creating -> Ready ----> Deleting -> Deleted (record removed)
//!          |   ^                    ^  |
//!          |   +-- CreateFailed    |  +-- CreateFailed/DeleteFailed
//!          +-----------------------+          |
//!                                  Remove ----+
//! ```

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::cluster::{ClusterRecord, ClusterStatus};
use crate::config::FleetConfig;
use crate::error::FleetError;
use crate::provisioner::{Provisioner, ProvisionerStatus};

/// Advance one record a single step.
///
/// Mutates the record in place; the caller owns writing it back (or removing
/// it once it reaches Deleted) within the surrounding transaction.
pub async fn advance(
    record: &mut ClusterRecord,
    now: DateTime<Utc>,
    provisioner: &dyn Provisioner,
    config: &FleetConfig,
) -> Result<(), FleetError> {
    match record.status {
        ClusterStatus::New => step_new(record, provisioner).await,
        ClusterStatus::Creating => step_creating(record, now, provisioner).await,
        ClusterStatus::Ready => step_ready(record, now, provisioner, config).await,
        ClusterStatus::Remove => step_remove(record, provisioner).await,
        ClusterStatus::Deleting => step_deleting(record, provisioner).await,
        // Deleted records are removed by the caller; nothing to do.
        ClusterStatus::Deleted => Ok(()),
    }
}

async fn step_new(
    record: &mut ClusterRecord,
    provisioner: &dyn Provisioner,
) -> Result<(), FleetError> {
    // A fresh random name every attempt; the provisioner rejects collisions.
    let name = rand::random::<u32>().to_string();
    let address = provisioner
        .create(&name)
        .await
        .map_err(FleetError::Provisioner)?;

    info!(cluster_id = %record.id, address = %address, "Cluster provisioning requested");
    record.address = address;
    record.status = ClusterStatus::Creating;
    Ok(())
}

async fn step_creating(
    record: &mut ClusterRecord,
    now: DateTime<Utc>,
    provisioner: &dyn Provisioner,
) -> Result<(), FleetError> {
    let observed = provisioner
        .status(&record.address)
        .await
        .map_err(FleetError::Provisioner)?;

    match observed {
        ProvisionerStatus::Creating => {}
        ProvisionerStatus::Ready => {
            record.ports = provisioner
                .ports(&record.address)
                .await
                .map_err(FleetError::Provisioner)?;
            record.created_on = now;
            record.status = ClusterStatus::Ready;
            info!(
                cluster_id = %record.id,
                ports = record.ports.len(),
                "Cluster is ready"
            );
        }
        ProvisionerStatus::CreateFailed => {
            warn!(cluster_id = %record.id, address = %record.address, "Cluster creation failed, retrying");
            record.address.clear();
            record.status = ClusterStatus::New;
        }
        ProvisionerStatus::Deleting => {
            record.status = ClusterStatus::Deleting;
        }
        // Not in the transition table; re-observe on the next tick.
        ProvisionerStatus::DeleteFailed | ProvisionerStatus::ClusterNotFound => {
            debug!(
                cluster_id = %record.id,
                observed = ?observed,
                "Unexpected status while creating, leaving record as is"
            );
        }
    }
    Ok(())
}

async fn step_ready(
    record: &mut ClusterRecord,
    now: DateTime<Utc>,
    provisioner: &dyn Provisioner,
    config: &FleetConfig,
) -> Result<(), FleetError> {
    // Expiry wins over any observed status.
    if record.uptime(now) >= config.max_cluster_uptime {
        info!(cluster_id = %record.id, "Cluster uptime expired, retiring");
        provisioner
            .delete(&record.address)
            .await
            .map_err(FleetError::Provisioner)?;
        record.status = ClusterStatus::Deleting;
        return Ok(());
    }

    let observed = provisioner
        .status(&record.address)
        .await
        .map_err(FleetError::Provisioner)?;
    if observed == ProvisionerStatus::Deleting {
        warn!(cluster_id = %record.id, "Ready cluster is being deleted by the platform");
        record.status = ClusterStatus::Deleting;
    }
    Ok(())
}

async fn step_remove(
    record: &mut ClusterRecord,
    provisioner: &dyn Provisioner,
) -> Result<(), FleetError> {
    let observed = provisioner
        .status(&record.address)
        .await
        .map_err(FleetError::Provisioner)?;

    match observed {
        ProvisionerStatus::Creating
        | ProvisionerStatus::Ready
        | ProvisionerStatus::CreateFailed
        | ProvisionerStatus::DeleteFailed => {
            info!(cluster_id = %record.id, "Tearing down surplus cluster");
            provisioner
                .delete(&record.address)
                .await
                .map_err(FleetError::Provisioner)?;
            record.status = ClusterStatus::Deleting;
        }
        // Nothing to tear down; let the Deleting step retire the record.
        ProvisionerStatus::Deleting | ProvisionerStatus::ClusterNotFound => {
            record.status = ClusterStatus::Deleting;
        }
    }
    Ok(())
}

async fn step_deleting(
    record: &mut ClusterRecord,
    provisioner: &dyn Provisioner,
) -> Result<(), FleetError> {
    let observed = provisioner
        .status(&record.address)
        .await
        .map_err(FleetError::Provisioner)?;

    match observed {
        // Teardown lost or never arrived; retry. Delete is idempotent.
        ProvisionerStatus::Creating | ProvisionerStatus::Ready => {
            provisioner
                .delete(&record.address)
                .await
                .map_err(FleetError::Provisioner)?;
        }
        ProvisionerStatus::Deleting => {}
        ProvisionerStatus::ClusterNotFound => {
            debug!(cluster_id = %record.id, "Cluster confirmed gone");
            record.status = ClusterStatus::Deleted;
        }
        ProvisionerStatus::CreateFailed | ProvisionerStatus::DeleteFailed => {
            record.status = ClusterStatus::Remove;
        }
    }
    Ok(())
}
