//! Error taxonomy for the fleet engine.

use thiserror::Error;

use partyfleet_store::StoreError;

use crate::cluster::ClusterId;

/// Errors surfaced to join callers, synchronously.
#[derive(Debug, Error)]
pub enum JoinError {
    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),

    #[error("cluster {0} not found")]
    NotFound(ClusterId),

    #[error("cluster {0} is not accepting new users")]
    NotJoinable(ClusterId),

    #[error("user '{user}' already joined cluster {cluster}")]
    AlreadyJoined { user: String, cluster: ClusterId },

    #[error("cluster {0} has no free ports")]
    NoCapacity(ClusterId),

    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

/// Errors inside a reconciliation tick. Logged by the loop, never fatal; the
/// failed phase's transaction is discarded and retried next tick.
#[derive(Debug, Error)]
pub enum FleetError {
    #[error("provisioner operation failed: {0:#}")]
    Provisioner(anyhow::Error),

    #[error("store error: {0}")]
    Store(#[from] StoreError),
}
