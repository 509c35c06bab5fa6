//! Party-cluster fleet controller.
//!
//! Maintains a pool of short-lived, shared "party" clusters and admits users
//! onto them. The engine continuously reconciles the desired fleet size
//! against observed user load, drives every cluster through its lifecycle by
//! polling the external provisioner, and admits users transactionally
//! against per-cluster capacity and uptime rules.
//!
//! ## Modules
//!
//! - `cluster`: record types held in the durable mapping
//! - `lifecycle`: per-record state machine, driven by provisioner status
//! - `planner`: capacity policy computing the target fleet size
//! - `balancer`: transactional fleet reshaping toward the target
//! - `reconciler`: the periodic advance -> plan -> balance loop
//! - `admission`: transactional user joins
//! - `query`: read-only fleet projection
//! - `provisioner`: the external cluster-operator contract and its mock

pub mod admission;
pub mod balancer;
pub mod cluster;
pub mod config;
pub mod error;
pub mod lifecycle;
pub mod planner;
pub mod provisioner;
pub mod query;
pub mod reconciler;

// Re-export commonly used types
pub use admission::{AdmissionHandler, JoinOutcome};
pub use cluster::{ClusterId, ClusterMap, ClusterRecord, ClusterStatus, ClusterUser};
pub use config::FleetConfig;
pub use error::{FleetError, JoinError};
pub use provisioner::{MockProvisioner, Provisioner, ProvisionerStatus};
pub use query::{ClusterView, QueryHandler};
pub use reconciler::{FleetReconciler, TickStats};
