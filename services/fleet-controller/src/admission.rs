//! Join admission: place a user on a Ready cluster.

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info};

use partyfleet_store::{LockMode, StateManager, StoreError};

use crate::cluster::{ClusterId, ClusterMap, ClusterRecord, ClusterStatus, ClusterUser, CLUSTER_MAP_NAME};
use crate::config::FleetConfig;
use crate::error::JoinError;

/// Clusters this close to retirement stop admitting users; a joiner would
/// barely get to use the cluster before it is torn down.
const EXPIRY_MARGIN_MINUTES: i64 = 5;

/// Result of a successful join, handed to the edge for user notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JoinOutcome {
    pub cluster_id: ClusterId,
    pub port: u16,
}

/// Handles join requests against the fleet.
pub struct AdmissionHandler {
    manager: Arc<StateManager>,
    map: ClusterMap,
    config: FleetConfig,
}

impl AdmissionHandler {
    pub fn new(manager: Arc<StateManager>, config: FleetConfig) -> Result<Self, StoreError> {
        let map = manager.get_or_create::<ClusterId, ClusterRecord>(CLUSTER_MAP_NAME)?;
        Ok(Self {
            manager,
            map,
            config,
        })
    }

    /// Admit `username` onto the cluster, assigning it a free port.
    ///
    /// All admission conditions are checked inside the transaction, under an
    /// update lock on the record, so a concurrent reconciler pass either
    /// observes the added user or this join observes the record's new state
    /// and rejects.
    pub async fn join(
        &self,
        username: &str,
        cluster_id: ClusterId,
    ) -> Result<JoinOutcome, JoinError> {
        if username.trim().is_empty() {
            return Err(JoinError::InvalidArgument("username must not be blank"));
        }

        let mut tx = self.manager.begin_transaction();

        let Some(mut record) = self
            .map
            .try_get(&mut tx, &cluster_id, LockMode::Update)
            .await?
        else {
            return Err(JoinError::NotFound(cluster_id));
        };

        if record.status != ClusterStatus::Ready {
            debug!(cluster_id = %cluster_id, status = ?record.status, "Join rejected: not ready");
            return Err(JoinError::NotJoinable(cluster_id));
        }

        let now = Utc::now();
        let expiry_margin = chrono::Duration::minutes(EXPIRY_MARGIN_MINUTES);
        if record.uptime(now) > self.config.max_cluster_uptime - expiry_margin {
            debug!(cluster_id = %cluster_id, "Join rejected: cluster expiring soon");
            return Err(JoinError::NotJoinable(cluster_id));
        }

        if record.has_user(username) {
            return Err(JoinError::AlreadyJoined {
                user: username.to_string(),
                cluster: cluster_id,
            });
        }

        if record.users.len() >= self.config.maximum_users_per_cluster {
            return Err(JoinError::NoCapacity(cluster_id));
        }

        let Some(port) = record.free_port() else {
            return Err(JoinError::NoCapacity(cluster_id));
        };

        record.users.push(ClusterUser {
            name: username.to_string(),
            port,
        });
        self.map.set(&mut tx, cluster_id, record).await?;
        tx.commit()?;

        info!(cluster_id = %cluster_id, user = username, port, "User joined cluster");
        Ok(JoinOutcome { cluster_id, port })
    }
}
