//! Read-only projection of the fleet for external consumers.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::Serialize;

use partyfleet_store::{StateManager, StoreError};

use crate::cluster::{ClusterId, ClusterMap, ClusterRecord, ClusterStatus, CLUSTER_MAP_NAME};

/// One Ready cluster as shown to consumers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClusterView {
    pub name: String,
    pub app_count: u32,
    pub service_count: u32,
    pub uptime: Duration,
    pub user_count: usize,
}

/// Serves read-only views of the fleet.
pub struct QueryHandler {
    manager: Arc<StateManager>,
    map: ClusterMap,
}

impl QueryHandler {
    pub fn new(manager: Arc<StateManager>) -> Result<Self, StoreError> {
        let map = manager.get_or_create::<ClusterId, ClusterRecord>(CLUSTER_MAP_NAME)?;
        Ok(Self { manager, map })
    }

    /// Snapshot every Ready cluster, in the mapping's enumeration order.
    pub async fn list_clusters(&self) -> Result<Vec<ClusterView>, StoreError> {
        let mut tx = self.manager.begin_transaction();
        let records = self.map.enumerate(&mut tx).await?;
        tx.abort();

        let now = Utc::now();
        Ok(records
            .into_iter()
            .filter(|(_, record)| record.status == ClusterStatus::Ready)
            .map(|(id, record)| ClusterView {
                name: format!("Party Cluster {id}"),
                app_count: record.app_count,
                service_count: record.service_count,
                uptime: record.uptime(now).to_std().unwrap_or_default(),
                user_count: record.users.len(),
            })
            .collect())
    }
}
