//! Cluster record types held in the durable mapping.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use partyfleet_store::ReliableMap;

/// Name of the durable mapping holding the fleet.
pub const CLUSTER_MAP_NAME: &str = "clusterDictionary";

/// The fleet's durable mapping.
pub type ClusterMap = ReliableMap<ClusterId, ClusterRecord>;

/// Opaque cluster identifier, unique within the mapping.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct ClusterId(u64);

impl ClusterId {
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// Fresh random id. Callers inserting into the mapping must check for
    /// collisions within their transaction.
    pub fn random() -> Self {
        Self(rand::random())
    }

    pub const fn value(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for ClusterId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle state of a cluster record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClusterStatus {
    /// Created by the balancer; provisioning not yet requested.
    New,
    /// Provisioning requested; waiting for the provisioner.
    Creating,
    /// Provisioned and accepting users.
    Ready,
    /// Flagged surplus by the balancer; teardown pending.
    Remove,
    /// Teardown requested; waiting for the provisioner to forget it.
    Deleting,
    /// Confirmed gone; the record is removed in the same transaction.
    Deleted,
}

/// A user admitted onto a cluster, pinned to one of its ports.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterUser {
    pub name: String,
    pub port: u16,
}

/// One logical cluster as stored in the mapping.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterRecord {
    pub id: ClusterId,
    pub status: ClusterStatus,
    /// Provisioner-supplied handle; empty until provisioning is requested.
    pub address: String,
    /// Ports assigned by the provisioner once Ready.
    pub ports: Vec<u16>,
    pub users: Vec<ClusterUser>,
    /// Set at the Creating -> Ready transition; the max sentinel before.
    pub created_on: DateTime<Utc>,
    pub app_count: u32,
    pub service_count: u32,
}

impl ClusterRecord {
    /// A fresh record in state New with every field empty.
    pub fn new(id: ClusterId) -> Self {
        Self {
            id,
            status: ClusterStatus::New,
            address: String::new(),
            ports: Vec::new(),
            users: Vec::new(),
            created_on: DateTime::<Utc>::MAX_UTC,
            app_count: 0,
            service_count: 0,
        }
    }

    /// Active clusters count against the fleet's min/max bounds.
    pub fn is_active(&self) -> bool {
        matches!(
            self.status,
            ClusterStatus::New | ClusterStatus::Creating | ClusterStatus::Ready
        )
    }

    /// Time since the cluster became Ready. Meaningless before that (the
    /// sentinel makes it hugely negative).
    pub fn uptime(&self, now: DateTime<Utc>) -> chrono::Duration {
        now - self.created_on
    }

    pub fn has_user(&self, name: &str) -> bool {
        self.users.iter().any(|u| u.name == name)
    }

    /// First assigned port no user occupies.
    pub fn free_port(&self) -> Option<u16> {
        self.ports
            .iter()
            .copied()
            .find(|port| !self.users.iter().any(|u| u.port == *port))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_record_is_empty_and_active() {
        let record = ClusterRecord::new(ClusterId::new(7));
        assert_eq!(record.status, ClusterStatus::New);
        assert!(record.address.is_empty());
        assert!(record.ports.is_empty());
        assert!(record.users.is_empty());
        assert_eq!(record.created_on, DateTime::<Utc>::MAX_UTC);
        assert!(record.is_active());
    }

    #[test]
    fn test_free_port_skips_occupied() {
        let mut record = ClusterRecord::new(ClusterId::new(1));
        record.ports = vec![80, 8081, 405];
        assert_eq!(record.free_port(), Some(80));

        record.users.push(ClusterUser {
            name: "alice".to_string(),
            port: 80,
        });
        assert_eq!(record.free_port(), Some(8081));

        record.users.push(ClusterUser {
            name: "bob".to_string(),
            port: 8081,
        });
        record.users.push(ClusterUser {
            name: "carol".to_string(),
            port: 405,
        });
        assert_eq!(record.free_port(), None);
    }

    #[test]
    fn test_active_statuses() {
        let mut record = ClusterRecord::new(ClusterId::new(1));
        for (status, active) in [
            (ClusterStatus::New, true),
            (ClusterStatus::Creating, true),
            (ClusterStatus::Ready, true),
            (ClusterStatus::Remove, false),
            (ClusterStatus::Deleting, false),
            (ClusterStatus::Deleted, false),
        ] {
            record.status = status;
            assert_eq!(record.is_active(), active);
        }
    }

    #[test]
    fn test_record_serde_round_trip() {
        let mut record = ClusterRecord::new(ClusterId::new(42));
        record.status = ClusterStatus::Ready;
        record.address = "mock://42".to_string();
        record.ports = vec![80, 8081];
        record.created_on = Utc::now();
        record.users.push(ClusterUser {
            name: "alice".to_string(),
            port: 80,
        });

        let json = serde_json::to_string(&record).unwrap();
        let back: ClusterRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(back, record);
    }
}
