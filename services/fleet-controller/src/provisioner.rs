//! Cluster provisioner interface and mock implementation.
//!
//! The provisioner abstracts the platform that physically creates and
//! destroys clusters:
//! - `create`/`delete` begin asynchronous provisioning and teardown
//! - `status` reports the platform's view of a cluster
//! - `ports` lists the ports a Ready cluster exposes
//!
//! A mock implementation is provided for testing and development.

use std::collections::HashMap;
use std::sync::Mutex;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Status reported by the provisioner for one cluster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProvisionerStatus {
    Creating,
    Ready,
    Deleting,
    CreateFailed,
    DeleteFailed,
    ClusterNotFound,
}

/// Operation surface of the external cluster operator.
#[async_trait]
pub trait Provisioner: Send + Sync {
    /// Begin provisioning a cluster and return its opaque address.
    ///
    /// The provisioner rejects name collisions.
    async fn create(&self, name: &str) -> Result<String>;

    /// Begin tearing a cluster down. Idempotent.
    async fn delete(&self, address: &str) -> Result<()>;

    /// Report the platform's current view of the cluster.
    async fn status(&self, address: &str) -> Result<ProvisionerStatus>;

    /// Ports exposed by a provisioned cluster.
    async fn ports(&self, address: &str) -> Result<Vec<u16>>;
}

// =============================================================================
// Mock provisioner
// =============================================================================

/// Ports a mock cluster hands out once Ready.
pub const DEFAULT_MOCK_PORTS: &[u16] = &[80, 8081, 405, 520];

/// Create/delete calls observed by the mock, for assertions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockOp {
    Create { name: String, address: String },
    Delete { address: String },
}

#[derive(Debug)]
struct MockCluster {
    status: ProvisionerStatus,
    /// Status polls remaining before Creating reports Ready or Deleting
    /// reports ClusterNotFound.
    polls_left: u32,
    /// Status frozen by a test; poll counters are ignored.
    pinned: bool,
    ports: Vec<u16>,
}

#[derive(Debug, Default)]
struct MockState {
    clusters: HashMap<String, MockCluster>,
    ops: Vec<MockOp>,
}

/// Mock provisioner for testing and development.
///
/// Clusters progress Creating -> Ready after `creating_polls` status calls,
/// and Deleting -> ClusterNotFound after `deleting_polls` status calls.
pub struct MockProvisioner {
    state: Mutex<MockState>,
    creating_polls: u32,
    deleting_polls: u32,
    fail_creates: bool,
    ports: Vec<u16>,
}

impl MockProvisioner {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MockState::default()),
            creating_polls: 1,
            deleting_polls: 1,
            fail_creates: false,
            ports: DEFAULT_MOCK_PORTS.to_vec(),
        }
    }

    /// Mock whose clusters report Ready on the first poll after create and
    /// ClusterNotFound on the first poll after delete.
    pub fn ready_immediately() -> Self {
        Self {
            creating_polls: 0,
            deleting_polls: 0,
            ..Self::new()
        }
    }

    /// Mock that fails all creates.
    pub fn failing() -> Self {
        Self {
            fail_creates: true,
            ..Self::new()
        }
    }

    pub fn with_ports(mut self, ports: Vec<u16>) -> Self {
        self.ports = ports;
        self
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MockState> {
        self.state.lock().expect("mock provisioner state poisoned")
    }

    /// Register a cluster at a known address with a pinned status, for tests
    /// that seed records directly.
    pub fn register(&self, address: &str, status: ProvisionerStatus) {
        self.lock().clusters.insert(
            address.to_string(),
            MockCluster {
                status,
                polls_left: 0,
                pinned: true,
                ports: self.ports.clone(),
            },
        );
    }

    /// Pin a cluster's reported status.
    pub fn set_status(&self, address: &str, status: ProvisionerStatus) {
        if let Some(cluster) = self.lock().clusters.get_mut(address) {
            cluster.status = status;
            cluster.pinned = true;
        }
    }

    /// Snapshot of create/delete calls made so far.
    pub fn operations(&self) -> Vec<MockOp> {
        self.lock().ops.clone()
    }

    pub fn clear_operations(&self) {
        self.lock().ops.clear();
    }

    pub fn delete_count(&self, address: &str) -> usize {
        self.lock()
            .ops
            .iter()
            .filter(|op| matches!(op, MockOp::Delete { address: a } if a == address))
            .count()
    }
}

impl Default for MockProvisioner {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Provisioner for MockProvisioner {
    async fn create(&self, name: &str) -> Result<String> {
        if self.fail_creates {
            anyhow::bail!("mock provisioner configured to fail creates");
        }

        let address = format!("mock://{name}");
        let mut state = self.lock();
        if state.clusters.contains_key(&address) {
            anyhow::bail!("cluster name '{name}' already exists");
        }

        info!(name, address = %address, "[MOCK] Provisioning cluster");
        state.clusters.insert(
            address.clone(),
            MockCluster {
                status: ProvisionerStatus::Creating,
                polls_left: self.creating_polls,
                pinned: false,
                ports: self.ports.clone(),
            },
        );
        state.ops.push(MockOp::Create {
            name: name.to_string(),
            address: address.clone(),
        });
        Ok(address)
    }

    async fn delete(&self, address: &str) -> Result<()> {
        let mut state = self.lock();
        state.ops.push(MockOp::Delete {
            address: address.to_string(),
        });

        if let Some(cluster) = state.clusters.get_mut(address) {
            info!(address, "[MOCK] Deleting cluster");
            cluster.status = ProvisionerStatus::Deleting;
            cluster.polls_left = self.deleting_polls;
            cluster.pinned = false;
        } else {
            debug!(address, "[MOCK] Delete of unknown cluster ignored");
        }
        Ok(())
    }

    async fn status(&self, address: &str) -> Result<ProvisionerStatus> {
        let mut state = self.lock();
        let Some(cluster) = state.clusters.get_mut(address) else {
            return Ok(ProvisionerStatus::ClusterNotFound);
        };

        if cluster.pinned {
            return Ok(cluster.status);
        }

        match cluster.status {
            ProvisionerStatus::Creating => {
                if cluster.polls_left > 0 {
                    cluster.polls_left -= 1;
                } else {
                    cluster.status = ProvisionerStatus::Ready;
                }
            }
            ProvisionerStatus::Deleting => {
                if cluster.polls_left > 0 {
                    cluster.polls_left -= 1;
                } else {
                    cluster.status = ProvisionerStatus::ClusterNotFound;
                }
            }
            _ => {}
        }

        Ok(cluster.status)
    }

    async fn ports(&self, address: &str) -> Result<Vec<u16>> {
        let state = self.lock();
        match state.clusters.get(address) {
            Some(cluster) => Ok(cluster.ports.clone()),
            None => anyhow::bail!("no such cluster: {address}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_create_then_ready() {
        let mock = MockProvisioner::new();
        let address = mock.create("123").await.unwrap();
        assert_eq!(address, "mock://123");

        // One Creating poll, then Ready.
        assert_eq!(
            mock.status(&address).await.unwrap(),
            ProvisionerStatus::Creating
        );
        assert_eq!(
            mock.status(&address).await.unwrap(),
            ProvisionerStatus::Ready
        );
        assert_eq!(mock.ports(&address).await.unwrap(), DEFAULT_MOCK_PORTS);
    }

    #[tokio::test]
    async fn test_mock_delete_then_gone() {
        let mock = MockProvisioner::ready_immediately();
        let address = mock.create("123").await.unwrap();
        assert_eq!(
            mock.status(&address).await.unwrap(),
            ProvisionerStatus::Ready
        );

        mock.delete(&address).await.unwrap();
        assert_eq!(
            mock.status(&address).await.unwrap(),
            ProvisionerStatus::ClusterNotFound
        );

        // Idempotent: deleting again (or an unknown address) succeeds.
        mock.delete(&address).await.unwrap();
        mock.delete("mock://nonexistent").await.unwrap();
    }

    #[tokio::test]
    async fn test_mock_failing_creates() {
        let mock = MockProvisioner::failing();
        assert!(mock.create("123").await.is_err());
        assert!(mock.operations().is_empty());
    }

    #[tokio::test]
    async fn test_mock_rejects_name_collision() {
        let mock = MockProvisioner::new();
        mock.create("123").await.unwrap();
        assert!(mock.create("123").await.is_err());
    }

    #[tokio::test]
    async fn test_mock_operation_log() {
        let mock = MockProvisioner::new();
        let address = mock.create("7").await.unwrap();
        mock.delete(&address).await.unwrap();
        mock.delete(&address).await.unwrap();

        assert_eq!(mock.operations().len(), 3);
        assert_eq!(mock.delete_count(&address), 2);
    }

    #[tokio::test]
    async fn test_mock_pinned_status() {
        let mock = MockProvisioner::new();
        let address = mock.create("9").await.unwrap();
        mock.set_status(&address, ProvisionerStatus::CreateFailed);

        for _ in 0..3 {
            assert_eq!(
                mock.status(&address).await.unwrap(),
                ProvisionerStatus::CreateFailed
            );
        }
    }
}
