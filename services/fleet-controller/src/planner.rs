//! Capacity planning policy.
//!
//! Computes the number of active clusters the fleet should have from the
//! current snapshot. Deterministic and side-effect free; the balancer is
//! what acts on the result.

use tracing::debug;

use crate::cluster::ClusterRecord;
use crate::config::FleetConfig;

/// Compute the target active-cluster count for a fleet snapshot.
///
/// The fill ratio divides users across the whole fleet by the capacity of the
/// active clusters only. Users on Remove/Deleting records therefore inflate
/// the ratio; this matches the policy the system has always shipped with and
/// existing sizing behaviour depends on it.
pub fn compute_target(records: &[ClusterRecord], config: &FleetConfig) -> usize {
    let active = records.iter().filter(|r| r.is_active()).count();
    let total_users: usize = records.iter().map(|r| r.users.len()).sum();
    let capacity = active * config.maximum_users_per_cluster;

    let fill = if capacity == 0 {
        0.0
    } else {
        total_users as f64 / capacity as f64
    };

    let high = config.user_capacity_high_threshold;
    let low = config.user_capacity_low_threshold;

    let target = if fill >= high {
        let growth = (active as f64 * (1.0 - high)).ceil() as usize;
        (active + growth).min(config.maximum_cluster_count)
    } else if fill <= low {
        let shrink = (active as f64 * (high - low)).floor() as usize;
        active
            .saturating_sub(shrink)
            .max(config.minimum_cluster_count)
    } else {
        active
    };

    debug!(active, total_users, fill, target, "Computed fleet target");
    target
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::{ClusterId, ClusterStatus, ClusterUser};

    fn cluster(status: ClusterStatus, users: usize) -> ClusterRecord {
        let mut record = ClusterRecord::new(ClusterId::random());
        record.status = status;
        record.ports = (0..users as u16).map(|i| 8000 + i).collect();
        record.users = (0..users)
            .map(|i| ClusterUser {
                name: format!("user-{i}"),
                port: 8000 + i as u16,
            })
            .collect();
        record
    }

    fn fleet(ready: usize, users_each: usize) -> Vec<ClusterRecord> {
        (0..ready)
            .map(|_| cluster(ClusterStatus::Ready, users_each))
            .collect()
    }

    #[test]
    fn test_empty_fleet_targets_minimum() {
        let config = FleetConfig::default();
        assert_eq!(compute_target(&[], &config), 10);
    }

    #[test]
    fn test_high_load_grows_fleet() {
        // 10 clusters at 8/10 users: fill 0.8 >= 0.75, growth ceil(2.5) = 3.
        let config = FleetConfig::default();
        assert_eq!(compute_target(&fleet(10, 8), &config), 13);
    }

    #[test]
    fn test_growth_capped_at_maximum() {
        let config = FleetConfig {
            maximum_cluster_count: 12,
            ..FleetConfig::default()
        };
        assert_eq!(compute_target(&fleet(10, 10), &config), 12);
    }

    #[test]
    fn test_low_load_shrinks_fleet() {
        // 20 clusters at 2/10 users: fill 0.2 <= 0.25, shrink floor(10.0) = 10.
        let config = FleetConfig::default();
        assert_eq!(compute_target(&fleet(20, 2), &config), 10);
    }

    #[test]
    fn test_shrink_floored_at_minimum() {
        let config = FleetConfig::default();
        assert_eq!(compute_target(&fleet(12, 0), &config), 10);
    }

    #[test]
    fn test_mid_band_load_holds_steady() {
        let config = FleetConfig::default();
        assert_eq!(compute_target(&fleet(10, 5), &config), 10);
    }

    #[test]
    fn test_users_on_dying_clusters_inflate_fill() {
        // 10 active at 7/10 users is mid-band; 12 more users stranded on
        // Deleting records push the ratio over the high threshold.
        let config = FleetConfig::default();
        let mut records = fleet(10, 7);
        records.push(cluster(ClusterStatus::Deleting, 6));
        records.push(cluster(ClusterStatus::Remove, 6));
        assert_eq!(compute_target(&records, &config), 13);
    }
}
