//! Fleet policy configuration.
//!
//! The engine takes a [`FleetConfig`] at construction; nothing reads ambient
//! state after startup. `from_env` exists for the hosting binary only.

use std::time::Duration;

#[derive(Debug, Clone)]
pub struct FleetConfig {
    /// Reconciler tick period.
    pub refresh_interval: Duration,

    /// Floor on active clusters.
    pub minimum_cluster_count: usize,

    /// Ceiling on active clusters.
    pub maximum_cluster_count: usize,

    /// Admission cap per cluster.
    pub maximum_users_per_cluster: usize,

    /// Age at which a Ready cluster is retired.
    pub max_cluster_uptime: chrono::Duration,

    /// Fleet fill ratio at or above which the planner grows the fleet.
    pub user_capacity_high_threshold: f64,

    /// Fleet fill ratio at or below which the planner shrinks the fleet.
    pub user_capacity_low_threshold: f64,
}

impl Default for FleetConfig {
    fn default() -> Self {
        Self {
            refresh_interval: Duration::from_secs(1),
            minimum_cluster_count: 10,
            maximum_cluster_count: 100,
            maximum_users_per_cluster: 10,
            max_cluster_uptime: chrono::Duration::hours(2),
            user_capacity_high_threshold: 0.75,
            user_capacity_low_threshold: 0.25,
        }
    }
}

impl FleetConfig {
    /// Build a config from `PARTYFLEET_*` environment variables, falling back
    /// to the defaults above for anything unset or unparsable.
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let refresh_interval = env_u64("PARTYFLEET_REFRESH_INTERVAL_MS")
            .map(Duration::from_millis)
            .unwrap_or(defaults.refresh_interval);

        let max_cluster_uptime = env_u64("PARTYFLEET_MAX_CLUSTER_UPTIME_SECS")
            .map(|secs| chrono::Duration::seconds(secs as i64))
            .unwrap_or(defaults.max_cluster_uptime);

        Self {
            refresh_interval,
            minimum_cluster_count: env_u64("PARTYFLEET_MINIMUM_CLUSTER_COUNT")
                .map(|n| n as usize)
                .unwrap_or(defaults.minimum_cluster_count),
            maximum_cluster_count: env_u64("PARTYFLEET_MAXIMUM_CLUSTER_COUNT")
                .map(|n| n as usize)
                .unwrap_or(defaults.maximum_cluster_count),
            maximum_users_per_cluster: env_u64("PARTYFLEET_MAXIMUM_USERS_PER_CLUSTER")
                .map(|n| n as usize)
                .unwrap_or(defaults.maximum_users_per_cluster),
            max_cluster_uptime,
            user_capacity_high_threshold: env_f64("PARTYFLEET_USER_CAPACITY_HIGH_THRESHOLD")
                .unwrap_or(defaults.user_capacity_high_threshold),
            user_capacity_low_threshold: env_f64("PARTYFLEET_USER_CAPACITY_LOW_THRESHOLD")
                .unwrap_or(defaults.user_capacity_low_threshold),
        }
    }
}

fn env_u64(key: &str) -> Option<u64> {
    std::env::var(key).ok().and_then(|s| s.parse().ok())
}

fn env_f64(key: &str) -> Option<f64> {
    std::env::var(key).ok().and_then(|s| s.parse().ok())
}
