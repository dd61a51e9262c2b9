//! Caller-facing pod specification types.

use std::collections::BTreeMap;
use std::time::Duration;

use error_stack::Report;
use serde::Deserialize;
use serde::Serialize;

use crate::error::OrchestrationError;

/// Reserved pod name of the flow entry gateway.
pub const GATEWAY_NAME: &str = "gateway";

/// Specification of one pod: an executor's full deployment footprint,
/// covering the optional head plus all sharded workers.
///
/// Immutable once partitioned into per-deployment specs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PodSpec {
    /// Logical pod name; also the prefix of every derived deployment name.
    pub name: String,
    /// Number of independently-addressed worker shards.
    pub shards: u32,
    /// Replicas per worker shard.
    pub replicas: i32,
    /// Image/executor reference run by the workers.
    pub executor: String,
    /// Executor run in front of the workers, addressed by the head over
    /// localhost.
    pub uses_before: Option<String>,
    /// Executor run behind the workers, addressed by the head over localhost.
    pub uses_after: Option<String>,
    /// Runtime argument overrides passed through to the executor.
    pub uses_with: Option<BTreeMap<String, String>>,
    /// Extra environment variables for every container.
    pub env: BTreeMap<String, String>,
    /// Resource requests, e.g. `nvidia.com/gpu -> 1`.
    pub resources: BTreeMap<String, String>,
    /// Kubernetes namespace all deployments are placed in.
    pub namespace: String,
    /// Whether the managed connection pool resolves worker addresses at
    /// runtime. When disabled the head carries a static address table.
    pub connection_pool_enabled: bool,
    /// Readiness deadline in milliseconds; zero or negative waits forever.
    pub timeout_ready_ms: i64,
}

impl Default for PodSpec {
    fn default() -> Self {
        Self {
            name: String::new(),
            shards: 1,
            replicas: 1,
            executor: String::new(),
            uses_before: None,
            uses_after: None,
            uses_with: None,
            env: BTreeMap::new(),
            resources: BTreeMap::new(),
            namespace: "default".to_string(),
            connection_pool_enabled: true,
            timeout_ready_ms: 600_000,
        }
    }
}

impl PodSpec {
    /// Whether this pod is the flow entry gateway.
    pub fn is_gateway(&self) -> bool {
        self.name == GATEWAY_NAME
    }

    /// Check the spec for values that can never form a valid topology.
    ///
    /// # Errors
    ///
    /// - [`OrchestrationError::InvalidSpec`] for an empty name, zero shards
    ///   or a non-positive replica count
    pub fn validate(&self) -> Result<(), Report<OrchestrationError>> {
        if self.name.is_empty() {
            return Err(Report::new(OrchestrationError::InvalidSpec {
                message: "pod name must not be empty".to_string(),
            }));
        }
        if self.shards < 1 {
            return Err(Report::new(OrchestrationError::InvalidSpec {
                message: format!("pod {} must have at least one shard", self.name),
            }));
        }
        if self.replicas < 1 {
            return Err(Report::new(OrchestrationError::InvalidSpec {
                message: format!("pod {} must have at least one replica", self.name),
            }));
        }
        Ok(())
    }

    /// Readiness deadline; `None` means wait indefinitely.
    pub(crate) fn timeout(&self) -> Option<Duration> {
        if self.timeout_ready_ms <= 0 {
            None
        } else {
            Some(Duration::from_millis(self.timeout_ready_ms as u64))
        }
    }
}

/// Configuration overrides applied by a rolling update.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RollingUpdateConfig {
    /// Replacement runtime argument overrides for the workers.
    pub uses_with: Option<BTreeMap<String, String>>,
    /// Path to a state dump the restarted executors should load.
    pub dump_path: Option<String>,
}

impl RollingUpdateConfig {
    /// Merge the override bag; `dump_path` is folded into `uses_with` so the
    /// executor receives it like any other runtime argument.
    pub(crate) fn merged_uses_with(&self) -> Option<BTreeMap<String, String>> {
        let mut merged = self.uses_with.clone();
        if let Some(dump_path) = &self.dump_path {
            merged
                .get_or_insert_with(BTreeMap::new)
                .insert("dump_path".to_string(), dump_path.clone());
        }
        merged
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_single_shard_with_pool() {
        let spec = PodSpec::default();
        assert_eq!(spec.shards, 1);
        assert_eq!(spec.replicas, 1);
        assert!(spec.connection_pool_enabled);
        assert_eq!(spec.namespace, "default");
    }

    #[test]
    fn validate_rejects_zero_shards() {
        let spec = PodSpec {
            name: "enc".to_string(),
            shards: 0,
            ..Default::default()
        };
        let report = spec.validate().unwrap_err();
        assert!(matches!(
            report.current_context(),
            OrchestrationError::InvalidSpec { .. }
        ));
    }

    #[test]
    fn validate_rejects_non_positive_replicas() {
        let spec = PodSpec {
            name: "enc".to_string(),
            replicas: 0,
            ..Default::default()
        };
        assert!(spec.validate().is_err());
    }

    #[test]
    fn timeout_non_positive_means_indefinite() {
        let mut spec = PodSpec {
            name: "enc".to_string(),
            timeout_ready_ms: -1,
            ..Default::default()
        };
        assert!(spec.timeout().is_none());

        spec.timeout_ready_ms = 2_000;
        assert_eq!(spec.timeout(), Some(Duration::from_secs(2)));
    }

    #[test]
    fn dump_path_is_folded_into_uses_with() {
        let overrides = RollingUpdateConfig {
            uses_with: Some(BTreeMap::from([(
                "threshold".to_string(),
                "0.5".to_string(),
            )])),
            dump_path: Some("/data/dump".to_string()),
        };

        let merged = overrides.merged_uses_with().unwrap();
        assert_eq!(merged.get("threshold").unwrap(), "0.5");
        assert_eq!(merged.get("dump_path").unwrap(), "/data/dump");
    }

    #[test]
    fn empty_overrides_merge_to_none() {
        assert!(RollingUpdateConfig::default().merged_uses_with().is_none());
    }
}
