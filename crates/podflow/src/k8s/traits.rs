//! Platform API seam used by deployment handles.

use async_trait::async_trait;
use error_stack::Report;

use crate::error::OrchestrationError;
use crate::topology::DeploymentSpec;

/// Replica counts observed on a live Deployment resource.
///
/// Fields mirror the apps/v1 status: `None` means the field has not been
/// reported yet, which is distinct from zero during rollout accounting.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ObservedStatus {
    /// Total replicas alive, old and new generations combined.
    pub replicas: Option<i32>,
    pub ready_replicas: Option<i32>,
    /// Replicas already running the latest template.
    pub updated_replicas: Option<i32>,
}

/// Operations the orchestration layer needs from the platform.
///
/// The concrete implementation owns manifest construction and transport;
/// handles only ever reason about names, counts and pod identities. Mock
/// implementations back the unit tests.
#[async_trait]
pub trait DeploymentApi: Send + Sync {
    /// Idempotently apply the Deployment resource for `spec` and return its
    /// cluster-internal address. `replace` forces a full re-apply instead of
    /// a patch.
    async fn apply(
        &self,
        spec: &DeploymentSpec,
        replace: bool,
    ) -> Result<String, Report<OrchestrationError>>;

    /// Delete the named Deployment.
    async fn delete(
        &self,
        dns_name: &str,
        namespace: &str,
    ) -> Result<(), Report<OrchestrationError>>;

    /// Mutate only the replica count of the named Deployment.
    async fn scale(
        &self,
        dns_name: &str,
        namespace: &str,
        replicas: i32,
    ) -> Result<(), Report<OrchestrationError>>;

    /// Read the current replica counts of the named Deployment.
    async fn status(
        &self,
        dns_name: &str,
        namespace: &str,
    ) -> Result<ObservedStatus, Report<OrchestrationError>>;

    /// UIDs of every pod currently backing the named Deployment.
    async fn pod_uids(
        &self,
        dns_name: &str,
        namespace: &str,
    ) -> Result<Vec<String>, Report<OrchestrationError>>;
}
