//! Handle owning one managed Deployment resource.

use std::collections::BTreeMap;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use error_stack::Report;
use tracing::debug;
use tracing::info;
use tracing::warn;

use crate::error::OrchestrationError;
use crate::k8s::traits::DeploymentApi;
use crate::poll::poll_until;
use crate::poll::PollError;
use crate::poll::PollOutcome;
use crate::poll::POLL_INTERVAL;
use crate::topology::DeploymentSpec;
use crate::topology::TopologyNode;

/// Owns one head, gateway or worker Deployment: creates it, mutates it in
/// place and blocks on its convergence.
///
/// All state beyond the derived spec is reconstructed from the platform on
/// demand; the handle holds no durable store. A handle never outlives the
/// controller that constructed it.
pub struct DeploymentHandle {
    spec: DeploymentSpec,
    api: Arc<dyn DeploymentApi>,
    /// Desired replica count; updated after a successful scale.
    num_replicas: i32,
    /// Cluster-internal address, set after the first successful creation.
    cluster_address: Option<String>,
    /// Deadline applied to every wait; `None` waits indefinitely.
    timeout: Option<Duration>,
}

impl DeploymentHandle {
    pub(crate) fn new(
        spec: DeploymentSpec,
        timeout: Option<Duration>,
        api: Arc<dyn DeploymentApi>,
    ) -> Self {
        let num_replicas = spec.replicas;
        Self {
            spec,
            api,
            num_replicas,
            cluster_address: None,
            timeout,
        }
    }

    pub fn spec(&self) -> &DeploymentSpec {
        &self.spec
    }

    pub fn dns_name(&self) -> &str {
        &self.spec.dns_name
    }

    pub fn num_replicas(&self) -> i32 {
        self.num_replicas
    }

    pub fn cluster_address(&self) -> Option<&str> {
        self.cluster_address.as_deref()
    }

    pub(crate) fn set_num_replicas(&mut self, replicas: i32) {
        self.num_replicas = replicas;
    }

    pub(crate) fn set_uses_with(&mut self, uses_with: Option<BTreeMap<String, String>>) {
        self.spec.uses_with = uses_with;
    }

    /// Apply the underlying Deployment resource; `replace` forces a full
    /// re-apply instead of a patch. Idempotent.
    ///
    /// # Errors
    ///
    /// - [`OrchestrationError::Api`] if the apply call fails
    pub async fn create(&mut self, replace: bool) -> Result<(), Report<OrchestrationError>> {
        debug!(
            deployment = %self.spec.dns_name,
            replace,
            "Applying deployment"
        );
        let address = self.api.apply(&self.spec, replace).await?;
        self.cluster_address = Some(address);
        Ok(())
    }

    /// Issue a replica-count mutation. Does not wait for convergence.
    pub async fn scale(&self, replicas: i32) -> Result<(), Report<OrchestrationError>> {
        debug!(deployment = %self.spec.dns_name, replicas, "Scaling deployment");
        self.api
            .scale(&self.spec.dns_name, &self.spec.namespace, replicas)
            .await
    }

    /// Best-effort deletion. API errors are logged, never raised, so
    /// teardown can always complete.
    pub async fn delete(&self) {
        match self
            .api
            .delete(&self.spec.dns_name, &self.spec.namespace)
            .await
        {
            Ok(()) => info!(deployment = %self.spec.dns_name, "Deleted deployment"),
            Err(report) => {
                warn!(
                    deployment = %self.spec.dns_name,
                    "Failed to delete deployment: {report:?}"
                );
            }
        }
    }

    /// UIDs of every pod currently backing this deployment.
    pub async fn pod_uids(&self) -> Result<Vec<String>, Report<OrchestrationError>> {
        self.api
            .pod_uids(&self.spec.dns_name, &self.spec.namespace)
            .await
    }

    /// Block until every desired replica reports ready.
    ///
    /// # Errors
    ///
    /// - [`OrchestrationError::DeadlineExceeded`] carrying the last observed
    ///   counts if the deadline elapses
    /// - [`OrchestrationError::Api`] surfaced immediately from a failed read
    pub async fn wait_ready(&self) -> Result<(), Report<OrchestrationError>> {
        info!(
            deployment = %self.spec.dns_name,
            replicas = self.num_replicas,
            "Waiting for deployment to become ready"
        );

        let desired = self.num_replicas;
        let result = poll_until(self.timeout, POLL_INTERVAL, move || async move {
            let status = self
                .api
                .status(&self.spec.dns_name, &self.spec.namespace)
                .await?;
            let ready = status.ready_replicas.unwrap_or(0);
            if status.ready_replicas.is_some() && ready == desired {
                return Ok(PollOutcome::Ready);
            }
            debug!(
                deployment = %self.spec.dns_name,
                ready,
                desired,
                "Replicas not ready yet"
            );
            Ok(PollOutcome::NotReady(format!(
                "{ready}/{desired} replicas ready"
            )))
        })
        .await;

        self.finish_wait(result, "start")
    }

    /// Block until the rollout has fully replaced the previous generation:
    /// updated and total replica counts both equal the desired count, and no
    /// live pod identity is left from `previous_uids`.
    ///
    /// Counts alone are not enough: old and new pods overlap during a
    /// rollout, so the UID intersection check is what actually proves every
    /// prior replica is gone.
    pub async fn wait_restarted(
        &self,
        previous_uids: &HashSet<String>,
    ) -> Result<(), Report<OrchestrationError>> {
        info!(
            deployment = %self.spec.dns_name,
            replicas = self.num_replicas,
            "Waiting for deployment to be restarted"
        );

        let desired = self.num_replicas;
        let result = poll_until(self.timeout, POLL_INTERVAL, move || async move {
            let status = self
                .api
                .status(&self.spec.dns_name, &self.spec.namespace)
                .await?;
            let updated = status.updated_replicas.unwrap_or(0);
            let total = status.replicas.unwrap_or(0);

            let live_uids = self.pod_uids().await?;
            let stale = live_uids.iter().any(|uid| previous_uids.contains(uid));

            if status.updated_replicas.is_some() && updated == desired && total == desired && !stale
            {
                return Ok(PollOutcome::Ready);
            }

            let detail = if updated < desired {
                format!("{updated}/{desired} replicas updated")
            } else if stale {
                "old replicas still terminating".to_string()
            } else if total < desired {
                format!("{total}/{desired} replicas alive")
            } else {
                format!(
                    "{total} replicas alive, waiting for {} old replicas to terminate",
                    total - desired
                )
            };
            debug!(deployment = %self.spec.dns_name, detail = %detail, "Rollout incomplete");
            Ok(PollOutcome::NotReady(detail))
        })
        .await;

        self.finish_wait(result, "restart")
    }

    /// Block until the ready replica count equals `target`.
    pub async fn wait_scaled(&self, target: i32) -> Result<(), Report<OrchestrationError>> {
        info!(
            deployment = %self.spec.dns_name,
            from = self.num_replicas,
            to = target,
            "Waiting for deployment to be scaled"
        );

        let result = poll_until(self.timeout, POLL_INTERVAL, move || async move {
            let status = self
                .api
                .status(&self.spec.dns_name, &self.spec.namespace)
                .await?;
            let ready = status.ready_replicas.unwrap_or(0);
            if status.ready_replicas.is_some() && ready == target {
                return Ok(PollOutcome::Ready);
            }

            let detail = if ready < target {
                format!("{ready}/{target} replicas scaled up")
            } else {
                format!(
                    "{ready} replicas ready, waiting for {} to scale down",
                    ready - target
                )
            };
            debug!(deployment = %self.spec.dns_name, detail = %detail, "Scale incomplete");
            Ok(PollOutcome::NotReady(detail))
        })
        .await;

        self.finish_wait(result, "scale")
    }

    /// Node-address record for the routing table.
    pub fn to_node(&self) -> TopologyNode {
        TopologyNode {
            name: self.spec.dns_name.clone(),
            host: self.spec.cluster_address(),
            port_in: self.spec.port_in,
        }
    }

    fn finish_wait(
        &self,
        result: Result<(), PollError>,
        operation: &'static str,
    ) -> Result<(), Report<OrchestrationError>> {
        match result {
            Ok(()) => {
                info!(deployment = %self.spec.dns_name, operation, "Deployment converged");
                Ok(())
            }
            Err(PollError::Check(report)) => Err(report),
            Err(PollError::DeadlineExceeded { last_observed }) => {
                let mut report = Report::new(OrchestrationError::DeadlineExceeded {
                    operation,
                    deployment: self.spec.dns_name.clone(),
                });
                if let Some(observed) = last_observed {
                    report = report.attach_printable(format!("last observed: {observed}"));
                }
                Err(report)
            }
        }
    }
}
