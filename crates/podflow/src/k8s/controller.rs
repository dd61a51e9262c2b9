//! Kubernetes-backed pod controller.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use error_stack::Report;
use futures::future;
use tracing::error;
use tracing::info;

use crate::error::OrchestrationError;
use crate::k8s::deployment::DeploymentHandle;
use crate::k8s::traits::DeploymentApi;
use crate::pod::Pod;
use crate::spec::PodSpec;
use crate::spec::RollingUpdateConfig;
use crate::topology::partition;
use crate::topology::TopologyNode;

/// Fans pod lifecycle operations out over one optional head handle and a
/// fixed, ordered set of worker handles.
///
/// The worker handle count equals the shard count for the lifetime of the
/// controller; scaling changes replicas per handle, never the handle count.
pub struct K8sPodController {
    spec: PodSpec,
    head: Option<DeploymentHandle>,
    workers: Vec<DeploymentHandle>,
}

impl K8sPodController {
    /// Partition the spec and construct the deployment handles.
    ///
    /// # Errors
    ///
    /// - [`OrchestrationError::InvalidSpec`] if the spec fails validation
    pub fn new(
        spec: PodSpec,
        api: Arc<dyn DeploymentApi>,
    ) -> Result<Self, Report<OrchestrationError>> {
        let topology = partition(&spec)?;
        let timeout = spec.timeout();

        let head = topology
            .head
            .map(|head| DeploymentHandle::new(head, timeout, Arc::clone(&api)));
        let workers = topology
            .workers
            .into_iter()
            .map(|worker| DeploymentHandle::new(worker, timeout, Arc::clone(&api)))
            .collect();

        Ok(Self {
            spec,
            head,
            workers,
        })
    }

    pub fn name(&self) -> &str {
        &self.spec.name
    }

    pub fn head(&self) -> Option<&DeploymentHandle> {
        self.head.as_ref()
    }

    pub fn workers(&self) -> &[DeploymentHandle] {
        &self.workers
    }

    /// Total replicas across the head and every worker shard.
    pub fn num_replicas(&self) -> i32 {
        let head = self.head.as_ref().map_or(0, DeploymentHandle::num_replicas);
        head + self
            .workers
            .iter()
            .map(DeploymentHandle::num_replicas)
            .sum::<i32>()
    }

    async fn start_inner(&mut self, blocking: bool) -> Result<(), Report<OrchestrationError>> {
        // Creation of head and workers is not ordered; only the waits are,
        // because downstream routing expects the head's address to resolve
        // before workers count as reachable.
        if let Some(head) = self.head.as_mut() {
            head.create(false).await?;
        }
        for worker in self.workers.iter_mut() {
            worker.create(false).await?;
        }

        if blocking {
            self.wait_all_ready().await?;
        }

        Ok(())
    }

    async fn wait_all_ready(&self) -> Result<(), Report<OrchestrationError>> {
        if let Some(head) = &self.head {
            head.wait_ready().await?;
        }
        for worker in &self.workers {
            worker.wait_ready().await?;
        }
        Ok(())
    }

    /// Wait for a pod created with `start(false)` to become ready, in the
    /// same head-then-workers order a blocking start uses. Any failure tears
    /// down every deployment before surfacing.
    pub async fn wait_start(&self) -> Result<(), Report<OrchestrationError>> {
        match self.wait_all_ready().await {
            Ok(()) => Ok(()),
            Err(report) => {
                error!(
                    pod = %self.spec.name,
                    "Pod never became ready, tearing down created deployments"
                );
                self.teardown().await;
                Err(report.change_context(OrchestrationError::StartupFailed {
                    pod: self.spec.name.clone(),
                }))
            }
        }
    }

    async fn teardown(&self) {
        if let Some(head) = &self.head {
            head.delete().await;
        }
        for worker in &self.workers {
            worker.delete().await;
        }
    }
}

#[async_trait]
impl Pod for K8sPodController {
    async fn start(&mut self, blocking: bool) -> Result<(), Report<OrchestrationError>> {
        info!(pod = %self.spec.name, blocking, "Creating pod deployments");

        match self.start_inner(blocking).await {
            Ok(()) => Ok(()),
            Err(report) => {
                // A half-started pod must never be observable as success.
                error!(
                    pod = %self.spec.name,
                    "Pod startup failed, tearing down created deployments"
                );
                self.teardown().await;
                Err(report.change_context(OrchestrationError::StartupFailed {
                    pod: self.spec.name.clone(),
                }))
            }
        }
    }

    async fn rolling_update(
        &mut self,
        overrides: RollingUpdateConfig,
    ) -> Result<(), Report<OrchestrationError>> {
        if self.spec.is_gateway() {
            return Err(Report::new(OrchestrationError::InvalidSpec {
                message: "rolling update is not supported on the gateway".to_string(),
            }));
        }

        info!(pod = %self.spec.name, "Rolling update of worker deployments");
        let uses_with = overrides.merged_uses_with();

        // Snapshot each worker's live pod identities before its own replace,
        // then issue every replace before waiting on any worker. The head is
        // never restarted.
        let mut previous_uids = Vec::with_capacity(self.workers.len());
        for worker in self.workers.iter_mut() {
            let uids: HashSet<String> = worker.pod_uids().await?.into_iter().collect();
            worker.set_uses_with(uses_with.clone());
            worker.create(true).await?;
            previous_uids.push(uids);
        }

        // Each worker's rollout is awaited independently; one failure does
        // not cancel the others, and surfaces only after all complete.
        let waits = self
            .workers
            .iter()
            .zip(&previous_uids)
            .map(|(worker, uids)| worker.wait_restarted(uids));
        let results = future::join_all(waits).await;
        results.into_iter().collect()
    }

    async fn scale(&mut self, replicas: i32) -> Result<(), Report<OrchestrationError>> {
        info!(pod = %self.spec.name, replicas, "Scaling worker deployments");

        // Fan the mutation out over every worker before waiting on any; the
        // head's replica count is never touched.
        for worker in &self.workers {
            worker.scale(replicas).await?;
        }

        let waits = self.workers.iter().map(|worker| worker.wait_scaled(replicas));
        let results = future::join_all(waits).await;
        results.into_iter().collect::<Result<(), _>>()?;

        for worker in self.workers.iter_mut() {
            worker.set_num_replicas(replicas);
        }
        Ok(())
    }

    async fn close(&mut self) {
        info!(pod = %self.spec.name, "Closing pod");
        self.teardown().await;
    }

    fn topology(&self) -> Vec<TopologyNode> {
        if self.spec.is_gateway() {
            return self.workers.iter().take(1).map(|w| w.to_node()).collect();
        }

        let mut nodes = Vec::with_capacity(self.workers.len() + 1);
        if let Some(head) = &self.head {
            nodes.push(head.to_node());
        }
        nodes.extend(self.workers.iter().map(|w| w.to_node()));
        nodes
    }
}
