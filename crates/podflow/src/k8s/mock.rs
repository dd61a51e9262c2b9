//! Test adapter implementing the platform API seam
//!
//! This module provides a recording mock implementation of [`DeploymentApi`]
//! for use in unit tests: every call is appended to an ordered log, replica
//! statuses and pod UIDs are scripted per deployment, and individual
//! operations can be switched into error mode.

use std::collections::HashMap;
use std::collections::HashSet;
use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use error_stack::Report;

use crate::error::OrchestrationError;
use crate::k8s::traits::DeploymentApi;
use crate::k8s::traits::ObservedStatus;
use crate::topology::DeploymentSpec;

/// One recorded platform API call, keyed by deployment DNS name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApiCall {
    Apply { deployment: String, replace: bool },
    Delete { deployment: String },
    Scale { deployment: String, replicas: i32 },
    Status { deployment: String },
    PodUids { deployment: String },
}

#[derive(Default)]
struct MockState {
    calls: Vec<ApiCall>,
    /// Statuses consumed front-to-back; the final entry repeats forever.
    queued_statuses: HashMap<String, VecDeque<ObservedStatus>>,
    steady_statuses: HashMap<String, ObservedStatus>,
    pod_uids: HashMap<String, Vec<String>>,
    /// UIDs installed for a deployment the next time it is applied,
    /// simulating the rollout swapping its pods.
    uids_after_apply: HashMap<String, Vec<String>>,
    fail_apply: HashSet<String>,
    fail_delete: HashSet<String>,
    fail_status: HashSet<String>,
}

/// Mock platform API for testing
#[derive(Default)]
pub struct MockDeploymentApi {
    state: Mutex<MockState>,
}

impl MockDeploymentApi {
    pub fn new() -> Self {
        Self::default()
    }

    /// A status where every count already equals `n`.
    pub fn ready_status(n: i32) -> ObservedStatus {
        ObservedStatus {
            replicas: Some(n),
            ready_replicas: Some(n),
            updated_replicas: Some(n),
        }
    }

    /// Set the steady-state status returned for a deployment.
    pub fn set_status(&self, deployment: &str, status: ObservedStatus) {
        let mut state = self.state.lock().unwrap();
        state.steady_statuses.insert(deployment.to_string(), status);
    }

    /// Enqueue a status transition; queued entries are served before the
    /// steady state, in order.
    pub fn push_status(&self, deployment: &str, status: ObservedStatus) {
        let mut state = self.state.lock().unwrap();
        state
            .queued_statuses
            .entry(deployment.to_string())
            .or_default()
            .push_back(status);
    }

    /// Set the live pod UIDs reported for a deployment.
    pub fn set_pod_uids(&self, deployment: &str, uids: Vec<&str>) {
        let mut state = self.state.lock().unwrap();
        state.pod_uids.insert(
            deployment.to_string(),
            uids.into_iter().map(str::to_string).collect(),
        );
    }

    /// Swap the reported pod UIDs when the deployment is next applied.
    pub fn set_pod_uids_after_apply(&self, deployment: &str, uids: Vec<&str>) {
        let mut state = self.state.lock().unwrap();
        state.uids_after_apply.insert(
            deployment.to_string(),
            uids.into_iter().map(str::to_string).collect(),
        );
    }

    /// Make `apply` fail for a deployment.
    pub fn fail_apply_for(&self, deployment: &str) {
        let mut state = self.state.lock().unwrap();
        state.fail_apply.insert(deployment.to_string());
    }

    /// Make `delete` fail for a deployment.
    pub fn fail_delete_for(&self, deployment: &str) {
        let mut state = self.state.lock().unwrap();
        state.fail_delete.insert(deployment.to_string());
    }

    /// Make `status` fail for a deployment.
    pub fn fail_status_for(&self, deployment: &str) {
        let mut state = self.state.lock().unwrap();
        state.fail_status.insert(deployment.to_string());
    }

    /// Ordered log of every call recorded so far.
    pub fn calls(&self) -> Vec<ApiCall> {
        self.state.lock().unwrap().calls.clone()
    }

    /// Index of the first call matching `predicate`, if any.
    pub fn first_index(&self, predicate: impl Fn(&ApiCall) -> bool) -> Option<usize> {
        self.state.lock().unwrap().calls.iter().position(predicate)
    }

    fn record(&self, call: ApiCall) {
        self.state.lock().unwrap().calls.push(call);
    }

    fn injected_failure(&self, operation: &str, deployment: &str) -> Report<OrchestrationError> {
        Report::new(OrchestrationError::Api {
            message: format!("injected {operation} failure for {deployment}"),
        })
    }
}

#[async_trait]
impl DeploymentApi for MockDeploymentApi {
    async fn apply(
        &self,
        spec: &DeploymentSpec,
        replace: bool,
    ) -> Result<String, Report<OrchestrationError>> {
        self.record(ApiCall::Apply {
            deployment: spec.dns_name.clone(),
            replace,
        });

        let mut state = self.state.lock().unwrap();
        if state.fail_apply.contains(&spec.dns_name) {
            drop(state);
            return Err(self.injected_failure("apply", &spec.dns_name));
        }
        if let Some(uids) = state.uids_after_apply.remove(&spec.dns_name) {
            state.pod_uids.insert(spec.dns_name.clone(), uids);
        }

        Ok(spec.cluster_address())
    }

    async fn delete(
        &self,
        dns_name: &str,
        namespace: &str,
    ) -> Result<(), Report<OrchestrationError>> {
        let _ = namespace;
        self.record(ApiCall::Delete {
            deployment: dns_name.to_string(),
        });

        if self.state.lock().unwrap().fail_delete.contains(dns_name) {
            return Err(self.injected_failure("delete", dns_name));
        }
        Ok(())
    }

    async fn scale(
        &self,
        dns_name: &str,
        namespace: &str,
        replicas: i32,
    ) -> Result<(), Report<OrchestrationError>> {
        let _ = namespace;
        self.record(ApiCall::Scale {
            deployment: dns_name.to_string(),
            replicas,
        });
        Ok(())
    }

    async fn status(
        &self,
        dns_name: &str,
        namespace: &str,
    ) -> Result<ObservedStatus, Report<OrchestrationError>> {
        let _ = namespace;
        self.record(ApiCall::Status {
            deployment: dns_name.to_string(),
        });

        let mut state = self.state.lock().unwrap();
        if state.fail_status.contains(dns_name) {
            drop(state);
            return Err(self.injected_failure("status", dns_name));
        }

        if let Some(queue) = state.queued_statuses.get_mut(dns_name) {
            match queue.len() {
                0 => {}
                1 => return Ok(queue[0]),
                _ => return Ok(queue.pop_front().unwrap()),
            }
        }

        Ok(state
            .steady_statuses
            .get(dns_name)
            .copied()
            .unwrap_or_default())
    }

    async fn pod_uids(
        &self,
        dns_name: &str,
        namespace: &str,
    ) -> Result<Vec<String>, Report<OrchestrationError>> {
        let _ = namespace;
        self.record(ApiCall::PodUids {
            deployment: dns_name.to_string(),
        });

        let state = self.state.lock().unwrap();
        Ok(state.pod_uids.get(dns_name).cloned().unwrap_or_default())
    }
}
