//! Partitioning of one pod specification into per-deployment specs.
//!
//! A non-gateway pod expands into one head deployment fronting `shards`
//! worker deployments; the gateway expands into a single deployment. Each
//! derived spec maps 1:1 to one Kubernetes Deployment resource.

use std::collections::BTreeMap;

use error_stack::Report;
use serde::Deserialize;
use serde::Serialize;

use crate::error::OrchestrationError;
use crate::spec::PodSpec;

/// Well-known port every head and worker listens on for traffic.
pub const PORT_IN: u16 = 8081;
/// Well-known port of the pre-processing executor, local to the head.
pub const PORT_USES_BEFORE: u16 = 8082;
/// Well-known port of the post-processing executor, local to the head.
pub const PORT_USES_AFTER: u16 = 8083;

/// Role a single deployment plays inside a pod.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeploymentRole {
    /// Flow entry point; never sharded, never fronted by a head.
    Gateway,
    /// Singleton fan-out resource placed in front of the worker shards.
    Head,
    /// One shard of the executor.
    Worker,
}

impl DeploymentRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeploymentRole::Gateway => "gateway",
            DeploymentRole::Head => "head",
            DeploymentRole::Worker => "worker",
        }
    }
}

/// Derived configuration of one managed Deployment resource.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeploymentSpec {
    pub name: String,
    /// DNS-safe resource name derived from `name`.
    pub dns_name: String,
    pub role: DeploymentRole,
    /// Absent for head and gateway deployments.
    pub shard_index: Option<u32>,
    pub replicas: i32,
    pub namespace: String,
    pub port_in: u16,
    pub executor: String,
    pub uses_before: Option<String>,
    pub uses_after: Option<String>,
    /// Loopback address of the pre-processing executor; head only.
    pub uses_before_address: Option<String>,
    /// Loopback address of the post-processing executor; head only.
    pub uses_after_address: Option<String>,
    /// Static shard-index -> worker-address table; set on the head only when
    /// the managed connection pool is disabled.
    pub connection_list: Option<BTreeMap<String, String>>,
    pub uses_with: Option<BTreeMap<String, String>>,
    pub env: BTreeMap<String, String>,
    pub resources: BTreeMap<String, String>,
}

impl DeploymentSpec {
    /// Cluster-internal address of the Deployment's service.
    pub fn cluster_address(&self) -> String {
        format!("{}.{}.svc", self.dns_name, self.namespace)
    }
}

/// Node-address record consumed by the routing-table builder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopologyNode {
    pub name: String,
    pub host: String,
    pub port_in: u16,
}

/// A pod specification expanded into per-deployment specs.
#[derive(Debug, Clone)]
pub struct PodTopology {
    pub head: Option<DeploymentSpec>,
    pub workers: Vec<DeploymentSpec>,
}

/// Convert a pod name into a name usable as a Kubernetes resource name.
///
/// Lowercases, maps everything outside `[a-z0-9-]` to `-`, clamps to the
/// 63-character label limit and trims stray dashes.
pub fn to_dns_name(name: &str) -> String {
    let mut dns: String = name
        .to_lowercase()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '-' })
        .collect();
    dns.truncate(63);
    dns.trim_matches('-').to_string()
}

fn worker_name(pod_name: &str, shard_index: u32, shards: u32) -> String {
    if shards > 1 {
        format!("{pod_name}-{shard_index}")
    } else {
        pod_name.to_string()
    }
}

/// Expand a pod specification into its deployment topology.
///
/// - The gateway never gets a head and always yields exactly one deployment,
///   regardless of the configured shard count.
/// - Any other pod gets a head with its replica count forced to 1, plus one
///   worker deployment per shard with indices `0..shards`.
///
/// # Errors
///
/// - [`OrchestrationError::InvalidSpec`] if the spec fails validation
pub fn partition(spec: &PodSpec) -> Result<PodTopology, Report<OrchestrationError>> {
    spec.validate()?;

    if spec.is_gateway() {
        return Ok(PodTopology {
            head: None,
            workers: vec![gateway_spec(spec)],
        });
    }

    Ok(PodTopology {
        head: Some(head_spec(spec)),
        workers: (0..spec.shards).map(|i| worker_spec(spec, i)).collect(),
    })
}

fn gateway_spec(spec: &PodSpec) -> DeploymentSpec {
    DeploymentSpec {
        name: spec.name.clone(),
        dns_name: to_dns_name(&spec.name),
        role: DeploymentRole::Gateway,
        shard_index: None,
        replicas: 1,
        namespace: spec.namespace.clone(),
        port_in: PORT_IN,
        executor: spec.executor.clone(),
        uses_before: None,
        uses_after: None,
        uses_before_address: None,
        uses_after_address: None,
        connection_list: None,
        uses_with: None,
        env: spec.env.clone(),
        resources: spec.resources.clone(),
    }
}

fn head_spec(spec: &PodSpec) -> DeploymentSpec {
    // Without a managed connection pool the head has to know every worker
    // address up front.
    let connection_list = (!spec.connection_pool_enabled).then(|| {
        (0..spec.shards)
            .map(|i| {
                let dns = to_dns_name(&worker_name(&spec.name, i, spec.shards));
                (
                    i.to_string(),
                    format!("{dns}.{}.svc:{PORT_IN}", spec.namespace),
                )
            })
            .collect()
    });

    DeploymentSpec {
        name: format!("{}-head", spec.name),
        dns_name: to_dns_name(&format!("{}-head", spec.name)),
        role: DeploymentRole::Head,
        shard_index: None,
        replicas: 1,
        namespace: spec.namespace.clone(),
        port_in: PORT_IN,
        executor: spec.executor.clone(),
        uses_before: spec.uses_before.clone(),
        uses_after: spec.uses_after.clone(),
        uses_before_address: spec
            .uses_before
            .as_ref()
            .map(|_| format!("127.0.0.1:{PORT_USES_BEFORE}")),
        uses_after_address: spec
            .uses_after
            .as_ref()
            .map(|_| format!("127.0.0.1:{PORT_USES_AFTER}")),
        connection_list,
        uses_with: spec.uses_with.clone(),
        env: spec.env.clone(),
        resources: spec.resources.clone(),
    }
}

fn worker_spec(spec: &PodSpec, shard_index: u32) -> DeploymentSpec {
    let name = worker_name(&spec.name, shard_index, spec.shards);
    DeploymentSpec {
        dns_name: to_dns_name(&name),
        name,
        role: DeploymentRole::Worker,
        shard_index: Some(shard_index),
        replicas: spec.replicas,
        namespace: spec.namespace.clone(),
        port_in: PORT_IN,
        executor: spec.executor.clone(),
        // Pre/post-processing only runs at the head.
        uses_before: None,
        uses_after: None,
        uses_before_address: None,
        uses_after_address: None,
        connection_list: None,
        uses_with: spec.uses_with.clone(),
        env: spec.env.clone(),
        resources: spec.resources.clone(),
    }
}
