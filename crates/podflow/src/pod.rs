//! Backend-independent pod capability surface.

use async_trait::async_trait;
use error_stack::Report;

use crate::error::OrchestrationError;
use crate::spec::RollingUpdateConfig;
use crate::topology::TopologyNode;

/// Lifecycle operations every pod backend implements.
///
/// A pod is the full deployment footprint of one executor: an optional head
/// plus its sharded workers. Backends own the underlying resources; callers
/// must invoke [`Pod::close`] on every exit path once [`Pod::start`] has been
/// issued.
#[async_trait]
pub trait Pod {
    /// Create every underlying deployment. When `blocking`, wait for the
    /// head to become ready first, then every worker; on any failure all
    /// already-created deployments are torn down before the error surfaces.
    async fn start(&mut self, blocking: bool) -> Result<(), Report<OrchestrationError>>;

    /// Replace every worker replica in place with the merged configuration,
    /// completing only once no pre-update replica is left alive.
    ///
    /// # Errors
    ///
    /// - [`OrchestrationError::InvalidSpec`] when invoked on the gateway
    async fn rolling_update(
        &mut self,
        overrides: RollingUpdateConfig,
    ) -> Result<(), Report<OrchestrationError>>;

    /// Change the replica count of every worker deployment. The head is
    /// never affected.
    async fn scale(&mut self, replicas: i32) -> Result<(), Report<OrchestrationError>>;

    /// Tear down every underlying deployment. Deletion failures are logged,
    /// never raised, so shutdown always completes.
    async fn close(&mut self);

    /// Node-address records in routing order: head first (if present), then
    /// workers in shard order.
    fn topology(&self) -> Vec<TopologyNode>;
}
