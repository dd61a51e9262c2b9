//! Kubernetes integration module.
//!
//! Everything that talks to the cluster lives here:
//! - [`DeploymentApi`]: the platform API seam handles operate through
//! - [`KubeDeploymentApi`]: the live apps/v1-backed implementation
//! - [`DeploymentHandle`]: lifecycle of one managed Deployment
//! - [`K8sPodController`]: fan-out of pod operations over the handles
//!
//! Tests exercise the seam through a recording double in `mock`.

pub mod client;
pub mod controller;
pub mod deployment;
pub(crate) mod manifest;
#[cfg(test)]
pub(crate) mod mock;
pub mod traits;

pub use client::init_kube_client;
pub use client::KubeDeploymentApi;
pub use controller::K8sPodController;
pub use deployment::DeploymentHandle;
pub use traits::DeploymentApi;
pub use traits::ObservedStatus;
