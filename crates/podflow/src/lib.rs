pub mod error;
pub mod k8s;
pub mod logging;
pub mod pod;
mod poll;
pub mod spec;
pub mod topology;

// Re-export the main types
pub use error::OrchestrationError;
pub use k8s::K8sPodController;
pub use pod::Pod;
pub use spec::PodSpec;
pub use spec::RollingUpdateConfig;
pub use topology::DeploymentRole;
pub use topology::TopologyNode;
