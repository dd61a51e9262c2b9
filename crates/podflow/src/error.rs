use thiserror::Error;

/// Errors that can occur while orchestrating pod deployments.
#[derive(Debug, Error)]
pub enum OrchestrationError {
    /// The caller-supplied specification is malformed or the requested
    /// operation is illegal for the pod's role. Never retried.
    #[error("Invalid pod specification: {message}")]
    InvalidSpec { message: String },
    /// A platform API call failed. Retry policy, if any, belongs to the
    /// API client, not this controller.
    #[error("Kubernetes API call failed: {message}")]
    Api { message: String },
    /// A wait condition never became true before the configured deadline.
    /// The deployment may still converge after the caller gives up.
    #[error("Deployment {deployment} failed to {operation} within the configured deadline")]
    DeadlineExceeded {
        operation: &'static str,
        deployment: String,
    },
    /// A fresh startup failed partway; every already-created deployment
    /// has been torn down before this surfaces.
    #[error("Failed to start pod {pod}")]
    StartupFailed { pod: String },
}
