//! Kubernetes client bootstrap and the live [`DeploymentApi`] implementation.

use std::path::PathBuf;

use async_trait::async_trait;
use error_stack::Report;
use error_stack::ResultExt;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::Pod;
use kube::api::DeleteParams;
use kube::api::ListParams;
use kube::api::Patch;
use kube::api::PatchParams;
use kube::config::KubeConfigOptions;
use kube::config::Kubeconfig;
use kube::Api;
use kube::Client;
use kube::Config;

use crate::error::OrchestrationError;
use crate::k8s::manifest;
use crate::k8s::traits::DeploymentApi;
use crate::k8s::traits::ObservedStatus;
use crate::topology::DeploymentSpec;

const FIELD_MANAGER: &str = "podflow";

/// Create a Kubernetes client, either from an explicit kubeconfig file or
/// the default chain (in-cluster config or `~/.kube/config`).
///
/// # Errors
///
/// - [`OrchestrationError::Api`] if the client cannot be constructed
pub async fn init_kube_client(
    kubeconfig: Option<PathBuf>,
) -> Result<Client, Report<OrchestrationError>> {
    let client = match kubeconfig {
        Some(kubeconfig_path) => {
            let kubeconfig =
                Kubeconfig::read_from(&kubeconfig_path).change_context(OrchestrationError::Api {
                    message: format!(
                        "Failed to read kubeconfig file: {}",
                        kubeconfig_path.display()
                    ),
                })?;

            let config = Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default())
                .await
                .change_context(OrchestrationError::Api {
                    message: format!(
                        "Failed to create config from kubeconfig: {}",
                        kubeconfig_path.display()
                    ),
                })?;

            Client::try_from(config).change_context(OrchestrationError::Api {
                message: "Failed to create Kubernetes client from custom kubeconfig".to_string(),
            })?
        }
        None => Client::try_default()
            .await
            .change_context(OrchestrationError::Api {
                message: "Failed to create Kubernetes client".to_string(),
            })?,
    };
    Ok(client)
}

/// [`DeploymentApi`] backed by the cluster's apps/v1 and core/v1 APIs.
#[derive(Clone)]
pub struct KubeDeploymentApi {
    client: Client,
}

impl KubeDeploymentApi {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn deployments(&self, namespace: &str) -> Api<Deployment> {
        Api::namespaced(self.client.clone(), namespace)
    }

    fn pods(&self, namespace: &str) -> Api<Pod> {
        Api::namespaced(self.client.clone(), namespace)
    }
}

#[async_trait]
impl DeploymentApi for KubeDeploymentApi {
    async fn apply(
        &self,
        spec: &DeploymentSpec,
        replace: bool,
    ) -> Result<String, Report<OrchestrationError>> {
        let deployment = manifest::build_deployment(spec);

        // Server-side apply keeps creation idempotent; a forced apply takes
        // ownership of every field, which is what a full replace needs.
        let mut params = PatchParams::apply(FIELD_MANAGER);
        if replace {
            params = params.force();
        }

        self.deployments(&spec.namespace)
            .patch(&spec.dns_name, &params, &Patch::Apply(&deployment))
            .await
            .change_context(OrchestrationError::Api {
                message: format!("Failed to apply deployment {}", spec.dns_name),
            })?;

        Ok(spec.cluster_address())
    }

    async fn delete(
        &self,
        dns_name: &str,
        namespace: &str,
    ) -> Result<(), Report<OrchestrationError>> {
        self.deployments(namespace)
            .delete(dns_name, &DeleteParams::default())
            .await
            .change_context(OrchestrationError::Api {
                message: format!("Failed to delete deployment {dns_name}"),
            })?;
        Ok(())
    }

    async fn scale(
        &self,
        dns_name: &str,
        namespace: &str,
        replicas: i32,
    ) -> Result<(), Report<OrchestrationError>> {
        let patch = serde_json::json!({ "spec": { "replicas": replicas } });
        self.deployments(namespace)
            .patch_scale(dns_name, &PatchParams::default(), &Patch::Merge(&patch))
            .await
            .change_context(OrchestrationError::Api {
                message: format!("Failed to scale deployment {dns_name} to {replicas}"),
            })?;
        Ok(())
    }

    async fn status(
        &self,
        dns_name: &str,
        namespace: &str,
    ) -> Result<ObservedStatus, Report<OrchestrationError>> {
        let deployment = self.deployments(namespace).get(dns_name).await.change_context(
            OrchestrationError::Api {
                message: format!("Failed to read deployment {dns_name}"),
            },
        )?;

        let status = deployment.status.unwrap_or_default();
        Ok(ObservedStatus {
            replicas: status.replicas,
            ready_replicas: status.ready_replicas,
            updated_replicas: status.updated_replicas,
        })
    }

    async fn pod_uids(
        &self,
        dns_name: &str,
        namespace: &str,
    ) -> Result<Vec<String>, Report<OrchestrationError>> {
        let params = ListParams::default().labels(&format!("app={dns_name}"));
        let pods = self
            .pods(namespace)
            .list(&params)
            .await
            .change_context(OrchestrationError::Api {
                message: format!("Failed to list pods of deployment {dns_name}"),
            })?;

        Ok(pods
            .items
            .into_iter()
            .filter_map(|pod| pod.metadata.uid)
            .collect())
    }
}
