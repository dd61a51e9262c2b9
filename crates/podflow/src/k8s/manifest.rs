//! Deployment manifest construction.
//!
//! Translates a [`DeploymentSpec`] into the apps/v1 `Deployment` object the
//! cluster consumes: labels, the role-shaped container command line, ports,
//! environment and resource requests.

use std::collections::BTreeMap;

use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::apps::v1::DeploymentSpec as K8sDeploymentSpec;
use k8s_openapi::api::core::v1::Container;
use k8s_openapi::api::core::v1::ContainerPort;
use k8s_openapi::api::core::v1::EnvVar;
use k8s_openapi::api::core::v1::PodSpec as K8sPodSpec;
use k8s_openapi::api::core::v1::PodTemplateSpec;
use k8s_openapi::api::core::v1::ResourceRequirements;
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::LabelSelector;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

use crate::topology::DeploymentRole;
use crate::topology::DeploymentSpec;

pub(crate) fn labels(spec: &DeploymentSpec) -> BTreeMap<String, String> {
    BTreeMap::from([
        ("app".to_string(), spec.dns_name.clone()),
        ("role".to_string(), spec.role.as_str().to_string()),
    ])
}

/// Runtime command-line arguments for the main container, shaped by role.
pub(crate) fn container_args(spec: &DeploymentSpec) -> Vec<String> {
    let mut args = match spec.role {
        DeploymentRole::Gateway => vec!["gateway".to_string()],
        DeploymentRole::Head => vec![
            "executor".to_string(),
            "--runtime-cls".to_string(),
            "HeadRuntime".to_string(),
        ],
        DeploymentRole::Worker => vec![
            "executor".to_string(),
            "--uses".to_string(),
            spec.executor.clone(),
            "--runtime-cls".to_string(),
            "WorkerRuntime".to_string(),
        ],
    };

    args.push("--port-in".to_string());
    args.push(spec.port_in.to_string());

    if let Some(shard_index) = spec.shard_index {
        args.push("--shard-id".to_string());
        args.push(shard_index.to_string());
    }
    if let Some(connection_list) = &spec.connection_list {
        args.push("--connection-list".to_string());
        args.push(serde_json::to_string(connection_list).unwrap_or_default());
    }
    if let Some(address) = &spec.uses_before_address {
        args.push("--uses-before-address".to_string());
        args.push(address.clone());
    }
    if let Some(address) = &spec.uses_after_address {
        args.push("--uses-after-address".to_string());
        args.push(address.clone());
    }
    if let Some(uses_with) = &spec.uses_with {
        args.push("--uses-with".to_string());
        args.push(serde_json::to_string(uses_with).unwrap_or_default());
    }

    args
}

/// Build the apps/v1 Deployment object for one derived spec.
pub(crate) fn build_deployment(spec: &DeploymentSpec) -> Deployment {
    let labels = labels(spec);

    let env: Vec<EnvVar> = spec
        .env
        .iter()
        .map(|(name, value)| EnvVar {
            name: name.clone(),
            value: Some(value.clone()),
            value_from: None,
        })
        .collect();

    let resources = (!spec.resources.is_empty()).then(|| ResourceRequirements {
        requests: Some(
            spec.resources
                .iter()
                .map(|(name, quantity)| (name.clone(), Quantity(quantity.clone())))
                .collect(),
        ),
        ..Default::default()
    });

    let container = Container {
        name: spec.role.as_str().to_string(),
        image: Some(spec.executor.clone()),
        args: Some(container_args(spec)),
        env: (!env.is_empty()).then_some(env),
        ports: Some(vec![ContainerPort {
            container_port: i32::from(spec.port_in),
            name: Some("port-in".to_string()),
            ..Default::default()
        }]),
        resources,
        ..Default::default()
    };

    Deployment {
        metadata: ObjectMeta {
            name: Some(spec.dns_name.clone()),
            namespace: Some(spec.namespace.clone()),
            labels: Some(labels.clone()),
            ..Default::default()
        },
        spec: Some(K8sDeploymentSpec {
            replicas: Some(spec.replicas),
            selector: LabelSelector {
                match_labels: Some(labels.clone()),
                ..Default::default()
            },
            template: PodTemplateSpec {
                metadata: Some(ObjectMeta {
                    labels: Some(labels),
                    ..Default::default()
                }),
                spec: Some(K8sPodSpec {
                    containers: vec![container],
                    ..Default::default()
                }),
            },
            ..Default::default()
        }),
        status: None,
    }
}
