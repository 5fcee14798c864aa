pub mod controller;
pub mod crd;
pub mod identity;
pub mod mapper;
pub mod operator;

use crate::{
    controller::{Backend, DeploymentController},
    crd::EdgeDeployment,
    identity::StaticIdentityProvider,
    mapper::{MapperConfig, Mappers},
    operator::DeploymentOperator,
};
use anyhow::Context;
use edgeplane_operator_common::labels::sanitize_dns_domain;
use edgeplane_service_common::defaults;
use kube::Api;
use serde::Deserialize;
use std::time::Duration;

pub const LABEL_DEVICE: &str = "edgeplane.io/device";
pub const LABEL_HUB: &str = "edgeplane.io/hub";
pub const LABEL_MODULE: &str = "edgeplane.io/module";
/// Module IDs like `$edgeHub` are not valid label values, so we keep the original one here.
pub const ANNOTATION_ORIGINAL_MODULE_ID: &str = "edgeplane.io/original-module-id";

#[derive(Clone, Debug, Deserialize)]
pub struct Config {
    /// The namespace the workloads get created in.
    #[serde(default = "defaults::namespace")]
    pub namespace: String,

    pub device_id: String,

    pub iot_hub_hostname: String,

    /// Name of the `EdgeDeployment` resource to reconcile.
    #[serde(default)]
    pub resource_name: Option<String>,

    #[serde(default = "defaults::watch_retry_delay", with = "humantime_serde")]
    pub watch_retry_delay: Duration,

    pub mapper: MapperConfig,
}

impl Config {
    pub fn resource_name(&self) -> String {
        self.resource_name.clone().unwrap_or_else(|| {
            sanitize_dns_domain(&format!("{}-{}", self.iot_hub_hostname, self.device_id))
        })
    }
}

pub async fn run(config: Config) -> anyhow::Result<()> {
    log::debug!("Config: {:#?}", config);

    let client = edgeplane_service_common::kube::client()
        .await
        .context("Failed to create Kubernetes client")?;

    // k8s resources

    let backend = Backend::namespaced(client.clone(), &config.namespace);
    let deployments = Api::<EdgeDeployment>::namespaced(client, &config.namespace);

    // controller

    let identities = StaticIdentityProvider::new(
        &config.iot_hub_hostname,
        &config.device_id,
        config.mapper.gateway_hostname.clone(),
    );
    let controller = DeploymentController::new(
        &config.device_id,
        &config.iot_hub_hostname,
        identities,
        backend,
        Mappers::new(config.mapper.clone()),
    );

    // operator

    let name = config.resource_name();
    log::info!("Watching EdgeDeployment {}/{name}", config.namespace);

    let operator = DeploymentOperator::new(name, deployments, controller, config.watch_retry_delay);
    let handle = operator.start();

    // run

    edgeplane_service_common::app::interrupted().await?;
    handle.shutdown().await;

    // exiting

    Ok(())
}
