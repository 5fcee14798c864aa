//! Map modules to the Kubernetes resources running them.

mod deployment;
mod pvc;
mod secret;
mod service;
mod service_account;

pub use deployment::*;
pub use pvc::*;
pub use secret::*;
pub use service::*;
pub use service_account::*;

use crate::ANNOTATION_ORIGINAL_MODULE_ID;
use edgeplane_operator_common::labels::sanitize_dns_value;
use k8s_openapi::{
    api::{
        apps::v1::Deployment,
        core::v1::{PersistentVolumeClaim, Service, ServiceAccount},
    },
    apimachinery::pkg::apis::meta::v1::ObjectMeta,
};
use edgeplane_service_api::{KubernetesModule, ModuleIdentity};
use serde::Deserialize;
use std::collections::BTreeMap;
use thiserror::Error;

pub const EDGE_AGENT_MODULE: &str = "$edgeAgent";
pub use edgeplane_service_api::EDGE_HUB_MODULE;

#[derive(Debug, Error)]
pub enum MapperError {
    #[error("Failed to serialize resource: {0}")]
    Serialization(#[from] serde_json::Error),
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Deserialize)]
pub enum ServiceType {
    #[default]
    ClusterIP,
    NodePort,
    LoadBalancer,
}

impl ServiceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ClusterIP => "ClusterIP",
            Self::NodePort => "NodePort",
            Self::LoadBalancer => "LoadBalancer",
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
pub struct ProxyConfig {
    pub image: String,
    /// Where the proxy expects its configuration.
    pub config_path: String,
    /// The config map holding the proxy configuration.
    pub config_map_name: String,
}

#[derive(Clone, Debug, Deserialize)]
pub struct MapperConfig {
    pub workload_uri: String,
    pub management_uri: String,
    #[serde(default)]
    pub gateway_hostname: Option<String>,
    #[serde(default = "default_edge_api_version")]
    pub edge_api_version: String,
    #[serde(default)]
    pub default_service_type: ServiceType,
    #[serde(default)]
    pub persistent_volume_name: Option<String>,
    #[serde(default)]
    pub storage_class_name: Option<String>,
    #[serde(default = "default_pvc_size_mb")]
    pub persistent_volume_claim_default_size_mb: u32,
    #[serde(default)]
    pub proxy: Option<ProxyConfig>,
}

impl MapperConfig {
    /// Persistent volume claims are only used when either a volume or a storage class is set.
    pub fn use_pvc(&self) -> bool {
        self.persistent_volume_name.is_some() || self.storage_class_name.is_some()
    }
}

fn default_edge_api_version() -> String {
    "2019-01-30".into()
}

const fn default_pvc_size_mb() -> u32 {
    100
}

pub trait ServiceMapper: Send + Sync {
    /// Create the service for a module, if it exposes any ports.
    fn create_service(
        &self,
        identity: &ModuleIdentity,
        module: &KubernetesModule,
        labels: &BTreeMap<String, String>,
    ) -> Result<Option<Service>, MapperError>;

    /// Prepare the desired service for replacing the existing one.
    fn update_service(&self, to: Service, from: &Service) -> Service;
}

pub trait DeploymentMapper: Send + Sync {
    fn create_deployment(
        &self,
        identity: &ModuleIdentity,
        module: &KubernetesModule,
        labels: &BTreeMap<String, String>,
    ) -> Result<Deployment, MapperError>;

    fn update_deployment(&self, to: Deployment, from: &Deployment) -> Deployment;
}

pub trait PvcMapper: Send + Sync {
    /// If claims are being used at all.
    fn enabled(&self) -> bool;

    /// Create the claims for the module's volumes.
    fn create_pvcs(
        &self,
        module: &KubernetesModule,
        labels: &BTreeMap<String, String>,
    ) -> Vec<PersistentVolumeClaim>;

    fn update_pvc(&self, to: PersistentVolumeClaim, from: &PersistentVolumeClaim)
        -> PersistentVolumeClaim;
}

pub trait ServiceAccountMapper: Send + Sync {
    fn create_service_account(
        &self,
        identity: &ModuleIdentity,
        labels: &BTreeMap<String, String>,
    ) -> ServiceAccount;

    fn update_service_account(&self, to: ServiceAccount, from: &ServiceAccount) -> ServiceAccount;
}

/// The set of mappers used by the controller.
pub struct Mappers {
    pub services: Box<dyn ServiceMapper>,
    pub deployments: Box<dyn DeploymentMapper>,
    pub pvcs: Box<dyn PvcMapper>,
    pub service_accounts: Box<dyn ServiceAccountMapper>,
}

impl Mappers {
    pub fn new(config: MapperConfig) -> Self {
        Self {
            services: Box::new(KubernetesServiceMapper::new(config.default_service_type)),
            pvcs: Box::new(KubernetesPvcMapper::new(&config)),
            service_accounts: Box::new(KubernetesServiceAccountMapper),
            deployments: Box::new(KubernetesDeploymentMapper::new(config)),
        }
    }
}

/// The name of all resources belonging to a module.
pub fn module_resource_name(module_id: &str) -> String {
    sanitize_dns_value(module_id)
}

/// Metadata common to all resources of a module.
pub(crate) fn module_metadata(
    identity: &ModuleIdentity,
    labels: &BTreeMap<String, String>,
) -> ObjectMeta {
    ObjectMeta {
        name: Some(module_resource_name(&identity.module_id)),
        labels: Some(labels.clone()),
        annotations: Some(BTreeMap::from([(
            ANNOTATION_ORIGINAL_MODULE_ID.to_string(),
            identity.module_id.clone(),
        )])),
        ..Default::default()
    }
}

#[cfg(test)]
pub(crate) mod test {
    use super::*;
    use edgeplane_service_api::Credentials;
    use maplit::btreemap;

    pub fn identity(module_id: &str) -> ModuleIdentity {
        ModuleIdentity {
            iot_hub_hostname: "hub.example.com".into(),
            gateway_hostname: Some("gateway".into()),
            device_id: "device1".into(),
            module_id: module_id.into(),
            credentials: Credentials::IdentityProvider {
                auth_scheme: "sasToken".into(),
                generation_id: None,
            },
        }
    }

    pub fn labels(module: &str) -> BTreeMap<String, String> {
        btreemap! {
            crate::LABEL_MODULE.to_string() => module.to_string(),
            crate::LABEL_DEVICE.to_string() => "device1".to_string(),
            crate::LABEL_HUB.to_string() => "hub.example.com".to_string(),
        }
    }

    pub fn config() -> MapperConfig {
        MapperConfig {
            workload_uri: "unix:///var/run/iotedge/workload.sock".into(),
            management_uri: "unix:///var/run/iotedge/mgmt.sock".into(),
            gateway_hostname: Some("gateway".into()),
            edge_api_version: default_edge_api_version(),
            default_service_type: ServiceType::ClusterIP,
            persistent_volume_name: None,
            storage_class_name: None,
            persistent_volume_claim_default_size_mb: default_pvc_size_mb(),
            proxy: None,
        }
    }

    #[test]
    fn test_module_resource_name() {
        assert_eq!(module_resource_name("$edgeHub"), "edgehub");
        assert_eq!(module_resource_name("Temp_Sensor"), "tempsensor");
    }
}
