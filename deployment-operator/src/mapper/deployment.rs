use super::{
    module_metadata, module_resource_name, parse_port, DeploymentMapper, MapperConfig,
    MapperError, EDGE_AGENT_MODULE,
};
use crate::mapper::secret::ImagePullSecret;
use edgeplane_operator_common::labels::{sanitize_dns_value, with_creation_string};
use edgeplane_service_api::{
    Credentials, ImagePullPolicy, KubernetesModule, ModuleIdentity, ModuleStatus,
};
use indexmap::IndexMap;
use k8s_openapi::{
    api::{
        apps::v1::{Deployment, DeploymentSpec},
        core::v1::{
            ConfigMapVolumeSource, Container, ContainerPort, EmptyDirVolumeSource, EnvVar,
            HostPathVolumeSource, LocalObjectReference, PersistentVolumeClaimVolumeSource,
            PodSpec, PodTemplateSpec, SecurityContext, Volume, VolumeMount,
        },
    },
    apimachinery::pkg::apis::meta::v1::{LabelSelector, ObjectMeta},
};
use std::collections::BTreeMap;

pub const MOUNT_TYPE_VOLUME: &str = "volume";
pub const MOUNT_TYPE_BIND: &str = "bind";

const PROXY_CONTAINER_NAME: &str = "proxy";
const PROXY_CONFIG_VOLUME_NAME: &str = "proxy-config";

pub struct KubernetesDeploymentMapper {
    config: MapperConfig,
}

impl KubernetesDeploymentMapper {
    pub fn new(config: MapperConfig) -> Self {
        Self { config }
    }

    /// The environment of a module's container, later entries replace earlier ones.
    fn env(&self, identity: &ModuleIdentity, module: &KubernetesModule) -> Vec<EnvVar> {
        let mut env = IndexMap::<String, String>::new();

        env.insert("IOTEDGE_IOTHUBHOSTNAME".into(), identity.iot_hub_hostname.clone());
        env.insert("IOTEDGE_DEVICEID".into(), identity.device_id.clone());
        env.insert("IOTEDGE_MODULEID".into(), identity.module_id.clone());

        match &identity.credentials {
            Credentials::IdentityProvider {
                auth_scheme,
                generation_id,
            } => {
                env.insert("IOTEDGE_AUTHSCHEME".into(), auth_scheme.clone());
                if let Some(generation_id) = generation_id {
                    env.insert("IOTEDGE_MODULEGENERATIONID".into(), generation_id.clone());
                }
                env.insert("IOTEDGE_WORKLOADURI".into(), self.config.workload_uri.clone());
            }
            Credentials::ConnectionString(connection_string) => {
                env.insert("EdgeHubConnectionString".into(), connection_string.clone());
            }
        }

        if let Some(gateway_hostname) = &identity.gateway_hostname {
            env.insert("IOTEDGE_GATEWAYHOSTNAME".into(), gateway_hostname.clone());
        }
        env.insert("IOTEDGE_APIVERSION".into(), self.config.edge_api_version.clone());

        if identity.module_id == EDGE_AGENT_MODULE {
            env.insert("Mode".into(), "kubernetes".into());
            env.insert(
                "IOTEDGE_MANAGEMENTURI".into(),
                self.config.management_uri.clone(),
            );
        }

        for (name, value) in &module.env {
            env.insert(name.clone(), value.value.clone());
        }

        for entry in &module.config.create_options.env {
            let (name, value) = entry.split_once('=').unwrap_or((entry.as_str(), ""));
            if name.is_empty() {
                log::warn!("Module {}: ignoring invalid env entry", module.name);
                continue;
            }
            env.insert(name.into(), value.into());
        }

        env.into_iter()
            .map(|(name, value)| EnvVar {
                name,
                value: Some(value),
                ..Default::default()
            })
            .collect()
    }

    fn volume_source(&self, kind: &str, source: &str, read_only: bool) -> Option<Volume> {
        let name = sanitize_dns_value(source);
        if name.is_empty() {
            return None;
        }

        let mut volume = Volume {
            name: name.clone(),
            ..Default::default()
        };

        match kind {
            MOUNT_TYPE_BIND => {
                volume.host_path = Some(HostPathVolumeSource {
                    path: source.into(),
                    ..Default::default()
                });
            }
            MOUNT_TYPE_VOLUME if self.config.use_pvc() => {
                volume.persistent_volume_claim = Some(PersistentVolumeClaimVolumeSource {
                    claim_name: name,
                    read_only: Some(read_only),
                });
            }
            MOUNT_TYPE_VOLUME => {
                volume.empty_dir = Some(EmptyDirVolumeSource::default());
            }
            _ => return None,
        }

        Some(volume)
    }

    /// Volumes and mounts, from binds (`source:target[:ro]`) and mounts.
    fn volumes(&self, module: &KubernetesModule) -> (Vec<Volume>, Vec<VolumeMount>) {
        let mut volumes = BTreeMap::new();
        let mut mounts = vec![];

        let host_config = match &module.config.create_options.host_config {
            Some(host_config) => host_config,
            None => return (vec![], vec![]),
        };

        let binds = host_config.binds.iter().filter_map(|bind| {
            let mut parts = bind.split(':');
            match (parts.next(), parts.next(), parts.next()) {
                (Some(source), Some(target), options) => Some((
                    MOUNT_TYPE_BIND,
                    source,
                    target,
                    options.map_or(false, |options| options.split(',').any(|o| o == "ro")),
                )),
                _ => {
                    log::warn!("Module {}: invalid bind: {bind}", module.name);
                    None
                }
            }
        });

        let other_mounts = host_config.mounts.iter().map(|mount| {
            (
                mount.r#type.as_str(),
                mount.source.as_str(),
                mount.target.as_str(),
                mount.read_only,
            )
        });

        for (kind, source, target, read_only) in binds.chain(other_mounts) {
            match self.volume_source(kind, source, read_only) {
                Some(volume) => {
                    mounts.push(VolumeMount {
                        name: volume.name.clone(),
                        mount_path: target.into(),
                        read_only: Some(read_only),
                        ..Default::default()
                    });
                    volumes.insert(volume.name.clone(), volume);
                }
                None => log::warn!(
                    "Module {}: unsupported mount: {kind} {source} -> {target}",
                    module.name
                ),
            }
        }

        (volumes.into_values().collect(), mounts)
    }

    fn proxy_container(&self) -> Option<(Container, Volume)> {
        let proxy = self.config.proxy.as_ref()?;

        let container = Container {
            name: PROXY_CONTAINER_NAME.into(),
            image: Some(proxy.image.clone()),
            image_pull_policy: Some("IfNotPresent".into()),
            volume_mounts: Some(vec![VolumeMount {
                name: PROXY_CONFIG_VOLUME_NAME.into(),
                mount_path: proxy.config_path.clone(),
                read_only: Some(true),
                ..Default::default()
            }]),
            ..Default::default()
        };

        let volume = Volume {
            name: PROXY_CONFIG_VOLUME_NAME.into(),
            config_map: Some(ConfigMapVolumeSource {
                name: Some(proxy.config_map_name.clone()),
                ..Default::default()
            }),
            ..Default::default()
        };

        Some((container, volume))
    }
}

impl DeploymentMapper for KubernetesDeploymentMapper {
    fn create_deployment(
        &self,
        identity: &ModuleIdentity,
        module: &KubernetesModule,
        labels: &BTreeMap<String, String>,
    ) -> Result<Deployment, MapperError> {
        let name = module_resource_name(&identity.module_id);
        let options = &module.config.create_options;

        let (mut volumes, volume_mounts) = self.volumes(module);

        let ports = options
            .exposed_ports
            .keys()
            .filter_map(|spec| parse_port(spec))
            .map(|(port, protocol)| ContainerPort {
                container_port: port,
                protocol: Some(protocol.into()),
                ..Default::default()
            })
            .collect::<Vec<_>>();

        let privileged = options
            .host_config
            .as_ref()
            .map_or(false, |host_config| host_config.privileged);

        let mut containers = vec![Container {
            name: name.clone(),
            image: Some(module.config.image.clone()),
            image_pull_policy: Some(
                match module.image_pull_policy {
                    ImagePullPolicy::OnCreate => "IfNotPresent",
                    ImagePullPolicy::Never => "Never",
                }
                .into(),
            ),
            env: Some(self.env(identity, module)),
            ports: (!ports.is_empty()).then_some(ports),
            volume_mounts: (!volume_mounts.is_empty()).then_some(volume_mounts),
            security_context: privileged.then(|| SecurityContext {
                privileged: Some(true),
                ..Default::default()
            }),
            ..Default::default()
        }];

        if let Some((container, volume)) = self.proxy_container() {
            containers.push(container);
            volumes.push(volume);
        }

        let image_pull_secrets = module.config.auth.as_ref().map(|auth| {
            vec![LocalObjectReference {
                name: Some(ImagePullSecret::name_for(auth)),
            }]
        });

        let replicas = match module.status {
            ModuleStatus::Running => 1,
            ModuleStatus::Stopped => 0,
        };

        let deployment = Deployment {
            metadata: module_metadata(identity, labels),
            spec: Some(DeploymentSpec {
                replicas: Some(replicas),
                selector: LabelSelector {
                    match_labels: Some(labels.clone()),
                    ..Default::default()
                },
                template: PodTemplateSpec {
                    metadata: Some(ObjectMeta {
                        labels: Some(labels.clone()),
                        annotations: (!options.labels.is_empty()).then(|| options.labels.clone()),
                        ..Default::default()
                    }),
                    spec: Some(PodSpec {
                        containers,
                        service_account_name: Some(name),
                        image_pull_secrets,
                        volumes: (!volumes.is_empty()).then_some(volumes),
                        node_selector: (!options.node_selector.is_empty())
                            .then(|| options.node_selector.clone()),
                        ..Default::default()
                    }),
                },
                ..Default::default()
            }),
            ..Default::default()
        };

        Ok(with_creation_string(deployment)?)
    }

    fn update_deployment(&self, mut to: Deployment, from: &Deployment) -> Deployment {
        to.metadata.resource_version = from.metadata.resource_version.clone();
        to
    }
}
