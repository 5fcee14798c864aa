use super::{module_metadata, MapperError, ServiceMapper, ServiceType};
use edgeplane_operator_common::labels::with_creation_string;
use edgeplane_service_api::{KubernetesModule, ModuleIdentity};
use k8s_openapi::{
    api::core::v1::{Service, ServicePort, ServiceSpec},
    apimachinery::pkg::util::intstr::IntOrString,
};
use std::collections::BTreeMap;

/// Parse a docker port spec, like `8080/tcp`, into port and (Kubernetes) protocol.
///
/// A missing protocol defaults to TCP.
pub(crate) fn parse_port(spec: &str) -> Option<(i32, &'static str)> {
    let (port, protocol) = spec.split_once('/').unwrap_or((spec, "tcp"));

    let port = port.parse::<u16>().ok().filter(|port| *port > 0)?;
    let protocol = match protocol.to_lowercase().as_str() {
        "tcp" => "TCP",
        "udp" => "UDP",
        "sctp" => "SCTP",
        _ => return None,
    };

    Some((port.into(), protocol))
}

pub struct KubernetesServiceMapper {
    default_service_type: ServiceType,
}

impl KubernetesServiceMapper {
    pub fn new(default_service_type: ServiceType) -> Self {
        Self {
            default_service_type,
        }
    }

    fn ports(module: &KubernetesModule) -> (BTreeMap<String, ServicePort>, bool) {
        let mut ports = BTreeMap::new();
        let mut host_ports = false;

        let options = &module.config.create_options;

        for spec in options.exposed_ports.keys() {
            match parse_port(spec) {
                Some((port, protocol)) => {
                    let name = format!("exposedport-{port}-{}", protocol.to_lowercase());
                    ports.insert(
                        name.clone(),
                        ServicePort {
                            name: Some(name),
                            port,
                            protocol: Some(protocol.into()),
                            target_port: Some(IntOrString::Int(port)),
                            ..Default::default()
                        },
                    );
                }
                None => log::warn!("Module {}: unsupported exposed port: {spec}", module.name),
            }
        }

        let bindings = options
            .host_config
            .iter()
            .flat_map(|host_config| host_config.port_bindings.iter());

        for (spec, bindings) in bindings {
            let (target, protocol) = match parse_port(spec) {
                Some(port) => port,
                None => {
                    log::warn!("Module {}: unsupported port binding: {spec}", module.name);
                    continue;
                }
            };

            for binding in bindings {
                let port = match binding.host_port.parse::<u16>() {
                    Ok(port) if port > 0 => i32::from(port),
                    _ => {
                        log::warn!(
                            "Module {}: invalid host port: {}",
                            module.name,
                            binding.host_port
                        );
                        continue;
                    }
                };

                let name = format!("hostport-{port}-{}", protocol.to_lowercase());
                host_ports = true;
                ports.insert(
                    name.clone(),
                    ServicePort {
                        name: Some(name),
                        port,
                        protocol: Some(protocol.into()),
                        target_port: Some(IntOrString::Int(target)),
                        ..Default::default()
                    },
                );
            }
        }

        (ports, host_ports)
    }
}

impl ServiceMapper for KubernetesServiceMapper {
    fn create_service(
        &self,
        identity: &ModuleIdentity,
        module: &KubernetesModule,
        labels: &BTreeMap<String, String>,
    ) -> Result<Option<Service>, MapperError> {
        let (ports, host_ports) = Self::ports(module);

        if ports.is_empty() {
            return Ok(None);
        }

        let service_type = match host_ports {
            true => self.default_service_type,
            false => ServiceType::ClusterIP,
        };

        let service = Service {
            metadata: module_metadata(identity, labels),
            spec: Some(ServiceSpec {
                type_: Some(service_type.as_str().into()),
                ports: Some(ports.into_values().collect()),
                selector: Some(labels.clone()),
                ..Default::default()
            }),
            ..Default::default()
        };

        Ok(Some(with_creation_string(service)?))
    }

    fn update_service(&self, mut to: Service, from: &Service) -> Service {
        to.metadata.resource_version = from.metadata.resource_version.clone();

        // the cluster IP is immutable
        let cluster_ip = from.spec.as_ref().and_then(|spec| spec.cluster_ip.clone());
        if let Some(spec) = to.spec.as_mut() {
            spec.cluster_ip = cluster_ip;
        }

        to
    }
}
