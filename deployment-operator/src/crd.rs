//! The `EdgeDeployment` custom resource, holding the desired modules of a device.

use edgeplane_service_api::KubernetesModule;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::{core::NamespaceResourceScope, Resource};
use serde::{Deserialize, Serialize};
use std::borrow::Cow;

pub const GROUP: &str = "edgeplane.io";
pub const VERSION: &str = "v1";
pub const KIND: &str = "EdgeDeployment";
pub const PLURAL: &str = "edgedeployments";

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EdgeDeployment {
    #[serde(default)]
    pub api_version: String,
    #[serde(default)]
    pub kind: String,
    #[serde(default)]
    pub metadata: ObjectMeta,
    #[serde(default)]
    pub spec: Vec<KubernetesModule>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<EdgeDeploymentStatus>,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeploymentState {
    Success,
    Failure,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EdgeDeploymentStatus {
    pub state: DeploymentState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl EdgeDeploymentStatus {
    pub fn success() -> Self {
        Self {
            state: DeploymentState::Success,
            message: None,
        }
    }

    pub fn failure<S: ToString>(message: S) -> Self {
        Self {
            state: DeploymentState::Failure,
            message: Some(message.to_string()),
        }
    }
}

impl EdgeDeployment {
    pub fn new<S: Into<String>>(name: S, spec: Vec<KubernetesModule>) -> Self {
        Self {
            api_version: format!("{GROUP}/{VERSION}"),
            kind: KIND.into(),
            metadata: ObjectMeta {
                name: Some(name.into()),
                ..Default::default()
            },
            spec,
            status: None,
        }
    }

    pub fn name(&self) -> &str {
        self.metadata.name.as_deref().unwrap_or_default()
    }
}

impl Resource for EdgeDeployment {
    type DynamicType = ();
    type Scope = NamespaceResourceScope;

    fn kind(_: &()) -> Cow<'_, str> {
        KIND.into()
    }

    fn group(_: &()) -> Cow<'_, str> {
        GROUP.into()
    }

    fn version(_: &()) -> Cow<'_, str> {
        VERSION.into()
    }

    fn plural(_: &()) -> Cow<'_, str> {
        PLURAL.into()
    }

    fn meta(&self) -> &ObjectMeta {
        &self.metadata
    }

    fn meta_mut(&mut self) -> &mut ObjectMeta {
        &mut self.metadata
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse() {
        let deployment: EdgeDeployment = serde_json::from_value(json!({
            "apiVersion": "edgeplane.io/v1",
            "kind": "EdgeDeployment",
            "metadata": {
                "name": "hub-device1",
                "namespace": "edge",
                "resourceVersion": "12",
            },
            "spec": [
                {
                    "name": "$edgeHub",
                    "version": "1.0",
                    "type": "docker",
                    "status": "running",
                    "restartPolicy": "always",
                    "imagePullPolicy": "on-create",
                    "config": {
                        "image": "edgehub:1.0",
                        "createOptions": {
                            "ExposedPorts": { "5671/tcp": {} },
                        },
                    },
                }
            ],
        }))
        .unwrap();

        assert_eq!(deployment.name(), "hub-device1");
        assert_eq!(deployment.spec.len(), 1);
        assert_eq!(deployment.spec[0].config.image, "edgehub:1.0");
        assert_eq!(deployment.status, None);
        assert_eq!(EdgeDeployment::api_version(&()), "edgeplane.io/v1");
        assert_eq!(
            EdgeDeployment::url_path(&(), Some("edge")),
            "/apis/edgeplane.io/v1/namespaces/edge/edgedeployments"
        );
    }

    fn namespaced<K: Resource<Scope = NamespaceResourceScope, DynamicType = ()>>(ns: &str) -> String {
        K::url_path(&(), Some(ns))
    }

    #[test]
    fn test_namespaced() {
        assert_eq!(
            namespaced::<EdgeDeployment>("other"),
            "/apis/edgeplane.io/v1/namespaces/other/edgedeployments"
        );
    }

    #[test]
    fn test_status() {
        let mut deployment = EdgeDeployment::new("foo", vec![]);
        deployment.status = Some(EdgeDeploymentStatus::failure("boom"));

        assert_eq!(
            serde_json::to_value(&deployment).unwrap()["status"],
            json!({"state": "failure", "message": "boom"})
        );
    }
}
