use edgeplane_operator_common::labels::sanitize_dns_domain;
use edgeplane_service_api::AuthConfig;
use k8s_openapi::{api::core::v1::Secret, apimachinery::pkg::apis::meta::v1::ObjectMeta, ByteString};
use serde_json::json;
use std::collections::BTreeMap;

pub const SECRET_TYPE_DOCKER_CONFIG_JSON: &str = "kubernetes.io/dockerconfigjson";
pub const KEY_DOCKER_CONFIG_JSON: &str = ".dockerconfigjson";

/// Registry credentials, as a Kubernetes image pull secret.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ImagePullSecret {
    pub name: String,
    pub payload: Vec<u8>,
}

impl ImagePullSecret {
    /// The name of the secret, derived from the user and registry.
    pub fn name_for(auth: &AuthConfig) -> String {
        sanitize_dns_domain(&format!("{}-{}", auth.username, auth.serveraddress))
    }

    pub fn from_auth(auth: &AuthConfig) -> Self {
        let encoded = base64::encode(format!("{}:{}", auth.username, auth.password));
        let payload = json!({
            "auths": {
                &auth.serveraddress: {
                    "username": &auth.username,
                    "password": &auth.password,
                    "auth": encoded,
                }
            }
        });

        Self {
            name: Self::name_for(auth),
            payload: payload.to_string().into_bytes(),
        }
    }

    pub fn to_secret(&self, labels: &BTreeMap<String, String>) -> Secret {
        Secret {
            metadata: ObjectMeta {
                name: Some(self.name.clone()),
                labels: Some(labels.clone()),
                ..Default::default()
            },
            type_: Some(SECRET_TYPE_DOCKER_CONFIG_JSON.into()),
            data: Some(BTreeMap::from([(
                KEY_DOCKER_CONFIG_JSON.to_string(),
                ByteString(self.payload.clone()),
            )])),
            ..Default::default()
        }
    }

    /// Check if the secret already carries this payload.
    pub fn matches(&self, secret: &Secret) -> bool {
        secret
            .data
            .as_ref()
            .and_then(|data| data.get(KEY_DOCKER_CONFIG_JSON))
            .map_or(false, |data| data.0 == self.payload)
    }
}
