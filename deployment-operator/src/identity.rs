use async_trait::async_trait;
use edgeplane_service_api::{Credentials, ModuleIdentity, ModuleSet, AUTH_SCHEME_SAS_TOKEN};
use std::collections::BTreeMap;
use thiserror::Error;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum IdentityProviderError {
    #[error("Failed to provision identity for module {module}: {reason}")]
    Provisioning { module: String, reason: String },
    #[error("Identity provider unavailable: {0}")]
    Unavailable(String),
}

/// Provide the identities for a set of modules.
#[async_trait]
pub trait ModuleIdentityProvider: Send + Sync {
    /// Get the identities of all desired modules, keyed by module name.
    ///
    /// Identities of modules only present in `current` may get cleaned up.
    async fn identities(
        &self,
        desired: &ModuleSet,
        current: &ModuleSet,
    ) -> Result<BTreeMap<String, ModuleIdentity>, IdentityProviderError>;
}

/// Hand out identities backed by the workload identity provider, for every module.
pub struct StaticIdentityProvider {
    iot_hub_hostname: String,
    device_id: String,
    gateway_hostname: Option<String>,
}

impl StaticIdentityProvider {
    pub fn new<H, D>(iot_hub_hostname: H, device_id: D, gateway_hostname: Option<String>) -> Self
    where
        H: Into<String>,
        D: Into<String>,
    {
        Self {
            iot_hub_hostname: iot_hub_hostname.into(),
            device_id: device_id.into(),
            gateway_hostname,
        }
    }
}

#[async_trait]
impl ModuleIdentityProvider for StaticIdentityProvider {
    async fn identities(
        &self,
        desired: &ModuleSet,
        _current: &ModuleSet,
    ) -> Result<BTreeMap<String, ModuleIdentity>, IdentityProviderError> {
        Ok(desired
            .names()
            .map(|name| {
                (
                    name.to_string(),
                    ModuleIdentity {
                        iot_hub_hostname: self.iot_hub_hostname.clone(),
                        gateway_hostname: self.gateway_hostname.clone(),
                        device_id: self.device_id.clone(),
                        module_id: name.to_string(),
                        credentials: Credentials::IdentityProvider {
                            auth_scheme: AUTH_SCHEME_SAS_TOKEN.into(),
                            generation_id: None,
                        },
                    },
                )
            })
            .collect())
    }
}
