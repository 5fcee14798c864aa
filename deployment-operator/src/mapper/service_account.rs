use super::{module_metadata, ServiceAccountMapper};
use edgeplane_service_api::ModuleIdentity;
use k8s_openapi::api::core::v1::ServiceAccount;
use std::collections::BTreeMap;

pub struct KubernetesServiceAccountMapper;

impl ServiceAccountMapper for KubernetesServiceAccountMapper {
    fn create_service_account(
        &self,
        identity: &ModuleIdentity,
        labels: &BTreeMap<String, String>,
    ) -> ServiceAccount {
        ServiceAccount {
            metadata: module_metadata(identity, labels),
            ..Default::default()
        }
    }

    fn update_service_account(&self, mut to: ServiceAccount, from: &ServiceAccount) -> ServiceAccount {
        to.metadata.resource_version = from.metadata.resource_version.clone();
        to
    }
}

/// Service accounts are equal when their names, labels and annotations are.
pub fn service_account_equals(existing: &ServiceAccount, desired: &ServiceAccount) -> bool {
    existing.metadata.name == desired.metadata.name
        && existing.metadata.labels == desired.metadata.labels
        && existing.metadata.annotations == desired.metadata.annotations
}
