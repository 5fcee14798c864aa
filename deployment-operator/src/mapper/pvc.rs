use super::{MapperConfig, PvcMapper, MOUNT_TYPE_VOLUME};
use edgeplane_operator_common::labels::sanitize_dns_value;
use edgeplane_service_api::KubernetesModule;
use k8s_openapi::{
    api::core::v1::{PersistentVolumeClaim, PersistentVolumeClaimSpec, ResourceRequirements},
    apimachinery::pkg::{api::resource::Quantity, apis::meta::v1::ObjectMeta},
};
use std::collections::{BTreeMap, BTreeSet};

const ACCESS_MODE_READ_ONLY_MANY: &str = "ReadOnlyMany";
const ACCESS_MODE_READ_WRITE_MANY: &str = "ReadWriteMany";
const RESOURCE_STORAGE: &str = "storage";

pub struct KubernetesPvcMapper {
    persistent_volume_name: Option<String>,
    storage_class_name: Option<String>,
    default_size_mb: u32,
}

impl KubernetesPvcMapper {
    pub fn new(config: &MapperConfig) -> Self {
        Self {
            persistent_volume_name: config.persistent_volume_name.clone(),
            storage_class_name: config.storage_class_name.clone(),
            default_size_mb: config.persistent_volume_claim_default_size_mb,
        }
    }
}

impl PvcMapper for KubernetesPvcMapper {
    fn enabled(&self) -> bool {
        self.persistent_volume_name.is_some() || self.storage_class_name.is_some()
    }

    fn create_pvcs(
        &self,
        module: &KubernetesModule,
        labels: &BTreeMap<String, String>,
    ) -> Vec<PersistentVolumeClaim> {
        if !self.enabled() {
            return vec![];
        }

        let mounts = module
            .config
            .create_options
            .host_config
            .iter()
            .flat_map(|host_config| host_config.mounts.iter())
            .filter(|mount| mount.r#type == MOUNT_TYPE_VOLUME);

        mounts
            .filter_map(|mount| {
                let name = sanitize_dns_value(&mount.source);
                if name.is_empty() {
                    return None;
                }

                let access_mode = match mount.read_only {
                    true => ACCESS_MODE_READ_ONLY_MANY,
                    false => ACCESS_MODE_READ_WRITE_MANY,
                };

                Some(PersistentVolumeClaim {
                    metadata: ObjectMeta {
                        name: Some(name),
                        labels: Some(labels.clone()),
                        ..Default::default()
                    },
                    spec: Some(PersistentVolumeClaimSpec {
                        access_modes: Some(vec![access_mode.into()]),
                        storage_class_name: self.storage_class_name.clone(),
                        volume_name: self.persistent_volume_name.clone(),
                        resources: Some(ResourceRequirements {
                            requests: Some(BTreeMap::from([(
                                RESOURCE_STORAGE.to_string(),
                                Quantity(format!("{}Mi", self.default_size_mb)),
                            )])),
                            ..Default::default()
                        }),
                        ..Default::default()
                    }),
                    ..Default::default()
                })
            })
            .collect()
    }

    fn update_pvc(
        &self,
        mut to: PersistentVolumeClaim,
        from: &PersistentVolumeClaim,
    ) -> PersistentVolumeClaim {
        to.metadata.resource_version = from.metadata.resource_version.clone();

        // once bound, the volume can't change
        let volume_name = from.spec.as_ref().and_then(|spec| spec.volume_name.clone());
        if let (Some(spec), Some(volume_name)) = (to.spec.as_mut(), volume_name) {
            spec.volume_name = Some(volume_name);
        }

        to
    }
}

fn access_modes(spec: Option<&PersistentVolumeClaimSpec>) -> BTreeSet<&str> {
    spec.and_then(|spec| spec.access_modes.as_ref())
        .map(|modes| modes.iter().map(String::as_str).collect())
        .unwrap_or_default()
}

fn storage_request(spec: Option<&PersistentVolumeClaimSpec>) -> Option<&Quantity> {
    spec.and_then(|spec| spec.resources.as_ref())
        .and_then(|resources| resources.requests.as_ref())
        .and_then(|requests| requests.get(RESOURCE_STORAGE))
}

/// Compare an existing claim with the desired one.
///
/// Names, labels, access modes (as a set) and the storage request must match. Storage class and
/// volume name are only compared when the desired claim sets them, as the backend fills them in
/// when binding the claim.
pub fn pvc_equals(existing: &PersistentVolumeClaim, desired: &PersistentVolumeClaim) -> bool {
    if existing.metadata.name != desired.metadata.name
        || existing.metadata.labels != desired.metadata.labels
    {
        return false;
    }

    let existing = existing.spec.as_ref();
    let desired = desired.spec.as_ref();

    let set_and_different = |f: fn(&PersistentVolumeClaimSpec) -> Option<&String>| {
        let want = desired.and_then(f);
        want.is_some() && want != existing.and_then(f)
    };

    access_modes(existing) == access_modes(desired)
        && storage_request(existing) == storage_request(desired)
        && !set_and_different(|spec| spec.storage_class_name.as_ref())
        && !set_and_different(|spec| spec.volume_name.as_ref())
}
