use async_trait::async_trait;
use edgeplane_deployment_operator::{
    controller::{Backend, DeploymentController, DeploymentError, ModuleDeployer},
    identity::{IdentityProviderError, ModuleIdentityProvider, StaticIdentityProvider},
    mapper::{MapperConfig, Mappers, ServiceType, MOUNT_TYPE_VOLUME},
    LABEL_DEVICE, LABEL_HUB,
};
use edgeplane_service_api::{
    AuthConfig, HostConfig, KubernetesModule, ModuleIdentity, ModuleSet, Mount,
};
use edgeplane_test_common::{init, Call, MockApi};
use k8s_openapi::{
    api::{
        apps::v1::Deployment,
        core::v1::{PersistentVolumeClaim, Secret, Service, ServiceAccount},
    },
    apimachinery::pkg::apis::meta::v1::ObjectMeta,
};
use maplit::btreemap;
use serde_json::json;
use std::collections::BTreeMap;

#[derive(Clone, Default)]
struct Mocks {
    services: MockApi<Service>,
    deployments: MockApi<Deployment>,
    pvcs: MockApi<PersistentVolumeClaim>,
    service_accounts: MockApi<ServiceAccount>,
    secrets: MockApi<Secret>,
}

impl Mocks {
    fn backend(&self) -> Backend {
        Backend {
            services: Box::new(self.services.clone()),
            deployments: Box::new(self.deployments.clone()),
            pvcs: Box::new(self.pvcs.clone()),
            service_accounts: Box::new(self.service_accounts.clone()),
            secrets: Box::new(self.secrets.clone()),
        }
    }

    fn writes(&self) -> Vec<(&'static str, Call)> {
        let mut writes = vec![];
        writes.extend(self.services.writes().into_iter().map(|c| ("service", c)));
        writes.extend(self.deployments.writes().into_iter().map(|c| ("deployment", c)));
        writes.extend(self.pvcs.writes().into_iter().map(|c| ("pvc", c)));
        writes.extend(
            self.service_accounts
                .writes()
                .into_iter()
                .map(|c| ("service account", c)),
        );
        writes.extend(self.secrets.writes().into_iter().map(|c| ("secret", c)));
        writes
    }

    fn reset(&self) {
        self.services.reset_calls();
        self.deployments.reset_calls();
        self.pvcs.reset_calls();
        self.service_accounts.reset_calls();
        self.secrets.reset_calls();
    }
}

fn config() -> MapperConfig {
    MapperConfig {
        workload_uri: "unix:///var/run/iotedge/workload.sock".into(),
        management_uri: "unix:///var/run/iotedge/mgmt.sock".into(),
        gateway_hostname: None,
        edge_api_version: "2019-01-30".into(),
        default_service_type: ServiceType::ClusterIP,
        persistent_volume_name: None,
        storage_class_name: Some("local".into()),
        persistent_volume_claim_default_size_mb: 100,
        proxy: None,
    }
}

fn controller(mocks: &Mocks) -> DeploymentController<StaticIdentityProvider> {
    DeploymentController::new(
        "device1",
        "hub.example.com",
        StaticIdentityProvider::new("hub.example.com", "device1", None),
        mocks.backend(),
        Mappers::new(config()),
    )
}

fn auth() -> AuthConfig {
    AuthConfig {
        username: "user".into(),
        password: "secret".into(),
        serveraddress: "registry.example.com".into(),
    }
}

fn module_with_volume(name: &str, volume: &str) -> KubernetesModule {
    let mut module = KubernetesModule::new(name, "registry.example.com/image:1");
    module.config.create_options.exposed_ports = btreemap! {
        "80/tcp".to_string() => json!({}),
    };
    module.config.create_options.host_config = Some(HostConfig {
        mounts: vec![Mount {
            r#type: MOUNT_TYPE_VOLUME.into(),
            source: volume.into(),
            target: "/data".into(),
            read_only: false,
        }],
        ..Default::default()
    });
    module.config.auth = Some(auth());
    module
}

fn device_labels() -> BTreeMap<String, String> {
    btreemap! {
        LABEL_DEVICE.to_string() => "device1".to_string(),
        LABEL_HUB.to_string() => "hub.example.com".to_string(),
    }
}

fn pvc(name: &str, labels: Option<BTreeMap<String, String>>) -> PersistentVolumeClaim {
    PersistentVolumeClaim {
        metadata: ObjectMeta {
            name: Some(name.into()),
            labels,
            ..Default::default()
        },
        ..Default::default()
    }
}

fn names<K: kube::Resource>(items: Vec<K>) -> Vec<String> {
    items
        .into_iter()
        .map(|item| item.meta().name.clone().unwrap_or_default())
        .collect()
}

#[tokio::test]
async fn test_deploy() {
    init();

    let mocks = Mocks::default();
    let controller = controller(&mocks);

    let desired = ModuleSet::new(vec![
        module_with_volume("$edgeHub", "hub-data"),
        KubernetesModule::new("module1", "image:1"),
    ])
    .unwrap();

    let result = controller
        .deploy_modules(&desired, &ModuleSet::empty())
        .await
        .unwrap();
    assert_eq!(result, desired);

    assert_eq!(names(mocks.deployments.items()), vec!["edgehub", "module1"]);
    assert_eq!(
        names(mocks.service_accounts.items()),
        vec!["edgehub", "module1"]
    );
    // only the hub exposes ports
    assert_eq!(names(mocks.services.items()), vec!["edgehub"]);
    assert_eq!(names(mocks.pvcs.items()), vec!["hub-data"]);
    assert_eq!(
        names(mocks.secrets.items()),
        vec!["user-registry.example.com"]
    );

    // everything we created can be found by the selector
    assert_eq!(
        controller.selector(),
        "edgeplane.io/device=device1,edgeplane.io/hub=hub.example.com"
    );
    for call in [
        Call::List(Some(controller.selector().to_string())),
        Call::Create("edgehub".into()),
    ] {
        assert!(mocks.deployments.calls().contains(&call), "{call:?}");
    }
}

#[tokio::test]
async fn test_idempotent() {
    init();

    let mocks = Mocks::default();
    let controller = controller(&mocks);

    let desired = ModuleSet::new(vec![
        module_with_volume("$edgeHub", "hub-data"),
        module_with_volume("module1", "module-data"),
    ])
    .unwrap();

    let current = controller
        .deploy_modules(&desired, &ModuleSet::empty())
        .await
        .unwrap();
    assert!(!mocks.writes().is_empty());

    mocks.reset();

    controller.deploy_modules(&desired, &current).await.unwrap();
    assert_eq!(mocks.writes(), vec![]);
}

#[tokio::test]
async fn test_update_and_remove() {
    init();

    let mocks = Mocks::default();
    let controller = controller(&mocks);

    let first = ModuleSet::new(vec![
        KubernetesModule::new("module1", "image:1"),
        KubernetesModule::new("module2", "image:1"),
    ])
    .unwrap();
    controller
        .deploy_modules(&first, &ModuleSet::empty())
        .await
        .unwrap();

    mocks.reset();

    let second = ModuleSet::new(vec![KubernetesModule::new("module1", "image:2")]).unwrap();
    controller.deploy_modules(&second, &first).await.unwrap();

    assert_eq!(
        mocks.deployments.writes(),
        vec![
            Call::Replace("module1".into()),
            Call::Delete("module2".into())
        ]
    );
    assert_eq!(
        mocks.service_accounts.writes(),
        vec![Call::Delete("module2".into())]
    );

    let deployment = mocks.deployments.item("module1").unwrap();
    let image = deployment.spec.unwrap().template.spec.unwrap().containers[0]
        .image
        .clone();
    assert_eq!(image.as_deref(), Some("image:2"));
}

#[tokio::test]
async fn test_pvc_ownership() {
    init();

    let mocks = Mocks::default();
    mocks.pvcs.insert(pvc("user-claim", None));
    mocks.pvcs.insert(pvc("other-device", Some(btreemap! {
        LABEL_DEVICE.to_string() => "device2".to_string(),
        LABEL_HUB.to_string() => "hub.example.com".to_string(),
    })));
    mocks.pvcs.insert(pvc("stale", Some(device_labels())));
    // same name as a desired claim, but created by someone else
    mocks.pvcs.insert(pvc("module-data", None));

    let controller = controller(&mocks);
    let desired = ModuleSet::new(vec![module_with_volume("module1", "module-data")]).unwrap();

    controller
        .deploy_modules(&desired, &ModuleSet::empty())
        .await
        .unwrap();

    // the claims are listed without a selector
    assert!(mocks.pvcs.calls().contains(&Call::List(None)));
    assert_eq!(mocks.pvcs.writes(), vec![Call::Delete("stale".into())]);
    assert_eq!(
        names(mocks.pvcs.items()),
        vec!["module-data", "other-device", "user-claim"]
    );
}

#[tokio::test]
async fn test_pvc_not_configured() {
    init();

    let mocks = Mocks::default();
    mocks.pvcs.insert(pvc("stale", Some(device_labels())));

    let mut config = config();
    config.storage_class_name = None;
    let controller = DeploymentController::new(
        "device1",
        "hub.example.com",
        StaticIdentityProvider::new("hub.example.com", "device1", None),
        mocks.backend(),
        Mappers::new(config),
    );

    // without any module, claims are still left alone
    controller
        .deploy_modules(&ModuleSet::empty(), &ModuleSet::empty())
        .await
        .unwrap();
    controller
        .deploy_modules(
            &ModuleSet::new(vec![module_with_volume("module1", "data")]).unwrap(),
            &ModuleSet::empty(),
        )
        .await
        .unwrap();

    assert!(mocks.pvcs.calls().is_empty());
    assert_eq!(names(mocks.pvcs.items()), vec!["stale"]);
}

#[tokio::test]
async fn test_secret_dedup() {
    init();

    let mocks = Mocks::default();
    let controller = controller(&mocks);

    let desired = ModuleSet::new(vec![
        module_with_volume("module1", "data1"),
        module_with_volume("module2", "data2"),
    ])
    .unwrap();

    controller
        .deploy_modules(&desired, &ModuleSet::empty())
        .await
        .unwrap();

    assert_eq!(
        mocks.secrets.writes(),
        vec![Call::Create("user-registry.example.com".into())]
    );

    // a changed password replaces the secret, once

    mocks.reset();

    let mut changed = module_with_volume("module1", "data1");
    changed.config.auth.as_mut().unwrap().password = "changed".into();
    let mut changed2 = module_with_volume("module2", "data2");
    changed2.config.auth.as_mut().unwrap().password = "changed".into();
    let desired2 = ModuleSet::new(vec![changed, changed2]).unwrap();

    controller.deploy_modules(&desired2, &desired).await.unwrap();

    assert_eq!(
        mocks.secrets.writes(),
        vec![Call::Replace("user-registry.example.com".into())]
    );
}

#[tokio::test]
async fn test_item_failures_are_isolated() {
    init();

    let mocks = Mocks::default();
    mocks.deployments.fail_on(Call::Create("module1".into()));
    mocks.services.fail_on(Call::List(Some(
        "edgeplane.io/device=device1,edgeplane.io/hub=hub.example.com".into(),
    )));

    let controller = controller(&mocks);
    let desired = ModuleSet::new(vec![
        module_with_volume("module1", "data1"),
        module_with_volume("module2", "data2"),
    ])
    .unwrap();

    let result = controller
        .deploy_modules(&desired, &ModuleSet::empty())
        .await
        .unwrap();

    // the result is what we want, not what we achieved
    assert_eq!(result, desired);
    assert_eq!(names(mocks.deployments.items()), vec!["module2"]);
    assert!(mocks.services.items().is_empty());
    assert_eq!(
        names(mocks.service_accounts.items()),
        vec!["module1", "module2"]
    );
}

struct FailingIdentities;

#[async_trait]
impl ModuleIdentityProvider for FailingIdentities {
    async fn identities(
        &self,
        _desired: &ModuleSet,
        _current: &ModuleSet,
    ) -> Result<BTreeMap<String, ModuleIdentity>, IdentityProviderError> {
        Err(IdentityProviderError::Unavailable("offline".into()))
    }
}

#[tokio::test]
async fn test_identity_failure() {
    init();

    let mocks = Mocks::default();
    let controller = DeploymentController::new(
        "device1",
        "hub.example.com",
        FailingIdentities,
        mocks.backend(),
        Mappers::new(config()),
    );

    let desired = ModuleSet::new(vec![KubernetesModule::new("module1", "image:1")]).unwrap();
    let result = controller
        .deploy_modules(&desired, &ModuleSet::empty())
        .await;

    assert_eq!(
        result,
        Err(DeploymentError::Identity(IdentityProviderError::Unavailable(
            "offline".into()
        )))
    );
    assert_eq!(mocks.writes(), vec![]);
}

#[tokio::test]
async fn test_purge() {
    init();

    let mocks = Mocks::default();
    mocks.pvcs.insert(pvc("user-claim", None));

    let controller = controller(&mocks);
    let desired = ModuleSet::new(vec![
        module_with_volume("$edgeHub", "hub-data"),
        module_with_volume("module1", "data1"),
    ])
    .unwrap();

    controller
        .deploy_modules(&desired, &ModuleSet::empty())
        .await
        .unwrap();

    controller.purge_modules().await;

    assert!(mocks.services.items().is_empty());
    assert!(mocks.deployments.items().is_empty());
    assert!(mocks.service_accounts.items().is_empty());
    assert!(mocks.secrets.items().is_empty());
    assert_eq!(names(mocks.pvcs.items()), vec!["user-claim"]);
}
