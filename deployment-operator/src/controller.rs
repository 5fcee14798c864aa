use crate::{
    identity::{IdentityProviderError, ModuleIdentityProvider},
    mapper::{pvc_equals, service_account_equals, ImagePullSecret, MapperError, Mappers},
    LABEL_DEVICE, LABEL_HUB, LABEL_MODULE,
};
use async_trait::async_trait;
use edgeplane_operator_common::{
    api::ResourceApi,
    error::ResourceError,
    labels::{creation_string_equals, has_labels, sanitize_label_value, selector},
};
use edgeplane_service_api::{
    diff::keyed, Diff, KubernetesModule, ModuleIdentity, ModuleSet, Update,
};
use futures::future::join_all;
use k8s_openapi::api::{
    apps::v1::Deployment,
    core::v1::{PersistentVolumeClaim, Secret, Service, ServiceAccount},
};
use kube::{Api, Client, Resource};
use std::{collections::BTreeMap, fmt::Debug};
use thiserror::Error;
use tracing::instrument;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DeploymentError {
    #[error("Failed to resolve module identities: {0}")]
    Identity(#[from] IdentityProviderError),
    #[error("Missing identity for module: {0}")]
    MissingIdentity(String),
}

/// Deploy modules to the backend.
#[async_trait]
pub trait ModuleDeployer: Send + Sync {
    /// Converge the backend towards the desired modules, returning the new current set.
    async fn deploy_modules(
        &self,
        desired: &ModuleSet,
        current: &ModuleSet,
    ) -> Result<ModuleSet, DeploymentError>;

    /// Remove all resources which got created for this device.
    async fn purge_modules(&self);
}

/// Access to the resources the controller manages.
pub struct Backend {
    pub services: Box<dyn ResourceApi<Service>>,
    pub deployments: Box<dyn ResourceApi<Deployment>>,
    pub pvcs: Box<dyn ResourceApi<PersistentVolumeClaim>>,
    pub service_accounts: Box<dyn ResourceApi<ServiceAccount>>,
    pub secrets: Box<dyn ResourceApi<Secret>>,
}

impl Backend {
    pub fn namespaced(client: Client, namespace: &str) -> Self {
        Self {
            services: Box::new(Api::<Service>::namespaced(client.clone(), namespace)),
            deployments: Box::new(Api::<Deployment>::namespaced(client.clone(), namespace)),
            pvcs: Box::new(Api::<PersistentVolumeClaim>::namespaced(
                client.clone(),
                namespace,
            )),
            service_accounts: Box::new(Api::<ServiceAccount>::namespaced(
                client.clone(),
                namespace,
            )),
            secrets: Box::new(Api::<Secret>::namespaced(client, namespace)),
        }
    }
}

fn name_of<K: Resource>(resource: &K) -> String {
    resource.meta().name.clone().unwrap_or_default()
}

fn by_name<K: Resource>(resources: Vec<K>) -> BTreeMap<String, K> {
    keyed(resources, name_of)
}

/// A desired module, with everything required to map it.
struct ModuleContext<'a> {
    module: &'a KubernetesModule,
    identity: &'a ModuleIdentity,
    labels: BTreeMap<String, String>,
}

pub struct DeploymentController<I> {
    /// Labels marking resources as created for this device.
    device_labels: BTreeMap<String, String>,
    /// Selector for all resources created for this device.
    selector: String,
    identities: I,
    backend: Backend,
    mappers: Mappers,
}

impl<I> DeploymentController<I>
where
    I: ModuleIdentityProvider,
{
    pub fn new(
        device_id: &str,
        iot_hub_hostname: &str,
        identities: I,
        backend: Backend,
        mappers: Mappers,
    ) -> Self {
        let device_labels = BTreeMap::from([
            (LABEL_DEVICE.to_string(), sanitize_label_value(device_id)),
            (LABEL_HUB.to_string(), sanitize_label_value(iot_hub_hostname)),
        ]);
        let selector = selector(&device_labels);

        Self {
            device_labels,
            selector,
            identities,
            backend,
            mappers,
        }
    }

    pub fn selector(&self) -> &str {
        &self.selector
    }

    fn module_labels(&self, identity: &ModuleIdentity) -> BTreeMap<String, String> {
        let mut labels = self.device_labels.clone();
        labels.insert(
            LABEL_MODULE.to_string(),
            sanitize_label_value(&identity.module_id),
        );
        labels
    }

    async fn list<K>(
        &self,
        kind: &str,
        api: &dyn ResourceApi<K>,
        selector: Option<&str>,
    ) -> Option<BTreeMap<String, K>>
    where
        K: Resource,
    {
        match api.list(selector).await {
            Ok(items) => Some(by_name(items)),
            Err(err) => {
                log::warn!("Failed to list {kind}s: {err}");
                None
            }
        }
    }

    async fn reconcile_services(&self, modules: &[ModuleContext<'_>]) {
        let desired = modules
            .iter()
            .filter_map(|ctx| {
                self.mappers
                    .services
                    .create_service(ctx.identity, ctx.module, &ctx.labels)
                    .transpose()
            })
            .collect::<Result<Vec<_>, MapperError>>();

        let desired = match desired {
            Ok(desired) => by_name(desired),
            Err(err) => {
                log::warn!("Failed to map services: {err}");
                return;
            }
        };

        let api = self.backend.services.as_ref();
        let existing = self.list("service", api, Some(self.selector.as_str()));
        if let Some(existing) = existing.await {
            let diff = Diff::create_with(desired, existing, creation_string_equals);
            apply("service", api, diff, |to, from| {
                self.mappers.services.update_service(to, from)
            })
            .await;
        }
    }

    async fn reconcile_deployments(&self, modules: &[ModuleContext<'_>]) {
        let desired = modules
            .iter()
            .map(|ctx| {
                self.mappers
                    .deployments
                    .create_deployment(ctx.identity, ctx.module, &ctx.labels)
            })
            .collect::<Result<Vec<_>, MapperError>>();

        let desired = match desired {
            Ok(desired) => by_name(desired),
            Err(err) => {
                log::warn!("Failed to map deployments: {err}");
                return;
            }
        };

        let api = self.backend.deployments.as_ref();
        let existing = self.list("deployment", api, Some(self.selector.as_str()));
        if let Some(existing) = existing.await {
            let diff = Diff::create_with(desired, existing, creation_string_equals);
            apply("deployment", api, diff, |to, from| {
                self.mappers.deployments.update_deployment(to, from)
            })
            .await;
        }
    }

    async fn reconcile_service_accounts(&self, modules: &[ModuleContext<'_>]) {
        let desired = by_name(
            modules
                .iter()
                .map(|ctx| {
                    self.mappers
                        .service_accounts
                        .create_service_account(ctx.identity, &ctx.labels)
                })
                .collect(),
        );

        let api = self.backend.service_accounts.as_ref();
        let existing = self.list("service account", api, Some(self.selector.as_str()));
        if let Some(existing) = existing.await {
            let diff = Diff::create_with(desired, existing, service_account_equals);
            apply("service account", api, diff, |to, from| {
                self.mappers.service_accounts.update_service_account(to, from)
            })
            .await;
        }
    }

    /// Claims may have been created by someone else, up front. So we look at all of them, but
    /// only touch those carrying our labels.
    async fn reconcile_pvcs(&self, modules: &[ModuleContext<'_>]) {
        if !self.mappers.pvcs.enabled() {
            log::debug!("Persistent volume claims are not configured");
            return;
        }

        let claims = modules
            .iter()
            .flat_map(|ctx| self.mappers.pvcs.create_pvcs(ctx.module, &ctx.labels))
            .collect::<Vec<_>>();

        let api = self.backend.pvcs.as_ref();
        let existing = match self.list("persistent volume claim", api, None).await {
            Some(existing) => existing,
            None => return,
        };

        let owned = |claim: &PersistentVolumeClaim| has_labels(claim, &self.device_labels);

        let owned_names = existing
            .values()
            .filter(|claim| owned(*claim))
            .map(name_of)
            .collect::<Vec<_>>();

        let mut diff = Diff::create_with(by_name(claims), existing, pvc_equals);
        diff.retain_removed(|name| owned_names.contains(name));
        diff.retain_updated(|update| owned(&update.from));

        apply("persistent volume claim", api, diff, |to, from| {
            self.mappers.pvcs.update_pvc(to, from)
        })
        .await;
    }

    async fn reconcile_secrets(&self, modules: &[ModuleContext<'_>]) {
        let secrets = keyed(
            modules
                .iter()
                .filter_map(|ctx| ctx.module.config.auth.as_ref())
                .map(ImagePullSecret::from_auth),
            |secret| secret.name.clone(),
        );

        join_all(secrets.values().map(|secret| async move {
            if let Err(err) = self.apply_secret(secret).await {
                log::warn!("Failed to apply image pull secret {}: {err}", secret.name);
            }
        }))
        .await;
    }

    async fn apply_secret(&self, secret: &ImagePullSecret) -> Result<(), ResourceError> {
        let api = &self.backend.secrets;
        let mut desired = secret.to_secret(&self.device_labels);

        match api.get(&secret.name).await? {
            Some(existing) if secret.matches(&existing) => {
                log::debug!("Image pull secret {} is up to date", secret.name);
            }
            Some(existing) => {
                desired.metadata.resource_version = existing.metadata.resource_version;
                api.replace(&secret.name, &desired).await?;
                log::info!("Updated image pull secret {}", secret.name);
            }
            None => {
                api.create(&desired).await?;
                log::info!("Created image pull secret {}", secret.name);
            }
        }

        Ok(())
    }
}

#[async_trait]
impl<I> ModuleDeployer for DeploymentController<I>
where
    I: ModuleIdentityProvider,
{
    #[instrument(skip_all, fields(desired = desired.len(), current = current.len()))]
    async fn deploy_modules(
        &self,
        desired: &ModuleSet,
        current: &ModuleSet,
    ) -> Result<ModuleSet, DeploymentError> {
        let changes = desired.diff(current);
        log::info!(
            "Deploying modules - added: {}, removed: {}, updated: {}",
            changes.added.len(),
            changes.removed.len(),
            changes.updated.len()
        );

        let identities = self.identities.identities(desired, current).await?;

        let modules = desired
            .iter()
            .map(|module| {
                let identity = identities
                    .get(&module.name)
                    .ok_or_else(|| DeploymentError::MissingIdentity(module.name.clone()))?;
                Ok(ModuleContext {
                    module,
                    identity,
                    labels: self.module_labels(identity),
                })
            })
            .collect::<Result<Vec<_>, DeploymentError>>()?;

        // kinds are independent, a failure in one doesn't roll back another

        self.reconcile_secrets(&modules).await;
        self.reconcile_service_accounts(&modules).await;
        self.reconcile_pvcs(&modules).await;
        self.reconcile_services(&modules).await;
        self.reconcile_deployments(&modules).await;

        // done

        Ok(desired.clone())
    }

    #[instrument(skip_all)]
    async fn purge_modules(&self) {
        let selector = self.selector.as_str();
        log::info!("Purging all modules ({selector})");

        futures::join!(
            purge("service", self.backend.services.as_ref(), selector),
            purge("deployment", self.backend.deployments.as_ref(), selector),
            purge("persistent volume claim", self.backend.pvcs.as_ref(), selector),
            purge(
                "service account",
                self.backend.service_accounts.as_ref(),
                selector
            ),
            purge("secret", self.backend.secrets.as_ref(), selector),
        );
    }
}

/// Apply a diff: all updates, then all removals, then all additions. Each phase runs
/// concurrently, failing items are logged and skipped.
async fn apply<K, U>(kind: &str, api: &dyn ResourceApi<K>, diff: Diff<String, K>, update: U)
where
    K: Resource + Debug + Send + Sync,
    U: Fn(K, &K) -> K,
{
    let Diff {
        added,
        removed,
        updated,
    } = diff;

    if added.is_empty() && removed.is_empty() && updated.is_empty() {
        log::debug!("No {kind}s to change");
        return;
    }

    // update

    let updated = updated
        .into_iter()
        .map(|Update { from, to }| update(to, &from))
        .collect::<Vec<_>>();

    join_all(updated.iter().map(|resource| async move {
        let name = name_of(resource);
        match api.replace(&name, resource).await {
            Ok(_) => log::info!("Updated {kind} {name}"),
            Err(err) => log::warn!("Failed to update {kind} {name}: {err}"),
        }
    }))
    .await;

    // remove

    join_all(removed.iter().map(|name| async move {
        match api.delete(name).await {
            Ok(_) => log::info!("Deleted {kind} {name}"),
            Err(err) => log::warn!("Failed to delete {kind} {name}: {err}"),
        }
    }))
    .await;

    // add

    join_all(added.iter().map(|resource| async move {
        let name = name_of(resource);
        match api.create(resource).await {
            Ok(_) => log::info!("Created {kind} {name}"),
            Err(err) => log::warn!("Failed to create {kind} {name}: {err}"),
        }
    }))
    .await;
}

async fn purge<K>(kind: &str, api: &dyn ResourceApi<K>, selector: &str)
where
    K: Resource + Send + Sync,
{
    let items = match api.list(Some(selector)).await {
        Ok(items) => items,
        Err(err) => {
            log::warn!("Failed to list {kind}s for purging: {err}");
            return;
        }
    };

    join_all(items.iter().map(|item| async move {
        let name = name_of(item);
        if let Err(err) = api.delete(&name).await {
            log::warn!("Failed to delete {kind} {name}: {err}");
        }
    }))
    .await;
}
