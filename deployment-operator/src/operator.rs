//! Watch the `EdgeDeployment` resource, and deploy its modules when it changes.

use crate::{
    controller::ModuleDeployer,
    crd::{EdgeDeployment, EdgeDeploymentStatus},
};
use async_trait::async_trait;
use edgeplane_operator_common::{
    error::ResourceError,
    watcher::{ResourceEvent, WatchHandler, WatchSource, Watcher},
};
use edgeplane_service_api::ModuleSet;
use kube::{api::PostParams, Api};
use std::{sync::Arc, time::Duration};
use tokio::{
    sync::{watch, Mutex},
    task::JoinHandle,
};

/// Access to the `EdgeDeployment` resources.
#[async_trait]
pub trait EdgeDeploymentApi: WatchSource<EdgeDeployment> {
    async fn replace_status(
        &self,
        deployment: &EdgeDeployment,
    ) -> Result<EdgeDeployment, ResourceError>;
}

#[async_trait]
impl EdgeDeploymentApi for Api<EdgeDeployment> {
    async fn replace_status(
        &self,
        deployment: &EdgeDeployment,
    ) -> Result<EdgeDeployment, ResourceError> {
        let data = serde_json::to_vec(deployment)?;
        Ok(Api::replace_status(self, deployment.name(), &PostParams::default(), data).await?)
    }
}

struct OperatorState {
    modules: ModuleSet,
}

struct Inner<A, D> {
    /// Name of the resource we reconcile.
    name: String,
    api: Arc<A>,
    deployer: D,
    /// Serializes all work on the backend.
    state: Mutex<OperatorState>,
}

impl<A, D> Inner<A, D>
where
    A: EdgeDeploymentApi,
    D: ModuleDeployer,
{
    async fn deploy(&self, deployment: EdgeDeployment) {
        let mut state = self.state.lock().await;

        let status = match ModuleSet::new(deployment.spec.clone()) {
            Ok(desired) => match self.deployer.deploy_modules(&desired, &state.modules).await {
                Ok(modules) => {
                    state.modules = modules;
                    EdgeDeploymentStatus::success()
                }
                Err(err) => {
                    log::warn!("Failed to deploy modules: {err}");
                    EdgeDeploymentStatus::failure(err)
                }
            },
            Err(err) => {
                log::warn!("Invalid module list: {err}");
                EdgeDeploymentStatus::failure(err)
            }
        };

        self.report_status(&deployment, status).await;
    }

    async fn purge(&self) {
        let mut state = self.state.lock().await;
        self.deployer.purge_modules().await;
        state.modules = ModuleSet::empty();
    }

    async fn report_status(&self, deployment: &EdgeDeployment, status: EdgeDeploymentStatus) {
        if deployment.status.as_ref() == Some(&status) {
            log::debug!("Status unchanged: {status:?}");
            return;
        }

        let mut update = EdgeDeployment::new(deployment.name(), deployment.spec.clone());
        update.metadata.namespace = deployment.metadata.namespace.clone();
        update.metadata.resource_version = deployment.metadata.resource_version.clone();
        update.status = Some(status);

        if let Err(err) = self.api.replace_status(&update).await {
            log::warn!("Failed to report deployment status: {err}");
        }
    }
}

struct EventHandler<A, D>(Arc<Inner<A, D>>);

#[async_trait]
impl<A, D> WatchHandler<EdgeDeployment> for EventHandler<A, D>
where
    A: EdgeDeploymentApi,
    D: ModuleDeployer,
{
    async fn handle(&self, event: ResourceEvent<EdgeDeployment>) -> anyhow::Result<()> {
        let name = event.resource().name();
        if name != self.0.name {
            log::debug!("Ignoring event for other deployment: {name}");
            return Ok(());
        }

        match event {
            ResourceEvent::Added(deployment) | ResourceEvent::Modified(deployment) => {
                log::info!(
                    "Deployment changed (resourceVersion: {:?})",
                    deployment.metadata.resource_version
                );
                self.0.deploy(deployment).await;
            }
            ResourceEvent::Deleted(_) => {
                log::info!("Deployment deleted");
                self.0.purge().await;
            }
        }

        Ok(())
    }
}

/// Watches one `EdgeDeployment` and reconciles its modules, one event at a time.
pub struct DeploymentOperator<A, D> {
    inner: Arc<Inner<A, D>>,
    retry_delay: Duration,
}

impl<A, D> DeploymentOperator<A, D>
where
    A: EdgeDeploymentApi + 'static,
    D: ModuleDeployer + 'static,
{
    pub fn new<S: Into<String>>(name: S, api: A, deployer: D, retry_delay: Duration) -> Self {
        Self {
            inner: Arc::new(Inner {
                name: name.into(),
                api: Arc::new(api),
                deployer,
                state: Mutex::new(OperatorState {
                    modules: ModuleSet::empty(),
                }),
            }),
            retry_delay,
        }
    }

    /// Start watching, in a background task.
    pub fn start(&self) -> OperatorHandle {
        let (shutdown, rx) = watch::channel(false);

        let watcher = Watcher::new(
            self.inner.api.clone(),
            EventHandler(self.inner.clone()),
            self.retry_delay,
        );
        let task = tokio::spawn(watcher.run(rx));

        OperatorHandle { shutdown, task }
    }

    /// The modules currently deployed.
    pub async fn current_modules(&self) -> ModuleSet {
        self.inner.state.lock().await.modules.clone()
    }
}

pub struct OperatorHandle {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl OperatorHandle {
    /// Stop watching, and wait for the event currently being processed.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        if let Err(err) = self.task.await {
            log::warn!("Operator task failed: {err}");
        }
    }
}
