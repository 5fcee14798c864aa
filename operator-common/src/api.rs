use crate::error::ResourceError;
use async_trait::async_trait;
use kube::{
    api::{DeleteParams, ListParams, PostParams},
    Api,
};
use serde::{de::DeserializeOwned, Serialize};
use std::fmt::Debug;

/// Access to one kind of resources, in one namespace, of the orchestration backend.
#[async_trait]
pub trait ResourceApi<K>: Send + Sync {
    /// List resources, optionally filtered by a label selector.
    async fn list(&self, selector: Option<&str>) -> Result<Vec<K>, ResourceError>;

    async fn get(&self, name: &str) -> Result<Option<K>, ResourceError>;

    async fn create(&self, resource: &K) -> Result<K, ResourceError>;

    /// Replace an existing resource, the resource version of `resource` must match.
    async fn replace(&self, name: &str, resource: &K) -> Result<K, ResourceError>;

    /// Delete a resource. Deleting a resource which doesn't exist is not an error.
    async fn delete(&self, name: &str) -> Result<(), ResourceError>;
}

#[async_trait]
impl<K> ResourceApi<K> for Api<K>
where
    K: Clone + Debug + DeserializeOwned + Serialize + Send + Sync + 'static,
{
    async fn list(&self, selector: Option<&str>) -> Result<Vec<K>, ResourceError> {
        let lp = match selector {
            Some(selector) => ListParams::default().labels(selector),
            None => ListParams::default(),
        };
        Ok(Api::list(self, &lp).await?.items)
    }

    async fn get(&self, name: &str) -> Result<Option<K>, ResourceError> {
        match Api::get(self, name).await {
            Ok(resource) => Ok(Some(resource)),
            Err(kube::Error::Api(response)) if response.code == 404 => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    async fn create(&self, resource: &K) -> Result<K, ResourceError> {
        Ok(Api::create(self, &PostParams::default(), resource).await?)
    }

    async fn replace(&self, name: &str, resource: &K) -> Result<K, ResourceError> {
        Ok(Api::replace(self, name, &PostParams::default(), resource).await?)
    }

    async fn delete(&self, name: &str) -> Result<(), ResourceError> {
        match Api::delete(self, name, &DeleteParams::default()).await {
            Ok(_) => Ok(()),
            Err(kube::Error::Api(response)) if response.code == 404 => {
                log::debug!("Resource {name} already gone");
                Ok(())
            }
            Err(err) => Err(err.into()),
        }
    }
}
