use async_trait::async_trait;
use edgeplane_operator_common::{api::ResourceApi, error::ResourceError};
use kube::Resource;
use std::{
    collections::BTreeMap,
    sync::{Arc, PoisonError, RwLock},
};

/// A call made to the [`MockApi`].
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum Call {
    List(Option<String>),
    Get(String),
    Create(String),
    Replace(String),
    Delete(String),
}

impl Call {
    /// Check if the call modifies state.
    pub fn is_write(&self) -> bool {
        matches!(self, Self::Create(_) | Self::Replace(_) | Self::Delete(_))
    }
}

#[derive(Debug)]
struct State<K> {
    items: BTreeMap<String, K>,
    calls: Vec<Call>,
    failing: Vec<Call>,
    version: u64,
}

impl<K> Default for State<K> {
    fn default() -> Self {
        Self {
            items: Default::default(),
            calls: vec![],
            failing: vec![],
            version: 0,
        }
    }
}

/// An in-memory backend for one kind of resources, recording all calls.
///
/// Clones share the same state.
#[derive(Debug)]
pub struct MockApi<K> {
    state: Arc<RwLock<State<K>>>,
}

impl<K> Clone for MockApi<K> {
    fn clone(&self) -> Self {
        Self {
            state: self.state.clone(),
        }
    }
}

impl<K> Default for MockApi<K> {
    fn default() -> Self {
        Self {
            state: Default::default(),
        }
    }
}

fn name_of<K: Resource>(resource: &K) -> String {
    resource.meta().name.clone().unwrap_or_default()
}

/// Check the labels of the resource against a simple `k=v,k=v` selector.
fn matches_selector<K: Resource>(resource: &K, selector: &str) -> bool {
    let labels = resource.meta().labels.as_ref();
    selector
        .split(',')
        .filter(|s| !s.is_empty())
        .all(|term| match term.split_once('=') {
            Some((k, v)) => labels.and_then(|labels| labels.get(k)).map(String::as_str) == Some(v),
            None => labels.map(|labels| labels.contains_key(term)).unwrap_or_default(),
        })
}

impl<K> MockApi<K>
where
    K: Resource + Clone,
{
    pub fn new() -> Self {
        Self::default()
    }

    /// Store resources, without recording a call.
    pub fn with<I>(self, resources: I) -> Self
    where
        I: IntoIterator<Item = K>,
    {
        for resource in resources {
            self.insert(resource);
        }
        self
    }

    /// Store a resource, without recording a call, assigning a resource version.
    pub fn insert(&self, mut resource: K) {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        state.version += 1;
        resource.meta_mut().resource_version = Some(state.version.to_string());
        state.items.insert(name_of(&resource), resource);
    }

    pub fn items(&self) -> Vec<K> {
        self.state.read().unwrap_or_else(PoisonError::into_inner).items.values().cloned().collect()
    }

    pub fn item(&self, name: &str) -> Option<K> {
        self.state.read().unwrap_or_else(PoisonError::into_inner).items.get(name).cloned()
    }

    pub fn calls(&self) -> Vec<Call> {
        self.state.read().unwrap_or_else(PoisonError::into_inner).calls.clone()
    }

    /// Calls which modified state.
    pub fn writes(&self) -> Vec<Call> {
        self.calls().into_iter().filter(Call::is_write).collect()
    }

    pub fn reset_calls(&self) {
        self.state.write().unwrap_or_else(PoisonError::into_inner).calls.clear();
    }

    /// Let matching calls fail with a backend error.
    pub fn fail_on(&self, call: Call) {
        self.state.write().unwrap_or_else(PoisonError::into_inner).failing.push(call);
    }

    fn record(&self, call: Call) -> Result<(), ResourceError> {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        let failing = state.failing.contains(&call);
        state.calls.push(call.clone());
        if failing {
            Err(ResourceError::backend(format!("Mock failure: {call:?}")))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl<K> ResourceApi<K> for MockApi<K>
where
    K: Resource + Clone + Send + Sync,
{
    async fn list(&self, selector: Option<&str>) -> Result<Vec<K>, ResourceError> {
        self.record(Call::List(selector.map(ToString::to_string)))?;
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        Ok(state
            .items
            .values()
            .filter(|item| selector.map_or(true, |selector| matches_selector(*item, selector)))
            .cloned()
            .collect())
    }

    async fn get(&self, name: &str) -> Result<Option<K>, ResourceError> {
        self.record(Call::Get(name.into()))?;
        Ok(self.item(name))
    }

    async fn create(&self, resource: &K) -> Result<K, ResourceError> {
        let name = name_of(resource);
        self.record(Call::Create(name.clone()))?;

        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        if state.items.contains_key(&name) {
            return Err(ResourceError::Conflict(format!("{name} already exists")));
        }
        state.version += 1;
        let mut resource = resource.clone();
        resource.meta_mut().resource_version = Some(state.version.to_string());
        state.items.insert(name, resource.clone());
        Ok(resource)
    }

    async fn replace(&self, name: &str, resource: &K) -> Result<K, ResourceError> {
        self.record(Call::Replace(name.into()))?;

        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        let current = state
            .items
            .get(name)
            .ok_or_else(|| ResourceError::NotFound(name.into()))?;

        let expected = &resource.meta().resource_version;
        if expected.is_some() && expected != &current.meta().resource_version {
            return Err(ResourceError::Conflict(format!(
                "{name}: resource version mismatch"
            )));
        }

        state.version += 1;
        let mut resource = resource.clone();
        resource.meta_mut().resource_version = Some(state.version.to_string());
        state.items.insert(name.into(), resource.clone());
        Ok(resource)
    }

    async fn delete(&self, name: &str) -> Result<(), ResourceError> {
        self.record(Call::Delete(name.into()))?;
        self.state.write().unwrap_or_else(PoisonError::into_inner).items.remove(name);
        Ok(())
    }
}
