use crate::diff::{keyed, Diff};
use core::fmt::{self, Formatter};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

pub const MODULE_TYPE_DOCKER: &str = "docker";

/// A module, as it should run on the orchestration backend.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KubernetesModule {
    pub name: String,
    #[serde(default)]
    pub version: String,
    #[serde(rename = "type", default = "default_module_type")]
    pub r#type: String,
    #[serde(default)]
    pub status: ModuleStatus,
    #[serde(default)]
    pub restart_policy: RestartPolicy,
    #[serde(default)]
    pub image_pull_policy: ImagePullPolicy,
    pub config: KubernetesConfig,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub env: BTreeMap<String, EnvValue>,
}

fn default_module_type() -> String {
    MODULE_TYPE_DOCKER.into()
}

impl KubernetesModule {
    pub fn new<N, I>(name: N, image: I) -> Self
    where
        N: Into<String>,
        I: Into<String>,
    {
        Self {
            name: name.into(),
            version: "1.0".into(),
            r#type: default_module_type(),
            status: Default::default(),
            restart_policy: Default::default(),
            image_pull_policy: Default::default(),
            config: KubernetesConfig {
                image: image.into(),
                create_options: Default::default(),
                auth: None,
            },
            env: Default::default(),
        }
    }
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModuleStatus {
    #[default]
    Running,
    Stopped,
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RestartPolicy {
    Never,
    OnFailure,
    OnUnhealthy,
    #[default]
    Always,
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ImagePullPolicy {
    #[default]
    OnCreate,
    Never,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KubernetesConfig {
    pub image: String,
    #[serde(default)]
    pub create_options: CreateOptions,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth: Option<AuthConfig>,
}

/// The subset of the container create options, understood by the resource mappers.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct CreateOptions {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub env: Vec<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub exposed_ports: BTreeMap<String, serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host_config: Option<HostConfig>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub node_selector: BTreeMap<String, String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct HostConfig {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub binds: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub mounts: Vec<Mount>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub port_bindings: BTreeMap<String, Vec<PortBinding>>,
    #[serde(default)]
    pub privileged: bool,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Mount {
    #[serde(rename = "Type")]
    pub r#type: String,
    pub source: String,
    pub target: String,
    #[serde(default)]
    pub read_only: bool,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct PortBinding {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host_ip: Option<String>,
    pub host_port: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvValue {
    pub value: String,
}

/// Registry credentials of a module.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthConfig {
    pub username: String,
    pub password: String,
    pub serveraddress: String,
}

impl fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthConfig")
            .field("username", &self.username)
            .field("password", &"...")
            .field("serveraddress", &self.serveraddress)
            .finish()
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ModuleSetError {
    #[error("Duplicate module name: {0}")]
    DuplicateName(String),
}

/// An immutable set of modules, keyed by their name.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ModuleSet(BTreeMap<String, KubernetesModule>);

impl ModuleSet {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn new<I>(modules: I) -> Result<Self, ModuleSetError>
    where
        I: IntoIterator<Item = KubernetesModule>,
    {
        let mut result = BTreeMap::new();
        for module in modules {
            if result.contains_key(&module.name) {
                return Err(ModuleSetError::DuplicateName(module.name));
            }
            result.insert(module.name.clone(), module);
        }
        Ok(Self(result))
    }

    pub fn get(&self, name: &str) -> Option<&KubernetesModule> {
        self.0.get(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &KubernetesModule> {
        self.0.values()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(|s| s.as_str())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Diff this (desired) set against an existing one, using structural equality.
    pub fn diff(&self, existing: &ModuleSet) -> Diff<String, KubernetesModule> {
        Diff::create_with(self.0.clone(), existing.0.clone(), |a, b| a == b)
    }

    pub fn into_modules(self) -> Vec<KubernetesModule> {
        self.0.into_values().collect()
    }
}

impl TryFrom<Vec<KubernetesModule>> for ModuleSet {
    type Error = ModuleSetError;

    fn try_from(value: Vec<KubernetesModule>) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<ModuleSet> for Vec<KubernetesModule> {
    fn from(value: ModuleSet) -> Self {
        value.into_modules()
    }
}

/// Key modules by their name, without checking for duplicates.
pub fn modules_by_name<I>(modules: I) -> BTreeMap<String, KubernetesModule>
where
    I: IntoIterator<Item = KubernetesModule>,
{
    keyed(modules, |m| m.name.clone())
}

#[cfg(test)]
mod test {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_deserialize() {
        let module: KubernetesModule = serde_json::from_value(json!({
            "name": "module-a",
            "version": "1.0",
            "type": "docker",
            "status": "running",
            "restartPolicy": "on-unhealthy",
            "imagePullPolicy": "never",
            "config": {
                "image": "example.com/module-a:1.0",
                "createOptions": {
                    "Env": ["FOO=bar"],
                    "ExposedPorts": { "80/tcp": {} },
                    "HostConfig": {
                        "PortBindings": { "80/tcp": [ { "HostPort": "8080" } ] },
                        "Mounts": [ { "Type": "volume", "Source": "data", "Target": "/data" } ]
                    }
                },
                "auth": {
                    "username": "user",
                    "password": "secret",
                    "serveraddress": "example.com"
                }
            },
            "env": { "BAR": { "value": "baz" } }
        }))
        .unwrap();

        assert_eq!(module.name, "module-a");
        assert_eq!(module.restart_policy, RestartPolicy::OnUnhealthy);
        assert_eq!(module.image_pull_policy, ImagePullPolicy::Never);
        assert_eq!(module.config.create_options.env, vec!["FOO=bar"]);
        let host = module.config.create_options.host_config.as_ref().unwrap();
        assert_eq!(host.port_bindings["80/tcp"][0].host_port, "8080");
        assert_eq!(host.mounts[0].r#type, "volume");
        assert!(!host.mounts[0].read_only);
        assert_eq!(module.env["BAR"].value, "baz");
    }

    #[test]
    fn test_defaults() {
        let module: KubernetesModule = serde_json::from_value(json!({
            "name": "m",
            "config": { "image": "m:1" }
        }))
        .unwrap();

        assert_eq!(module.r#type, MODULE_TYPE_DOCKER);
        assert_eq!(module.status, ModuleStatus::Running);
        assert_eq!(module.restart_policy, RestartPolicy::Always);
        assert_eq!(module.image_pull_policy, ImagePullPolicy::OnCreate);
    }

    #[test]
    fn test_no_leak_password() {
        let auth = AuthConfig {
            username: "user".into(),
            password: "secret".into(),
            serveraddress: "example.com".into(),
        };
        assert!(!format!("{auth:?}").contains("secret"));
    }

    #[test]
    fn test_module_set_unique() {
        let result = ModuleSet::new(vec![
            KubernetesModule::new("a", "a:1"),
            KubernetesModule::new("a", "a:2"),
        ]);
        assert_eq!(result, Err(ModuleSetError::DuplicateName("a".into())));
    }

    #[test]
    fn test_module_set_equality() {
        let a = ModuleSet::new(vec![
            KubernetesModule::new("a", "a:1"),
            KubernetesModule::new("b", "b:1"),
        ])
        .unwrap();
        let b = ModuleSet::new(vec![
            KubernetesModule::new("b", "b:1"),
            KubernetesModule::new("a", "a:1"),
        ])
        .unwrap();
        assert_eq!(a, b);
        assert!(a.diff(&b).is_empty());
    }

    #[test]
    fn test_module_set_diff() {
        let desired = ModuleSet::new(vec![
            KubernetesModule::new("a", "a:2"),
            KubernetesModule::new("b", "b:1"),
        ])
        .unwrap();
        let current = ModuleSet::new(vec![
            KubernetesModule::new("a", "a:1"),
            KubernetesModule::new("c", "c:1"),
        ])
        .unwrap();

        let diff = desired.diff(&current);
        assert_eq!(diff.added.len(), 1);
        assert_eq!(diff.added[0].name, "b");
        assert_eq!(diff.removed, vec!["c".to_string()]);
        assert_eq!(diff.updated.len(), 1);
        assert_eq!(diff.updated[0].from.config.image, "a:1");
        assert_eq!(diff.updated[0].to.config.image, "a:2");
    }
}
