use serde::Deserialize;
use std::collections::HashMap;

/// Nesting separator for environment variables, e.g. `MAPPER__STORAGE_CLASS_NAME`.
pub const SEPARATOR: &str = "__";

/// Load a configuration structure from environment variables.
pub trait ConfigFromEnv<'de>: Sized + Deserialize<'de> {
    /// Load from the process environment.
    fn from_env() -> Result<Self, config::ConfigError> {
        Self::from_source(config::Environment::default())
    }

    /// Load from the process environment, only considering variables with the prefix.
    fn from_env_prefix<S: AsRef<str>>(prefix: S) -> Result<Self, config::ConfigError> {
        Self::from_source(config::Environment::with_prefix(prefix.as_ref()))
    }

    /// Load from a fixed set of variables, instead of the process environment.
    fn from_set<K, V>(set: HashMap<K, V>) -> Result<Self, config::ConfigError>
    where
        K: Into<String>,
        V: Into<String>,
    {
        let set = set
            .into_iter()
            .map(|(k, v)| (k.into().to_uppercase(), v.into()))
            .collect();
        Self::from_source(config::Environment::default().source(Some(set)))
    }

    fn from_source(env: config::Environment) -> Result<Self, config::ConfigError>;
}

impl<'de, T> ConfigFromEnv<'de> for T
where
    T: Deserialize<'de> + Sized,
{
    fn from_source(env: config::Environment) -> Result<T, config::ConfigError> {
        config::Config::builder()
            .add_source(env.try_parsing(true).separator(SEPARATOR))
            .build()?
            .try_deserialize()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use serde::Deserialize;
    use std::time::Duration;

    #[derive(Debug, Deserialize)]
    struct Operator {
        pub namespace: String,
        #[serde(default, with = "humantime_serde")]
        pub watch_retry_delay: Option<Duration>,
        pub mapper: Mapper,
    }

    #[derive(Debug, Deserialize)]
    struct Mapper {
        #[serde(default)]
        pub storage_class_name: Option<String>,
        pub persistent_volume_claim_default_size_mb: u32,
    }

    #[test]
    fn test_nested() {
        let mut env = HashMap::new();
        env.insert("NAMESPACE", "edge");
        env.insert("WATCH_RETRY_DELAY", "5s");
        env.insert("MAPPER__STORAGE_CLASS_NAME", "local");
        env.insert("MAPPER__PERSISTENT_VOLUME_CLAIM_DEFAULT_SIZE_MB", "250");

        let cfg = Operator::from_set(env).unwrap();

        assert_eq!(cfg.namespace, "edge");
        assert_eq!(cfg.watch_retry_delay, Some(Duration::from_secs(5)));
        assert_eq!(cfg.mapper.storage_class_name.as_deref(), Some("local"));
        assert_eq!(cfg.mapper.persistent_volume_claim_default_size_mb, 250);
    }

    #[test]
    fn test_missing() {
        let env = HashMap::<String, String>::new();
        assert!(Operator::from_set(env).is_err());
    }

    #[test]
    fn test_prefix() {
        #[derive(Debug, Deserialize)]
        struct Simple {
            pub device_id: String,
        }

        let mut env = HashMap::<String, String>::new();
        env.insert("EDGE__DEVICE_ID".into(), "device-1".into());

        let cfg = <Simple as ConfigFromEnv>::from_source(
            config::Environment::with_prefix("EDGE").source(Some(env)),
        )
        .unwrap();

        assert_eq!(cfg.device_id, "device-1");
    }
}
