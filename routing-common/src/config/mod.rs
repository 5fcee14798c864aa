//! The desired properties of the edge hub, and their conversion into a runtime configuration.

pub mod authorization;
pub mod bridge;

use crate::route::{Route, RouteError, DEFAULT_PRIORITY};
use authorization::{AuthorizationError, AuthorizationProperties, Statement};
use bridge::{Bridge, BridgeError};
use semver::Version;
use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, time::Duration};
use thiserror::Error;

/// The most recent schema version this implementation understands.
pub const LATEST_SCHEMA_VERSION: Version = Version::new(1, 2, 0);

const ROUTE_OBJECTS_SINCE: Version = Version::new(1, 1, 0);
const BROKER_SINCE: Version = Version::new(1, 2, 0);
const DEFAULT_TIME_TO_LIVE_SECS: u64 = 7200;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to parse desired properties: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("Invalid schema version '{0}'")]
    InvalidSchemaVersion(String),
    #[error("Unsupported schema version {version}, latest supported is {latest}")]
    UnsupportedSchemaVersion { version: Version, latest: Version },
    #[error("{feature} requires schema version {required} or later, found {version}")]
    Feature {
        feature: &'static str,
        required: Version,
        version: Version,
    },
    #[error("Route '{name}': {error}")]
    Route {
        name: String,
        #[source]
        error: RouteError,
    },
    #[error("Invalid authorization policy: {0}")]
    Authorization(#[from] AuthorizationError),
    #[error("Invalid bridge configuration: {0}")]
    Bridge(#[from] BridgeError),
}

/// A route entry, either just the statement or an object with its settings.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum RouteSpec {
    Statement(String),
    #[serde(rename_all = "camelCase")]
    Object {
        route: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        priority: Option<u32>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        time_to_live_secs: Option<u64>,
    },
}

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct StoreAndForwardConfiguration {
    pub time_to_live_secs: u64,
}

impl Default for StoreAndForwardConfiguration {
    fn default() -> Self {
        Self {
            time_to_live_secs: DEFAULT_TIME_TO_LIVE_SECS,
        }
    }
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct BrokerProperties {
    #[serde(default)]
    pub bridges: Vec<Bridge>,
    #[serde(default)]
    pub authorizations: Vec<AuthorizationProperties>,
}

/// The desired properties document of the edge hub.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct EdgeHubDesiredProperties {
    pub schema_version: String,
    #[serde(default)]
    pub routes: BTreeMap<String, RouteSpec>,
    #[serde(default)]
    pub store_and_forward_configuration: StoreAndForwardConfiguration,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mqtt_broker: Option<BrokerProperties>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub integrity: Option<serde_json::Value>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct StoreAndForward {
    pub time_to_live: Duration,
}

#[derive(Clone, Debug, PartialEq)]
pub struct BrokerConfig {
    pub bridges: Vec<Bridge>,
    pub authorizations: Vec<Statement>,
}

/// The runtime configuration of the edge hub.
#[derive(Clone, Debug, PartialEq)]
pub struct EdgeHubConfig {
    pub schema_version: Version,
    pub routes: BTreeMap<String, Route>,
    pub store_and_forward: StoreAndForward,
    pub broker: Option<BrokerConfig>,
    pub integrity: Option<serde_json::Value>,
}

/// Parse a schema version, missing minor and patch components count as zero.
pub fn parse_schema_version(version: &str) -> Result<Version, ConfigError> {
    let version = version.trim();
    let padded = match version.split('.').count() {
        1 => format!("{version}.0.0"),
        2 => format!("{version}.0"),
        _ => version.to_string(),
    };
    Version::parse(&padded).map_err(|_| ConfigError::InvalidSchemaVersion(version.to_string()))
}

fn check_version(version: &Version) -> Result<(), ConfigError> {
    if version.major != LATEST_SCHEMA_VERSION.major || version > &LATEST_SCHEMA_VERSION {
        return Err(ConfigError::UnsupportedSchemaVersion {
            version: version.clone(),
            latest: LATEST_SCHEMA_VERSION,
        });
    }
    Ok(())
}

fn require(feature: &'static str, required: Version, version: &Version) -> Result<(), ConfigError> {
    if version < &required {
        return Err(ConfigError::Feature {
            feature,
            required,
            version: version.clone(),
        });
    }
    Ok(())
}

pub struct RouteConfigParser;

impl RouteConfigParser {
    /// Parse the JSON document of the desired properties.
    pub fn parse(doc: &[u8]) -> Result<EdgeHubConfig, ConfigError> {
        let properties: EdgeHubDesiredProperties = serde_json::from_slice(doc)?;
        Self::convert(properties)
    }

    pub fn convert(properties: EdgeHubDesiredProperties) -> Result<EdgeHubConfig, ConfigError> {
        let version = parse_schema_version(&properties.schema_version)?;
        check_version(&version)?;

        let mut routes = BTreeMap::new();
        for (name, spec) in properties.routes {
            let (text, priority, ttl) = match spec {
                RouteSpec::Statement(text) => (text, DEFAULT_PRIORITY, 0),
                RouteSpec::Object {
                    route,
                    priority,
                    time_to_live_secs,
                } => {
                    require("Route priority and time to live", ROUTE_OBJECTS_SINCE, &version)?;
                    (
                        route,
                        priority.unwrap_or(DEFAULT_PRIORITY),
                        time_to_live_secs.unwrap_or_default(),
                    )
                }
            };

            let route = Route::parse(name.clone(), text, priority, Duration::from_secs(ttl))
                .map_err(|error| ConfigError::Route {
                    name: name.clone(),
                    error,
                })?;
            log::debug!("Compiled route '{name}': {}", route.text);
            routes.insert(name, route);
        }

        let broker = match properties.mqtt_broker {
            Some(broker) => {
                require("MQTT broker configuration", BROKER_SINCE, &version)?;
                for bridge in &broker.bridges {
                    bridge.validate()?;
                }
                Some(BrokerConfig {
                    authorizations: authorization::build_policy(&broker.authorizations)?,
                    bridges: broker.bridges,
                })
            }
            None => None,
        };

        Ok(EdgeHubConfig {
            schema_version: version,
            routes,
            store_and_forward: StoreAndForward {
                time_to_live: Duration::from_secs(
                    properties.store_and_forward_configuration.time_to_live_secs,
                ),
            },
            broker,
            integrity: properties.integrity,
        })
    }
}
