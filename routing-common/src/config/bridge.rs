//! Broker bridges to the upstream hub.

use serde::{Deserialize, Serialize};
use thiserror::Error;

const UPSTREAM: &str = "$upstream";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum BridgeError {
    #[error("Unsupported bridge endpoint '{0}', only $upstream is supported")]
    Endpoint(String),
    #[error("Bridge setting {0}: topic must not be empty")]
    MissingTopic(usize),
    #[error("Bridge setting {0}: prefixes must not contain wildcards")]
    WildcardPrefix(usize),
}

#[derive(Copy, Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum Direction {
    In,
    Out,
    Both,
}

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Setting {
    pub direction: Direction,
    pub topic: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub in_prefix: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub out_prefix: Option<String>,
}

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Bridge {
    pub endpoint: String,
    #[serde(default)]
    pub settings: Vec<Setting>,
}

fn has_wildcard(prefix: &Option<String>) -> bool {
    prefix
        .as_deref()
        .map_or(false, |prefix| prefix.contains(['#', '+']))
}

impl Bridge {
    pub fn validate(&self) -> Result<(), BridgeError> {
        if self.endpoint != UPSTREAM {
            return Err(BridgeError::Endpoint(self.endpoint.clone()));
        }

        for (index, setting) in self.settings.iter().enumerate() {
            if setting.topic.trim().is_empty() {
                return Err(BridgeError::MissingTopic(index));
            }
            if has_wildcard(&setting.in_prefix) || has_wildcard(&setting.out_prefix) {
                return Err(BridgeError::WildcardPrefix(index));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use serde_json::json;

    fn bridge(value: serde_json::Value) -> Bridge {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_validate() {
        let ok = bridge(json!({
            "endpoint": "$upstream",
            "settings": [
                { "direction": "in", "topic": "alerts/#", "outPrefix": "local/" },
                { "direction": "both", "topic": "twin/#" },
            ]
        }));
        assert_eq!(ok.validate(), Ok(()));
        assert_eq!(ok.settings[0].direction, Direction::In);
        assert_eq!(ok.settings[0].out_prefix.as_deref(), Some("local/"));

        assert_eq!(
            bridge(json!({"endpoint": "other", "settings": []})).validate(),
            Err(BridgeError::Endpoint("other".into()))
        );
        assert_eq!(
            bridge(json!({"endpoint": "$upstream", "settings": [{"direction": "out", "topic": ""}]}))
                .validate(),
            Err(BridgeError::MissingTopic(0))
        );
        assert_eq!(
            bridge(json!({"endpoint": "$upstream", "settings": [{"direction": "out", "topic": "a", "inPrefix": "x/+/"}]}))
                .validate(),
            Err(BridgeError::WildcardPrefix(0))
        );
    }
}
