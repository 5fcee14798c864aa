//! Topics exchanged with the broker.
//!
//! Client identities are encoded into the topics as one (`device`) or two (`device/module`)
//! segments, captured as `id1` and `id2`.

use crate::error::TopicError;
use edgeplane_routing_common::message::{
    Message, SYSTEM_PROPERTY_CONNECTION_DEVICE_ID, SYSTEM_PROPERTY_CONNECTION_MODULE_ID,
    SYSTEM_PROPERTY_CONTENT_ENCODING, SYSTEM_PROPERTY_CONTENT_TYPE, SYSTEM_PROPERTY_CORRELATION_ID,
    SYSTEM_PROPERTY_MESSAGE_ID, SYSTEM_PROPERTY_OUTPUT_NAME,
};
use edgeplane_service_api::Identity;
use lazy_static::lazy_static;
use regex::{Captures, Regex};
use std::collections::HashMap;

pub const CONNECTED: &str = "$edgehub/connected";

macro_rules! topic {
    ($pattern:expr) => {
        Regex::new($pattern).expect("valid topic regex")
    };
}

lazy_static! {
    pub static ref SUBSCRIPTIONS: Regex =
        topic!(r"^\$edgehub/(?P<id1>[^/+#]+)(?:/(?P<id2>[^/+#]+))?/subscriptions$");
    pub static ref TELEMETRY: Regex =
        topic!(r"^\$edgehub/(?P<id1>[^/+#]+)(?:/(?P<id2>[^/+#]+))?/messages/events/(?P<props>.*)$");
    pub static ref MODULE_OUTPUT: Regex =
        topic!(r"^\$edgehub/(?P<id1>[^/+#]+)/(?P<id2>[^/+#]+)/outputs/(?P<props>.*)$");
    pub static ref METHOD_RESPONSE: Regex = topic!(
        r"^\$edgehub/(?P<id1>[^/+#]+)(?:/(?P<id2>[^/+#]+))?/methods/res/(?P<status>\d+)/\?\$rid=(?P<rid>.+)$"
    );
    pub static ref TWIN_GET: Regex =
        topic!(r"^\$edgehub/(?P<id1>[^/+#]+)(?:/(?P<id2>[^/+#]+))?/twin/get/\?\$rid=(?P<rid>.+)$");
    pub static ref TWIN_REPORTED: Regex = topic!(
        r"^\$edgehub/(?P<id1>[^/+#]+)(?:/(?P<id2>[^/+#]+))?/twin/reported/\?\$rid=(?P<rid>.+)$"
    );
    pub static ref CONNECTED_TOPIC: Regex = topic!(r"^\$edgehub/connected$");

    // subscriptions of clients, enabling a capability of their connection

    pub static ref METHODS_SUBSCRIPTION: Regex =
        topic!(r"^\$edgehub/(?P<id1>[^/+#]+)(?:/(?P<id2>[^/+#]+))?/methods/post/#$");
    pub static ref TWIN_RESPONSE_SUBSCRIPTION: Regex =
        topic!(r"^\$edgehub/(?P<id1>[^/+#]+)(?:/(?P<id2>[^/+#]+))?/twin/res/#$");
    pub static ref DESIRED_SUBSCRIPTION: Regex =
        topic!(r"^\$edgehub/(?P<id1>[^/+#]+)(?:/(?P<id2>[^/+#]+))?/twin/desired/#$");
    pub static ref INPUTS_SUBSCRIPTION: Regex =
        topic!(r"^\$edgehub/(?P<id1>[^/+#]+)(?:/(?P<id2>[^/+#]+))?/inputs/#$");
    pub static ref C2D_SUBSCRIPTION: Regex =
        topic!(r"^\$edgehub/(?P<id1>[^/+#]+)(?:/(?P<id2>[^/+#]+))?/messages/c2d/post/#$");
    pub static ref MODULE_MESSAGES_SUBSCRIPTION: Regex =
        topic!(r"^devices/(?P<id1>[^/+#]+)/modules/(?P<id2>[^/+#]+)/#$");
}

/// The identity encoded into a matched topic.
pub fn identity_from_captures(captures: &Captures) -> Result<Identity, TopicError> {
    let id1 = captures.name("id1").map_or("", |m| m.as_str());
    let id2 = captures.name("id2").map(|m| m.as_str());
    Ok(Identity::from_parts(id1, id2)?)
}

/// Match the topic and extract its identity.
pub fn match_identity<'t>(
    pattern: &Regex,
    topic: &'t str,
) -> Result<(Identity, Captures<'t>), TopicError> {
    let captures = pattern
        .captures(topic)
        .ok_or_else(|| TopicError::Unmatched(topic.to_string()))?;
    let identity = identity_from_captures(&captures)?;
    Ok((identity, captures))
}

/// The topic prefix addressing a client.
pub fn client_topic(identity: &Identity) -> String {
    format!("$edgehub/{identity}")
}

/// Short names of system properties in a topic's property bag.
const SYSTEM_PROPERTIES: [(&str, &str); 7] = [
    ("$.mid", SYSTEM_PROPERTY_MESSAGE_ID),
    ("$.cid", SYSTEM_PROPERTY_CORRELATION_ID),
    ("$.ct", SYSTEM_PROPERTY_CONTENT_TYPE),
    ("$.ce", SYSTEM_PROPERTY_CONTENT_ENCODING),
    ("$.on", SYSTEM_PROPERTY_OUTPUT_NAME),
    ("$.cdid", SYSTEM_PROPERTY_CONNECTION_DEVICE_ID),
    ("$.cmid", SYSTEM_PROPERTY_CONNECTION_MODULE_ID),
];

/// Application and system properties of a message, as encoded in a topic.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PropertyBag {
    pub properties: HashMap<String, String>,
    pub system_properties: HashMap<String, String>,
}

impl PropertyBag {
    /// Decode a url-encoded property bag, like `$.ct=application%2Fjson&a=1`.
    pub fn decode(bag: &str) -> Self {
        let bag = bag.trim_start_matches('?').trim_end_matches('/');
        let mut result = Self::default();

        for (key, value) in url::form_urlencoded::parse(bag.as_bytes()) {
            match key.strip_prefix("$.") {
                Some(short) => {
                    let name = SYSTEM_PROPERTIES
                        .iter()
                        .find(|(encoded, _)| *encoded == key)
                        .map_or(short, |(_, name)| *name);
                    result
                        .system_properties
                        .insert(name.to_string(), value.into_owned());
                }
                None => {
                    result.properties.insert(key.into_owned(), value.into_owned());
                }
            }
        }

        result
    }

    /// Encode the properties of a message, sorted by key.
    pub fn encode(message: &Message) -> String {
        let mut system = message
            .system_properties
            .iter()
            .map(|(name, value)| {
                let key = SYSTEM_PROPERTIES
                    .iter()
                    .find(|(_, known)| *known == name.as_str())
                    .map_or_else(|| format!("$.{name}"), |(encoded, _)| encoded.to_string());
                (key, value)
            })
            .collect::<Vec<_>>();
        system.sort();

        let mut properties = message.properties.iter().collect::<Vec<_>>();
        properties.sort();

        let mut serializer = url::form_urlencoded::Serializer::new(String::new());
        for (key, value) in properties {
            serializer.append_pair(key, value);
        }
        for (key, value) in system {
            serializer.append_pair(&key, value);
        }
        serializer.finish()
    }

    pub fn apply(self, mut message: Message) -> Message {
        message.properties.extend(self.properties);
        message.system_properties.extend(self.system_properties);
        message
    }
}
