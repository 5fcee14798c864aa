use bytes::Bytes;
use std::collections::HashMap;

pub const SYSTEM_PROPERTY_CONTENT_TYPE: &str = "contentType";
pub const SYSTEM_PROPERTY_CONTENT_ENCODING: &str = "contentEncoding";
pub const SYSTEM_PROPERTY_CONNECTION_DEVICE_ID: &str = "connectionDeviceId";
pub const SYSTEM_PROPERTY_CONNECTION_MODULE_ID: &str = "connectionModuleId";
pub const SYSTEM_PROPERTY_OUTPUT_NAME: &str = "outputName";
pub const SYSTEM_PROPERTY_MESSAGE_ID: &str = "messageId";
pub const SYSTEM_PROPERTY_CORRELATION_ID: &str = "correlationId";

const CONTENT_TYPE_JSON: &str = "application/json";
const CONTENT_ENCODING_UTF8: &str = "utf-8";

/// Where a message came from.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MessageSource {
    /// Telemetry of a device, not sent by a module.
    Telemetry,
    /// Sent by a module, optionally on a named output.
    Module {
        module: String,
        output: Option<String>,
    },
    TwinChangeNotification,
}

/// A message as seen by the router.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Message {
    pub source: MessageSource,
    pub body: Bytes,
    /// Application properties.
    pub properties: HashMap<String, String>,
    /// System properties, keyed without the `$` prefix.
    pub system_properties: HashMap<String, String>,
}

impl Message {
    pub fn new<B: Into<Bytes>>(source: MessageSource, body: B) -> Self {
        Self {
            source,
            body: body.into(),
            properties: Default::default(),
            system_properties: Default::default(),
        }
    }

    pub fn telemetry<B: Into<Bytes>>(body: B) -> Self {
        Self::new(MessageSource::Telemetry, body)
    }

    pub fn property<K, V>(mut self, key: K, value: V) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        self.properties.insert(key.into(), value.into());
        self
    }

    pub fn system_property<K, V>(mut self, key: K, value: V) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        self.system_properties.insert(key.into(), value.into());
        self
    }

    /// Mark the body as UTF-8 encoded JSON.
    pub fn json(self) -> Self {
        self.system_property(SYSTEM_PROPERTY_CONTENT_TYPE, CONTENT_TYPE_JSON)
            .system_property(SYSTEM_PROPERTY_CONTENT_ENCODING, CONTENT_ENCODING_UTF8)
    }

    /// The body as JSON, if the message says it is, or doesn't say anything but the body parses.
    pub fn json_body(&self) -> Option<serde_json::Value> {
        let content_type = self.system_properties.get(SYSTEM_PROPERTY_CONTENT_TYPE);
        let content_encoding = self.system_properties.get(SYSTEM_PROPERTY_CONTENT_ENCODING);

        match (content_type, content_encoding) {
            (Some(content_type), Some(content_encoding))
                if content_type.eq_ignore_ascii_case(CONTENT_TYPE_JSON)
                    && content_encoding.eq_ignore_ascii_case(CONTENT_ENCODING_UTF8) => {}
            (None, None) => {}
            _ => return None,
        }

        serde_json::from_slice(&self.body).ok()
    }
}
