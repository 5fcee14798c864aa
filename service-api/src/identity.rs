use core::fmt::{self, Formatter};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use thiserror::Error;

pub const IDENTITY_SEPARATOR: char = '/';
/// The module of an edge device relaying the messages of its children.
pub const EDGE_HUB_MODULE: &str = "$edgeHub";

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum IdentityError {
    #[error("Empty identity")]
    Empty,
    #[error("Identity contains an empty segment: '{0}'")]
    EmptySegment(String),
    #[error("Identity must have one or two segments, found {0}")]
    Segments(usize),
}

/// A device, or a module of a device.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Identity {
    Device(String),
    Module(String, String),
}

impl Identity {
    pub fn device<D: Into<String>>(device_id: D) -> Self {
        Self::Device(device_id.into())
    }

    pub fn module<D: Into<String>, M: Into<String>>(device_id: D, module_id: M) -> Self {
        Self::Module(device_id.into(), module_id.into())
    }

    /// Create an identity from the two captures of a topic.
    pub fn from_parts(id1: &str, id2: Option<&str>) -> Result<Self, IdentityError> {
        match (id1, id2) {
            ("", _) => Err(IdentityError::Empty),
            (device, None) => Ok(Self::device(device)),
            (device, Some("")) => Err(IdentityError::EmptySegment(format!("{device}/"))),
            (device, Some(module)) => Ok(Self::module(device, module)),
        }
    }

    pub fn device_id(&self) -> &str {
        match self {
            Self::Device(device) | Self::Module(device, _) => device,
        }
    }

    pub fn module_id(&self) -> Option<&str> {
        match self {
            Self::Device(_) => None,
            Self::Module(_, module) => Some(module),
        }
    }

    pub fn is_edge_hub(&self) -> bool {
        self.module_id() == Some(EDGE_HUB_MODULE)
    }
}

impl FromStr for Identity {
    type Err = IdentityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            return Err(IdentityError::Empty);
        }

        let segments = s.split(IDENTITY_SEPARATOR).collect::<Vec<_>>();
        if segments.iter().any(|s| s.is_empty()) {
            return Err(IdentityError::EmptySegment(s.into()));
        }

        match segments.as_slice() {
            [device] => Ok(Self::device(*device)),
            [device, module] => Ok(Self::module(*device, *module)),
            segments => Err(IdentityError::Segments(segments.len())),
        }
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::Device(device) => f.write_str(device),
            Self::Module(device, module) => write!(f, "{device}{IDENTITY_SEPARATOR}{module}"),
        }
    }
}

impl TryFrom<String> for Identity {
    type Error = IdentityError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Identity> for String {
    fn from(value: Identity) -> Self {
        value.to_string()
    }
}

pub const AUTH_SCHEME_SAS_TOKEN: &str = "sasToken";

/// Credentials a module uses to connect.
#[derive(Clone, PartialEq, Eq)]
pub enum Credentials {
    /// Credentials are provided by the workload identity provider.
    IdentityProvider {
        auth_scheme: String,
        generation_id: Option<String>,
    },
    ConnectionString(String),
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::IdentityProvider {
                auth_scheme,
                generation_id,
            } => f
                .debug_struct("IdentityProvider")
                .field("auth_scheme", auth_scheme)
                .field("generation_id", generation_id)
                .finish(),
            Self::ConnectionString(_) => f.debug_tuple("ConnectionString").field(&"...").finish(),
        }
    }
}

/// The identity of a deployed module.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ModuleIdentity {
    pub iot_hub_hostname: String,
    pub gateway_hostname: Option<String>,
    pub device_id: String,
    pub module_id: String,
    pub credentials: Credentials,
}

impl ModuleIdentity {
    pub fn identity(&self) -> Identity {
        Identity::module(&self.device_id, &self.module_id)
    }
}
