use crate::{
    condition::{CompilationErrors, CompilerFlags, Condition},
    message::{Message, MessageSource},
};
use lazy_static::lazy_static;
use regex::Regex;
use std::{fmt, time::Duration};
use thiserror::Error;

/// Priority of routes which don't define one, lower than any explicit priority.
pub const DEFAULT_PRIORITY: u32 = u32::MAX;
/// The highest explicit priority value, `0` being the most important.
pub const MAX_PRIORITY: u32 = 9;

const UPSTREAM: &str = "$upstream";
const TWIN_CHANGE_NOTIFICATIONS: &str = "/twinChangeNotifications";

lazy_static! {
    static ref ROUTE: Regex = Regex::new(
        r#"(?is)^\s*FROM\s+(?P<source>\S+)(?:\s+WHERE\s+(?P<condition>.+))?\s+INTO\s+(?P<endpoint>.+?)\s*;?\s*$"#
    )
    .expect("valid route regex");
    static ref BROKERED: Regex = Regex::new(
        r#"(?i)^BrokeredEndpoint\s*\(\s*["'](?P<target>[^"']*)["']\s*\)$"#
    )
    .expect("valid endpoint regex");
    static ref MODULE_INPUT: Regex =
        Regex::new(r"^/modules/(?P<module>[^/]+)/inputs/(?P<input>[^/]+)$")
            .expect("valid module input regex");
    static ref MODULE_SOURCE: Regex = Regex::new(
        r"^/messages/modules/(?P<module>[^/]+)(?:/\*|/outputs/(?P<output>[^/]+))$"
    )
    .expect("valid module source regex");
}

#[derive(Debug, Error)]
pub enum RouteError {
    #[error("Invalid route syntax: {0}")]
    Syntax(String),
    #[error("Unknown route source: {0}")]
    Source(String),
    #[error("Unknown route endpoint: {0}")]
    Endpoint(String),
    #[error("Invalid priority {0}, must be between 0 and 9")]
    Priority(u32),
    #[error(transparent)]
    Condition(#[from] CompilationErrors),
}

/// The messages a route applies to.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Source {
    /// `/messages/*`
    Messages,
    /// `/messages/modules/<module>/*`
    Module(String),
    /// `/messages/modules/<module>/outputs/*`
    ModuleOutputs(String),
    /// `/messages/modules/<module>/outputs/<output>`
    ModuleOutput(String, String),
    /// `/twinChangeNotifications`
    TwinChangeNotifications,
}

impl Source {
    pub fn parse(source: &str) -> Result<Self, RouteError> {
        if source == "/messages/*" {
            return Ok(Self::Messages);
        }
        if source.eq_ignore_ascii_case(TWIN_CHANGE_NOTIFICATIONS) {
            return Ok(Self::TwinChangeNotifications);
        }

        let captures = MODULE_SOURCE
            .captures(source)
            .ok_or_else(|| RouteError::Source(source.to_string()))?;
        let module = captures["module"].to_string();
        Ok(match captures.name("output").map(|m| m.as_str()) {
            None => Self::Module(module),
            Some("*") => Self::ModuleOutputs(module),
            Some(output) => Self::ModuleOutput(module, output.to_string()),
        })
    }

    pub fn matches(&self, source: &MessageSource) -> bool {
        match (self, source) {
            (Self::TwinChangeNotifications, MessageSource::TwinChangeNotification) => true,
            (Self::Messages, MessageSource::Telemetry | MessageSource::Module { .. }) => true,
            (Self::Module(expected), MessageSource::Module { module, .. }) => expected == module,
            (
                Self::ModuleOutputs(expected),
                MessageSource::Module {
                    module,
                    output: Some(_),
                },
            ) => expected == module,
            (
                Self::ModuleOutput(expected, expected_output),
                MessageSource::Module {
                    module,
                    output: Some(output),
                },
            ) => expected == module && expected_output == output,
            _ => false,
        }
    }

    /// The condition features available to routes of this source.
    pub fn compiler_flags(&self) -> CompilerFlags {
        match self {
            Self::TwinChangeNotifications => {
                CompilerFlags::BODY_QUERY | CompilerFlags::TWIN_CHANGE_INCLUDES
            }
            _ => CompilerFlags::BODY_QUERY,
        }
    }
}

/// Where matching messages are sent to.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Endpoint {
    Upstream,
    Brokered { module: String, input: String },
}

impl Endpoint {
    pub fn parse(endpoint: &str) -> Result<Self, RouteError> {
        if endpoint.eq_ignore_ascii_case(UPSTREAM) {
            return Ok(Self::Upstream);
        }

        BROKERED
            .captures(endpoint)
            .and_then(|captures| MODULE_INPUT.captures(captures.name("target")?.as_str()))
            .map(|captures| Self::Brokered {
                module: captures["module"].to_string(),
                input: captures["input"].to_string(),
            })
            .ok_or_else(|| RouteError::Endpoint(endpoint.to_string()))
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Upstream => f.write_str(UPSTREAM),
            Self::Brokered { module, input } => {
                write!(f, r#"BrokeredEndpoint("/modules/{module}/inputs/{input}")"#)
            }
        }
    }
}

/// A compiled route.
#[derive(Clone, Debug, PartialEq)]
pub struct Route {
    pub name: String,
    pub text: String,
    pub condition: Condition,
    pub source: Source,
    pub endpoint: Endpoint,
    pub priority: u32,
    /// Message time to live, zero for the store and forward default.
    pub ttl: Duration,
}

impl Route {
    /// Parse and compile a route statement.
    pub fn parse<N, T>(name: N, text: T, priority: u32, ttl: Duration) -> Result<Self, RouteError>
    where
        N: Into<String>,
        T: Into<String>,
    {
        let text = text.into();

        if priority != DEFAULT_PRIORITY && priority > MAX_PRIORITY {
            return Err(RouteError::Priority(priority));
        }

        let captures = ROUTE
            .captures(&text)
            .ok_or_else(|| RouteError::Syntax(text.clone()))?;

        let source = Source::parse(&captures["source"])?;
        let endpoint = Endpoint::parse(captures["endpoint"].trim())?;
        let condition = match captures.name("condition") {
            Some(condition) => {
                Condition::compile(condition.as_str().trim(), source.compiler_flags())?
            }
            None => Condition::always(),
        };

        Ok(Self {
            name: name.into(),
            text,
            condition,
            source,
            endpoint,
            priority,
            ttl,
        })
    }

    pub fn condition_text(&self) -> &str {
        self.condition.text()
    }

    pub fn matches(&self, message: &Message) -> bool {
        self.source.matches(&message.source) && self.condition.matches(message)
    }
}
