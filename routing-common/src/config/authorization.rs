//! Broker authorization policy, as defined in the hub's desired properties.

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const OPERATION_CONNECT: &str = "mqtt:connect";
pub const OPERATION_PUBLISH: &str = "mqtt:publish";
pub const OPERATION_SUBSCRIBE: &str = "mqtt:subscribe";

const OPERATIONS: [&str; 3] = [OPERATION_CONNECT, OPERATION_PUBLISH, OPERATION_SUBSCRIBE];

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AuthorizationError {
    #[error("Statement {0}: identities must not be empty")]
    MissingIdentities(usize),
    #[error("Statement {0}: operations must not be empty")]
    MissingOperations(usize),
    #[error("Statement {statement}: unknown operation '{operation}'")]
    UnknownOperation { statement: usize, operation: String },
    #[error("Statement {0}: resources are required for publish and subscribe operations")]
    MissingResources(usize),
    #[error("Statement {0}: resources are not allowed for connect operations")]
    UnexpectedResources(usize),
}

/// A statement of the desired properties, with its allow and deny rules.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AuthorizationProperties {
    pub identities: Vec<String>,
    #[serde(default)]
    pub allow: Vec<Rule>,
    #[serde(default)]
    pub deny: Vec<Rule>,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Rule {
    pub operations: Vec<String>,
    #[serde(default)]
    pub resources: Vec<String>,
}

#[derive(Copy, Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum Effect {
    Allow,
    Deny,
}

/// A statement of the policy handed to the broker.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Statement {
    pub effect: Effect,
    pub identities: Vec<String>,
    pub operations: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub resources: Vec<String>,
}

fn validate(index: usize, rule: &Rule) -> Result<(), AuthorizationError> {
    if rule.operations.is_empty() {
        return Err(AuthorizationError::MissingOperations(index));
    }

    if let Some(operation) = rule
        .operations
        .iter()
        .find(|operation| !OPERATIONS.contains(&operation.as_str()))
    {
        return Err(AuthorizationError::UnknownOperation {
            statement: index,
            operation: operation.clone(),
        });
    }

    let connect_only = rule.operations.iter().all(|op| op == OPERATION_CONNECT);
    match (connect_only, rule.resources.is_empty()) {
        (true, false) => Err(AuthorizationError::UnexpectedResources(index)),
        (false, true) => Err(AuthorizationError::MissingResources(index)),
        _ => Ok(()),
    }
}

/// Convert the desired properties into the broker's policy.
///
/// For every source statement, its deny statements come before its allow statements.
pub fn build_policy(
    properties: &[AuthorizationProperties],
) -> Result<Vec<Statement>, AuthorizationError> {
    let mut result = vec![];

    for (index, properties) in properties.iter().enumerate() {
        if properties.identities.is_empty() {
            return Err(AuthorizationError::MissingIdentities(index));
        }

        let rules = properties
            .deny
            .iter()
            .map(|rule| (Effect::Deny, rule))
            .chain(properties.allow.iter().map(|rule| (Effect::Allow, rule)));

        for (effect, rule) in rules {
            validate(index, rule)?;
            result.push(Statement {
                effect,
                identities: properties.identities.clone(),
                operations: rule.operations.clone(),
                resources: rule.resources.clone(),
            });
        }
    }

    Ok(result)
}
