use crate::identity::Identity;
use core::fmt::{self, Formatter};
use std::str::FromStr;
use thiserror::Error;

pub const AUTH_CHAIN_SEPARATOR: char = '/';

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum AuthChainError {
    #[error("Auth chain is empty")]
    Empty,
    #[error("Auth chain contains an empty link at position {0}")]
    EmptyLink(usize),
    #[error("Auth chain contains '{0}' more than once")]
    DuplicateLink(String),
    #[error("Invalid target identity: {0}")]
    InvalidTarget(String),
    #[error("Target '{target}' is not the end of the auth chain (ends with '{terminal}')")]
    TargetMismatch { target: String, terminal: String },
    #[error("Actor '{0}' is not part of the auth chain")]
    ActorNotInChain(String),
    #[error("Link '{link}' claims parent {actual:?}, but the auth chain expects '{expected}'")]
    BrokenLink {
        link: String,
        expected: String,
        actual: Option<String>,
    },
    #[error("Cycle detected in device scope at '{0}'")]
    Cycle(String),
}

/// An ordered list of nested device identities, from the root edge device down to a target.
///
/// The chain is rendered as a `/` delimited string, root first, target last.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AuthChain(Vec<String>);

impl AuthChain {
    pub fn new<I, S>(links: I) -> Result<Self, AuthChainError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let links: Vec<String> = links.into_iter().map(Into::into).collect();

        if links.is_empty() {
            return Err(AuthChainError::Empty);
        }

        for (i, link) in links.iter().enumerate() {
            if link.is_empty() {
                return Err(AuthChainError::EmptyLink(i));
            }
            if links[..i].contains(link) {
                return Err(AuthChainError::DuplicateLink(link.clone()));
            }
        }

        Ok(Self(links))
    }

    /// Build the chain for `target`, by following the parent relation up to the root.
    pub fn resolve<F>(target: &str, parent_of: F) -> Result<Self, AuthChainError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut links = vec![target.to_string()];
        while let Some(parent) = parent_of(&links[links.len() - 1]) {
            if links.contains(&parent) {
                return Err(AuthChainError::Cycle(parent));
            }
            links.push(parent);
        }
        links.reverse();

        Self::new(links)
    }

    pub fn links(&self) -> &[String] {
        &self.0
    }

    pub fn root(&self) -> &str {
        &self.0[0]
    }

    /// The last element of the chain.
    pub fn terminal(&self) -> &str {
        &self.0[self.0.len() - 1]
    }

    pub fn contains(&self, id: &str) -> bool {
        self.0.iter().any(|link| link == id)
    }

    /// Check that `actor` may act on behalf of `target`.
    ///
    /// The target must be the end of the chain, and the actor must be one of its links, which
    /// makes the actor an ancestor of the target, or the target itself. A module target is
    /// matched by its device.
    pub fn authorize(&self, actor: &str, target: &str) -> Result<(), AuthChainError> {
        let target: Identity = target
            .parse()
            .map_err(|_| AuthChainError::InvalidTarget(target.into()))?;

        if target.device_id() != self.terminal() {
            return Err(AuthChainError::TargetMismatch {
                target: target.to_string(),
                terminal: self.terminal().into(),
            });
        }

        if !self.contains(actor) {
            return Err(AuthChainError::ActorNotInChain(actor.into()));
        }

        Ok(())
    }

    /// Check that each link's claimed parent is the previous link of the chain.
    pub fn verify_links<F>(&self, parent_of: F) -> Result<(), AuthChainError>
    where
        F: Fn(&str) -> Option<String>,
    {
        for pair in self.0.windows(2) {
            let actual = parent_of(&pair[1]);
            if actual.as_deref() != Some(pair[0].as_str()) {
                return Err(AuthChainError::BrokenLink {
                    link: pair[1].clone(),
                    expected: pair[0].clone(),
                    actual,
                });
            }
        }
        Ok(())
    }
}

impl FromStr for AuthChain {
    type Err = AuthChainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            return Err(AuthChainError::Empty);
        }
        Self::new(s.split(AUTH_CHAIN_SEPARATOR))
    }
}

impl fmt::Display for AuthChain {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        for (i, link) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, "{AUTH_CHAIN_SEPARATOR}")?;
            }
            f.write_str(link)?;
        }
        Ok(())
    }
}

/// Validate that `actor_id` may act on behalf of `target_id`, given the target's auth chain.
pub fn validate_auth_chain(actor_id: &str, target_id: &str, chain: &str) -> bool {
    match chain
        .parse::<AuthChain>()
        .and_then(|chain| chain.authorize(actor_id, target_id))
    {
        Ok(()) => true,
        Err(err) => {
            log::debug!("Auth chain rejected - actor: {actor_id}, target: {target_id}, chain: {chain}: {err}");
            false
        }
    }
}
