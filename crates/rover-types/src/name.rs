//! Resource names and the remote-prefix algebra.
//!
//! A [`ResourceName`] is the canonical identity of one resource: its
//! [`Api`], the chain of remote hops it was reached through, and its
//! local name. Equality is structural; two names are the same resource
//! exactly when all three parts match.
//!
//! Resources discovered through a remote carry that remote's name as a
//! prefix: grafting `arm:a` from remote `r1` yields the local name
//! `r1:a` under the arm API. Remotes may themselves host remotes, so
//! the prefix is a list, not a single hop.

use crate::api::{Api, ApiParseError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Error returned when a rendered resource name cannot be parsed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid resource name \"{0}\": expected namespace:kind:subtype/name")]
pub struct NameParseError(pub String);

impl From<ApiParseError> for NameParseError {
    fn from(err: ApiParseError) -> Self {
        Self(err.0)
    }
}

/// Canonical identity of a resource: API, remote path, local name.
///
/// # Rendering
///
/// Names render as `namespace:kind:subtype/remote1:remote2:name`; the
/// remote path is empty for local resources. [`short_name`](Self::short_name)
/// is the part after the slash.
///
/// # Example
///
/// ```
/// use rover_types::{Api, ResourceName};
///
/// let arm = ResourceName::new(Api::component("arm"), "a");
/// assert_eq!(arm.to_string(), "rdk:component:arm/a");
///
/// let remote_arm = arm.prepend_remote("r1");
/// assert_eq!(remote_arm.short_name(), "r1:a");
/// assert!(remote_arm.contains_remote_names());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ResourceName {
    pub api: Api,
    /// Remote hops, outermost first.
    pub remotes: Vec<String>,
    pub name: String,
}

impl ResourceName {
    /// Creates a local (remote-free) resource name.
    #[must_use]
    pub fn new(api: Api, name: impl Into<String>) -> Self {
        Self {
            api,
            remotes: Vec::new(),
            name: name.into(),
        }
    }

    /// Returns a copy of this name scoped under one more remote hop.
    ///
    /// The new hop becomes the outermost prefix.
    #[must_use]
    pub fn prepend_remote(&self, remote: impl Into<String>) -> Self {
        let mut remotes = Vec::with_capacity(self.remotes.len() + 1);
        remotes.push(remote.into());
        remotes.extend(self.remotes.iter().cloned());
        Self {
            api: self.api.clone(),
            remotes,
            name: self.name.clone(),
        }
    }

    /// Returns `true` when the name was reached through at least one remote.
    #[must_use]
    pub fn contains_remote_names(&self) -> bool {
        !self.remotes.is_empty()
    }

    /// Returns a copy with the remote path stripped.
    #[must_use]
    pub fn without_remotes(&self) -> Self {
        Self {
            api: self.api.clone(),
            remotes: Vec::new(),
            name: self.name.clone(),
        }
    }

    /// The remote-qualified local name, without the API.
    #[must_use]
    pub fn short_name(&self) -> String {
        if self.remotes.is_empty() {
            self.name.clone()
        } else {
            format!("{}:{}", self.remotes.join(":"), self.name)
        }
    }
}

impl fmt::Display for ResourceName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.api, self.short_name())
    }
}

impl FromStr for ResourceName {
    type Err = NameParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (api_part, rest) = s.split_once('/').ok_or_else(|| NameParseError(s.to_string()))?;
        if rest.is_empty() {
            return Err(NameParseError(s.to_string()));
        }
        let api: Api = api_part.parse()?;
        let mut segments: Vec<&str> = rest.split(':').collect();
        if segments.iter().any(|seg| seg.is_empty()) {
            return Err(NameParseError(s.to_string()));
        }
        let Some(name) = segments.pop() else {
            return Err(NameParseError(s.to_string()));
        };
        Ok(Self {
            api,
            remotes: segments.into_iter().map(String::from).collect(),
            name: name.to_string(),
        })
    }
}
