//! Runtime configuration inputs.
//!
//! The manager does not parse configuration files; an external diff
//! producer hands it a [`ConfigDiff`] — three [`Config`] sets describing
//! what was added, modified, and removed. Component and service entries
//! reuse [`ResourceConfig`] from `rover-resource`; remotes and OS
//! processes have their own shapes here.

use rover_resource::{ResourceConfig, ResourceError};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Credentials presented when dialing a remote.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    /// Credential type, e.g. `api-key`.
    pub kind: String,
    pub payload: String,
}

impl Credentials {
    #[must_use]
    pub fn new(kind: impl Into<String>, payload: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            payload: payload.into(),
        }
    }

    /// Returns `true` when both fields are empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.kind.is_empty() && self.payload.is_empty()
    }
}

/// Authentication settings of one remote.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteAuth {
    /// Entity the credentials authenticate as; empty means plain
    /// credentials.
    pub entity: Option<String>,
    pub credentials: Option<Credentials>,
    pub external_auth_address: Option<String>,
    pub external_auth_to_entity: Option<String>,
    pub external_auth_insecure: bool,
    pub signaling_server_address: Option<String>,
    pub signaling_auth_entity: Option<String>,
    pub signaling_credentials: Option<Credentials>,
    /// Managed robots authenticate via TLS; discovery over multicast
    /// DNS must strip auth material.
    pub managed: bool,
}

/// Declarative description of one remote robot.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteConfig {
    pub name: String,
    pub address: String,
    #[serde(default)]
    pub insecure: bool,
    #[serde(default)]
    pub auth: RemoteAuth,
}

impl RemoteConfig {
    #[must_use]
    pub fn new(name: impl Into<String>, address: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            address: address.into(),
            ..Self::default()
        }
    }

    /// Validates structural requirements; checked by the diff producer
    /// and again before dialing.
    ///
    /// # Errors
    ///
    /// Returns [`ResourceError::ConfigValidation`] naming the violated
    /// requirement.
    pub fn validate(&self) -> Result<(), ResourceError> {
        let fail = |reason: &str| {
            Err(ResourceError::ConfigValidation {
                name: self.name.clone(),
                reason: reason.to_string(),
            })
        };
        if self.name.is_empty() {
            return fail("remote name must not be empty");
        }
        if self.name.contains([':', '/']) {
            return fail("remote name must not contain ':' or '/'");
        }
        if self.address.is_empty() {
            return fail("remote address must not be empty");
        }
        Ok(())
    }
}

/// Declarative description of one OS child process.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessConfig {
    pub id: String,
    /// Binary to execute.
    pub name: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub cwd: Option<PathBuf>,
    /// One-shot processes run to completion at start; others are kept
    /// alive until stopped.
    #[serde(default)]
    pub one_shot: bool,
}

impl ProcessConfig {
    #[must_use]
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            ..Self::default()
        }
    }

    /// Validates structural requirements.
    ///
    /// # Errors
    ///
    /// Returns [`ResourceError::ConfigValidation`] naming the violated
    /// requirement.
    pub fn validate(&self) -> Result<(), ResourceError> {
        if self.id.is_empty() {
            return Err(ResourceError::ConfigValidation {
                name: self.name.clone(),
                reason: "process ID must not be empty".to_string(),
            });
        }
        if self.name.is_empty() {
            return Err(ResourceError::ConfigValidation {
                name: self.id.clone(),
                reason: "process binary name must not be empty".to_string(),
            });
        }
        Ok(())
    }
}

/// One configuration set: everything a robot is declared to run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub components: Vec<ResourceConfig>,
    pub services: Vec<ResourceConfig>,
    pub remotes: Vec<RemoteConfig>,
    pub processes: Vec<ProcessConfig>,
}

impl Config {
    /// Returns `true` when the set declares nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
            && self.services.is_empty()
            && self.remotes.is_empty()
            && self.processes.is_empty()
    }
}

/// The difference between two configurations, as produced by the
/// external diff computer.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfigDiff {
    pub added: Config,
    pub modified: Config,
    pub removed: Config,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remote_config_validation() {
        assert!(RemoteConfig::new("r1", "robot.local:8080").validate().is_ok());
        assert!(RemoteConfig::new("", "robot.local:8080").validate().is_err());
        assert!(RemoteConfig::new("r1", "").validate().is_err());
        assert!(RemoteConfig::new("r:1", "robot.local:8080").validate().is_err());
    }

    #[test]
    fn process_config_validation() {
        assert!(ProcessConfig::new("p1", "/bin/true").validate().is_ok());
        assert!(ProcessConfig::new("", "/bin/true").validate().is_err());
        assert!(ProcessConfig::new("p1", "").validate().is_err());
    }

    #[test]
    fn empty_config() {
        assert!(Config::default().is_empty());
        let mut conf = Config::default();
        conf.remotes.push(RemoteConfig::new("r1", "addr"));
        assert!(!conf.is_empty());
    }

    #[test]
    fn diff_serde_roundtrip() {
        let mut diff = ConfigDiff::default();
        diff.added.remotes.push(RemoteConfig::new("r1", "addr"));
        diff.removed.processes.push(ProcessConfig::new("p1", "/bin/true"));
        let raw = serde_json::to_string(&diff).unwrap();
        let back: ConfigDiff = serde_json::from_str(&raw).unwrap();
        assert_eq!(back, diff);
    }
}
