//! Declarative resource configuration.
//!
//! A [`ResourceConfig`] describes one resource: what contract it serves
//! ([`Api`]), which driver implements it ([`Model`]), driver-specific
//! attributes (opaque JSON), and the symbolic names of the resources it
//! depends on. Dependency names stay symbolic here; the graph resolves
//! them to node handles during the resolve phase.
//!
//! Configuration is validated twice: once by the external diff producer
//! and once defensively at build time, because partial-start rules can
//! admit nodes whose configs were previously rejected.

use crate::errors::ResourceError;
use rover_types::{Api, Model, ResourceName};
use serde::{Deserialize, Serialize};

/// Declarative description of one resource.
///
/// # Example
///
/// ```
/// use rover_resource::ResourceConfig;
/// use rover_types::{Api, Model};
///
/// let conf = ResourceConfig::new(Api::component("arm"), "a", Model::new("acme", "fake"))
///     .with_depends_on(["b"]);
/// assert!(conf.validate().is_ok());
/// assert_eq!(conf.resource_name().to_string(), "rdk:component:arm/a");
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceConfig {
    pub name: String,
    pub api: Api,
    pub model: Model,
    /// Driver-specific attributes, opaque to the graph.
    #[serde(default)]
    pub attributes: serde_json::Value,
    /// Symbolic names of resources this one depends on.
    #[serde(default)]
    pub depends_on: Vec<String>,
}

impl ResourceConfig {
    /// Creates a config with no attributes and no dependencies.
    #[must_use]
    pub fn new(api: Api, name: impl Into<String>, model: Model) -> Self {
        Self {
            name: name.into(),
            api,
            model,
            attributes: serde_json::Value::Null,
            depends_on: Vec::new(),
        }
    }

    /// Sets the symbolic dependency list.
    #[must_use]
    pub fn with_depends_on<I, S>(mut self, deps: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.depends_on = deps.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the driver attributes.
    #[must_use]
    pub fn with_attributes(mut self, attributes: serde_json::Value) -> Self {
        self.attributes = attributes;
        self
    }

    /// The fully qualified name this config materializes as.
    #[must_use]
    pub fn resource_name(&self) -> ResourceName {
        ResourceName::new(self.api.clone(), self.name.clone())
    }

    /// Validates structural requirements of the config.
    ///
    /// # Errors
    ///
    /// Returns [`ResourceError::ConfigValidation`] naming the first
    /// violated requirement.
    pub fn validate(&self) -> Result<(), ResourceError> {
        let fail = |reason: &str| {
            Err(ResourceError::ConfigValidation {
                name: self.name.clone(),
                reason: reason.to_string(),
            })
        };
        if self.name.is_empty() {
            return fail("name must not be empty");
        }
        if self.name.contains([':', '/']) {
            return fail("name must not contain ':' or '/'");
        }
        if self.api.subtype.is_empty() {
            return fail("API subtype must not be empty");
        }
        if self.model.family.is_empty() || self.model.name.is_empty() {
            return fail("model family and name must not be empty");
        }
        for dep in &self.depends_on {
            if dep.is_empty() {
                return fail("dependency names must not be empty");
            }
            if dep == &self.name {
                return fail("resource cannot depend on itself");
            }
        }
        Ok(())
    }
}
