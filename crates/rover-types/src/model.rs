//! Driver model identifiers.
//!
//! A [`Model`] names the driver implementation behind a resource, as a
//! `family:name` pair. Two models are reserved: [`Model::builtin`] for
//! resources constructed natively by this runtime, and [`Model::unknown`]
//! for resources discovered through a remote whose concrete model is
//! opaque locally.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Default model family for the reserved models.
pub const DEFAULT_MODEL_FAMILY: &str = "rdk";

/// Qualified driver identifier.
///
/// # Example
///
/// ```
/// use rover_types::Model;
///
/// let fake = Model::new("acme", "fake-arm");
/// assert_eq!(fake.to_string(), "acme:fake-arm");
/// assert_ne!(fake, Model::builtin());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Model {
    pub family: String,
    pub name: String,
}

impl Model {
    /// Creates a model from family and name.
    #[must_use]
    pub fn new(family: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            family: family.into(),
            name: name.into(),
        }
    }

    /// The reserved model of natively constructed resources.
    #[must_use]
    pub fn builtin() -> Self {
        Self::new(DEFAULT_MODEL_FAMILY, "builtin")
    }

    /// The reserved model of remote-origin resources whose concrete
    /// model is not known locally.
    #[must_use]
    pub fn unknown() -> Self {
        Self::new(DEFAULT_MODEL_FAMILY, "unknown")
    }

    /// Returns `true` for the reserved builtin model.
    #[must_use]
    pub fn is_builtin(&self) -> bool {
        *self == Self::builtin()
    }

    /// Returns `true` for the reserved unknown model.
    #[must_use]
    pub fn is_unknown(&self) -> bool {
        *self == Self::unknown()
    }
}

impl fmt::Display for Model {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.family, self.name)
    }
}
