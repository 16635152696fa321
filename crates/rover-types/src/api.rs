//! API taxonomy for robot resources.
//!
//! Every resource exposes exactly one API: a `(namespace, kind, subtype)`
//! triple that identifies the contract the resource implements, not the
//! driver implementing it (drivers are identified by [`Model`](crate::Model)).
//!
//! | Example | Meaning |
//! |---------|---------|
//! | `rdk:component:arm` | a robot arm component |
//! | `rdk:service:shell` | the shell service |
//! | `rdk-internal:service:web` | the built-in web service |
//! | `rdk:remote:robot` | a remote robot node |
//!
//! The `rdk-internal` namespace is reserved for resources the runtime
//! creates for itself; they are hidden from resource listings.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Namespace of an [`Api`].
///
/// `Rdk` is the native namespace, `RdkInternal` is reserved for runtime
/// internals, and `Custom` covers user-defined namespaces.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ApiNamespace {
    /// Native namespace (`rdk`).
    Rdk,
    /// Runtime-internal namespace (`rdk-internal`).
    RdkInternal,
    /// User-defined namespace.
    Custom(String),
}

impl fmt::Display for ApiNamespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Rdk => write!(f, "rdk"),
            Self::RdkInternal => write!(f, "rdk-internal"),
            Self::Custom(ns) => write!(f, "{ns}"),
        }
    }
}

impl From<&str> for ApiNamespace {
    fn from(s: &str) -> Self {
        match s {
            "rdk" => Self::Rdk,
            "rdk-internal" => Self::RdkInternal,
            other => Self::Custom(other.to_string()),
        }
    }
}

/// Kind of an [`Api`].
///
/// Components represent hardware-like entities, services represent
/// robot-wide capabilities, and remotes are other robots integrated by
/// reference.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ApiKind {
    Component,
    Service,
    Remote,
    Other(String),
}

impl fmt::Display for ApiKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Component => write!(f, "component"),
            Self::Service => write!(f, "service"),
            Self::Remote => write!(f, "remote"),
            Self::Other(kind) => write!(f, "{kind}"),
        }
    }
}

impl From<&str> for ApiKind {
    fn from(s: &str) -> Self {
        match s {
            "component" => Self::Component,
            "service" => Self::Service,
            "remote" => Self::Remote,
            other => Self::Other(other.to_string()),
        }
    }
}

/// Error returned when an API triple cannot be parsed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid API \"{0}\": expected namespace:kind:subtype")]
pub struct ApiParseError(pub String);

/// A `(namespace, kind, subtype)` triple identifying a resource contract.
///
/// # Example
///
/// ```
/// use rover_types::Api;
///
/// let arm = Api::component("arm");
/// assert!(arm.is_component());
/// assert_eq!(arm.to_string(), "rdk:component:arm");
///
/// let parsed: Api = "rdk:service:shell".parse().unwrap();
/// assert_eq!(parsed, Api::service("shell"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Api {
    pub namespace: ApiNamespace,
    pub kind: ApiKind,
    pub subtype: String,
}

impl Api {
    /// Creates an API from its three parts.
    #[must_use]
    pub fn new(namespace: ApiNamespace, kind: ApiKind, subtype: impl Into<String>) -> Self {
        Self {
            namespace,
            kind,
            subtype: subtype.into(),
        }
    }

    /// A native component API (`rdk:component:<subtype>`).
    #[must_use]
    pub fn component(subtype: impl Into<String>) -> Self {
        Self::new(ApiNamespace::Rdk, ApiKind::Component, subtype)
    }

    /// A native service API (`rdk:service:<subtype>`).
    #[must_use]
    pub fn service(subtype: impl Into<String>) -> Self {
        Self::new(ApiNamespace::Rdk, ApiKind::Service, subtype)
    }

    /// A runtime-internal service API (`rdk-internal:service:<subtype>`).
    #[must_use]
    pub fn internal_service(subtype: impl Into<String>) -> Self {
        Self::new(ApiNamespace::RdkInternal, ApiKind::Service, subtype)
    }

    /// The API of remote robot nodes.
    ///
    /// Every remote declared in configuration becomes one node with this
    /// API; the remote's own resources are grafted underneath it.
    #[must_use]
    pub fn remote() -> Self {
        Self::new(ApiNamespace::Rdk, ApiKind::Remote, "robot")
    }

    /// Returns `true` for component APIs.
    #[must_use]
    pub fn is_component(&self) -> bool {
        self.kind == ApiKind::Component
    }

    /// Returns `true` for service APIs.
    #[must_use]
    pub fn is_service(&self) -> bool {
        self.kind == ApiKind::Service
    }

    /// Returns `true` for the remote node API.
    #[must_use]
    pub fn is_remote(&self) -> bool {
        self.kind == ApiKind::Remote
    }

    /// Returns `true` for APIs in the runtime-internal namespace.
    #[must_use]
    pub fn is_internal(&self) -> bool {
        self.namespace == ApiNamespace::RdkInternal
    }
}

impl fmt::Display for Api {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.namespace, self.kind, self.subtype)
    }
}

impl FromStr for Api {
    type Err = ApiParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.splitn(3, ':');
        match (parts.next(), parts.next(), parts.next()) {
            (Some(ns), Some(kind), Some(subtype))
                if !ns.is_empty() && !kind.is_empty() && !subtype.is_empty() =>
            {
                Ok(Self::new(ns.into(), kind.into(), subtype))
            }
            _ => Err(ApiParseError(s.to_string())),
        }
    }
}
