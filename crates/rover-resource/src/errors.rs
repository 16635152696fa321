//! Resource layer errors.
//!
//! All variants are typed so callers can react programmatically: a
//! `NotFound` is worth a retry after the next reconfigure pass, a
//! `RemoteResourceClash` needs a better-qualified name, a `Cycle` is a
//! configuration bug. [`ResourceError::MustRebuild`] is a sentinel, not
//! a failure: a driver returns it from `reconfigure` to request a full
//! rebuild.

use rover_types::{Api, ErrorCode, ResourceName};
use thiserror::Error;

/// Error produced by resources, graph operations, and build paths.
#[derive(Debug, Clone, Error)]
pub enum ResourceError {
    /// No node with this name exists in the graph.
    #[error("resource \"{0}\" not found")]
    NotFound(ResourceName),

    /// The node exists but its most recent build or reconfigure failed.
    #[error("resource \"{name}\" not available: {cause}")]
    NotAvailable {
        name: ResourceName,
        #[source]
        cause: Box<ResourceError>,
    },

    /// The node exists but has never been built. `GraphNode::resource`
    /// wraps this as the [`NotAvailable`](Self::NotAvailable) cause;
    /// only the unsafe reconfigure paths return it directly.
    #[error("resource \"{0}\" not initialized yet")]
    Uninitialized(ResourceName),

    /// A partial-match lookup matched resources on more than one remote.
    #[error("more than one remote resource named \"{0}\"; qualify the name with a remote prefix")]
    RemoteResourceClash(String),

    /// A symbolic dependency did not resolve to any node.
    #[error("\"{child}\" depends on \"{parent}\" but no such resource exists")]
    MissingParent { child: ResourceName, parent: String },

    /// Sentinel returned by `reconfigure` to request a full rebuild.
    #[error("resource must be rebuilt")]
    MustRebuild,

    /// Adding the edge would make the graph cyclic.
    #[error("\"{child}\" cannot depend on \"{parent}\": it would create a circular dependency")]
    Cycle {
        child: ResourceName,
        parent: ResourceName,
    },

    /// A remote-origin node tried to depend on a local resource.
    #[error("remote-origin resource \"{child}\" can only depend on its remote node, not on \"{parent}\"")]
    RemoteContainment {
        child: ResourceName,
        parent: ResourceName,
    },

    /// A node with this name is already present with a different identity.
    #[error("a different node named \"{0}\" is already present")]
    DuplicateName(ResourceName),

    /// Configuration failed validation.
    #[error("invalid config for \"{name}\": {reason}")]
    ConfigValidation { name: String, reason: String },

    /// Construction or reconfiguration failed.
    #[error("building \"{name}\" failed: {reason}")]
    Build { name: ResourceName, reason: String },

    /// The remote exposes an API with no client registered locally.
    #[error("no client registered for API \"{0}\"")]
    MissingClientRegistration(Api),

    /// The operation was canceled before it completed.
    #[error("operation canceled")]
    Canceled,

    /// Driver-specific failure that fits no other variant.
    #[error("{0}")]
    Other(String),
}

impl ResourceError {
    /// Returns `true` for the rebuild sentinel.
    #[must_use]
    pub fn must_rebuild(&self) -> bool {
        matches!(self, Self::MustRebuild)
    }

    /// Wraps a failure as the not-available state of a named node.
    #[must_use]
    pub fn not_available(name: ResourceName, cause: ResourceError) -> Self {
        Self::NotAvailable {
            name,
            cause: Box::new(cause),
        }
    }
}

impl ErrorCode for ResourceError {
    fn code(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "RESOURCE_NOT_FOUND",
            Self::NotAvailable { .. } => "RESOURCE_NOT_AVAILABLE",
            Self::Uninitialized(_) => "RESOURCE_UNINITIALIZED",
            Self::RemoteResourceClash(_) => "RESOURCE_REMOTE_CLASH",
            Self::MissingParent { .. } => "RESOURCE_MISSING_PARENT",
            Self::MustRebuild => "RESOURCE_MUST_REBUILD",
            Self::Cycle { .. } => "RESOURCE_CYCLE",
            Self::RemoteContainment { .. } => "RESOURCE_REMOTE_CONTAINMENT",
            Self::DuplicateName(_) => "RESOURCE_DUPLICATE_NAME",
            Self::ConfigValidation { .. } => "RESOURCE_CONFIG_VALIDATION",
            Self::Build { .. } => "RESOURCE_BUILD_FAILED",
            Self::MissingClientRegistration(_) => "RESOURCE_MISSING_CLIENT",
            Self::Canceled => "RESOURCE_CANCELED",
            Self::Other(_) => "RESOURCE_OTHER",
        }
    }

    fn is_recoverable(&self) -> bool {
        match self {
            // Retried by the next complete-config pass.
            Self::NotAvailable { .. }
            | Self::Uninitialized(_)
            | Self::Build { .. }
            | Self::Canceled
            | Self::MissingParent { .. }
            | Self::Other(_) => true,
            // Configuration bugs; a retry sees the same config.
            Self::NotFound(_)
            | Self::RemoteResourceClash(_)
            | Self::MustRebuild
            | Self::Cycle { .. }
            | Self::RemoteContainment { .. }
            | Self::DuplicateName(_)
            | Self::ConfigValidation { .. }
            | Self::MissingClientRegistration(_) => false,
        }
    }
}
