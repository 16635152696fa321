//! The remote robot contract.
//!
//! A remote robot is another robot integrated by reference. Locally it
//! is a single resource node; its own resources are pulled through this
//! interface and grafted underneath that node with their names prefixed
//! by the remote path. Remotes implement the same interface a local
//! robot exposes, so a remote may itself host remotes (transitive
//! remoting).

use crate::errors::ResourceError;
use crate::resource::Resource;
use rover_types::{Api, ResourceName};
use std::sync::Arc;

/// Callback a remote invokes when its resource set changes, so the
/// local manager can schedule a reconfigure pass.
pub type ParentNotifier = Box<dyn Fn() + Send + Sync>;

/// Descriptor of the RPC service implementing an API.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RpcServiceDescriptor {
    /// Fully qualified protobuf service name.
    pub fully_qualified_name: String,
}

impl RpcServiceDescriptor {
    #[must_use]
    pub fn new(fully_qualified_name: impl Into<String>) -> Self {
        Self {
            fully_qualified_name: fully_qualified_name.into(),
        }
    }
}

/// An API paired with the RPC service that implements it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RpcApi {
    pub api: Api,
    pub descriptor: RpcServiceDescriptor,
}

/// A connected remote robot.
///
/// Names returned by [`resource_names`](Self::resource_names) are in
/// the remote's own frame; the caller prepends the remote prefix before
/// inserting them into the local graph.
pub trait RemoteRobot: Resource {
    /// Current resources exposed by the remote.
    fn resource_names(&self) -> Vec<ResourceName>;

    /// Returns a client handle for one remote resource.
    ///
    /// # Errors
    ///
    /// [`MissingClientRegistration`](ResourceError::MissingClientRegistration)
    /// when the remote exposes an API this side has no client for; such
    /// resources are opaque and skipped during reconciliation.
    fn resource_by_name(&self, name: &ResourceName) -> Result<Arc<dyn Resource>, ResourceError>;

    /// APIs contributed by the remote, for RPC discovery.
    fn resource_rpc_apis(&self) -> Vec<RpcApi>;

    /// Registers the callback fired on any future resource-set change.
    fn set_parent_notifier(&self, notifier: ParentNotifier);
}
