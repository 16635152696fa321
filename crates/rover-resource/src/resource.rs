//! The resource contract.
//!
//! A [`Resource`] is one live driver: an arm, a camera, a service, or a
//! connected remote robot. The manager builds resources from
//! configuration, hands each one the resources it depends on, asks it to
//! reconfigure in place when its configuration changes, and closes it
//! when it disappears from configuration.
//!
//! # Reconfigure contract
//!
//! `reconfigure` must either apply the new configuration in place or
//! return the [`MustRebuild`](crate::ResourceError::MustRebuild)
//! sentinel, in which case the manager closes the resource and builds a
//! fresh one. The default implementation returns the sentinel, so
//! drivers that cannot reconfigure in place need no extra code.
//!
//! # Concurrency
//!
//! Live handles may be invoked by external callers concurrently with a
//! reconfigure pass; drivers are responsible for their own internal
//! synchronization.

use crate::errors::ResourceError;
use crate::remote::RemoteRobot;
use crate::ResourceConfig;
use async_trait::async_trait;
use rover_types::ResourceName;
use std::collections::HashMap;
use std::sync::Arc;

/// Resolved dependencies handed to a resource at build or reconfigure
/// time, keyed by fully qualified name.
pub type Dependencies = HashMap<ResourceName, Arc<dyn Resource>>;

impl std::fmt::Debug for dyn Resource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Resource").field("name", &self.name()).finish()
    }
}

/// One live driver managed by the resource graph.
#[async_trait]
pub trait Resource: Send + Sync + 'static {
    /// The fully qualified name this resource was built under.
    fn name(&self) -> ResourceName;

    /// Applies a new configuration in place.
    ///
    /// # Errors
    ///
    /// Returns [`MustRebuild`](ResourceError::MustRebuild) to request a
    /// close-and-rebuild instead; any other error is recorded on the
    /// node and retried next pass.
    async fn reconfigure(
        &self,
        deps: &Dependencies,
        conf: &ResourceConfig,
    ) -> Result<(), ResourceError> {
        let _ = (deps, conf);
        Err(ResourceError::MustRebuild)
    }

    /// Releases everything the resource holds. Must be safe to call on
    /// a partially failed resource.
    async fn close(&self) -> Result<(), ResourceError> {
        Ok(())
    }

    /// Returns this resource as a remote robot if it is one.
    ///
    /// Remote robot clients override this; everything else keeps the
    /// default `None`.
    fn as_remote(&self) -> Option<&dyn RemoteRobot> {
        None
    }
}
