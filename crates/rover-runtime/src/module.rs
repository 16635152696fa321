//! The module manager seam.
//!
//! Modular resources live in separate processes supervised by an
//! external module manager; the resource manager talks to them through
//! this trait only. For a config the module manager
//! [`provides`](ModuleManager::provides), the manager runs modular
//! validation in addition to structural validation, builds and
//! reconfigures through RPC instead of in-process construction, and
//! instructs the module manager to drop the resource on close.

use async_trait::async_trait;
use rover_resource::{Resource, ResourceConfig, ResourceError};
use rover_types::ResourceName;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Supervisor of out-of-process resource implementations.
#[async_trait]
pub trait ModuleManager: Send + Sync {
    /// Returns `true` when a module claims this config's API/model pair.
    fn provides(&self, conf: &ResourceConfig) -> bool;

    /// Returns `true` when the named resource is currently served by a
    /// module.
    fn is_modular_resource(&self, name: &ResourceName) -> bool;

    /// Module-side config validation, run in addition to the structural
    /// one.
    async fn validate_config(&self, conf: &ResourceConfig) -> Result<(), ResourceError>;

    /// Builds the resource in its module process and returns the local
    /// handle to it.
    async fn add_resource(
        &self,
        conf: &ResourceConfig,
        deps: &[ResourceName],
        cancel: &CancellationToken,
    ) -> Result<Arc<dyn Resource>, ResourceError>;

    /// Reconfigures the module-side resource in place.
    async fn reconfigure_resource(
        &self,
        conf: &ResourceConfig,
        deps: &[ResourceName],
        cancel: &CancellationToken,
    ) -> Result<(), ResourceError>;

    /// Drops the module-side resource.
    async fn remove_resource(
        &self,
        name: &ResourceName,
        cancel: &CancellationToken,
    ) -> Result<(), ResourceError>;
}
