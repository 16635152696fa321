//! The local resource registry.
//!
//! Drivers register two things here: a [`ResourceConstructor`] keyed by
//! `(Api, Model)` that the complete-config pass uses to build native
//! resources, and an [`RpcServiceDescriptor`] per API for RPC
//! discovery. The registry is shared read-mostly state; registration
//! normally happens once at startup.

use async_trait::async_trait;
use parking_lot::RwLock;
use rover_resource::{Dependencies, Resource, ResourceConfig, ResourceError, RpcApi, RpcServiceDescriptor};
use rover_types::{Api, Model};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::warn;

/// Builds one resource from its resolved dependencies and config.
#[async_trait]
pub trait ResourceConstructor: Send + Sync {
    async fn construct(
        &self,
        cancel: &CancellationToken,
        deps: Dependencies,
        conf: &ResourceConfig,
    ) -> Result<Arc<dyn Resource>, ResourceError>;
}

/// Registry of native constructors and RPC API descriptors.
#[derive(Default)]
pub struct ResourceRegistry {
    constructors: RwLock<HashMap<(Api, Model), Arc<dyn ResourceConstructor>>>,
    apis: RwLock<BTreeMap<Api, RpcServiceDescriptor>>,
}

impl ResourceRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a constructor for an API/model pair. A re-registration
    /// replaces the previous constructor.
    pub fn register_constructor(
        &self,
        api: Api,
        model: Model,
        constructor: Arc<dyn ResourceConstructor>,
    ) {
        let mut constructors = self.constructors.write();
        if constructors.insert((api.clone(), model.clone()), constructor).is_some() {
            warn!(api = %api, model = %model, "constructor re-registered");
        }
    }

    /// Looks up the constructor for an API/model pair.
    #[must_use]
    pub fn constructor_for(&self, api: &Api, model: &Model) -> Option<Arc<dyn ResourceConstructor>> {
        self.constructors.read().get(&(api.clone(), model.clone())).cloned()
    }

    /// Registers the RPC service descriptor of an API.
    pub fn register_api(&self, api: Api, descriptor: RpcServiceDescriptor) {
        self.apis.write().insert(api, descriptor);
    }

    /// Descriptor registered for an API, if any.
    #[must_use]
    pub fn rpc_api(&self, api: &Api) -> Option<RpcServiceDescriptor> {
        self.apis.read().get(api).cloned()
    }

    /// Every registered API with its descriptor, sorted by API.
    #[must_use]
    pub fn registered_apis(&self) -> Vec<RpcApi> {
        self.apis
            .read()
            .iter()
            .map(|(api, descriptor)| RpcApi {
                api: api.clone(),
                descriptor: descriptor.clone(),
            })
            .collect()
    }
}
