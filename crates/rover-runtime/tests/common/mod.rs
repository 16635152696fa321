//! Shared test doubles for manager integration tests.
#![allow(dead_code)]

use async_trait::async_trait;
use parking_lot::Mutex;
use rover_runtime::{
    Api, Dependencies, DialError, DialOptions, Model, ParentNotifier, RemoteConfig, RemoteDialer,
    RemoteRobot, Resource, ResourceConfig, ResourceConstructor, ResourceError, ResourceName,
    ResourceRegistry, RpcApi,
};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Records every driver call so tests can assert on ordering and on
/// "zero driver calls" idempotency.
#[derive(Default)]
pub struct DriverLog {
    events: Mutex<Vec<String>>,
}

impl DriverLog {
    pub fn record(&self, event: impl Into<String>) {
        self.events.lock().push(event.into());
    }

    pub fn events(&self) -> Vec<String> {
        self.events.lock().clone()
    }

    pub fn clear(&self) {
        self.events.lock().clear();
    }

    pub fn events_with_prefix(&self, prefix: &str) -> Vec<String> {
        self.events
            .lock()
            .iter()
            .filter(|event| event.starts_with(prefix))
            .cloned()
            .collect()
    }
}

/// A driver whose lifecycle calls land in the shared log.
pub struct FakeResource {
    name: ResourceName,
    log: Arc<DriverLog>,
    reconfigurable: bool,
}

impl FakeResource {
    pub fn new(name: ResourceName, log: Arc<DriverLog>, reconfigurable: bool) -> Self {
        Self {
            name,
            log,
            reconfigurable,
        }
    }
}

#[async_trait]
impl Resource for FakeResource {
    fn name(&self) -> ResourceName {
        self.name.clone()
    }

    async fn reconfigure(
        &self,
        _deps: &Dependencies,
        conf: &ResourceConfig,
    ) -> Result<(), ResourceError> {
        self.log.record(format!("reconfigure {}", conf.name));
        if self.reconfigurable {
            Ok(())
        } else {
            Err(ResourceError::MustRebuild)
        }
    }

    async fn close(&self) -> Result<(), ResourceError> {
        self.log.record(format!("close {}", self.name.name));
        Ok(())
    }
}

/// Constructor producing [`FakeResource`]s; can be told to fail.
pub struct FakeConstructor {
    log: Arc<DriverLog>,
    reconfigurable: bool,
    fail: bool,
}

impl FakeConstructor {
    pub fn new(log: Arc<DriverLog>) -> Self {
        Self {
            log,
            reconfigurable: true,
            fail: false,
        }
    }

    pub fn rebuild_only(log: Arc<DriverLog>) -> Self {
        Self {
            log,
            reconfigurable: false,
            fail: false,
        }
    }

    pub fn failing(log: Arc<DriverLog>) -> Self {
        Self {
            log,
            reconfigurable: true,
            fail: true,
        }
    }
}

#[async_trait]
impl ResourceConstructor for FakeConstructor {
    async fn construct(
        &self,
        _cancel: &CancellationToken,
        _deps: Dependencies,
        conf: &ResourceConfig,
    ) -> Result<Arc<dyn Resource>, ResourceError> {
        if self.fail {
            return Err(ResourceError::Build {
                name: conf.resource_name(),
                reason: "constructor told to fail".into(),
            });
        }
        self.log.record(format!("build {}", conf.name));
        Ok(Arc::new(FakeResource::new(
            conf.resource_name(),
            Arc::clone(&self.log),
            self.reconfigurable,
        )))
    }
}

/// Registry preloaded with fake constructors for the given pairs.
pub fn registry_with(log: &Arc<DriverLog>, pairs: &[(Api, Model)]) -> Arc<ResourceRegistry> {
    let registry = ResourceRegistry::new();
    for (api, model) in pairs {
        registry.register_constructor(
            api.clone(),
            model.clone(),
            Arc::new(FakeConstructor::new(Arc::clone(log))),
        );
    }
    Arc::new(registry)
}

/// A scriptable remote robot.
pub struct FakeRemoteRobot {
    name: ResourceName,
    log: Arc<DriverLog>,
    resources: Mutex<Vec<ResourceName>>,
    opaque_apis: Mutex<HashSet<Api>>,
    rpc_apis: Mutex<Vec<RpcApi>>,
    notifier: Mutex<Option<ParentNotifier>>,
}

impl FakeRemoteRobot {
    pub fn new(remote_name: &str, log: Arc<DriverLog>) -> Arc<Self> {
        Arc::new(Self {
            name: rover_runtime::remote_node_name(remote_name),
            log,
            resources: Mutex::new(Vec::new()),
            opaque_apis: Mutex::new(HashSet::new()),
            rpc_apis: Mutex::new(Vec::new()),
            notifier: Mutex::new(None),
        })
    }

    pub fn set_resources(&self, names: Vec<ResourceName>) {
        *self.resources.lock() = names;
    }

    /// APIs the local side has no client registration for.
    pub fn set_opaque_apis(&self, apis: HashSet<Api>) {
        *self.opaque_apis.lock() = apis;
    }

    pub fn set_rpc_apis(&self, apis: Vec<RpcApi>) {
        *self.rpc_apis.lock() = apis;
    }

    /// Fires the stored parent notifier, as a reconnecting remote would.
    pub fn notify_parent(&self) {
        if let Some(notifier) = &*self.notifier.lock() {
            notifier();
        }
    }

    pub fn has_notifier(&self) -> bool {
        self.notifier.lock().is_some()
    }
}

#[async_trait]
impl Resource for FakeRemoteRobot {
    fn name(&self) -> ResourceName {
        self.name.clone()
    }

    async fn close(&self) -> Result<(), ResourceError> {
        self.log.record(format!("close-remote {}", self.name.name));
        Ok(())
    }

    fn as_remote(&self) -> Option<&dyn RemoteRobot> {
        Some(self)
    }
}

impl RemoteRobot for FakeRemoteRobot {
    fn resource_names(&self) -> Vec<ResourceName> {
        self.resources.lock().clone()
    }

    fn resource_by_name(&self, name: &ResourceName) -> Result<Arc<dyn Resource>, ResourceError> {
        if self.opaque_apis.lock().contains(&name.api) {
            return Err(ResourceError::MissingClientRegistration(name.api.clone()));
        }
        Ok(Arc::new(FakeResource::new(
            name.clone(),
            Arc::clone(&self.log),
            true,
        )))
    }

    fn resource_rpc_apis(&self) -> Vec<RpcApi> {
        self.rpc_apis.lock().clone()
    }

    fn set_parent_notifier(&self, notifier: ParentNotifier) {
        *self.notifier.lock() = Some(notifier);
    }
}

/// Dialer backed by a name → remote map, recording the options of the
/// most recent dial.
#[derive(Default)]
pub struct MapDialer {
    remotes: Mutex<HashMap<String, Arc<FakeRemoteRobot>>>,
    failures: Mutex<HashMap<String, DialError>>,
    last_opts: Mutex<Option<DialOptions>>,
    dial_count: Mutex<usize>,
}

impl MapDialer {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn insert(&self, name: &str, remote: Arc<FakeRemoteRobot>) {
        self.remotes.lock().insert(name.to_string(), remote);
    }

    pub fn fail_with(&self, name: &str, err: DialError) {
        self.failures.lock().insert(name.to_string(), err);
    }

    pub fn last_options(&self) -> Option<DialOptions> {
        self.last_opts.lock().clone()
    }

    pub fn dial_count(&self) -> usize {
        *self.dial_count.lock()
    }
}

#[async_trait]
impl RemoteDialer for MapDialer {
    async fn dial(
        &self,
        remote: &RemoteConfig,
        opts: DialOptions,
        _cancel: &CancellationToken,
    ) -> Result<Arc<dyn RemoteRobot>, DialError> {
        *self.last_opts.lock() = Some(opts);
        *self.dial_count.lock() += 1;
        if let Some(err) = self.failures.lock().get(&remote.name) {
            return Err(err.clone());
        }
        match self.remotes.lock().get(&remote.name) {
            Some(robot) => Ok(Arc::clone(robot) as Arc<dyn RemoteRobot>),
            None => Err(DialError::ConnectionFailed {
                address: remote.address.clone(),
                reason: "no such remote in test dialer".into(),
            }),
        }
    }
}
