//! The resource manager.
//!
//! The manager materializes declarative configuration into the live
//! resource graph and keeps the two consistent. One reconfiguration is
//! three calls, in order:
//!
//! ```text
//! mark_removed(diff.removed)      tombstone vanished subgraphs,
//!                                 move removed processes to a shadow
//!                                 manager for deferred stopping
//! update_resources(diff)          record new/changed configs on nodes,
//!                                 gate by trust policy
//! complete_config(cancel)         remotes first, then resolve, then a
//!                                 reverse-topological build/reconfigure
//!                                 walk; failures stay on their node
//! remove_marked_and_close(..)     sweep tombstones, close leaves-first
//! ```
//!
//! # Locking
//!
//! `config_lock` (a tokio mutex) serializes passes and is held across
//! driver calls; the graph lock (`parking_lot`) protects structure only
//! and is never held across an await. Slow drivers therefore never
//! block graph reads, and a concurrent `resource_by_name` sees either
//! the old handle (still live) or the new one, never a closed one.
//!
//! # Failure stance
//!
//! Partial graphs are a first-class state. Config validation errors,
//! build failures, and dial failures are recorded on the affected node
//! and retried on the next pass; only cycle detection and close errors
//! propagate to callers.

use crate::config::{Config, ConfigDiff, RemoteConfig};
use crate::dial::{remote_dial_options, DialError, RemoteDialer, TlsConfig};
use crate::errors::ManagerError;
use crate::module::ModuleManager;
use crate::process::{HostProcessManager, NoopProcessManager, ProcessManager};
use crate::registry::ResourceRegistry;
use crate::trigger::{config_trigger, ConfigTrigger, ConfigTriggerStream};
use parking_lot::RwLock;
use rover_resource::{
    CloseOnlyResource, Dependencies, Graph, GraphNode, RemoteRobot, Resource, ResourceConfig,
    ResourceError, RpcApi, RpcServiceDescriptor,
};
use rover_types::{Api, Model, ResourceName};
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

/// Options fixed at manager construction.
#[derive(Debug, Clone, Default)]
pub struct ResourceManagerOptions {
    /// Verbose dial logging.
    pub debug: bool,
    /// Whether the runtime was started from a CLI; only changes the
    /// wording of credential-downgrade guidance.
    pub from_command: bool,
    /// Permit credential downgrade over insecure transports.
    pub allow_insecure_creds: bool,
    /// Untrusted environments forbid the shell service and child
    /// processes.
    pub untrusted_env: bool,
    /// TLS material injected into every remote dial.
    pub tls: Option<TlsConfig>,
}

/// The shell service API, forbidden in untrusted environments.
fn shell_api() -> Api {
    Api::service("shell")
}

/// Name of the built-in web service, excluded from the close sweep
/// because it carries in-flight RPCs; the caller closes it last.
#[must_use]
pub fn web_internal_name() -> ResourceName {
    ResourceName::new(Api::internal_service("web"), "builtin")
}

/// Graph name of the node representing a configured remote.
#[must_use]
pub fn remote_node_name(name: &str) -> ResourceName {
    ResourceName::new(Api::remote(), name)
}

/// Wraps a remote config as the node config of its remote node.
fn remote_resource_config(conf: &RemoteConfig) -> ResourceConfig {
    let attributes = serde_json::to_value(conf).unwrap_or(serde_json::Value::Null);
    ResourceConfig::new(Api::remote(), conf.name.clone(), Model::builtin())
        .with_attributes(attributes)
}

/// Recovers the remote config a remote node was configured with.
fn native_remote_config(conf: &ResourceConfig) -> Result<RemoteConfig, ResourceError> {
    serde_json::from_value(conf.attributes.clone()).map_err(|err| {
        ResourceError::ConfigValidation {
            name: conf.name.clone(),
            reason: format!("config is not a remote config: {err}"),
        }
    })
}

/// Result of marking a removed-config: everything the caller must
/// destroy once the critical section is over.
pub struct MarkedRemoval {
    /// Shadow manager holding removed processes; stop it after the
    /// pass.
    pub process_shadow: Arc<dyn ProcessManager>,
    /// Close-only handles for leaves-first destruction before the next
    /// complete-config pass.
    pub close_before_complete: Vec<Arc<dyn Resource>>,
    /// Every name tombstoned by this call; callers use it to skip
    /// re-adding.
    pub marked_names: HashSet<ResourceName>,
}

/// Orchestrates the resource graph, the process sub-manager, and
/// remote federation.
pub struct ResourceManager {
    resources: RwLock<Graph>,
    process_manager: Arc<dyn ProcessManager>,
    registry: Arc<ResourceRegistry>,
    module_manager: Option<Arc<dyn ModuleManager>>,
    dialer: Arc<dyn RemoteDialer>,
    opts: ResourceManagerOptions,
    /// Serializes structural mutation; held across one whole pass.
    config_lock: tokio::sync::Mutex<()>,
    trigger: ConfigTrigger,
    trigger_stream: parking_lot::Mutex<Option<ConfigTriggerStream>>,
}

fn new_process_manager(opts: &ResourceManagerOptions) -> Arc<dyn ProcessManager> {
    if opts.untrusted_env {
        Arc::new(NoopProcessManager)
    } else {
        Arc::new(HostProcessManager::new())
    }
}

impl ResourceManager {
    /// Creates a manager with an empty graph. In untrusted
    /// environments the process sub-manager is a no-op. Pass
    /// `module_manager: None` when no module manager supervises
    /// out-of-process resources.
    #[must_use]
    pub fn new(
        opts: ResourceManagerOptions,
        registry: Arc<ResourceRegistry>,
        module_manager: Option<Arc<dyn ModuleManager>>,
        dialer: Arc<dyn RemoteDialer>,
    ) -> Self {
        let (trigger, stream) = config_trigger();
        Self {
            resources: RwLock::new(Graph::new()),
            process_manager: new_process_manager(&opts),
            registry,
            module_manager,
            dialer,
            opts,
            config_lock: tokio::sync::Mutex::new(()),
            trigger,
            trigger_stream: parking_lot::Mutex::new(Some(stream)),
        }
    }

    #[must_use]
    pub fn options(&self) -> &ResourceManagerOptions {
        &self.opts
    }

    /// A handle that schedules a reconfigure pass; remote parent
    /// notifiers and diff producers fire it.
    #[must_use]
    pub fn trigger(&self) -> ConfigTrigger {
        self.trigger.clone()
    }

    /// Hands the single trigger stream to the long-running reconfigure
    /// task. Subsequent calls return `None`.
    pub fn take_trigger_stream(&self) -> Option<ConfigTriggerStream> {
        self.trigger_stream.lock().take()
    }

    /// The process sub-manager owning configured OS processes.
    #[must_use]
    pub fn process_manager(&self) -> Arc<dyn ProcessManager> {
        Arc::clone(&self.process_manager)
    }

    /// The node registered under `name`, for introspection.
    #[must_use]
    pub fn node(&self, name: &ResourceName) -> Option<Arc<GraphNode>> {
        self.resources.read().node(name)
    }

    // ─── Diff application ───────────────────────────────────────────

    /// Marks every resource of a removed-config (and its dependents)
    /// for removal, and moves removed processes to a shadow manager.
    ///
    /// Call before [`update_resources`](Self::update_resources); sweep
    /// with [`remove_marked_and_close`](Self::remove_marked_and_close)
    /// afterwards.
    pub async fn mark_removed(&self, removed: &Config, cancel: &CancellationToken) -> MarkedRemoval {
        let _guard = self.config_lock.lock().await;
        let process_shadow = new_process_manager(&self.opts);
        let mut close_before_complete: Vec<Arc<dyn Resource>> = Vec::new();
        let mut marked_names = HashSet::new();

        for conf in &removed.processes {
            if self.opts.untrusted_env {
                continue;
            }
            match self.process_manager.remove_process_by_id(&conf.id) {
                Some(proc) => {
                    if let Err(err) = process_shadow.add_process(proc, false, cancel).await {
                        error!(process = %conf.id, error = %err, "couldn't defer process stop");
                    }
                }
                None => error!(process = %conf.id, "couldn't remove process"),
            }
        }

        for conf in &removed.remotes {
            let name = remote_node_name(&conf.name);
            self.mark_subtree_removed(&name, &mut close_before_complete, &mut marked_names);
        }
        for conf in &removed.components {
            let name = conf.resource_name();
            self.mark_subtree_removed(&name, &mut close_before_complete, &mut marked_names);
        }
        for conf in &removed.services {
            let name = conf.resource_name();
            // An untrusted environment could not have added the shell
            // service, so there is nothing to remove.
            if self.opts.untrusted_env && name.api == shell_api() {
                continue;
            }
            self.mark_subtree_removed(&name, &mut close_before_complete, &mut marked_names);
        }

        MarkedRemoval {
            process_shadow,
            close_before_complete,
            marked_names,
        }
    }

    fn mark_subtree_removed(
        &self,
        name: &ResourceName,
        close_before_complete: &mut Vec<Arc<dyn Resource>>,
        marked_names: &mut HashSet<ResourceName>,
    ) {
        let graph = self.resources.read();
        let Some(node) = graph.node(name) else {
            return;
        };
        close_before_complete.push(Arc::new(CloseOnlyResource::new(name.clone(), node)));
        match graph.sub_graph_from(name) {
            Ok(sub) => {
                marked_names.extend(sub.names());
                graph.mark_for_removal(&sub);
            }
            Err(err) => {
                error!(resource = %name, error = %err, "error while getting a subgraph");
            }
        }
    }

    /// Applies the added and modified sets of a diff: records configs
    /// on graph nodes (creating uninitialized nodes as needed) and
    /// updates the process sub-manager. Policy gates reject the shell
    /// service and all processes in untrusted environments.
    ///
    /// # Errors
    ///
    /// Errors accumulate instead of failing fast; every entry is
    /// attempted.
    pub async fn update_resources(
        &self,
        diff: &ConfigDiff,
        cancel: &CancellationToken,
    ) -> Result<(), ManagerError> {
        let _guard = self.config_lock.lock().await;
        let mut errors: Vec<ManagerError> = Vec::new();

        for service in &diff.added.services {
            let name = service.resource_name();
            if self.opts.untrusted_env && name.api == shell_api() {
                errors.push(ManagerError::ShellServiceDisabled);
                continue;
            }
            if let Err(err) = self.mark_resource_for_update(name, service.clone()) {
                errors.push(err.into());
            }
        }
        for component in &diff.added.components {
            if let Err(err) =
                self.mark_resource_for_update(component.resource_name(), component.clone())
            {
                errors.push(err.into());
            }
        }
        for remote in &diff.added.remotes {
            let name = remote_node_name(&remote.name);
            if let Err(err) = self.mark_resource_for_update(name, remote_resource_config(remote)) {
                errors.push(err.into());
            }
        }
        for component in &diff.modified.components {
            if let Err(err) =
                self.mark_resource_for_update(component.resource_name(), component.clone())
            {
                errors.push(err.into());
            }
        }
        for service in &diff.modified.services {
            let name = service.resource_name();
            if self.opts.untrusted_env && name.api == shell_api() {
                errors.push(ManagerError::ShellServiceDisabled);
                continue;
            }
            if let Err(err) = self.mark_resource_for_update(name, service.clone()) {
                errors.push(err.into());
            }
        }
        for remote in &diff.modified.remotes {
            let name = remote_node_name(&remote.name);
            if let Err(err) = self.mark_resource_for_update(name, remote_resource_config(remote)) {
                errors.push(err.into());
            }
        }

        // Processes never enter the resource graph; they belong to the
        // process sub-manager.
        for process in &diff.added.processes {
            if self.opts.untrusted_env {
                errors.push(ManagerError::ProcessesDisabled);
                break;
            }
            if let Err(err) = self
                .process_manager
                .add_process_from_config(process, cancel)
                .await
            {
                error!(process = %process.id, error = %err, "error while adding process; skipping");
            }
        }
        for process in &diff.modified.processes {
            if self.opts.untrusted_env {
                errors.push(ManagerError::ProcessesDisabled);
                break;
            }
            match self.process_manager.remove_process_by_id(&process.id) {
                Some(old) => {
                    if let Err(err) = old.stop().await {
                        error!(process = %process.id, error = %err, "couldn't stop process");
                    }
                }
                None => error!(process = %process.id, "couldn't find modified process"),
            }
            if let Err(err) = self
                .process_manager
                .add_process_from_config(process, cancel)
                .await
            {
                error!(process = %process.id, error = %err, "error while changing process; skipping");
            }
        }

        ManagerError::from_accumulated(errors)
    }

    /// Records a config on the named node, creating an uninitialized
    /// node when none exists. Existing parent edges are erased; the
    /// resolve phase re-derives them from the new dependency list.
    fn mark_resource_for_update(
        &self,
        name: ResourceName,
        conf: ResourceConfig,
    ) -> Result<(), ResourceError> {
        let mut graph = self.resources.write();
        if let Some(node) = graph.node(&name) {
            node.set_new_config(conf);
            for parent in graph.get_all_parents_of(&name) {
                graph.remove_child(&name, &parent);
            }
            return Ok(());
        }
        let node = GraphNode::unconfigured(name.clone(), conf);
        graph.add_node(name, node)
    }

    // ─── Complete-config pass ───────────────────────────────────────

    /// Brings the graph to a state consistent with the most recent
    /// diff: remotes first, then dependency resolution, then a
    /// reverse-topological build/reconfigure walk. Failures are
    /// recorded per node and retried next pass.
    pub async fn complete_config(&self, cancel: &CancellationToken) {
        let _guard = self.config_lock.lock().await;

        // Handle remotes first since they may reveal unresolved
        // dependencies.
        let remote_names = self.resources.read().find_nodes_by_api(&Api::remote());
        for name in remote_names {
            if cancel.is_cancelled() {
                debug!("reconfigure pass canceled");
                return;
            }
            let Some(node) = self.resources.read().node(&name) else {
                continue;
            };
            if !node.needs_reconfigure() {
                continue;
            }
            let Some(conf) = node.config() else {
                error!(resource = %name, "remote node has no config");
                continue;
            };
            let remote_conf = match native_remote_config(&conf) {
                Ok(remote_conf) => remote_conf,
                Err(err) => {
                    error!(resource = %name, error = %err, "remote config error");
                    node.set_last_error(err);
                    continue;
                }
            };
            // Validated by the diff producer, but partial start rules
            // require checking again.
            if let Err(err) = remote_conf.validate() {
                error!(remote = %remote_conf.name, error = %err, "remote config validation error");
                node.set_last_error(err);
                continue;
            }
            let verb = if node.is_uninitialized() {
                "configuring"
            } else {
                "reconfiguring"
            };
            debug!(resource = %name, verb, "processing remote");
            match self.process_remote(&remote_conf, cancel).await {
                Ok(remote_robot) => {
                    self.add_remote(Arc::clone(&remote_robot), Some(node), &remote_conf)
                        .await;
                    let trigger = self.trigger.clone();
                    remote_robot.set_parent_notifier(Box::new(move || trigger.notify()));
                }
                Err(err) => {
                    error!(remote = %remote_conf.name, error = %err, "error connecting to remote");
                    node.set_last_error(ResourceError::Other(err.to_string()));
                    continue;
                }
            }
        }

        // Resolve prior to sorting in case anything was newly
        // discovered; the resolver logs details on its own.
        if let Err(err) = self.resources.write().resolve_dependencies() {
            debug!(error = %err, "error resolving dependencies");
        }

        for name in self.resources.read().reverse_topological_sort() {
            if cancel.is_cancelled() {
                debug!("reconfigure pass canceled");
                return;
            }
            if !(name.api.is_component() || name.api.is_service()) {
                continue;
            }
            let Some(node) = self.resources.read().node(&name) else {
                continue;
            };
            if !node.needs_reconfigure() {
                continue;
            }
            // Unresolved dependencies keep the node uninitialized until
            // a later pass resolves them.
            if !node.unresolved_dependencies().is_empty() {
                continue;
            }
            let Some(conf) = node.config() else {
                continue;
            };

            // Validated by the diff producer, but partial start rules
            // require checking again.
            if let Err(err) = conf.validate() {
                error!(resource = %conf.name, model = %conf.model, error = %err,
                    "resource config validation error");
                node.set_last_error(err);
                continue;
            }
            if let Some(module_manager) =
                self.module_manager.as_ref().filter(|mm| mm.provides(&conf))
            {
                if let Err(err) = module_manager.validate_config(&conf).await {
                    error!(resource = %conf.name, model = %conf.model, error = %err,
                        "modular resource config validation error");
                    node.set_last_error(err);
                    continue;
                }
            }

            let verb = if node.is_uninitialized() {
                "configuring"
            } else {
                "reconfiguring"
            };
            debug!(resource = %name, verb, "processing resource");
            match self.process_resource(&conf, &node, cancel).await {
                Ok((resource, newly_built)) => {
                    if newly_built {
                        if let Err(err) = self.mark_children_for_update(&name) {
                            error!(resource = %name, error = %err,
                                "failed to mark children of resource for update");
                        }
                    }
                    node.swap_resource(resource, conf.model.clone());
                }
                Err(err) => {
                    if let Err(mark_err) = self.mark_children_for_update(&name) {
                        error!(resource = %name, error = %mark_err,
                            "failed to mark children of resource for update");
                    }
                    error!(resource = %conf.name, model = %conf.model, error = %err,
                        "error building resource");
                    node.set_last_error(err);
                }
            }
        }
    }

    /// Returns `true` while any node still awaits a successful build
    /// or reconfigure; callers use it to decide whether another pass is
    /// worthwhile.
    #[must_use]
    pub fn any_resources_not_configured(&self) -> bool {
        let graph = self.resources.read();
        graph
            .names()
            .into_iter()
            .filter_map(|name| graph.node(&name))
            .any(|node| node.needs_reconfigure())
    }

    /// Builds, reconfigures, or rebuilds one resource.
    ///
    /// Returns the (possibly unchanged) handle and whether it was newly
    /// built, in which case descendants must re-evaluate.
    async fn process_resource(
        &self,
        conf: &ResourceConfig,
        node: &Arc<GraphNode>,
        cancel: &CancellationToken,
    ) -> Result<(Arc<dyn Resource>, bool), ResourceError> {
        if node.is_uninitialized() {
            let fresh = self.new_resource(conf, cancel).await?;
            return Ok((fresh, true));
        }

        let current = node.unsafe_resource()?;
        let name = conf.resource_name();
        // The node keeps its previous handle when a dependency is not
        // ready; the next pass retries.
        let deps = self.get_dependencies(&name)?;

        if node.resource_model().as_ref() == Some(&conf.model) {
            if let Some(module_manager) =
                self.module_manager.as_ref().filter(|mm| mm.provides(conf))
            {
                let dep_names: Vec<ResourceName> = deps.keys().cloned().collect();
                module_manager
                    .reconfigure_resource(conf, &dep_names, cancel)
                    .await?;
                return Ok((current, false));
            }
            match current.reconfigure(&deps, conf).await {
                Ok(()) => return Ok((current, false)),
                Err(err) if !err.must_rebuild() => return Err(err),
                Err(_) => {}
            }
        } else {
            debug!(resource = %name, old_model = ?node.resource_model(), new_model = %conf.model,
                "resource models differ so it must be rebuilt");
        }

        debug!(resource = %name, "rebuilding");
        if let Err(err) = self.close_resource(current, &name, cancel).await {
            error!(resource = %name, error = %err, "error closing old resource before rebuild");
        }
        let fresh = self.new_resource(conf, cancel).await?;
        Ok((fresh, true))
    }

    /// Constructs a fresh resource: through the module manager when a
    /// module claims the config, through the registry otherwise.
    async fn new_resource(
        &self,
        conf: &ResourceConfig,
        cancel: &CancellationToken,
    ) -> Result<Arc<dyn Resource>, ResourceError> {
        let name = conf.resource_name();
        let deps = self.get_dependencies(&name)?;
        if let Some(module_manager) = self.module_manager.as_ref().filter(|mm| mm.provides(conf)) {
            let dep_names: Vec<ResourceName> = deps.keys().cloned().collect();
            return module_manager.add_resource(conf, &dep_names, cancel).await;
        }
        let constructor = self
            .registry
            .constructor_for(&conf.api, &conf.model)
            .ok_or_else(|| ResourceError::Build {
                name: name.clone(),
                reason: format!("no registered constructor for model \"{}\"", conf.model),
            })?;
        constructor.construct(cancel, deps, conf).await
    }

    /// Gathers the live handles of every dependency of `name`.
    fn get_dependencies(&self, name: &ResourceName) -> Result<Dependencies, ResourceError> {
        let graph = self.resources.read();
        let mut deps = Dependencies::new();
        for parent in graph.get_all_parents_of(name) {
            let node = graph
                .node(&parent)
                .ok_or_else(|| ResourceError::NotFound(parent.clone()))?;
            let resource = node.resource().map_err(|err| ResourceError::Build {
                name: name.clone(),
                reason: format!("dependency \"{parent}\" is not ready: {err}"),
            })?;
            deps.insert(parent, resource);
        }
        Ok(deps)
    }

    /// Flags every local transitive dependent of `name` so the current
    /// pass re-evaluates it against the new upstream.
    fn mark_children_for_update(&self, name: &ResourceName) -> Result<(), ResourceError> {
        let graph = self.resources.read();
        let sub = graph.sub_graph_from(name)?;
        for child in sub.topological_sort() {
            // Ignore self and non-local resources.
            if &child == name || child.contains_remote_names() {
                continue;
            }
            if let Some(node) = graph.node(&child) {
                node.set_needs_update();
            }
        }
        Ok(())
    }

    /// Closes a resource and, for modular resources, instructs the
    /// module manager to drop it.
    async fn close_resource(
        &self,
        resource: Arc<dyn Resource>,
        name: &ResourceName,
        cancel: &CancellationToken,
    ) -> Result<(), ManagerError> {
        let mut errors: Vec<ManagerError> = Vec::new();
        if let Err(err) = resource.close().await {
            errors.push(err.into());
        }
        if let Some(module_manager) = self
            .module_manager
            .as_ref()
            .filter(|mm| mm.is_modular_resource(name))
        {
            if let Err(err) = module_manager.remove_resource(name, cancel).await {
                errors.push(err.into());
            }
        }
        ManagerError::from_accumulated(errors)
    }

    // ─── Remotes ────────────────────────────────────────────────────

    /// Dials one remote according to the dial policy.
    async fn process_remote(
        &self,
        conf: &RemoteConfig,
        cancel: &CancellationToken,
    ) -> Result<Arc<dyn RemoteRobot>, ManagerError> {
        let dial_opts = remote_dial_options(conf, &self.opts);
        // Refuse the downgrade before any credential reaches the
        // transport.
        if conf.insecure
            && !self.opts.allow_insecure_creds
            && dial_opts
                .credentials
                .as_ref()
                .is_some_and(|creds| !creds.credentials.is_empty())
        {
            return Err(ManagerError::InsecureWithCredentials {
                from_command: self.opts.from_command,
            });
        }
        debug!(remote = %conf.name, address = %conf.address, "connecting now to remote");
        match self.dialer.dial(conf, dial_opts, cancel).await {
            Ok(remote_robot) => {
                debug!(remote = %conf.name, "connected now to remote");
                Ok(remote_robot)
            }
            Err(DialError::InsecureWithCredentials) => Err(ManagerError::InsecureWithCredentials {
                from_command: self.opts.from_command,
            }),
            Err(err) => Err(ManagerError::Dial {
                remote: conf.name.clone(),
                source: err,
            }),
        }
    }

    /// Attaches a connected remote under its remote node and grafts its
    /// resources.
    async fn add_remote(
        &self,
        remote_robot: Arc<dyn RemoteRobot>,
        node: Option<Arc<GraphNode>>,
        conf: &RemoteConfig,
    ) {
        let name = remote_node_name(&conf.name);
        let as_resource: Arc<dyn Resource> = remote_robot.clone();
        match node {
            Some(node) => {
                node.swap_resource(as_resource, Model::builtin());
            }
            None => {
                let node = GraphNode::configured(
                    name.clone(),
                    Some(remote_resource_config(conf)),
                    as_resource,
                    Model::builtin(),
                );
                if let Err(err) = self.resources.write().add_node(name.clone(), node) {
                    error!(resource = %name, error = %err, "failed to add new node for remote");
                    return;
                }
            }
        }
        self.update_remote_resource_names(&name, remote_robot.as_ref())
            .await;
    }

    /// Remote-origin children currently grafted under a remote node.
    #[must_use]
    pub fn remote_resource_names(&self, remote_name: &ResourceName) -> Vec<ResourceName> {
        let graph = self.resources.read();
        if graph.node(remote_name).is_none() {
            error!(remote = %remote_name, "trying to get remote resources of a non existing remote");
        }
        graph
            .get_all_children_of(remote_name)
            .into_iter()
            .filter(ResourceName::contains_remote_names)
            .collect()
    }

    /// Reconciles the local subtree of one remote with the remote's
    /// current resource set.
    ///
    /// New remote resources are grafted (model `unknown`); vanished
    /// ones have their local dependents flagged for update and are then
    /// closed in place. Returns whether anything changed, so the caller
    /// can decide to re-run the complete-config pass.
    pub async fn update_remote_resource_names(
        &self,
        remote_name: &ResourceName,
        remote_robot: &dyn RemoteRobot,
    ) -> bool {
        let mut active: BTreeMap<ResourceName, bool> = self
            .remote_resource_names(remote_name)
            .into_iter()
            .map(|name| (name, false))
            .collect();
        let mut anything_changed = false;

        for res_name in remote_robot.resource_names() {
            let client = match remote_robot.resource_by_name(&res_name) {
                Ok(client) => client,
                Err(err) => {
                    if matches!(err, ResourceError::MissingClientRegistration(_)) {
                        debug!(resource = %res_name, reason = %err,
                            "couldn't obtain remote resource interface");
                    } else {
                        error!(resource = %res_name, reason = %err,
                            "couldn't obtain remote resource interface");
                    }
                    continue;
                }
            };

            let prefixed = res_name.prepend_remote(remote_name.name.clone());
            let existing = self.resources.read().node(&prefixed);
            if let Some(flag) = active.get_mut(&prefixed) {
                *flag = true;
                if existing.as_ref().is_some_and(|node| !node.is_uninitialized()) {
                    continue;
                }
            }

            match existing {
                Some(node) => {
                    node.swap_resource(client, Model::unknown());
                }
                None => {
                    let node = GraphNode::configured(prefixed.clone(), None, client, Model::unknown());
                    if let Err(err) = self.resources.write().add_node(prefixed.clone(), node) {
                        error!(resource = %prefixed, error = %err, "failed to add remote resource node");
                    }
                }
            }

            match self
                .resources
                .write()
                .add_child(prefixed.clone(), remote_name.clone())
            {
                Ok(()) => anything_changed = true,
                Err(err) => {
                    error!(node = %prefixed, remote = %remote_name, error = %err,
                        "error while trying to add node as a dependency of remote");
                }
            }
        }

        for (res_name, is_active) in active {
            if is_active {
                continue;
            }
            debug!(resource = %res_name, "removing remote resource");
            if let Err(err) = self.mark_children_for_update(&res_name) {
                error!(resource = %res_name, reason = %err,
                    "failed to mark children of remote for update");
                continue;
            }
            let Some(node) = self.resources.read().node(&res_name) else {
                error!(resource = %res_name, "failed to find remote node for closure");
                continue;
            };
            if let Err(err) = node.close().await {
                error!(resource = %res_name, reason = %err, "failed to close remote node");
            }
            anything_changed = true;
        }

        anything_changed
    }

    /// Reconciles every connected remote. Returns whether anything
    /// changed.
    pub async fn update_remotes_resource_names(&self) -> bool {
        let mut anything_changed = false;
        for name in self.resources.read().find_nodes_by_api(&Api::remote()) {
            let Some(node) = self.resources.read().node(&name) else {
                continue;
            };
            let Ok(resource) = node.resource() else {
                continue;
            };
            if let Some(remote_robot) = resource.as_remote() {
                anything_changed |= self
                    .update_remote_resource_names(&name, remote_robot)
                    .await;
            }
        }
        anything_changed
    }

    // ─── Queries ────────────────────────────────────────────────────

    /// Resolves a resource by name.
    ///
    /// Fully qualified names resolve directly; an unqualified name
    /// falls back to a partial match across remotes, where an ambiguous
    /// match is a [`RemoteResourceClash`](ResourceError::RemoteResourceClash).
    pub fn resource_by_name(&self, name: &ResourceName) -> Result<Arc<dyn Resource>, ResourceError> {
        let graph = self.resources.read();
        if let Some(node) = graph.node(name) {
            return node.resource();
        }
        if !name.contains_remote_names() {
            let keys = graph.find_nodes_by_short_name_and_api(name);
            if keys.len() > 1 {
                return Err(ResourceError::RemoteResourceClash(name.name.clone()));
            }
            if let Some(key) = keys.first() {
                if let Some(node) = graph.node(key) {
                    return node.resource();
                }
            }
        }
        Err(ResourceError::NotFound(name.clone()))
    }

    /// The connected remote registered under `name`, if it is healthy.
    #[must_use]
    pub fn remote_by_name(&self, name: &str) -> Option<Arc<dyn Resource>> {
        let node = self.resources.read().node(&remote_node_name(name))?;
        match node.resource() {
            Ok(resource) if resource.as_remote().is_some() => Some(resource),
            Ok(_) => {
                error!(remote = name, "tried to access remote but it is not a robot interface");
                None
            }
            Err(err) => {
                error!(remote = name, error = %err, "error getting remote");
                None
            }
        }
    }

    /// Names of all configured remotes.
    #[must_use]
    pub fn remote_names(&self) -> Vec<String> {
        self.resources
            .read()
            .find_nodes_by_api(&Api::remote())
            .into_iter()
            .map(|name| name.name)
            .collect()
    }

    /// Names of all user-facing resources holding a live handle.
    /// Excludes remote nodes themselves and internal-namespace entries;
    /// remote-origin resources are included.
    #[must_use]
    pub fn resource_names(&self) -> Vec<ResourceName> {
        let graph = self.resources.read();
        graph
            .names()
            .into_iter()
            .filter(|name| !name.api.is_remote() && !name.api.is_internal())
            .filter(|name| graph.node(name).is_some_and(|node| node.has_resource()))
            .collect()
    }

    /// Names of runtime-internal resources.
    #[must_use]
    pub fn internal_resource_names(&self) -> Vec<ResourceName> {
        self.resources
            .read()
            .names()
            .into_iter()
            .filter(|name| name.api.is_internal())
            .collect()
    }

    /// The RPC APIs in use: the union of native registry entries and
    /// APIs contributed by connected remotes. The native descriptor
    /// always wins a conflict; clashes are logged.
    #[must_use]
    pub fn resource_rpc_apis(&self) -> Vec<RpcApi> {
        let mut apis: BTreeMap<Api, RpcServiceDescriptor> = BTreeMap::new();
        let mut remotes: Vec<Arc<dyn Resource>> = Vec::new();
        {
            let graph = self.resources.read();
            for name in graph.names() {
                if name.api.is_internal() {
                    continue;
                }
                if name.api.is_remote() {
                    if let Some(node) = graph.node(&name) {
                        if let Ok(resource) = node.resource() {
                            remotes.push(resource);
                        }
                    }
                    continue;
                }
                if name.contains_remote_names() || apis.contains_key(&name.api) {
                    continue;
                }
                if let Some(descriptor) = self.registry.rpc_api(&name.api) {
                    apis.insert(name.api.clone(), descriptor);
                }
            }
        }

        // Remotes only fill gaps; a native descriptor is never
        // overwritten by a remote one.
        for resource in remotes {
            let Some(remote_robot) = resource.as_remote() else {
                debug!(resource = %resource.name(), "remote does not implement the robot interface");
                continue;
            };
            for contributed in remote_robot.resource_rpc_apis() {
                match apis.get(&contributed.api) {
                    Some(existing) if *existing != contributed.descriptor => {
                        error!(
                            existing = %existing.fully_qualified_name,
                            remote = %contributed.descriptor.fully_qualified_name,
                            "remote proto service name clashes with another of the same API"
                        );
                    }
                    Some(_) => {}
                    None => {
                        // A registered native descriptor still wins,
                        // even when no local resource serves the API.
                        let descriptor = match self.registry.rpc_api(&contributed.api) {
                            Some(native) => {
                                if native != contributed.descriptor {
                                    error!(
                                        existing = %native.fully_qualified_name,
                                        remote = %contributed.descriptor.fully_qualified_name,
                                        "remote proto service name clashes with another of the same API"
                                    );
                                }
                                native
                            }
                            None => contributed.descriptor,
                        };
                        apis.insert(contributed.api, descriptor);
                    }
                }
            }
        }

        apis.into_iter()
            .map(|(api, descriptor)| RpcApi { api, descriptor })
            .collect()
    }

    // ─── Teardown ───────────────────────────────────────────────────

    /// Sweeps every tombstoned node out of the graph and closes the
    /// removed resources leaves-first.
    ///
    /// Names in `exclude_from_close` are removed but not closed — used
    /// for resources already closed earlier in the diff and for the web
    /// service.
    ///
    /// # Errors
    ///
    /// Aggregated close failures; the sweep itself always completes.
    pub async fn remove_marked_and_close(
        &self,
        exclude_from_close: &HashSet<ResourceName>,
        cancel: &CancellationToken,
    ) -> Result<Vec<ResourceName>, ManagerError> {
        let removed_nodes = self.resources.write().remove_marked();
        let mut removed_names = Vec::with_capacity(removed_nodes.len());
        let mut errors: Vec<ManagerError> = Vec::new();
        for node in removed_nodes {
            let name = node.name();
            removed_names.push(name.clone());
            if exclude_from_close.contains(&name) {
                continue;
            }
            if let Ok(resource) = node.unsafe_resource() {
                if let Err(err) = self.close_resource(resource, &name, cancel).await {
                    error!(resource = %name, error = %err, "error closing removed resource");
                    errors.push(err);
                }
            }
        }
        ManagerError::from_accumulated(errors)?;
        Ok(removed_names)
    }

    /// Closes every resource and stops the process sub-manager. The
    /// web internal service is excluded; the caller closes it last
    /// because it is the transport carrying any in-flight RPCs.
    pub async fn close(&self, cancel: &CancellationToken) -> Result<(), ManagerError> {
        let snapshot = self.resources.read().clone();
        self.resources.read().mark_for_removal(&snapshot);

        let mut errors: Vec<ManagerError> = Vec::new();
        if let Err(err) = self.process_manager.stop().await {
            errors.push(err.into());
        }

        let mut exclude = HashSet::new();
        exclude.insert(web_internal_name());
        if let Err(err) = self.remove_marked_and_close(&exclude, cancel).await {
            errors.push(err);
        }
        ManagerError::from_accumulated(errors)
    }
}
