//! Per-resource graph node state machine.
//!
//! A [`GraphNode`] tracks one name in the dependency graph through its
//! lifecycle:
//!
//! ```text
//! Uninitialized ──build──► Built ◄──┐
//!      ▲                    │       │ reconfigure / rebuild
//!      │                    └───────┘
//!      └── close / rebuild failure
//! ```
//!
//! Two flags drive the complete-config pass: `needs_reconfigure` is set
//! when the node's own configuration changed, `needs_update` when an
//! ancestor was rebuilt. Both clear on a successful
//! [`swap_resource`](GraphNode::swap_resource). A failed build records a
//! last error but never removes the node; partial graphs are a
//! first-class state.
//!
//! All node state sits behind a short mutex that is never held across
//! an await; flags are only written while the manager holds its
//! configuration mutex.

use crate::errors::ResourceError;
use crate::resource::Resource;
use crate::ResourceConfig;
use async_trait::async_trait;
use parking_lot::Mutex;
use rover_types::{Model, ResourceName};
use std::fmt;
use std::sync::Arc;

#[derive(Default)]
struct NodeState {
    config: Option<ResourceConfig>,
    needs_reconfigure: bool,
    needs_update: bool,
    unresolved: Vec<String>,
    resource: Option<Arc<dyn Resource>>,
    model: Option<Model>,
    last_err: Option<ResourceError>,
    marked_for_removal: bool,
}

/// One node of the resource dependency graph.
pub struct GraphNode {
    name: ResourceName,
    state: Mutex<NodeState>,
}

impl GraphNode {
    /// Creates a node that has a configuration but no resource yet.
    #[must_use]
    pub fn unconfigured(name: ResourceName, config: ResourceConfig) -> Arc<Self> {
        Arc::new(Self {
            name,
            state: Mutex::new(NodeState {
                config: Some(config),
                needs_reconfigure: true,
                ..NodeState::default()
            }),
        })
    }

    /// Creates a node already holding a live resource.
    ///
    /// Remote-origin nodes pass `config: None`; their configuration
    /// lives on the remote side.
    #[must_use]
    pub fn configured(
        name: ResourceName,
        config: Option<ResourceConfig>,
        resource: Arc<dyn Resource>,
        model: Model,
    ) -> Arc<Self> {
        Arc::new(Self {
            name,
            state: Mutex::new(NodeState {
                config,
                resource: Some(resource),
                model: Some(model),
                ..NodeState::default()
            }),
        })
    }

    /// The name this node is registered under.
    #[must_use]
    pub fn name(&self) -> ResourceName {
        self.name.clone()
    }

    /// Records a new configuration and flags the node for reconfigure.
    pub fn set_new_config(&self, config: ResourceConfig) {
        let mut st = self.state.lock();
        st.config = Some(config);
        st.needs_reconfigure = true;
        st.unresolved.clear();
    }

    /// Flags the node because an ancestor was rebuilt.
    pub fn set_needs_update(&self) {
        self.state.lock().needs_update = true;
    }

    /// Returns `true` when the next pass must visit this node.
    #[must_use]
    pub fn needs_reconfigure(&self) -> bool {
        let st = self.state.lock();
        st.needs_reconfigure || st.needs_update
    }

    /// Returns `true` while the node has never been built (or was
    /// closed and not rebuilt).
    #[must_use]
    pub fn is_uninitialized(&self) -> bool {
        self.state.lock().resource.is_none()
    }

    /// Returns `true` when a live handle is present.
    #[must_use]
    pub fn has_resource(&self) -> bool {
        self.state.lock().resource.is_some()
    }

    /// Installs a freshly built or reconfigured resource, clearing both
    /// reconfigure flags and the last error.
    ///
    /// Returns the previous handle, if any. The swap is visible to
    /// concurrent readers before the caller closes the old handle, so a
    /// reader never observes a closed resource.
    pub fn swap_resource(
        &self,
        resource: Arc<dyn Resource>,
        model: Model,
    ) -> Option<Arc<dyn Resource>> {
        let mut st = self.state.lock();
        let old = st.resource.replace(resource);
        st.model = Some(model);
        st.needs_reconfigure = false;
        st.needs_update = false;
        st.last_err = None;
        st.unresolved.clear();
        old
    }

    /// Returns the live handle.
    ///
    /// # Errors
    ///
    /// [`NotAvailable`](ResourceError::NotAvailable) whenever the node
    /// is not both built and healthy: the cause is the last build or
    /// reconfigure failure, or [`Uninitialized`](ResourceError::Uninitialized)
    /// when the node has never been built.
    pub fn resource(&self) -> Result<Arc<dyn Resource>, ResourceError> {
        let st = self.state.lock();
        if let Some(err) = &st.last_err {
            return Err(ResourceError::not_available(self.name.clone(), err.clone()));
        }
        st.resource.clone().ok_or_else(|| {
            ResourceError::not_available(
                self.name.clone(),
                ResourceError::Uninitialized(self.name.clone()),
            )
        })
    }

    /// Returns the handle even when the node is in a failed state.
    ///
    /// Only reconfigure paths use this, to pass the old resource to a
    /// replacement or close it on rebuild.
    pub fn unsafe_resource(&self) -> Result<Arc<dyn Resource>, ResourceError> {
        self.state
            .lock()
            .resource
            .clone()
            .ok_or_else(|| ResourceError::Uninitialized(self.name.clone()))
    }

    /// Model of the currently installed resource.
    #[must_use]
    pub fn resource_model(&self) -> Option<Model> {
        self.state.lock().model.clone()
    }

    /// Current configuration, if the node has one.
    #[must_use]
    pub fn config(&self) -> Option<ResourceConfig> {
        self.state.lock().config.clone()
    }

    /// Symbolic dependency names from the current configuration.
    #[must_use]
    pub fn dependencies(&self) -> Vec<String> {
        self.state
            .lock()
            .config
            .as_ref()
            .map(|c| c.depends_on.clone())
            .unwrap_or_default()
    }

    /// Records which symbolic dependencies failed to resolve.
    pub fn set_unresolved_dependencies(&self, unresolved: Vec<String>) {
        self.state.lock().unresolved = unresolved;
    }

    /// Symbolic dependencies that did not resolve last pass; a node
    /// with unresolved dependencies stays uninitialized.
    #[must_use]
    pub fn unresolved_dependencies(&self) -> Vec<String> {
        self.state.lock().unresolved.clone()
    }

    /// Records the most recent build or reconfigure failure.
    pub fn set_last_error(&self, err: ResourceError) {
        self.state.lock().last_err = Some(err);
    }

    /// The most recent failure, if any.
    #[must_use]
    pub fn last_error(&self) -> Option<ResourceError> {
        self.state.lock().last_err.clone()
    }

    /// Tombstones the node for the next sweep.
    pub fn mark_for_removal(&self) {
        self.state.lock().marked_for_removal = true;
    }

    /// Returns `true` when the node is tombstoned.
    #[must_use]
    pub fn marked_for_removal(&self) -> bool {
        self.state.lock().marked_for_removal
    }

    /// Closes and drops the held resource. Idempotent and safe in any
    /// state; a node without a resource closes trivially.
    pub async fn close(&self) -> Result<(), ResourceError> {
        let res = {
            let mut st = self.state.lock();
            st.model = None;
            st.resource.take()
        };
        match res {
            Some(res) => res.close().await,
            None => Ok(()),
        }
    }
}

impl fmt::Debug for GraphNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut s = f.debug_struct("GraphNode");
        s.field("name", &self.name);
        match self.state.try_lock() {
            Some(st) => {
                s.field("built", &st.resource.is_some());
                s.field("needs_reconfigure", &st.needs_reconfigure);
                s.field("needs_update", &st.needs_update);
                s.field("marked_for_removal", &st.marked_for_removal);
            }
            None => {
                s.field("state", &"<locked>");
            }
        }
        s.finish()
    }
}

/// A handle that exists only to close an underlying node.
///
/// Used during diff application to record resources that must be
/// destroyed leaves-first before the next complete-config pass.
pub struct CloseOnlyResource {
    name: ResourceName,
    node: Arc<GraphNode>,
}

impl CloseOnlyResource {
    #[must_use]
    pub fn new(name: ResourceName, node: Arc<GraphNode>) -> Self {
        Self { name, node }
    }
}

#[async_trait]
impl Resource for CloseOnlyResource {
    fn name(&self) -> ResourceName {
        self.name.clone()
    }

    async fn close(&self) -> Result<(), ResourceError> {
        self.node.close().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rover_types::Api;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingResource {
        name: ResourceName,
        closes: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Resource for CountingResource {
        fn name(&self) -> ResourceName {
            self.name.clone()
        }

        async fn close(&self) -> Result<(), ResourceError> {
            self.closes.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn arm_name() -> ResourceName {
        ResourceName::new(Api::component("arm"), "a")
    }

    fn arm_config() -> ResourceConfig {
        ResourceConfig::new(Api::component("arm"), "a", Model::new("acme", "fake"))
    }

    fn counting(closes: &Arc<AtomicUsize>) -> Arc<dyn Resource> {
        Arc::new(CountingResource {
            name: arm_name(),
            closes: Arc::clone(closes),
        })
    }

    #[test]
    fn unconfigured_node_needs_reconfigure() {
        let node = GraphNode::unconfigured(arm_name(), arm_config());
        assert!(node.needs_reconfigure());
        assert!(node.is_uninitialized());
        assert!(!node.has_resource());
        // Never-built nodes report not-available with an uninitialized
        // cause, the same shape as built-then-failed nodes.
        match node.resource() {
            Err(ResourceError::NotAvailable { cause, .. }) => {
                assert!(matches!(*cause, ResourceError::Uninitialized(_)));
            }
            Err(other) => panic!("expected NotAvailable, got {other}"),
            Ok(_) => panic!("expected NotAvailable, got a live resource"),
        }
    }

    #[test]
    fn swap_clears_flags_and_error() {
        let closes = Arc::new(AtomicUsize::new(0));
        let node = GraphNode::unconfigured(arm_name(), arm_config());
        node.set_needs_update();
        node.set_last_error(ResourceError::Canceled);

        let old = node.swap_resource(counting(&closes), Model::new("acme", "fake"));
        assert!(old.is_none());
        assert!(!node.needs_reconfigure());
        assert!(node.last_error().is_none());
        assert!(node.resource().is_ok());
        assert_eq!(node.resource_model(), Some(Model::new("acme", "fake")));
    }

    #[test]
    fn swap_returns_previous_handle() {
        let closes = Arc::new(AtomicUsize::new(0));
        let node = GraphNode::unconfigured(arm_name(), arm_config());
        node.swap_resource(counting(&closes), Model::builtin());
        let old = node.swap_resource(counting(&closes), Model::builtin());
        assert!(old.is_some());
    }

    #[test]
    fn failed_node_reports_not_available_but_keeps_handle() {
        let closes = Arc::new(AtomicUsize::new(0));
        let node = GraphNode::unconfigured(arm_name(), arm_config());
        node.swap_resource(counting(&closes), Model::builtin());
        node.set_last_error(ResourceError::Build {
            name: arm_name(),
            reason: "driver fault".into(),
        });

        assert!(matches!(
            node.resource(),
            Err(ResourceError::NotAvailable { .. })
        ));
        // Reconfigure paths still reach the old handle.
        assert!(node.unsafe_resource().is_ok());
    }

    #[test]
    fn set_new_config_reflags_built_node() {
        let closes = Arc::new(AtomicUsize::new(0));
        let node = GraphNode::unconfigured(arm_name(), arm_config());
        node.swap_resource(counting(&closes), Model::builtin());
        assert!(!node.needs_reconfigure());

        node.set_new_config(arm_config().with_depends_on(["b"]));
        assert!(node.needs_reconfigure());
        assert_eq!(node.dependencies(), vec!["b".to_string()]);
    }

    #[tokio::test]
    async fn close_is_idempotent() {
        let closes = Arc::new(AtomicUsize::new(0));
        let node = GraphNode::unconfigured(arm_name(), arm_config());
        node.swap_resource(counting(&closes), Model::builtin());

        node.close().await.unwrap();
        node.close().await.unwrap();
        assert_eq!(closes.load(Ordering::SeqCst), 1);
        assert!(node.is_uninitialized());
    }

    #[tokio::test]
    async fn close_on_unbuilt_node_is_safe() {
        let node = GraphNode::unconfigured(arm_name(), arm_config());
        assert!(node.close().await.is_ok());
    }

    #[tokio::test]
    async fn close_only_resource_closes_node() {
        let closes = Arc::new(AtomicUsize::new(0));
        let node = GraphNode::unconfigured(arm_name(), arm_config());
        node.swap_resource(counting(&closes), Model::builtin());

        let closer = CloseOnlyResource::new(arm_name(), Arc::clone(&node));
        closer.close().await.unwrap();
        assert_eq!(closes.load(Ordering::SeqCst), 1);
        assert!(node.is_uninitialized());
    }

    #[test]
    fn removal_mark() {
        let node = GraphNode::unconfigured(arm_name(), arm_config());
        assert!(!node.marked_for_removal());
        node.mark_for_removal();
        assert!(node.marked_for_removal());
    }
}
