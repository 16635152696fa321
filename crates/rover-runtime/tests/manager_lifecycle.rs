//! End-to-end lifecycle scenarios: build order, rebuilds, policy
//! gating, idempotency, and teardown ordering.

mod common;

use common::{registry_with, DriverLog, FakeConstructor, MapDialer};
use rover_runtime::{
    Api, Config, ConfigDiff, ManagerError, Model, ProcessConfig, ResourceConfig, ResourceError,
    ResourceManager, ResourceManagerOptions, ResourceName,
};
use std::collections::HashSet;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

fn arm_api() -> Api {
    Api::component("arm")
}

fn fake_model() -> Model {
    Model::new("acme", "fake")
}

fn arm(name: &str) -> ResourceConfig {
    ResourceConfig::new(arm_api(), name, fake_model())
}

fn arm_name(name: &str) -> ResourceName {
    ResourceName::new(arm_api(), name)
}

fn manager_with_log(log: &Arc<DriverLog>) -> ResourceManager {
    ResourceManager::new(
        ResourceManagerOptions::default(),
        registry_with(log, &[(arm_api(), fake_model())]),
        None,
        MapDialer::new(),
    )
}

/// Builds the chain `a -> b -> c` and runs one pass.
async fn build_chain(manager: &ResourceManager) {
    let mut diff = ConfigDiff::default();
    diff.added.components.push(arm("a").with_depends_on(["b"]));
    diff.added.components.push(arm("b").with_depends_on(["c"]));
    diff.added.components.push(arm("c"));
    let cancel = CancellationToken::new();
    manager.update_resources(&diff, &cancel).await.unwrap();
    manager.complete_config(&cancel).await;
}

#[tokio::test]
async fn linear_chain_builds_dependencies_first() {
    let log = Arc::new(DriverLog::default());
    let manager = manager_with_log(&log);
    build_chain(&manager).await;

    assert_eq!(
        log.events_with_prefix("build"),
        vec!["build c", "build b", "build a"]
    );
    for name in ["a", "b", "c"] {
        assert!(
            manager.resource_by_name(&arm_name(name)).is_ok(),
            "{name} should be live"
        );
    }
    assert!(!manager.any_resources_not_configured());
}

#[tokio::test]
async fn model_change_rebuilds_node_and_reevaluates_dependents() {
    let log = Arc::new(DriverLog::default());
    let registry = registry_with(&log, &[(arm_api(), fake_model())]);
    registry.register_constructor(
        arm_api(),
        Model::new("acme", "turbo"),
        Arc::new(FakeConstructor::new(Arc::clone(&log))),
    );
    let manager = ResourceManager::new(
        ResourceManagerOptions::default(),
        registry,
        None,
        MapDialer::new(),
    );
    build_chain(&manager).await;
    log.clear();

    let mut diff = ConfigDiff::default();
    diff.modified.components.push(
        ResourceConfig::new(arm_api(), "b", Model::new("acme", "turbo")).with_depends_on(["c"]),
    );
    let cancel = CancellationToken::new();
    manager.update_resources(&diff, &cancel).await.unwrap();
    manager.complete_config(&cancel).await;

    // Old b closes, new b builds, a re-evaluates against the new
    // upstream; c is untouched.
    assert_eq!(log.events(), vec!["close b", "build b", "reconfigure a"]);
    assert!(manager.resource_by_name(&arm_name("b")).is_ok());
}

#[tokio::test]
async fn second_pass_with_no_diff_is_a_no_op() {
    let log = Arc::new(DriverLog::default());
    let manager = manager_with_log(&log);
    build_chain(&manager).await;

    let before = manager.resource_by_name(&arm_name("a")).unwrap();
    log.clear();
    manager.complete_config(&CancellationToken::new()).await;

    assert!(log.events().is_empty(), "no driver calls expected: {:?}", log.events());
    let after = manager.resource_by_name(&arm_name("a")).unwrap();
    assert!(Arc::ptr_eq(&before, &after), "handle must be unchanged");
}

#[tokio::test]
async fn reconfigure_in_place_when_config_changes() {
    let log = Arc::new(DriverLog::default());
    let manager = manager_with_log(&log);
    build_chain(&manager).await;
    log.clear();

    let mut diff = ConfigDiff::default();
    diff.modified.components.push(
        arm("c").with_attributes(serde_json::json!({"speed": 2})),
    );
    let cancel = CancellationToken::new();
    manager.update_resources(&diff, &cancel).await.unwrap();
    manager.complete_config(&cancel).await;

    // c reconfigures in place; its dependents keep their handles and
    // are not re-evaluated since nothing was rebuilt.
    assert_eq!(log.events(), vec!["reconfigure c"]);
}

#[tokio::test]
async fn must_rebuild_sentinel_escalates_to_rebuild() {
    let log = Arc::new(DriverLog::default());
    let registry = Arc::new(rover_runtime::ResourceRegistry::new());
    registry.register_constructor(
        arm_api(),
        fake_model(),
        Arc::new(FakeConstructor::rebuild_only(Arc::clone(&log))),
    );
    let manager = ResourceManager::new(
        ResourceManagerOptions::default(),
        registry,
        None,
        MapDialer::new(),
    );

    let mut diff = ConfigDiff::default();
    diff.added.components.push(arm("a"));
    let cancel = CancellationToken::new();
    manager.update_resources(&diff, &cancel).await.unwrap();
    manager.complete_config(&cancel).await;
    log.clear();

    let mut modified = ConfigDiff::default();
    modified
        .modified
        .components
        .push(arm("a").with_attributes(serde_json::json!({"speed": 3})));
    manager.update_resources(&modified, &cancel).await.unwrap();
    manager.complete_config(&cancel).await;

    assert_eq!(
        log.events(),
        vec!["reconfigure a", "close a", "build a"],
        "rebuild-only driver must be closed and rebuilt"
    );
}

#[tokio::test]
async fn untrusted_env_gates_shell_and_processes_but_not_others() {
    let log = Arc::new(DriverLog::default());
    let manager = ResourceManager::new(
        ResourceManagerOptions {
            untrusted_env: true,
            ..ResourceManagerOptions::default()
        },
        registry_with(&log, &[(arm_api(), fake_model())]),
        None,
        MapDialer::new(),
    );

    let mut diff = ConfigDiff::default();
    diff.added.services.push(ResourceConfig::new(
        Api::service("shell"),
        "shell",
        Model::builtin(),
    ));
    diff.added.processes.push(ProcessConfig::new("p1", "/bin/true"));
    diff.added.components.push(arm("a"));

    let cancel = CancellationToken::new();
    let err = manager.update_resources(&diff, &cancel).await.unwrap_err();
    assert!(err.any(&|e| matches!(e, ManagerError::ShellServiceDisabled)));
    assert!(err.any(&|e| matches!(e, ManagerError::ProcessesDisabled)));

    // Other resources proceed normally.
    manager.complete_config(&cancel).await;
    assert!(manager.resource_by_name(&arm_name("a")).is_ok());
    assert!(manager.process_manager().process_ids().is_empty());
}

#[tokio::test]
async fn failed_build_reports_not_available_and_retries() {
    let log = Arc::new(DriverLog::default());
    let registry = Arc::new(rover_runtime::ResourceRegistry::new());
    registry.register_constructor(
        arm_api(),
        fake_model(),
        Arc::new(FakeConstructor::failing(Arc::clone(&log))),
    );
    let manager = ResourceManager::new(
        ResourceManagerOptions::default(),
        registry.clone(),
        None,
        MapDialer::new(),
    );

    let mut diff = ConfigDiff::default();
    diff.added.components.push(arm("a"));
    let cancel = CancellationToken::new();
    manager.update_resources(&diff, &cancel).await.unwrap();
    manager.complete_config(&cancel).await;

    let err = manager.resource_by_name(&arm_name("a")).unwrap_err();
    assert!(matches!(err, ResourceError::NotAvailable { .. }), "got: {err}");
    // The failed node is not listed as a live resource but is retried.
    assert!(manager.resource_names().is_empty());
    assert!(manager.any_resources_not_configured());

    // A working constructor on the next pass heals the node.
    registry.register_constructor(
        arm_api(),
        fake_model(),
        Arc::new(FakeConstructor::new(Arc::clone(&log))),
    );
    manager.complete_config(&cancel).await;
    assert!(manager.resource_by_name(&arm_name("a")).is_ok());
}

#[tokio::test]
async fn removed_resources_mark_their_dependents_and_close_leaves_first() {
    let log = Arc::new(DriverLog::default());
    let manager = manager_with_log(&log);
    build_chain(&manager).await;
    log.clear();

    let mut removed = Config::default();
    removed.components.push(arm("b"));
    let cancel = CancellationToken::new();
    let marked = manager.mark_removed(&removed, &cancel).await;

    // Removing b tombstones its dependent a, but not its dependency c.
    assert!(marked.marked_names.contains(&arm_name("a")));
    assert!(marked.marked_names.contains(&arm_name("b")));
    assert!(!marked.marked_names.contains(&arm_name("c")));

    for handle in &marked.close_before_complete {
        handle.close().await.unwrap();
    }
    assert_eq!(log.events(), vec!["close b"]);

    let removed_names = manager
        .remove_marked_and_close(&HashSet::new(), &cancel)
        .await
        .unwrap();
    assert_eq!(removed_names, vec![arm_name("a"), arm_name("b")]);
    // a closes during the sweep; b was already closed by its handle.
    assert_eq!(log.events(), vec!["close b", "close a"]);
    assert!(manager.resource_by_name(&arm_name("c")).is_ok());
    assert!(matches!(
        manager.resource_by_name(&arm_name("b")),
        Err(ResourceError::NotFound(_))
    ));
}

#[tokio::test]
async fn close_tears_down_dependents_before_dependencies() {
    let log = Arc::new(DriverLog::default());
    let manager = manager_with_log(&log);
    build_chain(&manager).await;
    log.clear();

    manager.close(&CancellationToken::new()).await.unwrap();
    assert_eq!(log.events(), vec!["close a", "close b", "close c"]);
    assert!(manager.resource_names().is_empty());
}

#[tokio::test]
async fn unresolved_dependency_keeps_node_pending() {
    let log = Arc::new(DriverLog::default());
    let manager = manager_with_log(&log);

    let mut diff = ConfigDiff::default();
    diff.added.components.push(arm("a").with_depends_on(["ghost"]));
    let cancel = CancellationToken::new();
    manager.update_resources(&diff, &cancel).await.unwrap();
    manager.complete_config(&cancel).await;

    assert!(log.events().is_empty(), "nothing should build: {:?}", log.events());
    let node = manager.node(&arm_name("a")).unwrap();
    assert!(node.is_uninitialized());
    assert!(matches!(
        node.last_error(),
        Some(ResourceError::MissingParent { .. })
    ));

    // Once the dependency appears, the next pass builds both.
    let mut fix = ConfigDiff::default();
    fix.added.components.push(arm("ghost"));
    manager.update_resources(&fix, &cancel).await.unwrap();
    manager.complete_config(&cancel).await;
    assert_eq!(log.events_with_prefix("build"), vec!["build ghost", "build a"]);
}

#[tokio::test]
async fn removed_processes_stop_after_the_critical_section() {
    let manager = ResourceManager::new(
        ResourceManagerOptions::default(),
        Arc::new(rover_runtime::ResourceRegistry::new()),
        None,
        MapDialer::new(),
    );
    let cancel = CancellationToken::new();

    let mut diff = ConfigDiff::default();
    diff.added.processes.push(ProcessConfig {
        one_shot: true,
        args: vec!["-c".into(), "exit 0".into()],
        ..ProcessConfig::new("p1", "sh")
    });
    manager.update_resources(&diff, &cancel).await.unwrap();
    assert_eq!(manager.process_manager().process_ids(), vec!["p1".to_string()]);

    let mut removed = Config::default();
    removed.processes.push(ProcessConfig::new("p1", "sh"));
    let marked = manager.mark_removed(&removed, &cancel).await;

    // The live manager no longer owns it; the shadow does.
    assert!(manager.process_manager().process_ids().is_empty());
    assert_eq!(marked.process_shadow.process_ids(), vec!["p1".to_string()]);
    marked.process_shadow.stop().await.unwrap();
    assert!(marked.process_shadow.process_ids().is_empty());
}
