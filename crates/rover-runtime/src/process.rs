//! The OS process sub-manager.
//!
//! Configuration may declare OS child processes alongside resources.
//! They never enter the resource graph; a [`ProcessManager`] owns them.
//! Two implementations exist:
//!
//! - [`HostProcessManager`] spawns and supervises real child processes
//! - [`NoopProcessManager`] is installed in untrusted environments: it
//!   accepts no adds and performs no stops
//!
//! Managers can exchange live processes: during diff application,
//! removed processes move to a shadow manager whose sole job is to stop
//! them after the critical section.

use crate::config::ProcessConfig;
use async_trait::async_trait;
use parking_lot::Mutex;
use rover_types::ErrorCode;
use std::collections::HashMap;
use std::io;
use std::sync::Arc;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Process sub-manager failure.
#[derive(Debug, Clone, Error)]
pub enum ProcessError {
    /// The manager accepts no processes (untrusted environment).
    #[error("process manager does not accept processes")]
    Disabled,

    /// A process with this ID is already managed.
    #[error("a process with ID \"{0}\" is already managed")]
    DuplicateId(String),

    /// Spawning or running the process failed.
    #[error("failed to start process \"{id}\": {reason}")]
    StartFailed { id: String, reason: String },

    /// Stopping the process failed.
    #[error("failed to stop process \"{id}\": {reason}")]
    StopFailed { id: String, reason: String },

    /// The start was canceled.
    #[error("process start canceled")]
    Canceled,
}

impl ErrorCode for ProcessError {
    fn code(&self) -> &'static str {
        match self {
            Self::Disabled => "PROCESS_DISABLED",
            Self::DuplicateId(_) => "PROCESS_DUPLICATE_ID",
            Self::StartFailed { .. } => "PROCESS_START_FAILED",
            Self::StopFailed { .. } => "PROCESS_STOP_FAILED",
            Self::Canceled => "PROCESS_CANCELED",
        }
    }

    fn is_recoverable(&self) -> bool {
        match self {
            Self::Disabled | Self::DuplicateId(_) => false,
            Self::StartFailed { .. } | Self::StopFailed { .. } | Self::Canceled => true,
        }
    }
}

/// One supervised OS process.
#[async_trait]
pub trait ManagedProcess: Send + Sync {
    fn id(&self) -> &str;

    /// Starts the process. One-shot processes run to completion here.
    async fn start(&self, cancel: &CancellationToken) -> Result<(), ProcessError>;

    /// Stops the process. Must be safe on a process that already exited.
    async fn stop(&self) -> Result<(), ProcessError>;
}

/// Owner of a set of OS child processes.
#[async_trait]
pub trait ProcessManager: Send + Sync {
    /// IDs of all managed processes, sorted.
    fn process_ids(&self) -> Vec<String>;

    /// Spawns and manages a process described by config.
    async fn add_process_from_config(
        &self,
        conf: &ProcessConfig,
        cancel: &CancellationToken,
    ) -> Result<(), ProcessError>;

    /// Takes ownership of an already-running process, optionally
    /// starting it. This is the exchange path between two managers.
    async fn add_process(
        &self,
        proc: Arc<dyn ManagedProcess>,
        start: bool,
        cancel: &CancellationToken,
    ) -> Result<(), ProcessError>;

    /// Removes a process from management without stopping it.
    fn remove_process_by_id(&self, id: &str) -> Option<Arc<dyn ManagedProcess>>;

    /// Stops every managed process.
    async fn stop(&self) -> Result<(), ProcessError>;
}

/// The untrusted-environment manager: accepts nothing, stops nothing.
#[derive(Debug, Default)]
pub struct NoopProcessManager;

#[async_trait]
impl ProcessManager for NoopProcessManager {
    fn process_ids(&self) -> Vec<String> {
        Vec::new()
    }

    async fn add_process_from_config(
        &self,
        _conf: &ProcessConfig,
        _cancel: &CancellationToken,
    ) -> Result<(), ProcessError> {
        Err(ProcessError::Disabled)
    }

    async fn add_process(
        &self,
        _proc: Arc<dyn ManagedProcess>,
        _start: bool,
        _cancel: &CancellationToken,
    ) -> Result<(), ProcessError> {
        Err(ProcessError::Disabled)
    }

    fn remove_process_by_id(&self, _id: &str) -> Option<Arc<dyn ManagedProcess>> {
        None
    }

    async fn stop(&self) -> Result<(), ProcessError> {
        Ok(())
    }
}

/// Process manager that spawns real child processes on the host.
#[derive(Default)]
pub struct HostProcessManager {
    procs: Mutex<HashMap<String, Arc<dyn ManagedProcess>>>,
}

impl HostProcessManager {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ProcessManager for HostProcessManager {
    fn process_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.procs.lock().keys().cloned().collect();
        ids.sort();
        ids
    }

    async fn add_process_from_config(
        &self,
        conf: &ProcessConfig,
        cancel: &CancellationToken,
    ) -> Result<(), ProcessError> {
        conf.validate()
            .map_err(|err| ProcessError::StartFailed {
                id: conf.id.clone(),
                reason: err.to_string(),
            })?;
        let proc: Arc<dyn ManagedProcess> = Arc::new(ShellProcess::from_config(conf.clone()));
        self.add_process(proc, true, cancel).await
    }

    async fn add_process(
        &self,
        proc: Arc<dyn ManagedProcess>,
        start: bool,
        cancel: &CancellationToken,
    ) -> Result<(), ProcessError> {
        let id = proc.id().to_string();
        {
            let mut procs = self.procs.lock();
            if procs.contains_key(&id) {
                return Err(ProcessError::DuplicateId(id));
            }
            procs.insert(id.clone(), Arc::clone(&proc));
        }
        if start {
            if let Err(err) = proc.start(cancel).await {
                self.procs.lock().remove(&id);
                return Err(err);
            }
        }
        debug!(process = %id, started = start, "process now managed");
        Ok(())
    }

    fn remove_process_by_id(&self, id: &str) -> Option<Arc<dyn ManagedProcess>> {
        self.procs.lock().remove(id)
    }

    async fn stop(&self) -> Result<(), ProcessError> {
        let procs: Vec<Arc<dyn ManagedProcess>> = self.procs.lock().drain().map(|(_, p)| p).collect();
        let mut first_err = None;
        for proc in procs {
            if let Err(err) = proc.stop().await {
                warn!(process = proc.id(), error = %err, "failed stopping process");
                first_err.get_or_insert(err);
            }
        }
        match first_err {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

/// A child process spawned from a [`ProcessConfig`].
pub struct ShellProcess {
    conf: ProcessConfig,
    child: tokio::sync::Mutex<Option<tokio::process::Child>>,
}

impl ShellProcess {
    #[must_use]
    pub fn from_config(conf: ProcessConfig) -> Self {
        Self {
            conf,
            child: tokio::sync::Mutex::new(None),
        }
    }

    fn start_failed(&self, reason: impl ToString) -> ProcessError {
        ProcessError::StartFailed {
            id: self.conf.id.clone(),
            reason: reason.to_string(),
        }
    }
}

#[async_trait]
impl ManagedProcess for ShellProcess {
    fn id(&self) -> &str {
        &self.conf.id
    }

    async fn start(&self, cancel: &CancellationToken) -> Result<(), ProcessError> {
        let mut command = tokio::process::Command::new(&self.conf.name);
        command.args(&self.conf.args).kill_on_drop(true);
        if let Some(cwd) = &self.conf.cwd {
            command.current_dir(cwd);
        }
        let mut child = command.spawn().map_err(|err| self.start_failed(err))?;

        if self.conf.one_shot {
            let status = tokio::select! {
                status = child.wait() => status.map_err(|err| self.start_failed(err))?,
                () = cancel.cancelled() => {
                    let _ = child.kill().await;
                    return Err(ProcessError::Canceled);
                }
            };
            if !status.success() {
                return Err(self.start_failed(format!("exited with {status}")));
            }
            return Ok(());
        }

        *self.child.lock().await = Some(child);
        Ok(())
    }

    async fn stop(&self) -> Result<(), ProcessError> {
        let Some(mut child) = self.child.lock().await.take() else {
            return Ok(());
        };
        if let Err(err) = child.start_kill() {
            // A process that already exited is a successful stop.
            if err.kind() != io::ErrorKind::InvalidInput {
                return Err(ProcessError::StopFailed {
                    id: self.conf.id.clone(),
                    reason: err.to_string(),
                });
            }
        }
        let _ = child.wait().await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rover_types::assert_error_codes;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FakeProcess {
        id: String,
        starts: AtomicUsize,
        stops: AtomicUsize,
    }

    impl FakeProcess {
        fn new(id: &str) -> Arc<Self> {
            Arc::new(Self {
                id: id.to_string(),
                starts: AtomicUsize::new(0),
                stops: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl ManagedProcess for FakeProcess {
        fn id(&self) -> &str {
            &self.id
        }

        async fn start(&self, _cancel: &CancellationToken) -> Result<(), ProcessError> {
            self.starts.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn stop(&self) -> Result<(), ProcessError> {
            self.stops.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test]
    async fn noop_manager_accepts_nothing() {
        let noop = NoopProcessManager;
        let cancel = CancellationToken::new();
        assert!(matches!(
            noop.add_process_from_config(&ProcessConfig::new("p", "/bin/true"), &cancel)
                .await,
            Err(ProcessError::Disabled)
        ));
        assert!(matches!(
            noop.add_process(FakeProcess::new("p"), false, &cancel).await,
            Err(ProcessError::Disabled)
        ));
        assert!(noop.remove_process_by_id("p").is_none());
        assert!(noop.stop().await.is_ok());
        assert!(noop.process_ids().is_empty());
    }

    #[tokio::test]
    async fn host_manager_tracks_and_stops() {
        let manager = HostProcessManager::new();
        let cancel = CancellationToken::new();
        let proc = FakeProcess::new("p1");
        manager
            .add_process(Arc::clone(&proc) as Arc<dyn ManagedProcess>, true, &cancel)
            .await
            .unwrap();
        assert_eq!(manager.process_ids(), vec!["p1".to_string()]);
        assert_eq!(proc.starts.load(Ordering::SeqCst), 1);

        manager.stop().await.unwrap();
        assert_eq!(proc.stops.load(Ordering::SeqCst), 1);
        assert!(manager.process_ids().is_empty());
    }

    #[tokio::test]
    async fn duplicate_ids_rejected() {
        let manager = HostProcessManager::new();
        let cancel = CancellationToken::new();
        manager
            .add_process(FakeProcess::new("p1"), false, &cancel)
            .await
            .unwrap();
        assert!(matches!(
            manager.add_process(FakeProcess::new("p1"), false, &cancel).await,
            Err(ProcessError::DuplicateId(_))
        ));
    }

    #[tokio::test]
    async fn exchange_between_managers_defers_stop() {
        let live = HostProcessManager::new();
        let shadow = HostProcessManager::new();
        let cancel = CancellationToken::new();
        let proc = FakeProcess::new("p1");
        live.add_process(Arc::clone(&proc) as Arc<dyn ManagedProcess>, true, &cancel)
            .await
            .unwrap();

        // Diff application moves the process without stopping it.
        let taken = live.remove_process_by_id("p1").unwrap();
        shadow.add_process(taken, false, &cancel).await.unwrap();
        assert_eq!(proc.stops.load(Ordering::SeqCst), 0);
        assert!(live.process_ids().is_empty());

        // The shadow stops it after the critical section.
        shadow.stop().await.unwrap();
        assert_eq!(proc.stops.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn one_shot_process_runs_to_completion() {
        let manager = HostProcessManager::new();
        let cancel = CancellationToken::new();
        let conf = ProcessConfig {
            one_shot: true,
            args: vec!["-c".into(), "exit 0".into()],
            ..ProcessConfig::new("oneshot", "sh")
        };
        manager.add_process_from_config(&conf, &cancel).await.unwrap();
    }

    #[tokio::test]
    async fn failed_one_shot_reports_start_failure() {
        let manager = HostProcessManager::new();
        let cancel = CancellationToken::new();
        let conf = ProcessConfig {
            one_shot: true,
            args: vec!["-c".into(), "exit 3".into()],
            ..ProcessConfig::new("failing", "sh")
        };
        let err = manager.add_process_from_config(&conf, &cancel).await.unwrap_err();
        assert!(matches!(err, ProcessError::StartFailed { .. }));
        // Failed adds are not left behind in the manager.
        assert!(manager.process_ids().is_empty());
    }

    #[test]
    fn error_codes() {
        assert_error_codes(
            &[
                ProcessError::Disabled,
                ProcessError::DuplicateId("p".into()),
                ProcessError::StartFailed {
                    id: "p".into(),
                    reason: "spawn".into(),
                },
                ProcessError::StopFailed {
                    id: "p".into(),
                    reason: "kill".into(),
                },
                ProcessError::Canceled,
            ],
            "PROCESS_",
        );
    }
}
