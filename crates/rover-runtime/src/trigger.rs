//! The reconfigure trigger.
//!
//! Remote parent notifiers and diff producers wake the reconfigure
//! task through a single-slot channel: [`ConfigTrigger::notify`] is a
//! `try_send`, so any burst of wakes while a pass is pending collapses
//! into one. One long-running task drains the [`ConfigTriggerStream`];
//! re-entrant passes cannot happen by construction.

use tokio::sync::mpsc;

/// Creates a connected trigger/stream pair.
#[must_use]
pub fn config_trigger() -> (ConfigTrigger, ConfigTriggerStream) {
    let (tx, rx) = mpsc::channel(1);
    (ConfigTrigger { tx }, ConfigTriggerStream { rx })
}

/// Sending half: cheap to clone, safe to fire from any thread.
#[derive(Clone)]
pub struct ConfigTrigger {
    tx: mpsc::Sender<()>,
}

impl ConfigTrigger {
    /// Requests a reconfigure pass. Never blocks; a wake already
    /// pending absorbs this one.
    pub fn notify(&self) {
        let _ = self.tx.try_send(());
    }
}

/// Receiving half, held by the single reconfigure task.
pub struct ConfigTriggerStream {
    rx: mpsc::Receiver<()>,
}

impl ConfigTriggerStream {
    /// Waits for the next wake. Returns `false` once every trigger
    /// handle is gone.
    pub async fn triggered(&mut self) -> bool {
        self.rx.recv().await.is_some()
    }
}
