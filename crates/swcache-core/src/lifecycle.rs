//! Worker lifecycle states and the keep-alive set each event carries.

use std::fmt;
use std::future::Future;

use tokio::task::JoinHandle;
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    Parsed,
    Installing,
    /// Installed and waiting to take over
    Installed,
    Activating,
    Activated,
    /// Failed to install; never becomes active
    Redundant,
}

impl fmt::Display for WorkerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            WorkerState::Parsed => "parsed",
            WorkerState::Installing => "installing",
            WorkerState::Installed => "installed",
            WorkerState::Activating => "activating",
            WorkerState::Activated => "activated",
            WorkerState::Redundant => "redundant",
        };
        f.write_str(name)
    }
}

/// Work an event asked the host to wait for before tearing the worker down.
///
/// Tasks registered with `wait_until` run in the background; the caller of the
/// event is not blocked on them. The host awaits `settled` instead.
#[derive(Default)]
pub struct KeepAlive {
    pending: Vec<JoinHandle<()>>,
}

impl KeepAlive {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn wait_until<F>(&mut self, work: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.pending.push(tokio::spawn(work));
    }

    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    /// Wait for every registered task to finish.
    pub async fn settled(self) {
        for handle in self.pending {
            if let Err(e) = handle.await {
                warn!(error = %e, "Keep-alive task did not complete");
            }
        }
    }
}
