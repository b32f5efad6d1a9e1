//! Tracking of in-flight run tasks.
//!
//! Every agent run is spawned through `RunTasks` so graceful shutdown can
//! wait for runs to emit their terminal event and release their session.

// std::sync::Mutex: the lock is never held across an .await
use std::sync::{Arc, Mutex, PoisonError};

use tokio::task::JoinHandle;
use tracing::{info, warn};

/// Registry of spawned run tasks.
#[derive(Clone, Default)]
pub struct RunTasks {
    handles: Arc<Mutex<Vec<JoinHandle<()>>>>,
}

impl RunTasks {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Spawn a run and register its handle.
    ///
    /// The handle is registered before this returns, so a run that finishes
    /// immediately is still seen by `shutdown`.
    pub fn spawn<F>(&self, future: F)
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let handle = tokio::spawn(future);

        let mut handles = self.handles.lock().unwrap_or_else(PoisonError::into_inner);
        handles.retain(|h| !h.is_finished());
        handles.push(handle);
    }

    /// Wait for every registered run to finish.
    pub async fn shutdown(&self) {
        let handles: Vec<_> =
            std::mem::take(&mut *self.handles.lock().unwrap_or_else(PoisonError::into_inner));

        let count = handles.len();
        if count == 0 {
            return;
        }

        info!(count, "Waiting for in-flight runs to finish");

        for handle in handles {
            if let Err(e) = handle.await {
                warn!(error = %e, "Run task panicked");
            }
        }

        info!("All runs finished");
    }

    /// Number of runs still in flight.
    pub fn active(&self) -> usize {
        let mut handles = self.handles.lock().unwrap_or_else(PoisonError::into_inner);
        handles.retain(|h| !h.is_finished());
        handles.len()
    }
}
