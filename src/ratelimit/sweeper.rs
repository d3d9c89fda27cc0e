//! Background removal of expired windows.
//!
//! Lazy replacement in the store keeps decisions correct; the sweeper keeps
//! memory bounded when many keys are seen once and never again.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, info, warn};

use super::store::WindowStore;
use crate::error::{Result, WindowLimitError};

/// Handle to a running sweep task.
///
/// Dropping the handle also stops the task.
pub struct Sweeper {
    handle: Option<JoinHandle<()>>,
    shutdown: Option<oneshot::Sender<()>>,
}

impl Sweeper {
    /// Spawn a task on the current Tokio runtime that sweeps `store` every
    /// `interval`.
    pub fn spawn(store: Arc<WindowStore>, interval: Duration) -> Result<Self> {
        if interval.is_zero() {
            return Err(WindowLimitError::Config(
                "sweep interval must be greater than zero".to_string(),
            ));
        }
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| WindowLimitError::Runtime(e.to_string()))?;

        let (shutdown_tx, mut shutdown_rx) = oneshot::channel();
        let handle = runtime.spawn(async move {
            let mut ticker = time::interval_at(time::Instant::now() + interval, interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            info!(interval = ?interval, "Window sweeper started");
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let removed = store.sweep_expired();
                        debug!(removed = removed, tracked = store.len(), "Sweep pass finished");
                    }
                    _ = &mut shutdown_rx => {
                        break;
                    }
                }
            }
            info!("Window sweeper stopped");
        });

        Ok(Self {
            handle: Some(handle),
            shutdown: Some(shutdown_tx),
        })
    }

    /// Stop the task and wait for it to finish.
    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            if let Err(e) = handle.await {
                warn!(error = %e, "Window sweeper task ended abnormally");
            }
        }
    }
}

impl Drop for Sweeper {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
    }
}
