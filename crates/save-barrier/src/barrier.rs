//! Cleanup barrier: the chief's wait for worker temp saves to disappear
//!
//! Workers signal completion through the store itself. Each non-chief worker
//! saves into `<model_path>/worker<index>_temp` and deletes that tree when
//! done; the chief polls the model directory until no `worker*` entries
//! remain. No other channel exists between the processes.

use std::sync::Arc;
use std::time::{Duration, Instant};

use cluster_core::{Error, Result, SaveConfig};
use model_store::{join_path, StoreBackend};
use parking_lot::RwLock;
use tracing::{debug, info, instrument};

/// Entry-name prefix reserved for in-flight worker saves.
///
/// The chief treats ANY entry starting with this prefix as a pending worker,
/// whatever its type. Final artifact files must therefore never use it.
pub const WORKER_ENTRY_PREFIX: &str = "worker";

/// Temp directory name for a worker's in-flight save
pub fn worker_temp_name(index: u32) -> String {
    format!("{}{}_temp", WORKER_ENTRY_PREFIX, index)
}

/// Store path of a worker's temp directory under a model path
pub fn worker_temp_path(model_path: &str, index: u32) -> String {
    join_path(model_path, &worker_temp_name(index))
}

/// Outcome of a completed barrier wait
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BarrierWait {
    /// Wall time spent waiting
    pub waited: Duration,

    /// Number of directory polls issued
    pub polls: u64,
}

/// Polls a model directory until every worker temp entry is gone.
///
/// The wait is unbounded by default, mirroring a cluster whose workers are
/// trusted to always clean up; configuring `cleanup_timeout` converts a
/// worker that never does into a typed error instead of a hang.
pub struct CleanupBarrier {
    store: Arc<dyn StoreBackend>,
    poll_interval: Duration,
    cleanup_timeout: Option<Duration>,

    /// Entries seen by the most recent poll
    last_pending: Arc<RwLock<Vec<String>>>,
}

impl CleanupBarrier {
    /// Create a barrier over a store with the given save settings
    pub fn new(store: Arc<dyn StoreBackend>, config: &SaveConfig) -> Self {
        Self {
            store,
            poll_interval: config.poll_interval,
            cleanup_timeout: config.cleanup_timeout,
            last_pending: Arc::new(RwLock::new(Vec::new())),
        }
    }

    /// Worker temp entries currently present under a model path.
    ///
    /// A missing model directory reports no pending workers.
    pub async fn pending_workers(&self, model_path: &str) -> Result<Vec<String>> {
        let entries = self.store.list_entries(model_path).await?;
        let pending: Vec<String> = entries
            .into_iter()
            .filter(|name| name.starts_with(WORKER_ENTRY_PREFIX))
            .collect();

        *self.last_pending.write() = pending.clone();
        Ok(pending)
    }

    /// Snapshot of the entries seen by the most recent poll
    pub fn last_pending(&self) -> Vec<String> {
        self.last_pending.read().clone()
    }

    /// Block until no worker temp entries remain under the model path.
    ///
    /// Polls the directory listing at the configured interval. Returns how
    /// long the wait took once the directory is clean; fails with
    /// `CleanupTimeout` if a bound is configured and exceeded, naming the
    /// entries still present.
    #[instrument(skip(self))]
    pub async fn await_worker_cleanup(&self, model_path: &str) -> Result<BarrierWait> {
        let start = Instant::now();
        let mut polls = 0u64;

        loop {
            let pending = self.pending_workers(model_path).await?;
            polls += 1;

            if pending.is_empty() {
                let waited = start.elapsed();
                info!(
                    model_path = %model_path,
                    waited_ms = waited.as_millis() as u64,
                    polls,
                    "Worker temp saves cleaned up"
                );
                return Ok(BarrierWait { waited, polls });
            }

            if let Some(timeout) = self.cleanup_timeout {
                if start.elapsed() >= timeout {
                    return Err(Error::CleanupTimeout {
                        path: model_path.to_string(),
                        timeout_ms: timeout.as_millis() as u64,
                        pending,
                    });
                }
            }

            debug!(
                model_path = %model_path,
                pending = ?pending,
                polls,
                "Waiting for worker cleanup"
            );
            tokio::time::sleep(self.poll_interval).await;
        }
    }
}
