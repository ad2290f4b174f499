//! Chief-coordinated model saver
//!
//! Every process in the cluster calls [`ModelSaver::save`] with the same
//! model path. Non-chief workers write into a per-worker temp directory and
//! remove it; the chief writes the canonical artifact and then holds the
//! save open until all temp directories are gone. When the chief's call
//! returns, the model directory is complete and quiescent.

use std::sync::Arc;

use cluster_core::{ClusterConfig, Result, SaveConfig, WorkerIdentity};
use model_store::StoreBackend;
use tracing::{info, instrument};

use crate::artifact::Artifact;
use crate::barrier::{worker_temp_path, BarrierWait, CleanupBarrier};

/// What a completed save did with the artifact
#[derive(Debug, Clone, PartialEq)]
pub enum SaveOutcome {
    /// The chief wrote the canonical artifact and observed full cleanup
    Published {
        /// Canonical model path
        path: String,
        /// Bytes the artifact wrote
        bytes_written: u64,
        /// The barrier wait the chief sat through
        wait: BarrierWait,
    },

    /// A non-chief worker wrote its replica and removed it again
    Discarded {
        /// The worker's temp path
        temp_path: String,
        /// Bytes the artifact wrote before removal
        bytes_written: u64,
    },
}

impl SaveOutcome {
    /// Whether this process published the canonical artifact
    pub fn is_published(&self) -> bool {
        matches!(self, SaveOutcome::Published { .. })
    }

    /// Store path the artifact was written to
    pub fn path(&self) -> &str {
        match self {
            SaveOutcome::Published { path, .. } => path,
            SaveOutcome::Discarded { temp_path, .. } => temp_path,
        }
    }

    /// Bytes the artifact wrote
    pub fn bytes_written(&self) -> u64 {
        match self {
            SaveOutcome::Published { bytes_written, .. } => *bytes_written,
            SaveOutcome::Discarded { bytes_written, .. } => *bytes_written,
        }
    }

    /// The chief's barrier wait, if this process was chief
    pub fn wait(&self) -> Option<BarrierWait> {
        match self {
            SaveOutcome::Published { wait, .. } => Some(*wait),
            SaveOutcome::Discarded { .. } => None,
        }
    }
}

/// Coordinates one process's part of a cluster-wide model save.
///
/// The saver is built from an explicit [`WorkerIdentity`]; it never consults
/// the environment itself. Construct it once and reuse it for every save the
/// process performs.
pub struct ModelSaver {
    identity: WorkerIdentity,
    store: Arc<dyn StoreBackend>,
    barrier: CleanupBarrier,
}

impl ModelSaver {
    /// Create a saver for a process with the given identity
    pub fn new(identity: WorkerIdentity, store: Arc<dyn StoreBackend>, config: SaveConfig) -> Self {
        let barrier = CleanupBarrier::new(store.clone(), &config);
        Self {
            identity,
            store,
            barrier,
        }
    }

    /// Create a saver from a full cluster description.
    ///
    /// Validates the description first, so misconfigured clusters (no chief,
    /// several chiefs, unknown role tag) fail here rather than mid-save.
    pub fn from_cluster(
        cluster: &ClusterConfig,
        store: Arc<dyn StoreBackend>,
        config: SaveConfig,
    ) -> Result<Self> {
        cluster.validate()?;
        Ok(Self::new(cluster.identity(), store, config))
    }

    /// Create a saver from the cluster description in the conventional
    /// environment variable.
    ///
    /// This is the one place the pipeline touches the environment; the
    /// resolved identity is fixed from here on.
    pub fn from_env(store: Arc<dyn StoreBackend>, config: SaveConfig) -> Result<Self> {
        let cluster = ClusterConfig::from_env()?;
        Self::from_cluster(&cluster, store, config)
    }

    /// This process's identity
    pub fn identity(&self) -> &WorkerIdentity {
        &self.identity
    }

    /// Store path this process's save would write to, without performing
    /// any I/O. The canonical model path for the chief, a per-worker temp
    /// path otherwise.
    ///
    /// # Errors
    /// Fails for a non-chief identity that carries no task index.
    pub fn save_target(&self, model_path: &str) -> Result<String> {
        if self.identity.is_chief() {
            Ok(model_path.to_string())
        } else {
            let index = self.identity.worker_index()?;
            Ok(worker_temp_path(model_path, index))
        }
    }

    /// Perform this process's part of a cluster-wide save.
    ///
    /// Chief: writes the artifact at `model_path`, then blocks until every
    /// worker temp entry under it is gone. Non-chief: writes the artifact
    /// into its own temp directory under `model_path`, then removes the
    /// whole temp tree.
    #[instrument(skip(self, artifact), fields(role = %self.identity.role_label()))]
    pub async fn save(&self, artifact: &dyn Artifact, model_path: &str) -> Result<SaveOutcome> {
        if self.identity.is_chief() {
            self.save_as_chief(artifact, model_path).await
        } else {
            self.save_as_worker(artifact, model_path).await
        }
    }

    async fn save_as_chief(
        &self,
        artifact: &dyn Artifact,
        model_path: &str,
    ) -> Result<SaveOutcome> {
        let bytes_written = artifact.save_to(self.store.as_ref(), model_path).await?;
        info!(
            model_path = %model_path,
            bytes_written,
            "Chief saved canonical model, waiting for worker cleanup"
        );

        let wait = self.barrier.await_worker_cleanup(model_path).await?;

        Ok(SaveOutcome::Published {
            path: model_path.to_string(),
            bytes_written,
            wait,
        })
    }

    async fn save_as_worker(
        &self,
        artifact: &dyn Artifact,
        model_path: &str,
    ) -> Result<SaveOutcome> {
        let temp_path = self.save_target(model_path)?;

        let bytes_written = artifact.save_to(self.store.as_ref(), &temp_path).await?;
        self.store.remove_tree(&temp_path).await?;

        info!(
            temp_path = %temp_path,
            bytes_written,
            "Worker temp save written and removed"
        );

        Ok(SaveOutcome::Discarded {
            temp_path,
            bytes_written,
        })
    }
}
