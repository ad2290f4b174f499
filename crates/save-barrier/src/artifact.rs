//! Model artifacts and the bundle format written by the save pipeline

use std::collections::BTreeMap;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use cluster_core::{Error, Result};
use model_store::{join_path, StoreBackend};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use uuid::Uuid;

/// Bundle format version
pub const BUNDLE_FORMAT_VERSION: u32 = 1;

/// Manifest file name within a bundle directory
pub const MANIFEST_FILE: &str = "manifest.json";

/// Weights file name within a bundle directory
pub const WEIGHTS_FILE: &str = "weights.bin";

/// Something that can persist itself into a store directory.
///
/// The save coordination logic treats the trained model as opaque: it only
/// decides WHERE the artifact lands and when the save is visible, never what
/// the artifact contains. File names written by an artifact must not start
/// with `worker`; that prefix marks in-flight worker temp saves.
#[async_trait]
pub trait Artifact: Send + Sync {
    /// Persist this artifact under the given store directory
    ///
    /// # Returns
    /// Total bytes written
    async fn save_to(&self, store: &dyn StoreBackend, dir: &str) -> Result<u64>;
}

/// A named f32 tensor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TensorData {
    /// Dimension sizes
    pub shape: Vec<usize>,

    /// Row-major values
    pub values: Vec<f32>,
}

impl TensorData {
    /// Create a tensor from a shape and its row-major values
    pub fn new(shape: Vec<usize>, values: Vec<f32>) -> Self {
        Self { shape, values }
    }

    /// Create a zero-filled tensor of the given shape
    pub fn zeros(shape: Vec<usize>) -> Self {
        let len = shape.iter().product();
        Self {
            shape,
            values: vec![0.0; len],
        }
    }

    /// Number of elements
    pub fn num_elements(&self) -> usize {
        self.values.len()
    }
}

/// Metadata record written alongside the weights
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BundleManifest {
    /// Bundle format version
    pub format_version: u32,

    /// Model name
    pub model_name: String,

    /// When the bundle was written
    pub saved_at: DateTime<Utc>,

    /// Unique id of this save
    pub save_id: String,

    /// Number of tensors in the weights file
    pub tensor_count: usize,

    /// Total parameter count across all tensors
    pub total_parameters: u64,
}

/// A saveable model: named tensors plus a manifest.
///
/// On save the bundle writes two files under the target directory:
/// `manifest.json` (JSON metadata) and `weights.bin` (bincode tensor map).
#[derive(Debug, Clone, PartialEq)]
pub struct ModelBundle {
    name: String,
    tensors: BTreeMap<String, TensorData>,
}

impl ModelBundle {
    /// Create an empty bundle
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            tensors: BTreeMap::new(),
        }
    }

    /// Add a tensor, replacing any previous tensor of the same name
    pub fn with_tensor(mut self, name: impl Into<String>, tensor: TensorData) -> Self {
        self.tensors.insert(name.into(), tensor);
        self
    }

    /// Add a tensor in place
    pub fn insert_tensor(&mut self, name: impl Into<String>, tensor: TensorData) {
        self.tensors.insert(name.into(), tensor);
    }

    /// Model name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Look up a tensor by name
    pub fn tensor(&self, name: &str) -> Option<&TensorData> {
        self.tensors.get(name)
    }

    /// Number of tensors
    pub fn tensor_count(&self) -> usize {
        self.tensors.len()
    }

    /// Total parameter count across all tensors
    pub fn total_parameters(&self) -> u64 {
        self.tensors
            .values()
            .map(|t| t.num_elements() as u64)
            .sum()
    }

    /// Load a bundle previously written by [`Artifact::save_to`]
    pub async fn load(store: &dyn StoreBackend, dir: &str) -> Result<Self> {
        let manifest_path = join_path(dir, MANIFEST_FILE);
        let manifest_raw = store.read(&manifest_path).await?;
        let manifest: BundleManifest =
            serde_json::from_slice(&manifest_raw).map_err(|e| Error::ArtifactCorrupted {
                path: manifest_path.clone(),
                reason: format!("undecodable manifest: {}", e),
            })?;

        if manifest.format_version != BUNDLE_FORMAT_VERSION {
            return Err(Error::ArtifactCorrupted {
                path: manifest_path,
                reason: format!(
                    "unsupported format version {} (expected {})",
                    manifest.format_version, BUNDLE_FORMAT_VERSION
                ),
            });
        }

        let weights_path = join_path(dir, WEIGHTS_FILE);
        let weights_raw = store.read(&weights_path).await?;
        let tensors: BTreeMap<String, TensorData> =
            bincode::deserialize(&weights_raw).map_err(|e| Error::ArtifactCorrupted {
                path: weights_path.clone(),
                reason: format!("undecodable weights: {}", e),
            })?;

        if tensors.len() != manifest.tensor_count {
            return Err(Error::ArtifactCorrupted {
                path: weights_path,
                reason: format!(
                    "manifest lists {} tensors but weights hold {}",
                    manifest.tensor_count,
                    tensors.len()
                ),
            });
        }

        debug!(
            model_name = %manifest.model_name,
            tensor_count = manifest.tensor_count,
            "Loaded model bundle"
        );

        Ok(Self {
            name: manifest.model_name,
            tensors,
        })
    }
}

#[async_trait]
impl Artifact for ModelBundle {
    async fn save_to(&self, store: &dyn StoreBackend, dir: &str) -> Result<u64> {
        let manifest = BundleManifest {
            format_version: BUNDLE_FORMAT_VERSION,
            model_name: self.name.clone(),
            saved_at: Utc::now(),
            save_id: Uuid::new_v4().to_string(),
            tensor_count: self.tensor_count(),
            total_parameters: self.total_parameters(),
        };

        let weights = bincode::serialize(&self.tensors)
            .map_err(|e| Error::Serialization(e.to_string()))?;
        let manifest_json = serde_json::to_vec_pretty(&manifest)?;

        let weights_bytes = store
            .write(&join_path(dir, WEIGHTS_FILE), Bytes::from(weights))
            .await?;
        let manifest_bytes = store
            .write(&join_path(dir, MANIFEST_FILE), Bytes::from(manifest_json))
            .await?;

        let total = weights_bytes + manifest_bytes;
        info!(
            model_name = %self.name,
            dir = %dir,
            save_id = %manifest.save_id,
            size_bytes = total,
            "Model bundle written"
        );

        Ok(total)
    }
}
