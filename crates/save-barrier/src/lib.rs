//! Chief-coordinated model saves for distributed training
//!
//! Implements the save rendezvous used at the end of a training run: every
//! process saves, non-chief workers clean their temp saves up, and the chief
//! only reports success once the model directory holds nothing but the
//! canonical artifact.

pub mod artifact;
pub mod barrier;
pub mod saver;

pub use artifact::{
    Artifact, BundleManifest, ModelBundle, TensorData, BUNDLE_FORMAT_VERSION, MANIFEST_FILE,
    WEIGHTS_FILE,
};
pub use barrier::{
    worker_temp_name, worker_temp_path, BarrierWait, CleanupBarrier, WORKER_ENTRY_PREFIX,
};
pub use saver::{ModelSaver, SaveOutcome};
