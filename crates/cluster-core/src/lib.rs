//! Cluster Core - Foundation for the coordinated model-save pipeline
//!
//! Provides cluster topology parsing, worker identity resolution, error
//! handling, and configuration for the distributed save system.

pub mod config;
pub mod error;
pub mod telemetry;
pub mod topology;

pub use config::{JobConfig, SaveConfig, StoreBackendKind, StoreConfig};
pub use error::{Error, Result};
pub use telemetry::init_tracing;
pub use topology::{
    ClusterConfig, ClusterSpec, TaskInfo, WorkerIdentity, CHIEF_JOB, CLUSTER_CONFIG_ENV,
    WORKER_JOB,
};
