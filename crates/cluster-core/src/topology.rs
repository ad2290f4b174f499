//! Cluster topology description and worker identity resolution
//!
//! A training cluster is described by a JSON document of the form
//! `{"cluster": {"chief": [...], "worker": [...]}, "task": {"type": "worker",
//! "index": 1}}`, conventionally injected through an environment variable.
//! This module parses that document and resolves the calling process's
//! immutable identity (chief or not, task index) from it.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::debug;

use crate::{Error, Result};

/// Default environment variable holding the cluster description JSON
pub const CLUSTER_CONFIG_ENV: &str = "CLUSTER_CONFIG";

/// Job name designating the chief task
pub const CHIEF_JOB: &str = "chief";

/// Job name designating worker tasks
pub const WORKER_JOB: &str = "worker";

/// Cluster job map: job name to the addresses of its tasks
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClusterSpec {
    jobs: HashMap<String, Vec<String>>,
}

impl ClusterSpec {
    /// Create a cluster spec from a job map
    pub fn new(jobs: HashMap<String, Vec<String>>) -> Self {
        Self { jobs }
    }

    /// Returns true if no jobs are defined (single-process run)
    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    /// Addresses of the tasks in a job, if the job exists
    pub fn job(&self, name: &str) -> Option<&[String]> {
        self.jobs.get(name).map(|addrs| addrs.as_slice())
    }

    /// Number of tasks in a job (0 if the job is absent)
    pub fn task_count(&self, name: &str) -> usize {
        self.jobs.get(name).map(|addrs| addrs.len()).unwrap_or(0)
    }

    /// Number of tasks in the `worker` job
    pub fn num_workers(&self) -> usize {
        self.task_count(WORKER_JOB)
    }

    /// Total number of tasks across all jobs
    pub fn total_tasks(&self) -> usize {
        self.jobs.values().map(|addrs| addrs.len()).sum()
    }
}

/// The slot this process occupies in the cluster
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskInfo {
    /// Role tag, e.g. "chief" or "worker" (absent for a solo run)
    #[serde(rename = "type", default)]
    pub task_type: Option<String>,

    /// Index of this task within its job
    #[serde(default)]
    pub index: Option<u32>,
}

/// Full cluster description: job map plus this process's slot
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterConfig {
    /// Job name to task addresses
    #[serde(default)]
    pub cluster: ClusterSpec,

    /// This process's slot
    #[serde(default)]
    pub task: TaskInfo,
}

impl ClusterConfig {
    /// Parse a cluster description from its JSON form
    pub fn from_json(raw: &str) -> Result<Self> {
        serde_json::from_str(raw).map_err(|e| Error::InvalidClusterConfig {
            message: format!("unparseable cluster description: {}", e),
        })
    }

    /// Read the cluster description from the default environment variable
    pub fn from_env() -> Result<Self> {
        Self::from_env_var(CLUSTER_CONFIG_ENV)
    }

    /// Read the cluster description from a named environment variable
    pub fn from_env_var(variable: &str) -> Result<Self> {
        let raw = std::env::var(variable).map_err(|_| Error::ClusterConfigMissing {
            variable: variable.to_string(),
        })?;
        debug!(variable, "Read cluster description from environment");
        Self::from_json(&raw)
    }

    /// Check cluster-level invariants.
    ///
    /// An empty cluster spec is a valid solo run. A non-empty spec must
    /// designate exactly one chief task, and this process's role tag (when
    /// set) must name a job that exists in the spec. Task indices are not
    /// range-checked: they are opaque distinctness keys.
    pub fn validate(&self) -> Result<()> {
        if self.cluster.is_empty() {
            return Ok(());
        }

        let chiefs = self.cluster.task_count(CHIEF_JOB);
        if chiefs != 1 {
            return Err(Error::InvalidChiefCount { count: chiefs });
        }

        if let Some(task_type) = self.task.task_type.as_deref() {
            if !task_type.trim().is_empty() && self.cluster.job(task_type).is_none() {
                return Err(Error::InvalidClusterConfig {
                    message: format!("task type {} does not appear in the cluster spec", task_type),
                });
            }
        }

        Ok(())
    }

    /// Resolve this process's identity from the description
    pub fn identity(&self) -> WorkerIdentity {
        WorkerIdentity::from_config(self)
    }
}

/// Resolved identity of the calling process, immutable for its lifetime.
///
/// A process with no role tag, or tagged exactly `chief`, is the chief; all
/// others are not. A blank role tag counts as no tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerIdentity {
    task_type: Option<String>,
    task_index: Option<u32>,
}

impl WorkerIdentity {
    /// Build an identity from a raw role tag and task index
    pub fn new(task_type: Option<String>, task_index: Option<u32>) -> Self {
        let task_type = task_type.filter(|t| !t.trim().is_empty());
        Self {
            task_type,
            task_index,
        }
    }

    /// The chief task's identity
    pub fn chief() -> Self {
        Self::new(Some(CHIEF_JOB.to_string()), None)
    }

    /// A non-chief worker task's identity
    pub fn worker(index: u32) -> Self {
        Self::new(Some(WORKER_JOB.to_string()), Some(index))
    }

    /// Identity of a process running outside any cluster (acts as chief)
    pub fn solo() -> Self {
        Self::new(None, None)
    }

    /// Resolve the identity declared by a cluster description
    pub fn from_config(config: &ClusterConfig) -> Self {
        Self::new(config.task.task_type.clone(), config.task.index)
    }

    /// Whether this process is responsible for the canonical final save
    pub fn is_chief(&self) -> bool {
        match self.task_type.as_deref() {
            None => true,
            Some(task_type) => task_type == CHIEF_JOB,
        }
    }

    /// The raw role tag, if any
    pub fn task_type(&self) -> Option<&str> {
        self.task_type.as_deref()
    }

    /// The task index, if any
    pub fn task_index(&self) -> Option<u32> {
        self.task_index
    }

    /// Task index of a non-chief worker; required to derive its temp path
    pub fn worker_index(&self) -> Result<u32> {
        self.task_index.ok_or_else(|| Error::MissingTaskIndex {
            task_type: self
                .task_type
                .clone()
                .unwrap_or_else(|| "unknown".to_string()),
        })
    }

    /// Short role label for log fields
    pub fn role_label(&self) -> &str {
        if self.is_chief() {
            CHIEF_JOB
        } else {
            self.task_type.as_deref().unwrap_or(WORKER_JOB)
        }
    }
}
