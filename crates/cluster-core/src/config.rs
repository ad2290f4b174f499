//! Configuration structures for the save pipeline

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::topology::CLUSTER_CONFIG_ENV;

/// Tuning knobs for the coordinated save barrier
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SaveConfig {
    /// Interval between directory polls while the chief waits for worker
    /// temp entries to disappear
    #[serde(
        with = "duration_ms",
        rename = "poll_interval_ms",
        default = "default_poll_interval"
    )]
    pub poll_interval: Duration,

    /// Upper bound on the chief's wait for worker cleanup. `None` waits
    /// indefinitely, matching the behavior of a cluster whose workers are
    /// trusted to always clean up.
    #[serde(with = "opt_duration_ms", rename = "cleanup_timeout_ms", default)]
    pub cleanup_timeout: Option<Duration>,
}

fn default_poll_interval() -> Duration {
    Duration::from_millis(100)
}

impl Default for SaveConfig {
    fn default() -> Self {
        Self {
            poll_interval: default_poll_interval(),
            cleanup_timeout: None,
        }
    }
}

impl SaveConfig {
    /// Bound the chief's cleanup wait
    pub fn with_cleanup_timeout(mut self, timeout: Duration) -> Self {
        self.cleanup_timeout = Some(timeout);
        self
    }

    /// Change the directory poll interval
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }
}

/// Which storage backend holds the model directory tree
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StoreBackendKind {
    /// Local filesystem (or a mounted shared filesystem)
    Local,

    /// S3-compatible object store
    S3 {
        bucket: String,
        #[serde(default)]
        region: Option<String>,
        #[serde(default)]
        endpoint: Option<String>,
    },
}

impl Default for StoreBackendKind {
    fn default() -> Self {
        Self::Local
    }
}

/// Where model bundles are written
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Backend selection
    #[serde(default)]
    pub backend: StoreBackendKind,

    /// Root under which model paths are resolved
    #[serde(default = "default_base_path")]
    pub base_path: String,
}

fn default_base_path() -> String {
    "./models".to_string()
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackendKind::default(),
            base_path: default_base_path(),
        }
    }
}

/// Top-level job configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobConfig {
    /// Environment variable carrying the cluster description JSON
    #[serde(default = "default_cluster_config_var")]
    pub cluster_config_var: String,

    /// Storage settings
    #[serde(default)]
    pub store: StoreConfig,

    /// Save barrier settings
    #[serde(default)]
    pub save: SaveConfig,
}

fn default_cluster_config_var() -> String {
    CLUSTER_CONFIG_ENV.to_string()
}

impl Default for JobConfig {
    fn default() -> Self {
        Self {
            cluster_config_var: default_cluster_config_var(),
            store: StoreConfig::default(),
            save: SaveConfig::default(),
        }
    }
}

mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_millis() as u64)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let ms = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(ms))
    }
}

mod opt_duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match duration {
            Some(d) => serializer.serialize_some(&(d.as_millis() as u64)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let ms = Option::<u64>::deserialize(deserializer)?;
        Ok(ms.map(Duration::from_millis))
    }
}
