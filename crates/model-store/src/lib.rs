//! Model Store - Pluggable storage backends for the coordinated save pipeline
//!
//! Provides async store operations with support for:
//! - Local filesystem (default feature)
//! - Amazon S3 / S3-compatible storage (with `s3` feature)
//!
//! # Example
//!
//! ```no_run
//! use model_store::{StoreBackend, LocalStore};
//! use bytes::Bytes;
//!
//! # async fn example() -> cluster_core::Result<()> {
//! let store = LocalStore::new("/tmp/models");
//! store.write("run-a/weights.bin", Bytes::from(vec![1, 2, 3])).await?;
//! let data = store.read("run-a/weights.bin").await?;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use cluster_core::{Result, StoreBackendKind, StoreConfig};

mod backend;
mod local;

#[cfg(feature = "s3")]
mod s3;

pub use backend::StoreBackend;
pub use local::LocalStore;

#[cfg(feature = "s3")]
pub use s3::{S3Config, S3Store};

/// Open the store backend selected by the configuration
pub async fn open_store(config: &StoreConfig) -> Result<Arc<dyn StoreBackend>> {
    match &config.backend {
        StoreBackendKind::Local => Ok(Arc::new(LocalStore::new(&config.base_path))),

        #[cfg(feature = "s3")]
        StoreBackendKind::S3 {
            bucket,
            region,
            endpoint,
        } => {
            let store = S3Store::with_config(S3Config {
                bucket: bucket.clone(),
                prefix: if config.base_path.is_empty() {
                    None
                } else {
                    Some(config.base_path.clone())
                },
                endpoint_url: endpoint.clone(),
                region: region.clone(),
                force_path_style: endpoint.is_some(),
            })
            .await;
            Ok(Arc::new(store))
        }

        #[cfg(not(feature = "s3"))]
        StoreBackendKind::S3 { .. } => Err(cluster_core::Error::Storage {
            message: "s3 backend requested but the s3 feature is not enabled".to_string(),
        }),
    }
}

/// Join store-relative path segments with a single separator
pub fn join_path(base: &str, child: &str) -> String {
    if base.is_empty() {
        child.to_string()
    } else {
        format!(
            "{}/{}",
            base.trim_end_matches('/'),
            child.trim_start_matches('/')
        )
    }
}
