//! End-to-end save rendezvous simulation
//!
//! Simulates the final save of a three-process training cluster sharing one
//! store:
//! - Chief and two workers resolve their identities from cluster documents
//! - Workers save into per-worker temp directories and clean them up
//! - The chief saves the canonical artifact and blocks until the directory
//!   is quiescent
//! - A crashed worker leaves its temp behind and a bounded chief surfaces it

use anyhow::Result;
use async_trait::async_trait;
use cluster_core::{ClusterConfig, Error, SaveConfig};
use model_store::{LocalStore, StoreBackend};
use save_barrier::{Artifact, ModelBundle, ModelSaver, SaveOutcome, TensorData};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::{mpsc, Notify};

const MODEL_PATH: &str = "runs/2024-06-01/model";

fn cluster_doc(task_type: &str, index: Option<u32>) -> String {
    let task = match index {
        Some(i) => format!(r#"{{"type": "{}", "index": {}}}"#, task_type, i),
        None => format!(r#"{{"type": "{}"}}"#, task_type),
    };
    format!(
        r#"{{
            "cluster": {{
                "chief": ["10.0.0.1:2222"],
                "worker": ["10.0.0.2:2222", "10.0.0.3:2222"]
            }},
            "task": {}
        }}"#,
        task
    )
}

fn worker_bundle(index: u32) -> ModelBundle {
    ModelBundle::new(format!("replica-{}", index))
        .with_tensor("w", TensorData::new(vec![2], vec![index as f32, 0.0]))
}

fn chief_bundle() -> ModelBundle {
    ModelBundle::new("canonical")
        .with_tensor("w", TensorData::new(vec![2], vec![42.0, 43.0]))
        .with_tensor("b", TensorData::new(vec![1], vec![0.5]))
}

fn fast_save_config() -> SaveConfig {
    SaveConfig::default().with_poll_interval(Duration::from_millis(10))
}

fn saver_for(
    doc: &str,
    store: Arc<dyn StoreBackend>,
    config: SaveConfig,
) -> Result<ModelSaver> {
    let cluster = ClusterConfig::from_json(doc)?;
    Ok(ModelSaver::from_cluster(&cluster, store, config)?)
}

/// Artifact wrapper that parks after writing, so the test controls when the
/// worker's cleanup phase runs
struct HeldSave {
    inner: ModelBundle,
    index: u32,
    ready: mpsc::Sender<u32>,
    release: Arc<Notify>,
}

#[async_trait]
impl Artifact for HeldSave {
    async fn save_to(&self, store: &dyn StoreBackend, dir: &str) -> cluster_core::Result<u64> {
        let bytes = self.inner.save_to(store, dir).await?;
        let _ = self.ready.send(self.index).await;
        self.release.notified().await;
        Ok(bytes)
    }
}

/// Artifact wrapper that dies after writing, standing in for a worker that
/// crashes between its save and its cleanup
struct CrashingSave {
    inner: ModelBundle,
}

#[async_trait]
impl Artifact for CrashingSave {
    async fn save_to(&self, store: &dyn StoreBackend, dir: &str) -> cluster_core::Result<u64> {
        self.inner.save_to(store, dir).await?;
        Err(Error::Storage {
            message: "simulated worker crash after temp save".to_string(),
        })
    }
}

#[tokio::test]
async fn test_three_process_save_rendezvous() -> Result<()> {
    cluster_core::init_tracing();
    let temp_dir = TempDir::new()?;
    let store: Arc<dyn StoreBackend> = Arc::new(LocalStore::new(temp_dir.path()));

    let (ready_tx, mut ready_rx) = mpsc::channel::<u32>(4);
    let releases = [Arc::new(Notify::new()), Arc::new(Notify::new())];

    // Workers 1 and 2 start saving; each parks once its temp files exist
    let mut worker_handles = Vec::new();
    for (slot, index) in [1u32, 2u32].iter().enumerate() {
        let saver = saver_for(
            &cluster_doc("worker", Some(*index)),
            store.clone(),
            fast_save_config(),
        )?;
        let artifact = HeldSave {
            inner: worker_bundle(*index),
            index: *index,
            ready: ready_tx.clone(),
            release: releases[slot].clone(),
        };
        worker_handles.push(tokio::spawn(async move {
            saver.save(&artifact, MODEL_PATH).await
        }));
    }

    // Both temp directories are on disk before the chief arrives
    let mut ready = HashSet::new();
    while ready.len() < 2 {
        ready.insert(ready_rx.recv().await.expect("worker dropped early"));
    }
    let entries = store.list_entries(MODEL_PATH).await?;
    assert!(entries.contains(&"worker1_temp".to_string()));
    assert!(entries.contains(&"worker2_temp".to_string()));

    let chief_saver = saver_for(&cluster_doc("chief", None), store.clone(), fast_save_config())?;
    let chief_handle =
        tokio::spawn(async move { chief_saver.save(&chief_bundle(), MODEL_PATH).await });

    // The chief has saved its artifact but must still be blocked on the
    // outstanding temp directories
    tokio::time::sleep(Duration::from_millis(80)).await;
    assert!(!chief_handle.is_finished());

    let entries = store.list_entries(MODEL_PATH).await?;
    assert!(entries.contains(&"manifest.json".to_string()));
    assert!(entries.contains(&"worker1_temp".to_string()));
    assert!(entries.contains(&"worker2_temp".to_string()));

    // Let the workers finish; their cleanup unblocks the chief
    for release in &releases {
        release.notify_one();
    }

    let mut worker_outcomes: Vec<SaveOutcome> = Vec::new();
    for handle in worker_handles {
        worker_outcomes.push(handle.await??);
    }
    let chief_outcome = chief_handle.await??;

    // Each worker used its own temp path and none published
    let paths: HashSet<_> = worker_outcomes
        .iter()
        .map(|o| o.path().to_string())
        .collect();
    assert_eq!(paths.len(), 2);
    assert!(paths.contains("runs/2024-06-01/model/worker1_temp"));
    assert!(paths.contains("runs/2024-06-01/model/worker2_temp"));
    assert!(worker_outcomes.iter().all(|o| !o.is_published()));

    // The chief observed a real wait
    assert!(chief_outcome.is_published());
    assert!(chief_outcome.wait().unwrap().waited >= Duration::from_millis(70));

    // Final state: exactly the canonical artifact, nothing else
    let entries = store.list_entries(MODEL_PATH).await?;
    assert_eq!(entries, vec!["manifest.json", "weights.bin"]);

    let loaded = ModelBundle::load(store.as_ref(), MODEL_PATH).await?;
    assert_eq!(loaded, chief_bundle());
    assert_ne!(loaded, worker_bundle(1));
    Ok(())
}

#[tokio::test]
async fn test_crashed_worker_surfaces_in_bounded_chief_save() -> Result<()> {
    cluster_core::init_tracing();
    let temp_dir = TempDir::new()?;
    let store: Arc<dyn StoreBackend> = Arc::new(LocalStore::new(temp_dir.path()));

    // Worker 2 dies after writing its temp files but before cleanup
    let worker_saver = saver_for(
        &cluster_doc("worker", Some(2)),
        store.clone(),
        fast_save_config(),
    )?;
    let crash = CrashingSave {
        inner: worker_bundle(2),
    };
    let worker_result = worker_saver.save(&crash, MODEL_PATH).await;
    assert!(worker_result.is_err());
    assert!(store.exists("runs/2024-06-01/model/worker2_temp").await?);

    // A chief with a bounded wait reports the orphaned temp by name
    let config = fast_save_config().with_cleanup_timeout(Duration::from_millis(120));
    let chief_saver = saver_for(&cluster_doc("chief", None), store.clone(), config)?;

    let err = chief_saver
        .save(&chief_bundle(), MODEL_PATH)
        .await
        .unwrap_err();
    match err {
        Error::CleanupTimeout { pending, .. } => {
            assert_eq!(pending, vec!["worker2_temp"]);
        }
        other => panic!("expected cleanup timeout, got {:?}", other),
    }

    // The canonical artifact is present even though the save failed overall;
    // a later retry after operator cleanup succeeds
    assert!(store.exists("runs/2024-06-01/model/manifest.json").await?);
    store.remove_tree("runs/2024-06-01/model/worker2_temp").await?;

    let retry_saver = saver_for(
        &cluster_doc("chief", None),
        store.clone(),
        fast_save_config(),
    )?;
    let outcome = retry_saver.save(&chief_bundle(), MODEL_PATH).await?;
    assert!(outcome.is_published());

    let entries = store.list_entries(MODEL_PATH).await?;
    assert_eq!(entries, vec!["manifest.json", "weights.bin"]);
    Ok(())
}

#[tokio::test]
async fn test_rendezvous_scales_with_worker_count() -> Result<()> {
    // Same protocol at a larger cluster size, with free-running workers
    let temp_dir = TempDir::new()?;
    let store: Arc<dyn StoreBackend> = Arc::new(LocalStore::new(temp_dir.path()));

    let worker_count = 8u32;
    let mut handles = Vec::new();
    for index in 1..=worker_count {
        let store = store.clone();
        handles.push(tokio::spawn(async move {
            let saver = ModelSaver::new(
                cluster_core::WorkerIdentity::worker(index),
                store,
                fast_save_config(),
            );
            saver.save(&worker_bundle(index), MODEL_PATH).await
        }));
    }

    let chief_store = store.clone();
    let chief = tokio::spawn(async move {
        let saver = ModelSaver::new(
            cluster_core::WorkerIdentity::chief(),
            chief_store,
            fast_save_config(),
        );
        saver.save(&chief_bundle(), MODEL_PATH).await
    });

    for handle in handles {
        handle.await??;
    }
    let outcome = chief.await??;
    assert!(outcome.is_published());

    let entries = store.list_entries(MODEL_PATH).await?;
    assert_eq!(entries, vec!["manifest.json", "weights.bin"]);

    let loaded = ModelBundle::load(store.as_ref(), MODEL_PATH).await?;
    assert_eq!(loaded, chief_bundle());
    Ok(())
}
