use anyhow::Result;
use cluster_core::{ClusterConfig, Error, SaveConfig, WorkerIdentity};
use model_store::{LocalStore, StoreBackend};
use save_barrier::{ModelBundle, ModelSaver, TensorData};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tempfile::TempDir;

// Helper to build the cluster description JSON a launcher would inject
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

fn small_bundle(name: &str) -> ModelBundle {
    ModelBundle::new(name)
        .with_tensor("layer0/kernel", TensorData::new(vec![4, 4], vec![0.25; 16]))
        .with_tensor("layer0/bias", TensorData::new(vec![4], vec![0.0; 4]))
}

fn fast_save_config() -> SaveConfig {
    SaveConfig::default().with_poll_interval(Duration::from_millis(10))
}

fn local_store(temp_dir: &TempDir) -> Arc<dyn StoreBackend> {
    Arc::new(LocalStore::new(temp_dir.path()))
}

#[tokio::test]
async fn test_identity_resolution_from_env_doc() -> Result<()> {
    let variable = "CLUSTER_CONFIG_ITEST_RESOLVE";
    std::env::set_var(variable, cluster_doc("worker", Some(1)));

    let config = ClusterConfig::from_env_var(variable)?;
    config.validate()?;

    let identity = config.identity();
    assert!(!identity.is_chief());
    assert_eq!(identity.worker_index()?, 1);
    assert_eq!(config.cluster.num_workers(), 2);

    std::env::remove_var(variable);
    Ok(())
}

#[tokio::test]
async fn test_one_chief_per_cluster_doc_set() -> Result<()> {
    // The documents each of the three processes would receive
    let docs = vec![
        cluster_doc("chief", None),
        cluster_doc("worker", Some(1)),
        cluster_doc("worker", Some(2)),
    ];

    let mut chiefs = 0;
    for doc in &docs {
        let config = ClusterConfig::from_json(doc)?;
        config.validate()?;
        if config.identity().is_chief() {
            chiefs += 1;
        }
    }

    assert_eq!(chiefs, 1);
    Ok(())
}

#[tokio::test]
async fn test_solo_process_save_completes_immediately() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let store = local_store(&temp_dir);

    // No cluster description at all: the process acts as chief
    let config = ClusterConfig::from_json("{}")?;
    let saver = ModelSaver::from_cluster(&config, store.clone(), fast_save_config())?;

    let bundle = small_bundle("solo-run");
    let start = Instant::now();
    let outcome = saver.save(&bundle, "export/model").await?;

    assert!(outcome.is_published());
    assert_eq!(outcome.path(), "export/model");
    assert!(start.elapsed() < Duration::from_secs(1));

    let loaded = ModelBundle::load(store.as_ref(), "export/model").await?;
    assert_eq!(loaded, bundle);
    Ok(())
}

#[tokio::test]
async fn test_repeated_save_to_same_path_overwrites() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let store = local_store(&temp_dir);
    let saver = ModelSaver::new(WorkerIdentity::solo(), store.clone(), fast_save_config());

    let first = small_bundle("epoch-1");
    saver.save(&first, "export/model").await?;

    let second = small_bundle("epoch-2")
        .with_tensor("layer1/kernel", TensorData::new(vec![2], vec![9.0, 9.0]));
    saver.save(&second, "export/model").await?;

    let loaded = ModelBundle::load(store.as_ref(), "export/model").await?;
    assert_eq!(loaded, second);
    assert_eq!(loaded.name(), "epoch-2");
    Ok(())
}

#[tokio::test]
async fn test_cleanup_timeout_is_typed_and_retryable() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let store = local_store(&temp_dir);

    // A stray temp entry no worker will ever remove
    store
        .write(
            "export/model/worker9_temp/weights.bin",
            bytes::Bytes::from_static(b"orphan"),
        )
        .await?;

    let config = fast_save_config().with_cleanup_timeout(Duration::from_millis(100));
    let saver = ModelSaver::new(WorkerIdentity::chief(), store, config);

    let err = saver
        .save(&small_bundle("m"), "export/model")
        .await
        .unwrap_err();
    assert!(err.is_retryable());
    assert!(!err.is_fatal());

    match err {
        Error::CleanupTimeout { pending, path, .. } => {
            assert_eq!(pending, vec!["worker9_temp"]);
            assert_eq!(path, "export/model");
        }
        other => panic!("expected cleanup timeout, got {:?}", other),
    }
    Ok(())
}

#[tokio::test]
async fn test_unbounded_wait_is_the_default() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let store = local_store(&temp_dir);

    store
        .write(
            "export/model/worker3_temp/weights.bin",
            bytes::Bytes::from_static(b"slow"),
        )
        .await?;

    let saver = Arc::new(ModelSaver::new(
        WorkerIdentity::chief(),
        store.clone(),
        fast_save_config(),
    ));

    let chief_saver = saver.clone();
    let chief = tokio::spawn(async move {
        chief_saver.save(&small_bundle("m"), "export/model").await
    });

    // With no timeout configured the chief just keeps polling
    tokio::time::sleep(Duration::from_millis(150)).await;
    assert!(!chief.is_finished());

    store.remove_tree("export/model/worker3_temp").await?;
    let outcome = chief.await??;
    assert!(outcome.wait().unwrap().waited >= Duration::from_millis(140));
    Ok(())
}

#[tokio::test]
async fn test_worker_identity_without_index_is_rejected() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let store = local_store(&temp_dir);

    let identity = WorkerIdentity::new(Some("worker".to_string()), None);
    let saver = ModelSaver::new(identity, store.clone(), fast_save_config());

    let result = saver.save(&small_bundle("m"), "export/model").await;
    assert!(matches!(result, Err(Error::MissingTaskIndex { .. })));

    // Nothing was written anywhere
    let entries = store.list_entries("export/model").await?;
    assert!(entries.is_empty());
    Ok(())
}

#[tokio::test]
async fn test_invalid_cluster_docs_fail_validation() -> Result<()> {
    // Two chiefs
    let doc = r#"{
        "cluster": {"chief": ["a:1", "b:1"], "worker": ["c:1"]},
        "task": {"type": "chief", "index": 0}
    }"#;
    let config = ClusterConfig::from_json(doc)?;
    assert!(matches!(
        config.validate(),
        Err(Error::InvalidChiefCount { count: 2 })
    ));

    // No chief at all
    let doc = r#"{
        "cluster": {"worker": ["a:1", "b:1"]},
        "task": {"type": "worker", "index": 0}
    }"#;
    let config = ClusterConfig::from_json(doc)?;
    assert!(matches!(
        config.validate(),
        Err(Error::InvalidChiefCount { count: 0 })
    ));

    // Role tag absent from the job map
    let doc = r#"{
        "cluster": {"chief": ["a:1"], "worker": ["b:1"]},
        "task": {"type": "evaluator", "index": 0}
    }"#;
    let config = ClusterConfig::from_json(doc)?;
    assert!(matches!(
        config.validate(),
        Err(Error::InvalidClusterConfig { .. })
    ));

    Ok(())
}

#[tokio::test]
async fn test_missing_env_is_a_fatal_config_error() -> Result<()> {
    let result = ClusterConfig::from_env_var("CLUSTER_CONFIG_ITEST_NEVER_SET");
    match result {
        Err(e) => assert!(e.is_fatal()),
        Ok(_) => panic!("expected missing variable to fail"),
    }
    Ok(())
}
