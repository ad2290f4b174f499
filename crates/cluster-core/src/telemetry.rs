//! Tracing setup for processes embedding the save pipeline

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize the global tracing subscriber.
///
/// Honors `RUST_LOG` when set; otherwise logs the save pipeline crates at
/// info. Safe to call once per process; later calls are ignored.
pub fn init_tracing() {
    let _ = tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "cluster_core=info,model_store=info,save_barrier=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .try_init();
}
