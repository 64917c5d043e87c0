//! Tenant reconciler entry point.
//!
//! Loads configuration, wires the stores and reconciles every known
//! specification on a fixed interval until interrupted.
use anyhow::Context;
use reconciler::config::{LedgerBackend, ReconcilerConfig};
use reconciler::reconcile::Reconciler;
use reconciler::store::LedgerStore;
use reconciler::store::memory::{
    InMemoryLedger, InMemoryNamespaceStore, InMemoryObjectStore, InMemorySpecStore,
};
use reconciler::store::postgres::PostgresLedger;
use reconciler::{manifest, observability};
use std::future::Future;
use std::sync::Arc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = ReconcilerConfig::from_env_or_yaml().context("reconciler config")?;
    run_with_shutdown(config, async {
        let _ = tokio::signal::ctrl_c().await;
    })
    .await
}

async fn run_with_shutdown<F>(config: ReconcilerConfig, shutdown: F) -> anyhow::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let metrics_handle = observability::init_observability();
    let (metrics_stop_tx, metrics_stop_rx) = tokio::sync::oneshot::channel::<()>();
    let metrics_bind = config.metrics_bind;
    let metrics_task = tokio::spawn(async move {
        tracing::info!(%metrics_bind, "metrics listening");
        let stop = async move {
            let _ = metrics_stop_rx.await;
        };
        if let Err(err) = observability::serve_metrics(metrics_handle, metrics_bind, stop).await {
            tracing::warn!(error = %err, "metrics server stopped");
        }
    });

    let specs = Arc::new(InMemorySpecStore::new());
    if let Some(path) = &config.manifest_path {
        let states = manifest::load(path, config.default_istio_revision.as_deref())?;
        tracing::info!(count = states.len(), path = %path.display(), "seeding specifications");
        for state in states {
            specs.put(state).await;
        }
    }

    let ledger = build_ledger(&config).await?;
    tracing::info!(backend = ledger.backend_name(), "ledger ready");
    let reconciler = Reconciler::new(
        specs.clone(),
        Arc::new(InMemoryNamespaceStore::new()),
        ledger,
        Arc::new(InMemoryObjectStore::new()),
    );

    let mut ticker = tokio::time::interval(config.resync_interval);
    tokio::pin!(shutdown);
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                // One key at a time: the driver assumes no concurrent reconcile per key.
                for name in specs.names().await {
                    // Failures are logged and counted by the driver; the next tick retries.
                    let _ = reconciler.reconcile(&name).await;
                }
            }
            _ = &mut shutdown => {
                tracing::info!("shutdown requested");
                break;
            }
        }
    }

    let _ = metrics_stop_tx.send(());
    let _ = metrics_task.await;
    Ok(())
}

async fn build_ledger(config: &ReconcilerConfig) -> anyhow::Result<Arc<dyn LedgerStore>> {
    match config.ledger_backend {
        LedgerBackend::Memory => Ok(Arc::new(InMemoryLedger::new(config.ledger.clone()))),
        LedgerBackend::Postgres => {
            let pg = config
                .postgres
                .as_ref()
                .context("postgres ledger backend without postgres config")?;
            let ledger = PostgresLedger::connect(pg, &config.ledger)
                .await
                .context("connect postgres ledger")?;
            Ok(Arc::new(ledger))
        }
    }
}
