use anyhow::Context;
use kasir_bridge::{Config, JobStore, PrintService, logger};
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 1. Environment (dotenv, logging)
    dotenv::dotenv().ok();
    let config = Config::from_env();
    logger::init_logger_with_file(Some(&config.log_level), config.log_dir.as_deref());

    tracing::info!(
        driver = %config.printer_driver,
        work_dir = %config.work_dir,
        "kasir-bridge starting"
    );

    // 2. Durable job store
    std::fs::create_dir_all(&config.work_dir)
        .with_context(|| format!("failed to create work dir {}", config.work_dir))?;
    let db_path = std::path::Path::new(&config.work_dir).join("jobs.redb");
    let store = JobStore::open(&db_path)
        .with_context(|| format!("failed to open job database at {}", db_path.display()))?;

    let counts = store.counts_by_status()?;
    tracing::info!(
        pending = counts.pending,
        done = counts.done,
        failed = counts.failed,
        "job store opened; pending jobs resume automatically"
    );

    // 3. Print service + queue worker
    let shutdown = CancellationToken::new();
    let (service, worker_handle) = PrintService::start(
        store,
        config.printer_config(),
        config.max_retries,
        shutdown.clone(),
    );

    // The POS frontend attaches here; the service handle is what any
    // boundary adapter (IPC, HTTP, whatever the frontend speaks) calls
    // into. Probe once at startup so a misconfigured printer is visible
    // in the logs immediately.
    let probe = service.check_connection().await;
    tracing::info!(connected = probe.connected, message = %probe.message, "printer probe");

    // 4. Run until interrupted
    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for shutdown signal")?;
    tracing::info!("shutdown signal received");

    shutdown.cancel();
    worker_handle.await.context("queue worker panicked")?;
    tracing::info!("kasir-bridge stopped");

    Ok(())
}
