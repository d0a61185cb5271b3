use std::sync::Arc;

use anyhow::Context;
use smartspend_classify::{ExternalClassifier, ZeroShotClassifier};
use smartspend_pipeline::Pipeline;
use tokio::net::TcpListener;

mod config;
mod error;
mod http;
mod logging;

use config::Settings;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let settings = Settings::load()?;
    logging::init(settings.log_format)?;

    let pool = smartspend_storage::create_db(&settings.database_path)
        .await
        .with_context(|| format!("opening database {}", settings.database_path.display()))?;
    tracing::info!(path = %settings.database_path.display(), "database ready");

    let stale = smartspend_storage::fail_stale_jobs(&pool)
        .await
        .context("failing jobs interrupted by the last shutdown")?;
    if stale > 0 {
        tracing::warn!(jobs = stale, "failed jobs interrupted by restart");
    }

    if !settings.classifier.is_enabled() {
        tracing::warn!("no classifier token configured; unmatched rows will be uncategorized");
    }
    let backend = ZeroShotClassifier::new(settings.classifier.clone())
        .context("building classifier client")?;
    let classifier = ExternalClassifier::new(Arc::new(backend), settings.classifier.timeout());

    let (pipeline, workers) = Pipeline::start(pool.clone(), classifier, settings.pipeline_config());
    let app = http::router(pipeline);

    let listener = TcpListener::bind(&settings.listen_addr)
        .await
        .with_context(|| format!("binding {}", settings.listen_addr))?;
    tracing::info!(addr = %settings.listen_addr, "listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // The router, and with it the last queue sender, is gone: workers finish
    // what is queued and exit.
    tracing::info!("draining job queue");
    workers.join().await;
    pool.close().await;
    tracing::info!("shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "could not listen for ctrl-c");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown requested");
}
