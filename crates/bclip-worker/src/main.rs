//! Video processing worker binary.

use std::sync::Arc;

use anyhow::Context;
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use uuid::Uuid;

use bclip_db::{DbConfig, DbHandle, PgVideoRepository};
use bclip_media::FfmpegRunner;
use bclip_queue::{LedgerJanitor, QueueConfig, RedisJobLease, RedisStatusLedger, RedisStreamQueue, StatusLedger};
use bclip_storage::{BlobStore, Buckets, LocalBlobStore, S3BlobStore, S3Config};
use bclip_worker::{
    metrics, Dispatcher, DispatcherConfig, LedgerBackend, ResultPublisher, StorageBackend,
    TransformPipeline, WorkerConfig,
};

#[tokio::main]
async fn main() {
    // Install rustls crypto provider (required for TLS connections)
    if rustls::crypto::ring::default_provider()
        .install_default()
        .is_err()
    {
        eprintln!("rustls crypto provider was already installed");
    }

    // Load environment variables
    dotenvy::dotenv().ok();

    init_tracing();

    info!("Starting bclip-worker");

    let config = WorkerConfig::from_env();
    let queue_config = QueueConfig::from_env();
    info!("Worker config: {:?}", config);

    if let Some(port) = config.metrics_port {
        match metrics::install_exporter(port) {
            Ok(()) => info!(port, "Prometheus exporter listening"),
            Err(e) => warn!("Metrics disabled: {}", e),
        }
    }

    let (dispatcher, ledger) = match build(&config, &queue_config).await {
        Ok(parts) => parts,
        Err(e) => {
            error!("Failed to initialize worker: {:#}", e);
            std::process::exit(1);
        }
    };

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let janitor = tokio::spawn(LedgerJanitor::new(ledger).run(shutdown_rx.clone()));
    let mut dispatch = tokio::spawn(dispatcher.run(shutdown_rx));

    tokio::select! {
        _ = shutdown_signal() => {
            info!("Received shutdown signal, waiting for in-flight jobs");
            let _ = shutdown_tx.send(true);
            match tokio::time::timeout(config.shutdown_timeout, &mut dispatch).await {
                Ok(_) => info!("In-flight jobs finished"),
                Err(_) => {
                    warn!(
                        "In-flight jobs still running after {:?}, abandoning them",
                        config.shutdown_timeout
                    );
                    dispatch.abort();
                }
            }
        }
        result = &mut dispatch => {
            if let Err(e) = result {
                error!("Dispatcher task failed: {}", e);
            }
            let _ = shutdown_tx.send(true);
        }
    }

    janitor.await.ok();
    info!("Worker shutdown complete");
}

fn init_tracing() {
    // Colored output for dev, JSON for production
    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| v.to_lowercase() == "json")
        .unwrap_or(false);

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("bclip=info"));

    if use_json {
        tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(env_filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(
                fmt::layer()
                    .with_ansi(true)
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_file(false)
                    .with_line_number(false),
            )
            .with(env_filter)
            .init();
    }
}

/// Wire the backends selected by `config` into a dispatcher.
async fn build(
    config: &WorkerConfig,
    queue_config: &QueueConfig,
) -> anyhow::Result<(Arc<Dispatcher>, Arc<dyn StatusLedger>)> {
    let consumer_name = format!("worker-{}", Uuid::new_v4());

    let queue = RedisStreamQueue::new(queue_config.clone(), consumer_name.clone())
        .context("creating job queue")?;
    queue.init().await.context("initializing job queue")?;

    let db = DbHandle::connect(&DbConfig::from_env()?)
        .await
        .context("connecting to database")?;

    let ledger: Arc<dyn StatusLedger> = match config.ledger_backend {
        LedgerBackend::Redis => Arc::new(RedisStatusLedger::from_config(queue_config)?),
        LedgerBackend::Postgres => Arc::new(bclip_db::PgStatusLedger::new(db.pool().clone())),
    };

    let (store, buckets): (Arc<dyn BlobStore>, Buckets) = match config.storage_backend {
        StorageBackend::S3 => {
            let s3_config = S3Config::from_env()?;
            let buckets = s3_config.buckets.clone();
            let store = S3BlobStore::new(s3_config)
                .await
                .context("creating S3 client")?;
            (Arc::new(store), buckets)
        }
        StorageBackend::Local => (Arc::new(LocalBlobStore::from_env()), Buckets::from_env()),
    };

    let mut runner = FfmpegRunner::new();
    if let Some(path) = &config.ffmpeg_path {
        runner = runner.with_program(path);
    }

    let videos = Arc::new(PgVideoRepository::new(db.pool().clone()));
    let publisher = ResultPublisher::new(store.clone(), buckets.clone(), videos);
    let pipeline = TransformPipeline::new(
        Arc::new(runner),
        store,
        buckets,
        ledger.clone(),
        publisher,
        &config.work_dir,
        &config.intro_path,
        &config.outro_path,
    );

    let lease = RedisJobLease::from_config(queue_config)?;
    let dispatcher = Dispatcher::new(
        Arc::new(queue),
        Arc::new(pipeline),
        Arc::new(lease),
        ledger.clone(),
        DispatcherConfig::new(config, queue_config),
    )
    .with_worker_name(consumer_name);

    Ok((Arc::new(dispatcher), ledger))
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
