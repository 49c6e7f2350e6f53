use commerce_query_gateway::backend::{BigQueryBackend, ExecutionBackend, OfflineBackend};
use commerce_query_gateway::config::Config;
use commerce_query_gateway::registry::SchemaRegistry;
use commerce_query_gateway::router::QueryRouter;
use commerce_query_gateway::service::{QueryRequest, QueryResponse, QueryService};
use commerce_query_gateway::sql::{SqlGenerator, SqlValidator};

use serde_json::json;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::signal;
use tokio::time::{interval, Duration, MissedTickBehavior};
use tracing::{debug, error, info, warn};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let log_dir = std::env::var("LOG_DIR").unwrap_or_else(|_| "./logs".to_string());

    std::fs::create_dir_all(&log_dir).unwrap_or_else(|e| {
        eprintln!("Warning: Could not create log directory {}: {}", log_dir, e);
    });

    let file_appender = RollingFileAppender::new(Rotation::DAILY, &log_dir, "commerce-query-gateway.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);

    // stdout carries responses, so console logs go to stderr
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,commerce_query_gateway=debug")),
        )
        .with(
            fmt::layer()
                .with_target(true)
                .with_thread_ids(true)
                .with_writer(std::io::stderr),
        )
        .with(
            fmt::layer()
                .with_target(true)
                .with_thread_ids(true)
                .with_ansi(false)
                .json()
                .with_writer(non_blocking),
        )
        .init();

    debug!("Logging initialized - log directory: {}", log_dir);

    if let Err(e) = dotenvy::dotenv() {
        warn!("No .env file found or error loading it: {}", e);
    }

    let config = Config::from_env()?;

    info!("Starting commerce query gateway");
    info!("Platforms: {:?}", config.available_platforms);
    info!("Schema refresh interval: {:?}", config.refresh_interval);
    info!("Max bytes processed: {}", config.max_bytes_processed);

    let registry = Arc::new(SchemaRegistry::new(
        config.document_source(),
        config.available_platforms.clone(),
        config.refresh_interval,
    ));

    // A failed first load is not fatal; requests report the registry as
    // unavailable until the refresh task succeeds.
    match registry.initialize().await {
        Ok(report) => info!(
            "Schema registry ready: {} tables, fingerprint {}",
            report.tables.len(),
            report.fingerprint
        ),
        Err(e) => error!("Initial schema load failed: {}", e),
    }

    let backend: Arc<dyn ExecutionBackend> = match &config.service_key {
        Some(key) => {
            info!("Using BigQuery backend for project {}", config.project_id);
            Arc::new(BigQueryBackend::from_service_account_json(key, config.bigquery_settings()).await?)
        }
        None => {
            warn!("BIGQUERY_SERVICE_KEY not set, using offline backend");
            Arc::new(OfflineBackend::new(registry.clone()))
        }
    };

    let service = Arc::new(QueryService::new(
        registry.clone(),
        QueryRouter::new(),
        SqlGenerator::new(config.generator_settings()),
        SqlValidator::new(backend, config.validator_settings(), config.retry_policy()),
        config.verbose_errors,
    ));

    let refresh_registry = registry.clone();
    let check_every = config.refresh_interval.min(Duration::from_secs(60));
    tokio::spawn(async move {
        let mut ticker = interval(check_every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker.tick().await;

        loop {
            ticker.tick().await;
            match refresh_registry.reload_if_stale().await {
                Some(Ok(report)) => info!(
                    "Refresh task reloaded {} tables (fingerprint {})",
                    report.tables.len(),
                    report.fingerprint
                ),
                Some(Err(e)) => warn!("Refresh task reload failed: {}", e),
                None => {}
            }
        }
    });

    tokio::select! {
        result = serve_lines(service) => result?,
        _ = shutdown_signal() => {}
    }

    info!("Gateway shutdown complete");

    Ok(())
}

/// One JSON request per stdin line, one JSON response per stdout line
async fn serve_lines(service: Arc<QueryService>) -> anyhow::Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();

    info!("Reading requests from stdin");

    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }

        let body = match serde_json::from_str::<QueryRequest>(&line) {
            Ok(request) => {
                let response: QueryResponse = service.respond(&request).await;
                serde_json::to_string(&response)?
            }
            Err(e) => {
                warn!("Malformed request line: {}", e);
                json!({
                    "error": {
                        "error": "malformed_request",
                        "message": "Expected {\"text\": ..., \"platforms\": [...]}",
                        "retryable": false,
                    }
                })
                .to_string()
            }
        };

        stdout.write_all(body.as_bytes()).await?;
        stdout.write_all(b"\n").await?;
        stdout.flush().await?;
    }

    info!("Input closed");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
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

    info!("Received shutdown signal");
}
