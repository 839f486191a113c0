//! Soda Bottle Classifier server
//!
//! # Usage
//!
//! ```bash
//! # Defaults: 0.0.0.0:8080, weights at ./soda_bottle_classifier_resnet18.pth
//! soda-classifier-server
//!
//! # Custom weights, CPU only, load the model before accepting requests
//! soda-classifier-server --weights /models/soda.safetensors --device cpu --warm-first
//!
//! # Environment overrides
//! PORT=9000 SODA_CLASSIFIER__CLASSIFIER__DEVICE=cpu soda-classifier-server
//!
//! # Debug logging
//! RUST_LOG=debug soda-classifier-server
//! ```
//!
//! # Priority
//!
//! CLI arguments > Environment variables > Config files > Defaults

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::{fmt, EnvFilter};

use soda_classifier_core::{ClassifierService, DevicePolicy};
use soda_classifier_server::{create_router, AppConfig, AppState};

/// HTTP server classifying soda bottles as empty or full.
#[derive(Parser, Debug)]
#[command(name = "soda-classifier-server")]
#[command(version)]
#[command(about = "HTTP server classifying soda bottles as empty or full")]
struct Cli {
    /// Path to a TOML configuration file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Bind address override
    #[arg(long)]
    bind: Option<String>,

    /// Port override
    #[arg(long)]
    port: Option<u16>,

    /// Weights artifact override (.pth, .pt, .bin or .safetensors)
    #[arg(long)]
    weights: Option<PathBuf>,

    /// Device policy override: auto or cpu
    #[arg(long)]
    device: Option<DevicePolicy>,

    /// Load the model before accepting requests
    #[arg(long)]
    warm_first: bool,
}

/// Apply CLI overrides. Called after files and environment, before validation.
fn apply_overrides(config: &mut AppConfig, cli: &Cli) {
    if let Some(bind) = &cli.bind {
        info!("CLI override: server.bind_address = {}", bind);
        config.server.bind_address = bind.clone();
    }
    if let Some(port) = cli.port {
        info!("CLI override: server.port = {}", port);
        config.server.port = port;
    }
    if let Some(weights) = &cli.weights {
        info!("CLI override: classifier.weights_path = {}", weights.display());
        config.classifier.weights_path = weights.clone();
    }
    if let Some(device) = cli.device {
        info!("CLI override: classifier.device = {}", device);
        config.classifier.device = device;
    }
    if cli.warm_first {
        info!("CLI override: server.warm_on_start = true");
        config.server.warm_on_start = true;
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to install Ctrl-C handler");
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
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
    info!("Shutdown signal received");
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(true)
        .init();

    let mut config = AppConfig::load(cli.config.as_deref()).context("failed to load configuration")?;
    apply_overrides(&mut config, &cli);
    config.validate().context("invalid configuration")?;

    info!(
        weights = %config.classifier.weights_path.display(),
        device = %config.classifier.device,
        labels = ?config.classifier.class_labels.as_array(),
        "Classifier configured"
    );

    let service = ClassifierService::from_config(&config.classifier)?;

    if config.server.warm_on_start {
        let warm = service.clone();
        match tokio::task::spawn_blocking(move || warm.warm()).await {
            Ok(Ok(())) => info!("Model runtime warmed at startup"),
            Ok(Err(e)) => warn!(
                error_code = e.error_code(),
                error = %e,
                "Startup warm-up failed, first request will retry"
            ),
            Err(e) => warn!(error = %e, "Startup warm-up task aborted"),
        }
    }

    let app = create_router(AppState::new(service), &config.server);
    let address = config.server.listen_address();
    let listener = tokio::net::TcpListener::bind(&address)
        .await
        .with_context(|| format!("failed to bind {address}"))?;

    info!(address = %address, "Soda Bottle Classifier API listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    info!("Server stopped");
    Ok(())
}
