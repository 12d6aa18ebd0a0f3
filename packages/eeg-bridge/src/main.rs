use anyhow::Context;
use clap::Parser;
use eeg_bridge::{
    cli::Cli, create_source, relay, server, spawn_acquisition, AppState, BridgeConfig,
    BroadcastHub, MetricsSink, PipelineStats, SamplePipeline,
};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "eeg_bridge=info,eeg_bands=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    let config = BridgeConfig::from_cli(&cli).context("Invalid configuration")?;

    info!("🚀 Starting EEG bridge v{}", VERSION);
    info!(
        "   Analysis: {} Hz, {} samples per window, {} bands ({} edges)",
        config.analysis.sample_rate,
        config.analysis.window_size,
        config.analysis.bands.len(),
        config.analysis.band_edges
    );
    match &config.output_file {
        Some(path) => info!("   Metrics log: {}", path.display()),
        None => info!("   Metrics log: disabled"),
    }

    // Fail fast before serving anything
    let source = create_source(&config.source).context("Cannot start acquisition")?;

    let stats = Arc::new(PipelineStats::default());
    let (relay_tx, relay_rx) = relay::channel(config.relay_capacity);
    let relay_monitor = relay_tx.monitor();
    let pipeline = SamplePipeline::new(config.analysis.clone(), relay_tx, stats.clone())
        .context("Cannot build analysis pipeline")?;

    let sink = Arc::new(MetricsSink::new(config.output_file.clone()));
    let hub = BroadcastHub::new(sink, config.hub_config());

    let cancel = CancellationToken::new();
    let state = AppState::new(
        hub.handle(),
        stats,
        relay_monitor,
        config.ping_interval,
        cancel.clone(),
    );

    let listener = TcpListener::bind(config.bind_address())
        .await
        .with_context(|| format!("Cannot bind {}", config.bind_address()))?;

    let hub_task = tokio::spawn(hub.run(relay_rx));
    let producer = spawn_acquisition(source, pipeline, cancel.clone())
        .context("Cannot spawn acquisition thread")?;
    tokio::spawn(shutdown_signal(cancel.clone()));

    let served = server::serve(listener, state).await;
    cancel.cancel();
    info!("Shutting down...");

    // Producer first: dropping its relay sender lets the hub drain and exit
    match tokio::task::spawn_blocking(move || producer.join()).await {
        Ok(Ok(())) => {}
        Ok(Err(_)) => error!("Acquisition thread panicked"),
        Err(e) => error!("Failed to join acquisition thread: {}", e),
    }
    if let Err(e) = hub_task.await {
        error!("Broadcast hub task failed: {}", e);
    }

    served.context("Server error")?;
    info!("EEG bridge stopped");
    Ok(())
}

async fn shutdown_signal(cancel: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl-C: {}", e);
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
                warn!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl-C"),
        _ = terminate => info!("Received SIGTERM"),
        _ = cancel.cancelled() => return,
    }
    cancel.cancel();
}
