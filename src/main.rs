//! inference-gateway binary.
//!
//! Startup order matters: the engine is fully constructed before the
//! listener binds, so no generation request can arrive against a cold engine.

use std::sync::Arc;

use clap::Parser;
use tokio::net::TcpListener;
use tracing::{error, info};

use inference_gateway::config::{Cli, Config};
use inference_gateway::inference::backend::EchoBackendFactory;
use inference_gateway::inference::engine::EngineAdapter;
use inference_gateway::server::openai_api::{build_router, AppState};
use inference_gateway::server::shutdown::{drain_on, termination_signal};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse CLI arguments.
    let cli = Cli::parse();

    // Initialize tracing/logging.
    let filter = if cli.verbose {
        "inference_gateway=debug,tower_http=debug"
    } else {
        "inference_gateway=info,tower_http=info"
    };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| filter.into());

    if cli.log_json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(env_filter)
            .with_target(true)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(true)
            .init();
    }

    info!("inference-gateway v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration.
    let mut config = Config::load(&cli.config)?;
    config.apply_cli(&cli);
    let config = Arc::new(config);

    info!(
        model = config.engine.model,
        gpu_memory_utilization = config.engine.gpu_memory_utilization,
        max_num_seqs = config.engine.max_num_seqs,
        tensor_parallel = config.engine.tensor_parallel_size,
        pipeline_parallel = config.engine.pipeline_parallel_size,
        "Configuration loaded"
    );

    // Construct the engine before accepting any traffic.
    let engine = Arc::new(
        EngineAdapter::new(config.engine.clone(), Arc::new(EchoBackendFactory))
            .with_submit_timeout(config.request_timeout()),
    );
    if let Err(e) = engine.initialize().await {
        error!("Cannot serve: {e}");
        return Err(e.into());
    }

    // Build application state.
    let state = Arc::new(AppState::new(engine.clone(), config.clone())?);

    // Build the HTTP router.
    let app = build_router(state);

    // Start the server.
    let listen_addr = config.listen_addr();
    info!(addr = listen_addr, "Starting server");

    let listener = TcpListener::bind(&listen_addr).await?;
    info!("Listening on {listen_addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(drain_on(
            termination_signal(),
            engine.clone(),
            config.drain_timeout(),
        ))
        .await?;

    // The signal path already drained; this covers the server exiting on its own.
    engine.shutdown(config.drain_timeout()).await;
    info!("Server stopped");

    Ok(())
}
