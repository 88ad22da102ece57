use anyhow::Context;
use axum::http::{self, Method};
use clap::Parser;
use inference_allocator::config::AllocatorConfig;
use inference_allocator::scheduler::Orchestrator;
use inference_allocator::server::{build_router, AppState};
use inference_allocator::shutdown::install_shutdown_handler;
use std::path::PathBuf;
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Address to bind
    #[arg(long, default_value = "0.0.0.0")]
    host: String,

    /// Port to serve on
    #[arg(long, default_value_t = 8000)]
    port: u16,

    /// JSON file with allocator settings. Flags below override it.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Number of GPU slots
    #[arg(long, env = "INFERENCE_GPU_COUNT")]
    gpu_count: Option<usize>,

    /// Maximum queued requests before returning 503
    #[arg(long, env = "INFERENCE_QUEUE_MAX_SIZE")]
    queue_max_size: Option<usize>,

    /// Seconds a request may wait before returning 504
    #[arg(long, env = "INFERENCE_REQUEST_TIMEOUT_SECONDS")]
    request_timeout_seconds: Option<f64>,

    /// Minimum simulated inference time (ms)
    #[arg(long, env = "INFERENCE_MIN_MS")]
    inference_min_ms: Option<u64>,

    /// Maximum simulated inference time (ms)
    #[arg(long, env = "INFERENCE_MAX_MS")]
    inference_max_ms: Option<u64>,

    /// Set verbose mode (debug logging unless RUST_LOG is set)
    #[arg(long)]
    verbose: bool,
}

impl Args {
    fn allocator_config(&self) -> anyhow::Result<AllocatorConfig> {
        let mut config = match &self.config {
            Some(path) => AllocatorConfig::from_file(path)?,
            None => AllocatorConfig::default(),
        };
        if let Some(v) = self.gpu_count {
            config.gpu_count = v;
        }
        if let Some(v) = self.queue_max_size {
            config.queue_max_size = v;
        }
        if let Some(v) = self.request_timeout_seconds {
            config.request_timeout_secs = v;
        }
        if let Some(v) = self.inference_min_ms {
            config.inference_min_ms = v;
        }
        if let Some(v) = self.inference_max_ms {
            config.inference_max_ms = v;
        }
        config.validate()?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let default_level = if args.verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config = args.allocator_config()?;
    info!(
        "⚙️ Config: gpus={}, queue_max_size={}, timeout={}s, inference={}..={}ms",
        config.gpu_count,
        config.queue_max_size,
        config.request_timeout_secs,
        config.inference_min_ms,
        config.inference_max_ms
    );

    let orchestrator = Arc::new(Orchestrator::new(&config));
    orchestrator.start();

    let cors_layer = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([http::header::CONTENT_TYPE])
        .allow_origin(AllowOrigin::any());

    let app = build_router(AppState::new(
        orchestrator.clone(),
        config.request_timeout(),
    ))
    .layer(cors_layer);

    let addr = format!("{}:{}", args.host, args.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    warn!("Server started at http://{addr}.");

    let shutdown = install_shutdown_handler();
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown.cancelled_owned())
        .await
        .context("server error")?;

    orchestrator.stop().await;
    if !orchestrator
        .wait_for_in_flight(config.request_timeout())
        .await
    {
        warn!(
            "Exiting with {} dispatches still running",
            orchestrator.in_flight()
        );
    }
    info!("Shutdown complete");
    Ok(())
}
