//! # Speech Stream Backend - Main Application Entry Point
//!
//! Real-time speech transcription gateway. Accepts continuous PCM audio from
//! many concurrent clients over WebSocket and returns incremental
//! transcriptions produced by a whisper recognizer.
//!
//! ## Application Architecture:
//! - **config**: layered configuration (TOML file + environment + CLI flags)
//! - **state**: shared state (model handle, user-id counter, metrics)
//! - **audio**: the per-session streaming core (buffer, scheduling, diffing)
//! - **transcription**: model loading and the engine adapter
//! - **websocket**: one actor per connection, binding transport to session
//! - **error**: custom error types for the startup and inference paths
//!
//! ## Startup sequence:
//! Configuration is resolved first, then the model is loaded (fatal on
//! failure), then the server binds (fatal on failure) and serves until a
//! shutdown signal arrives.

mod audio; // Streaming session core (audio/ directory)
mod config; // Configuration management (config.rs)
mod error; // Error handling types (error.rs)
mod state; // Shared application state (state.rs)
mod transcription; // Model loading and engine adapter (transcription/ directory)
mod websocket; // WebSocket connection handler (websocket.rs)

use actix_web::{web, App, HttpServer};
use anyhow::{Context, Result};
use clap::Parser;
use config::AppConfig;
use state::AppState;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Global shutdown signal, set by the SIGINT/SIGTERM handlers and polled by
/// the main task to stop the server gracefully.
static SHUTDOWN_SIGNAL: AtomicBool = AtomicBool::new(false);

/// Real-time speech transcription gateway over WebSocket.
///
/// Clients connect on any path, stream binary PCM audio (float32 or int16,
/// 16 kHz mono), and receive incremental transcriptions as JSON text frames.
#[derive(Debug, Parser)]
#[command(name = "speech-stream-backend", version)]
struct Cli {
    /// WebSocket server port
    #[arg(long)]
    port: Option<u16>,

    /// Server hostname
    #[arg(long)]
    host: Option<String>,

    /// Path to the whisper model file
    #[arg(long)]
    model: Option<String>,

    /// Disable GPU acceleration
    #[arg(long)]
    no_gpu: bool,
}

impl Cli {
    /// Apply CLI flags on top of the layered configuration.
    fn apply(&self, config: &mut AppConfig) {
        if let Some(port) = self.port {
            config.server.port = port;
        }
        if let Some(host) = &self.host {
            config.server.host = host.clone();
        }
        if let Some(model) = &self.model {
            config.model.path = model.clone();
        }
        if self.no_gpu {
            config.model.use_gpu = false;
        }
    }
}

#[actix_web::main]
async fn main() -> Result<()> {
    // CLI parsing happens first so --help exits before any other setup
    let cli = Cli::parse();

    dotenv::dotenv().ok();
    init_tracing()?;

    let mut config = AppConfig::load()?;
    cli.apply(&mut config);
    config.validate()?;

    info!("Starting speech-stream-backend v{}", env!("CARGO_PKG_VERSION"));
    info!(
        "Configuration loaded: {}:{} (model: {})",
        config.server.host, config.server.port, config.model.path
    );

    // Model load failure is fatal: exit non-zero before accepting connections
    let whisper = transcription::model::load_model(&config.model)
        .context("failed to initialize the recognizer")?;

    let app_state = AppState::new(config.clone(), whisper);
    let shutdown_state = app_state.clone();

    // Binding is by port only; the configured host is informational and
    // appears in the banner as the address clients connect to.
    let bind_addr = format!("0.0.0.0:{}", config.server.port);

    setup_signal_handlers();

    info!(
        "Starting WebSocket server on ws://{}:{}",
        config.server.host, config.server.port
    );
    info!("Send binary PCM audio data (float32 or int16) at {} Hz", audio::SAMPLE_RATE);
    info!("Transcriptions are returned as JSON text messages");

    // Every path upgrades to a streaming WebSocket session
    let server = HttpServer::new(move || {
        App::new()
            .app_data(web::Data::new(app_state.clone()))
            .default_service(web::get().to(websocket::stream_websocket))
    })
    .bind(&bind_addr)
    .with_context(|| format!("failed to bind WebSocket server to {}", bind_addr))?
    .run();

    let server_handle = server.handle();
    let server_task = tokio::spawn(server);

    // Race the server against the shutdown signal
    tokio::select! {
        result = server_task => {
            match result {
                Ok(server_result) => {
                    if let Err(e) = server_result {
                        error!("Server error: {}", e);
                    }
                }
                Err(e) => {
                    error!("Server task error: {}", e);
                }
            }
        }
        _ = wait_for_shutdown() => {
            info!("Shutdown signal received, stopping server...");
            server_handle.stop(true).await;
        }
    }

    let metrics = shutdown_state.get_metrics_snapshot();
    info!(
        "Server stopped gracefully after {}s ({} connections served)",
        shutdown_state.get_uptime_seconds(),
        metrics.connections_opened
    );
    Ok(())
}

/// Initialize the tracing (logging) system.
///
/// `RUST_LOG` controls verbosity; without it the gateway logs its own debug
/// output and actix-web at info level.
fn init_tracing() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "speech_stream_backend=debug,actix_web=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    Ok(())
}

/// Install SIGTERM/SIGINT handlers that flip the global shutdown flag.
fn setup_signal_handlers() {
    tokio::spawn(async {
        let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler");
        let mut sigint = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::interrupt())
            .expect("Failed to install SIGINT handler");

        tokio::select! {
            _ = sigterm.recv() => {
                info!("Received SIGTERM");
            }
            _ = sigint.recv() => {
                info!("Received SIGINT");
            }
        }

        SHUTDOWN_SIGNAL.store(true, Ordering::SeqCst);
    });
}

/// Wait for the shutdown signal to be set, polling at a coarse interval.
async fn wait_for_shutdown() {
    while !SHUTDOWN_SIGNAL.load(Ordering::SeqCst) {
        tokio::time::sleep(tokio::time::Duration::from_millis(100)).await;
    }
}
