//! # Configuration Management
//!
//! This module handles loading and managing gateway configuration from
//! multiple sources:
//! - TOML configuration files (config.toml)
//! - Environment variables (with APP_ prefix)
//! - Default values (built into the code)
//!
//! CLI flags are applied on top of all of these in `main`, so the final
//! priority order (highest to lowest) is:
//! 1. Command line flags (--port, --host, --model, --no-gpu)
//! 2. Environment variables (APP_SERVER_HOST, APP_SERVER_PORT, etc.)
//! 3. Configuration file (config.toml)
//! 4. Default values (defined in the Default impl)

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::env;

/// Main gateway configuration that contains all settings.
///
/// ## Why separate config structs:
/// Breaking configuration into logical groups (server, model, stream) keeps
/// the transport settings apart from the per-session transcription
/// parameters, which are copied into every new session at accept time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub model: ModelConfig,
    pub stream: StreamConfig,
}

/// Server-specific configuration settings.
///
/// ## Fields:
/// - `host`: hostname shown in the startup banner; binding is by port only
/// - `port`: TCP port number to listen on (WebSocket clients connect here)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

/// Recognizer model configuration.
///
/// ## Fields:
/// - `path`: ggml model file to load at startup (startup fails if missing)
/// - `use_gpu`: hardware acceleration (disable with --no-gpu)
/// - `flash_attn`: flash attention kernels when the backend supports them
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    pub path: String,
    pub use_gpu: bool,
    pub flash_attn: bool,
}

/// Per-session streaming transcription parameters.
///
/// Copied into each session when its connection is accepted; immutable for
/// the lifetime of that session.
///
/// ## Scheduling:
/// - `step_ms`: minimum new audio AND minimum elapsed time between passes
/// - `length_ms`: target window length submitted to the recognizer
/// - `keep_ms`: minimum overlap carried over from the previous window
///
/// ## Decoding:
/// - `beam_size`: beam search when > 1, greedy otherwise
/// - `no_fallback`: disable the temperature-increment retry ladder
/// - `no_context`: when true, previous-pass tokens do not condition decoding
/// - `tinydiarize`: mark speaker turns in the rendered transcript
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamConfig {
    pub n_threads: i32,
    pub step_ms: u32,
    pub length_ms: u32,
    pub keep_ms: u32,
    pub max_tokens: i32,
    pub audio_ctx: i32,
    pub beam_size: i32,
    pub translate: bool,
    pub no_fallback: bool,
    pub print_special: bool,
    pub no_context: bool,
    pub no_timestamps: bool,
    pub tinydiarize: bool,
    pub language: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 8081,
            },
            model: ModelConfig {
                path: "models/ggml-base.en.bin".to_string(),
                use_gpu: true,
                flash_attn: true,
            },
            stream: StreamConfig::default(),
        }
    }
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            n_threads: std::cmp::min(4, num_cpus::get() as i32),
            step_ms: 3000,
            length_ms: 10000,
            keep_ms: 200,
            max_tokens: 32,
            audio_ctx: 0,
            beam_size: -1, // greedy decoding
            translate: false,
            no_fallback: false,
            print_special: false,
            no_context: true,
            no_timestamps: false,
            tinydiarize: false,
            language: "en".to_string(),
        }
    }
}

impl AppConfig {
    /// Load configuration from multiple sources in priority order.
    ///
    /// ## Configuration Loading Process:
    /// 1. Start with built-in defaults
    /// 2. Override with values from config.toml (if it exists)
    /// 3. Override with environment variables prefixed with APP_
    /// 4. Handle special cases for HOST and PORT environment variables
    ///
    /// ## Environment Variable Examples:
    /// - `APP_SERVER_HOST=0.0.0.0`: Override server host
    /// - `APP_SERVER_PORT=3000`: Override server port
    /// - `HOST=0.0.0.0` / `PORT=3000`: Special cases for deployment platforms
    pub fn load() -> Result<Self> {
        let mut settings = config::Config::builder()
            .add_source(config::Config::try_from(&AppConfig::default())?)
            .add_source(config::File::with_name("config").required(false))
            .add_source(config::Environment::with_prefix("APP").separator("_"));

        // Deployment platforms commonly inject these without the APP_ prefix
        if let Ok(host) = env::var("HOST") {
            settings = settings.set_override("server.host", host)?;
        }

        if let Ok(port) = env::var("PORT") {
            settings = settings.set_override("server.port", port)?;
        }

        let config = settings.build()?.try_deserialize()?;
        Ok(config)
    }

    /// Validate that the configuration values make sense.
    ///
    /// ## What this checks:
    /// - Server port is not 0 (port 0 is reserved and can't be bound)
    /// - Model path is non-empty (the recognizer cannot start without one)
    /// - Scheduling intervals are non-zero (a zero step would busy-loop the
    ///   readiness predicate; a zero window length would starve the engine)
    pub fn validate(&self) -> Result<()> {
        if self.server.port == 0 {
            return Err(anyhow::anyhow!("Server port cannot be 0"));
        }

        if self.model.path.is_empty() {
            return Err(anyhow::anyhow!("Model path cannot be empty"));
        }

        if self.stream.step_ms == 0 {
            return Err(anyhow::anyhow!("Stream step_ms must be greater than 0"));
        }

        if self.stream.length_ms == 0 {
            return Err(anyhow::anyhow!("Stream length_ms must be greater than 0"));
        }

        if self.stream.n_threads <= 0 {
            return Err(anyhow::anyhow!("Thread count must be greater than 0"));
        }

        Ok(())
    }
}
