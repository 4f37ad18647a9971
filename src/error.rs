//! # Error Handling
//!
//! Custom error types for the gateway. Client-visible failures travel as
//! WebSocket `error` frames built by the connection handler; this type covers
//! the server-side failure paths (startup and inference), so callers can use
//! `?` and still produce a useful message at the boundary.
//!
//! ## Error Categories:
//! - **Config**: configuration loading or validation problems (fatal at startup)
//! - **ModelLoad**: the recognizer model could not be initialized (fatal at startup)
//! - **Engine**: an inference pass failed (the owning session survives)

use std::fmt;

/// Custom error types for the gateway.
#[derive(Debug)]
pub enum AppError {
    /// Configuration file or environment variable problems
    Config(String),

    /// The recognizer model failed to load or initialize
    ModelLoad(String),

    /// An inference pass returned a failure
    Engine(String),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Config(msg) => write!(f, "Configuration error: {}", msg),
            AppError::ModelLoad(msg) => write!(f, "Model load error: {}", msg),
            AppError::Engine(msg) => write!(f, "Engine error: {}", msg),
        }
    }
}

impl std::error::Error for AppError {}

/// Automatic conversion from configuration errors to AppError.
///
/// ## When this happens:
/// - config.toml has invalid syntax
/// - Environment overrides fail to parse
impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        AppError::Config(err.to_string())
    }
}

/// Automatic conversion from whisper-rs errors to AppError.
///
/// ## Classification:
/// Everything surfacing from the bindings during a pass is an engine error;
/// load-time failures are mapped to `ModelLoad` explicitly at the call site
/// where the distinction is known.
impl From<whisper_rs::WhisperError> for AppError {
    fn from(err: whisper_rs::WhisperError) -> Self {
        AppError::Engine(err.to_string())
    }
}

/// Type alias for Results that use our custom error type.
pub type AppResult<T> = Result<T, AppError>;
