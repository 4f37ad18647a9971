//! # Recognizer Model Loading
//!
//! Loads the ggml model file into a process-wide `WhisperContext` at startup.
//! A load failure is fatal: the server exits non-zero rather than accepting
//! connections it cannot serve.

use crate::config::ModelConfig;
use crate::error::{AppError, AppResult};
use std::sync::Arc;
use std::time::Instant;
use tracing::info;
use whisper_rs::{WhisperContext, WhisperContextParameters};

/// Load the recognizer model described by the configuration.
///
/// ## Parameters:
/// - **config**: model path plus acceleration flags (`use_gpu`, `flash_attn`)
///
/// ## Returns:
/// - **Ok(Arc<WhisperContext>)**: shared handle sessions create states from
/// - **Err(AppError::ModelLoad)**: the file is missing or not a valid model
pub fn load_model(config: &ModelConfig) -> AppResult<Arc<WhisperContext>> {
    info!("Loading whisper model from {}", config.path);
    let start_time = Instant::now();

    let mut context_params = WhisperContextParameters::default();
    context_params.use_gpu(config.use_gpu);
    context_params.flash_attn(config.flash_attn);

    let context = WhisperContext::new_with_params(&config.path, context_params)
        .map_err(|err| AppError::ModelLoad(format!("{}: {}", config.path, err)))?;

    info!(
        "Whisper model loaded in {:.2}s (gpu: {}, flash_attn: {})",
        start_time.elapsed().as_secs_f64(),
        config.use_gpu,
        config.flash_attn
    );

    Ok(Arc::new(context))
}
