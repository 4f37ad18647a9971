//! # Transcription Module
//!
//! Speech-to-text via whisper.cpp through the `whisper-rs` bindings.
//!
//! ## Key Components:
//! - **Model Loading**: one process-wide `WhisperContext` loaded at startup
//! - **Engine Adapter**: the `SpeechEngine` trait and its whisper-backed
//!   implementation, one inference state per session
//!
//! ## Sharing model:
//! The context (model weights) is immutable after load and shared across all
//! sessions behind an `Arc`. Each session creates its own `WhisperState`, so
//! concurrent inference from different sessions needs no locking.

pub mod engine; // SpeechEngine trait and whisper-backed adapter
pub mod model; // Model loading

pub use engine::{SpeechEngine, TranscriptSegment, WhisperEngine};
