//! # Audio Streaming Module
//!
//! This module implements the per-connection streaming transcription core:
//! everything between raw PCM bytes arriving on the socket and an incremental
//! transcript leaving it.
//!
//! ## Key Components:
//! - **Frame Decoding**: binary-frame classification and PCM conversion
//! - **Sliding Window**: capped sample buffer with overlap retention
//! - **Stream Session**: scheduling, inference dispatch, incremental output
//!
//! ## Audio Format Requirements:
//! - **Sample Rate**: 16kHz (16,000 Hz), the recognizer's native rate
//! - **Channels**: Mono (1 channel)
//! - **Encoding**: Little-endian float32 in [-1, 1] or signed int16

pub mod buffer; // Sliding window buffer with overlap retention
pub mod decode; // Binary frame classification and PCM decoding
pub mod session; // Per-connection streaming session core

/// Sample rate the recognizer operates at. Clients must send audio already
/// resampled to this rate; the gateway performs no resampling.
pub const SAMPLE_RATE: u32 = 16_000;
