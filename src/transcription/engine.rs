//! # Engine Adapter
//!
//! A narrow interface over the recognizer: one operation, synchronous and
//! potentially slow (hundreds of milliseconds per window). The session core
//! drives it through the `SpeechEngine` trait so its scheduling and diffing
//! logic can be tested against a scripted engine without loading a model.
//!
//! ## Parameter mapping:
//! Session parameters translate to whisper `FullParams` as follows:
//! - `beam_size > 1` selects beam search, anything else greedy decoding
//! - `single_segment` is always on: each window is one utterance
//! - `no_fallback` forces `temperature_inc` to 0.0, otherwise the engine
//!   default temperature ladder applies
//! - prompt tokens are forwarded only when `no_context` is false

use crate::config::StreamConfig;
use crate::error::AppResult;
use std::sync::Arc;
use whisper_rs::{FullParams, SamplingStrategy, WhisperContext, WhisperState};

/// One recognized segment of an inference window.
#[derive(Debug, Clone)]
pub struct TranscriptSegment {
    /// Recognized text, as produced by the engine (leading space included)
    pub text: String,

    /// Segment start, centiseconds relative to the window
    pub start_cs: i64,

    /// Segment end, centiseconds relative to the window
    pub end_cs: i64,

    /// Whether the engine flagged a speaker turn at the segment boundary
    pub speaker_turn_next: bool,

    /// Token ids of this segment, for conditioning the next pass
    pub tokens: Vec<i32>,
}

/// Interface the session core uses to run an inference pass.
pub trait SpeechEngine {
    /// Transcribe one assembled window.
    ///
    /// ## Parameters:
    /// - **samples**: mono float PCM at the engine sample rate
    /// - **prompt_tokens**: tokens from the prior pass (empty when context is
    ///   disabled or no pass has produced any)
    fn transcribe(
        &mut self,
        samples: &[f32],
        prompt_tokens: &[i32],
    ) -> AppResult<Vec<TranscriptSegment>>;
}

/// Whisper-backed engine adapter.
///
/// Holds a private inference state created from the shared model context, so
/// sessions never contend with each other on a lock while decoding.
pub struct WhisperEngine {
    state: WhisperState,
    options: StreamConfig,
}

impl WhisperEngine {
    /// Create an engine bound to a fresh inference state.
    pub fn new(context: &Arc<WhisperContext>, options: StreamConfig) -> AppResult<Self> {
        let state = context.create_state()?;
        Ok(Self { state, options })
    }
}

impl SpeechEngine for WhisperEngine {
    fn transcribe(
        &mut self,
        samples: &[f32],
        prompt_tokens: &[i32],
    ) -> AppResult<Vec<TranscriptSegment>> {
        let strategy = if self.options.beam_size > 1 {
            SamplingStrategy::BeamSearch {
                beam_size: self.options.beam_size,
                patience: -1.0,
            }
        } else {
            SamplingStrategy::Greedy { best_of: 1 }
        };

        let mut params = FullParams::new(strategy);
        params.set_print_progress(false);
        params.set_print_special(self.options.print_special);
        params.set_print_realtime(false);
        params.set_print_timestamps(!self.options.no_timestamps);
        params.set_translate(self.options.translate);
        params.set_single_segment(true);
        params.set_max_tokens(self.options.max_tokens);
        params.set_language(Some(self.options.language.as_str()));
        params.set_n_threads(self.options.n_threads);
        params.set_audio_ctx(self.options.audio_ctx);
        params.set_tdrz_enable(self.options.tinydiarize);

        if self.options.no_fallback {
            params.set_temperature_inc(0.0);
        }

        if !self.options.no_context && !prompt_tokens.is_empty() {
            params.set_tokens(prompt_tokens);
        }

        self.state.full(params, samples)?;

        let n_segments = self.state.full_n_segments()?;
        let mut segments = Vec::with_capacity(n_segments as usize);

        for i in 0..n_segments {
            let text = self.state.full_get_segment_text(i)?;
            let start_cs = self.state.full_get_segment_t0(i)?;
            let end_cs = self.state.full_get_segment_t1(i)?;

            let speaker_turn_next =
                self.options.tinydiarize && self.state.full_get_segment_speaker_turn_next(i);

            // Token ids only matter when they will condition the next pass
            let mut tokens = Vec::new();
            if !self.options.no_context {
                let n_tokens = self.state.full_n_tokens(i)?;
                tokens.reserve(n_tokens as usize);
                for j in 0..n_tokens {
                    tokens.push(self.state.full_get_token_id(i, j)?);
                }
            }

            segments.push(TranscriptSegment {
                text,
                start_cs,
                end_cs,
                speaker_turn_next,
                tokens,
            });
        }

        Ok(segments)
    }
}
