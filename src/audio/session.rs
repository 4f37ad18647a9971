//! # Streaming Session Core
//!
//! One `StreamSession` exists per connected client and owns that stream's
//! entire transcription state: the sliding window buffer, the prompt-token
//! history, the last emitted transcript, and the scheduling clock that
//! decides when an inference pass is worth its cost.
//!
//! ## Scheduling:
//! A pass runs only when a full step of new audio has accumulated AND at
//! least `step_ms` has elapsed since the previous pass began. The time gate
//! prevents tight-loop invocation when small feeds arrive in bursts.
//!
//! ## Incremental output:
//! Successive windows overlap, so the recognizer re-decodes old audio every
//! pass. Output is diffed against the previous emission over a "clean" form
//! (bracketed spans stripped, whitespace trimmed): a prefix extension yields
//! only the new suffix, identical output yields nothing, and a revision of
//! earlier wording is surfaced in full.

use crate::audio::buffer::SlidingWindow;
use crate::config::StreamConfig;
use crate::transcription::{SpeechEngine, TranscriptSegment};
use std::time::{Duration, Instant};
use tracing::{debug, error};

/// Per-connection streaming transcription session.
pub struct StreamSession {
    /// Recognizer handle, private to this session
    engine: Box<dyn SpeechEngine>,

    /// Audio buffer and overlap tail
    window: SlidingWindow,

    /// Token ids from the most recent pass, used to condition the next one
    prompt_tokens: Vec<i32>,

    /// Most recent formatted transcript, used for incremental diffing
    last_emission: String,

    /// When the last inference pass began
    last_run_at: Instant,

    /// Number of completed inference passes
    iteration: u32,

    /// Session parameters, immutable after construction
    params: StreamConfig,

    /// Identifier assigned at accept time
    user_id: i32,
}

impl StreamSession {
    /// Create a new session.
    ///
    /// ## Parameters:
    /// - **engine**: the recognizer adapter this session will submit windows to
    /// - **params**: per-session streaming parameters (copied from config)
    /// - **sample_rate**: the engine's native sample rate, used to derive
    ///   sample counts from the millisecond parameters
    /// - **user_id**: identifier assigned by the server at accept time
    pub fn new(
        engine: Box<dyn SpeechEngine>,
        params: StreamConfig,
        sample_rate: u32,
        user_id: i32,
    ) -> Self {
        Self {
            engine,
            window: SlidingWindow::new(params.step_ms, params.length_ms, params.keep_ms, sample_rate),
            prompt_tokens: Vec::new(),
            last_emission: String::new(),
            last_run_at: Instant::now(),
            iteration: 0,
            params,
            user_id,
        }
    }

    pub fn user_id(&self) -> i32 {
        self.user_id
    }

    /// Append float samples to the buffer. No inference is triggered here.
    ///
    /// If the buffer cap is exceeded the oldest audio is silently discarded;
    /// the drop is logged so sustained overrun is visible to operators.
    pub fn push_audio(&mut self, samples: &[f32]) {
        let dropped = self.window.push(samples);
        if dropped > 0 {
            debug!(
                user_id = self.user_id,
                dropped,
                buffered = self.window.len(),
                "audio buffer cap exceeded, discarding oldest samples"
            );
        }
    }

    /// Readiness predicate: a full step of new audio has accumulated AND at
    /// least `step_ms` has elapsed since the last pass began.
    pub fn should_process(&self) -> bool {
        self.window.has_step()
            && self.last_run_at.elapsed() >= Duration::from_millis(self.params.step_ms as u64)
    }

    /// Run an inference pass if the session is ready; returns the incremental
    /// transcript, possibly empty.
    pub fn drain_if_ready(&mut self) -> String {
        if !self.should_process() {
            return String::new();
        }

        let window = self.window.take_step();
        self.last_run_at = Instant::now();
        self.run_inference(window)
    }

    /// Submit every remaining sample regardless of readiness, then clear the
    /// buffer and tail. An empty buffer is a no-op returning `""`.
    ///
    /// Prompt tokens survive a flush: a client flushing at an utterance
    /// boundary keeps its decoding context for the continuation. `reset` is
    /// the full clear.
    pub fn flush(&mut self) -> String {
        if self.window.is_empty() {
            return String::new();
        }

        let window = self.window.take_all();
        self.last_run_at = Instant::now();
        self.run_inference(window)
    }

    /// Clear all stream state. Subsequent output is unconditioned by prior
    /// context.
    pub fn reset(&mut self) {
        self.window.clear();
        self.prompt_tokens.clear();
        self.last_emission.clear();
        self.iteration = 0;
        self.last_run_at = Instant::now();
    }

    /// Run one inference pass over an assembled window and produce the
    /// incremental delta.
    ///
    /// On engine failure the pass's input is already consumed and the delta
    /// is empty; emission and prompt state are left untouched so the next
    /// pass diffs against the last text the client actually saw.
    fn run_inference(&mut self, window: Vec<f32>) -> String {
        if window.is_empty() {
            return String::new();
        }

        debug!(
            user_id = self.user_id,
            pass = self.iteration + 1,
            samples = window.len(),
            "running inference pass"
        );

        let segments = match self.engine.transcribe(&window, &self.prompt_tokens) {
            Ok(segments) => segments,
            Err(err) => {
                error!(user_id = self.user_id, error = %err, "inference pass failed");
                return String::new();
            }
        };

        self.iteration += 1;

        if !self.params.no_context && !segments.is_empty() {
            self.prompt_tokens.clear();
            for segment in &segments {
                self.prompt_tokens.extend_from_slice(&segment.tokens);
            }
        }

        let transcript = self.format_segments(&segments);
        let delta = extract_new_text(&self.last_emission, &transcript);
        self.last_emission = transcript;

        debug!(
            user_id = self.user_id,
            pass = self.iteration,
            chars = delta.len(),
            "inference pass complete"
        );

        delta
    }

    /// Render engine segments into the transcript string the diff operates on.
    fn format_segments(&self, segments: &[TranscriptSegment]) -> String {
        let mut transcript = String::new();

        for segment in segments {
            if !self.params.no_timestamps {
                transcript.push_str(&format!(
                    "[{} --> {}]  ",
                    format_timestamp(segment.start_cs),
                    format_timestamp(segment.end_cs)
                ));
            }

            transcript.push_str(&segment.text);

            if self.params.tinydiarize && segment.speaker_turn_next {
                transcript.push_str(" [SPEAKER_TURN]");
            }
        }

        transcript
    }
}

/// Strip every `[...]` span and trim surrounding whitespace.
///
/// Timestamps and speaker-turn markers are rendered in brackets, so the clean
/// form is the bare recognized text; diffing over it keeps the delta stable
/// across shifting window-relative timestamps.
fn clean_transcript(text: &str) -> String {
    let mut cleaned = String::with_capacity(text.len());
    let mut in_bracket = false;

    for ch in text.chars() {
        match ch {
            '[' => in_bracket = true,
            ']' if in_bracket => in_bracket = false,
            _ if !in_bracket => cleaned.push(ch),
            _ => {}
        }
    }

    cleaned.trim().to_string()
}

/// Compute the incremental delta between the previous emission and the
/// current transcript.
///
/// ## Cases:
/// 1. Current extends the previous text: return the trimmed new suffix
/// 2. Current equals the previous text: return nothing
/// 3. Current diverges (the engine revised prior wording): return it in full
fn extract_new_text(last_emission: &str, current: &str) -> String {
    let clean_last = clean_transcript(last_emission);
    let clean_current = clean_transcript(current);

    if clean_current == clean_last {
        return String::new();
    }

    if clean_current.len() > clean_last.len() && clean_current.starts_with(&clean_last) {
        return clean_current[clean_last.len()..].trim().to_string();
    }

    clean_current
}

/// Render a centisecond timestamp as `HH:MM:SS.mmm`.
fn format_timestamp(t_cs: i64) -> String {
    let mut msec = t_cs * 10;
    let hours = msec / (1000 * 60 * 60);
    msec -= hours * 1000 * 60 * 60;
    let minutes = msec / (1000 * 60);
    msec -= minutes * 1000 * 60;
    let seconds = msec / 1000;
    msec -= seconds * 1000;

    format!("{:02}:{:02}:{:02}.{:03}", hours, minutes, seconds, msec)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{AppError, AppResult};
    use std::cell::RefCell;
    use std::collections::VecDeque;
    use std::rc::Rc;

    /// Recorded state of the scripted engine, shared with the test body.
    #[derive(Default)]
    struct ScriptedState {
        outputs: VecDeque<AppResult<Vec<TranscriptSegment>>>,
        window_sizes: Vec<usize>,
        prompts: Vec<Vec<i32>>,
    }

    /// A fake engine that replays scripted results and records its inputs.
    struct ScriptedEngine {
        state: Rc<RefCell<ScriptedState>>,
    }

    impl SpeechEngine for ScriptedEngine {
        fn transcribe(
            &mut self,
            samples: &[f32],
            prompt_tokens: &[i32],
        ) -> AppResult<Vec<TranscriptSegment>> {
            let mut state = self.state.borrow_mut();
            state.window_sizes.push(samples.len());
            state.prompts.push(prompt_tokens.to_vec());
            state
                .outputs
                .pop_front()
                .unwrap_or_else(|| Ok(Vec::new()))
        }
    }

    fn segment(text: &str) -> TranscriptSegment {
        TranscriptSegment {
            text: text.to_string(),
            start_cs: 0,
            end_cs: 250,
            speaker_turn_next: false,
            tokens: Vec::new(),
        }
    }

    fn test_params() -> StreamConfig {
        StreamConfig {
            n_threads: 1,
            step_ms: 50,
            length_ms: 500,
            keep_ms: 20,
            no_timestamps: true, // most tests diff bare text
            ..StreamConfig::default()
        }
    }

    /// Build a session over the scripted engine at 1 kHz (1 ms == 1 sample).
    fn scripted_session(params: StreamConfig) -> (StreamSession, Rc<RefCell<ScriptedState>>) {
        let state = Rc::new(RefCell::new(ScriptedState::default()));
        let engine = ScriptedEngine {
            state: state.clone(),
        };
        (StreamSession::new(Box::new(engine), params, 1000, 7), state)
    }

    fn script(state: &Rc<RefCell<ScriptedState>>, result: AppResult<Vec<TranscriptSegment>>) {
        state.borrow_mut().outputs.push_back(result);
    }

    /// Push samples and force a pass via flush (no time gate).
    fn pass(session: &mut StreamSession, n_samples: usize) -> String {
        session.push_audio(&vec![0.1; n_samples]);
        session.flush()
    }

    #[test]
    fn test_no_pass_below_step_threshold() {
        let (mut session, state) = scripted_session(test_params());

        session.push_audio(&vec![0.0; 30]); // under the 50-sample step
        std::thread::sleep(Duration::from_millis(60));

        assert_eq!(session.drain_if_ready(), "");
        assert!(state.borrow().window_sizes.is_empty());
    }

    #[test]
    fn test_time_gate_allows_single_pass() {
        let (mut session, state) = scripted_session(test_params());
        script(&state, Ok(vec![segment("hello")]));
        script(&state, Ok(vec![segment("hello again")]));

        session.push_audio(&vec![0.0; 200]);
        std::thread::sleep(Duration::from_millis(60));

        assert_eq!(session.drain_if_ready(), "hello");
        // Buffer still holds 150 samples, but the clock gate blocks the pass
        assert_eq!(session.drain_if_ready(), "");
        assert_eq!(state.borrow().window_sizes.len(), 1);
    }

    #[test]
    fn test_drain_consumes_exactly_one_step() {
        let (mut session, state) = scripted_session(test_params());
        script(&state, Ok(vec![segment("first")]));

        session.push_audio(&vec![0.0; 120]);
        std::thread::sleep(Duration::from_millis(60));
        let _ = session.drain_if_ready();

        // First pass has no tail: the submitted window is exactly one step
        assert_eq!(state.borrow().window_sizes, vec![50]);
    }

    #[test]
    fn test_identical_pass_yields_empty_delta() {
        let (mut session, state) = scripted_session(test_params());
        script(&state, Ok(vec![segment("the quick brown fox")]));
        script(&state, Ok(vec![segment("the quick brown fox")]));

        assert_eq!(pass(&mut session, 60), "the quick brown fox");
        assert_eq!(pass(&mut session, 60), "");
    }

    #[test]
    fn test_prefix_extension_yields_suffix() {
        let (mut session, state) = scripted_session(test_params());
        script(&state, Ok(vec![segment("the quick brown")]));
        script(&state, Ok(vec![segment("the quick brown fox jumps")]));

        let first = pass(&mut session, 60);
        let second = pass(&mut session, 60);

        assert_eq!(first, "the quick brown");
        assert_eq!(second, "fox jumps");
        // Reassembling the pieces recovers the full clean transcript
        assert_eq!(format!("{} {}", first, second), "the quick brown fox jumps");
    }

    #[test]
    fn test_divergence_surfaces_full_revision() {
        let (mut session, state) = scripted_session(test_params());
        script(&state, Ok(vec![segment("I scream")]));
        script(&state, Ok(vec![segment("ice cream sounds good")]));

        assert_eq!(pass(&mut session, 60), "I scream");
        assert_eq!(pass(&mut session, 60), "ice cream sounds good");
    }

    #[test]
    fn test_timestamps_are_rendered_but_not_diffed() {
        let mut params = test_params();
        params.no_timestamps = false;
        let (mut session, state) = scripted_session(params);

        let mut first = segment(" hello");
        first.end_cs = 250;
        script(&state, Ok(vec![first]));
        // Same words, shifted window-relative timestamps
        let mut second = segment(" hello");
        second.start_cs = 30;
        second.end_cs = 280;
        script(&state, Ok(vec![second]));

        assert_eq!(pass(&mut session, 60), "hello");
        // The text did not change, so the shifted timestamps emit nothing
        assert_eq!(pass(&mut session, 60), "");
    }

    #[test]
    fn test_speaker_turn_marker_is_appended() {
        let mut params = test_params();
        params.tinydiarize = true;
        let (mut session, state) = scripted_session(params);

        let mut seg = segment("hello there");
        seg.speaker_turn_next = true;
        script(&state, Ok(vec![seg]));

        // The marker is bracketed, so the clean delta is the bare text
        assert_eq!(pass(&mut session, 60), "hello there");
        assert!(session.last_emission.ends_with(" [SPEAKER_TURN]"));
    }

    #[test]
    fn test_prompt_tokens_follow_context_setting() {
        let mut params = test_params();
        params.no_context = false;
        let (mut session, state) = scripted_session(params);

        let mut first = segment("one two");
        first.tokens = vec![11, 22];
        let mut second = segment("three");
        second.tokens = vec![33];
        script(&state, Ok(vec![first, second]));
        script(&state, Ok(vec![segment("next")]));

        let _ = pass(&mut session, 60);
        let _ = pass(&mut session, 60);

        let recorded = state.borrow();
        assert_eq!(recorded.prompts[0], Vec::<i32>::new());
        assert_eq!(recorded.prompts[1], vec![11, 22, 33]);
    }

    #[test]
    fn test_empty_pass_keeps_prior_prompt_tokens() {
        let mut params = test_params();
        params.no_context = false;
        let (mut session, state) = scripted_session(params);

        let mut seg = segment("kept");
        seg.tokens = vec![5, 6];
        script(&state, Ok(vec![seg]));
        script(&state, Ok(Vec::new())); // recognizer produced no segments
        script(&state, Ok(vec![segment("more")]));

        let _ = pass(&mut session, 60);
        let _ = pass(&mut session, 60);
        let _ = pass(&mut session, 60);

        // A segment-less pass does not discard the accumulated context
        assert_eq!(state.borrow().prompts[2], vec![5, 6]);
    }

    #[test]
    fn test_context_disabled_by_default() {
        let (mut session, state) = scripted_session(test_params());

        let mut seg = segment("ignored");
        seg.tokens = vec![1, 2, 3];
        script(&state, Ok(vec![seg]));
        script(&state, Ok(vec![segment("still ignored")]));

        let _ = pass(&mut session, 60);
        let _ = pass(&mut session, 60);

        assert_eq!(state.borrow().prompts[1], Vec::<i32>::new());
    }

    #[test]
    fn test_flush_of_empty_buffer_is_a_no_op() {
        let (mut session, state) = scripted_session(test_params());

        assert_eq!(session.flush(), "");
        assert!(state.borrow().window_sizes.is_empty());
    }

    #[test]
    fn test_flush_consumes_everything_and_drops_tail() {
        let (mut session, state) = scripted_session(test_params());
        script(&state, Ok(vec![segment("tail setup")]));
        script(&state, Ok(vec![segment("flushed")]));
        script(&state, Ok(vec![segment("fresh")]));

        let _ = pass(&mut session, 70);
        let _ = pass(&mut session, 40);

        // flush never retains a tail, so each pass sees only its own samples
        assert_eq!(state.borrow().window_sizes, vec![70, 40]);
        let _ = pass(&mut session, 30);
        assert_eq!(state.borrow().window_sizes, vec![70, 40, 30]);
    }

    #[test]
    fn test_reset_is_idempotent() {
        let (mut session, state) = scripted_session(test_params());
        script(&state, Ok(vec![segment("before reset")]));
        script(&state, Ok(vec![segment("after")]));

        let _ = pass(&mut session, 60);
        session.reset();
        session.reset();

        assert_eq!(session.iteration, 0);
        assert!(session.prompt_tokens.is_empty());
        assert!(session.last_emission.is_empty());
        // A fresh pass behaves exactly like the first one of a new session
        assert_eq!(pass(&mut session, 60), "after");
        assert_eq!(state.borrow().window_sizes, vec![60, 60]);
    }

    #[test]
    fn test_reset_clears_diff_context() {
        let (mut session, state) = scripted_session(test_params());
        script(&state, Ok(vec![segment("hello world")]));
        script(&state, Ok(vec![segment("hello world again")]));

        assert_eq!(pass(&mut session, 60), "hello world");
        session.reset();

        // Without the reset this would have been the suffix "again"
        assert_eq!(pass(&mut session, 60), "hello world again");
    }

    #[test]
    fn test_engine_error_yields_empty_delta_and_advances_buffer() {
        let (mut session, state) = scripted_session(test_params());
        script(&state, Err(AppError::Engine("decode failed".to_string())));
        script(&state, Ok(vec![segment("recovered")]));

        session.push_audio(&vec![0.0; 120]);
        std::thread::sleep(Duration::from_millis(60));

        assert_eq!(session.drain_if_ready(), "");
        // The failed pass consumed its step; 70 samples remain
        assert_eq!(session.window.len(), 70);
        assert_eq!(session.iteration, 0);

        // The session keeps working after the failure
        assert_eq!(pass(&mut session, 10), "recovered");
    }

    #[test]
    fn test_clean_transcript_strips_bracketed_spans() {
        assert_eq!(
            clean_transcript("[00:00:00.000 --> 00:00:02.500]   hello world"),
            "hello world"
        );
        assert_eq!(clean_transcript("  plain text  "), "plain text");
        assert_eq!(
            clean_transcript("a [x] b [SPEAKER_TURN]"),
            "a  b"
        );
        assert_eq!(clean_transcript("[only brackets]"), "");
    }

    #[test]
    fn test_extract_new_text_cases() {
        assert_eq!(extract_new_text("abc def", "abc def"), "");
        assert_eq!(extract_new_text("abc", "abc def"), "def");
        assert_eq!(extract_new_text("abc", "xyz"), "xyz");
        assert_eq!(extract_new_text("", "first words"), "first words");
    }

    #[test]
    fn test_format_timestamp() {
        assert_eq!(format_timestamp(0), "00:00:00.000");
        assert_eq!(format_timestamp(250), "00:00:02.500");
        assert_eq!(format_timestamp(366150), "01:01:01.500");
    }
}
