//! # Sliding Window Buffer
//!
//! Implements the audio buffer behind a streaming session: incoming samples
//! accumulate in a capped queue, and each inference pass drains a step of new
//! audio prefixed with a tail of previously submitted samples. The overlap
//! gives the recognizer acoustic context at window boundaries so words split
//! across passes are still decoded correctly.
//!
//! ## Key Features:
//! - **Capped buffer**: at most `2 x n_len` samples are held; older audio is
//!   discarded from the front when a client outruns the engine
//! - **Overlap retention**: the previously submitted window is kept as the
//!   tail and contributes up to `n_keep + n_len - n_new` samples to the next
//!   window
//! - **Pure assembly**: the window formula lives in [`assemble`] so it can be
//!   tested without a session or an engine

use std::collections::VecDeque;

/// Convert a duration in milliseconds to a sample count at the given rate.
fn samples_for_ms(ms: u32, sample_rate: u32) -> usize {
    (ms as usize * sample_rate as usize) / 1000
}

/// Assemble an inference window from the retained tail and new samples.
///
/// The overlap drawn from the end of the tail is
/// `min(len(tail), max(0, n_keep + n_len - n_new))`, targeting a submitted
/// window of `n_keep + n_len` samples when enough history exists. Early in a
/// stream the tail is short and the window is mostly new audio; as the stream
/// matures the overlap grows toward its target.
pub fn assemble(tail: &[f32], new_samples: &[f32], n_keep: usize, n_len: usize) -> Vec<f32> {
    let n_new = new_samples.len();
    let n_take = tail.len().min((n_keep + n_len).saturating_sub(n_new));

    let mut window = Vec::with_capacity(n_take + n_new);
    window.extend_from_slice(&tail[tail.len() - n_take..]);
    window.extend_from_slice(new_samples);
    window
}

/// Sliding window buffer for one streaming session.
///
/// ## Derived sample counts:
/// - **n_step**: `step_ms * sample_rate / 1000`, minimum new samples per pass
/// - **n_len**: `length_ms * sample_rate / 1000`, target window length
/// - **n_keep**: `keep_ms * sample_rate / 1000`, minimum carry-over
/// - **n_max**: `2 * n_len`, hard cap on buffered samples
pub struct SlidingWindow {
    /// Incoming samples not yet submitted to the engine
    samples: VecDeque<f32>,

    /// The most recently submitted window, retained for overlap
    tail: Vec<f32>,

    n_step: usize,
    n_len: usize,
    n_keep: usize,
    n_max: usize,
}

impl SlidingWindow {
    pub fn new(step_ms: u32, length_ms: u32, keep_ms: u32, sample_rate: u32) -> Self {
        let n_step = samples_for_ms(step_ms, sample_rate);
        let n_len = samples_for_ms(length_ms, sample_rate);
        let n_keep = samples_for_ms(keep_ms, sample_rate);

        Self {
            samples: VecDeque::with_capacity(n_len * 2),
            tail: Vec::new(),
            n_step,
            n_len,
            n_keep,
            n_max: n_len * 2,
        }
    }

    /// Append samples, discarding from the front once the cap is exceeded.
    ///
    /// ## Returns:
    /// The number of samples discarded, so the caller can log sustained
    /// overrun. No inference is triggered here.
    pub fn push(&mut self, samples: &[f32]) -> usize {
        self.samples.extend(samples.iter().copied());

        let overflow = self.samples.len().saturating_sub(self.n_max);
        if overflow > 0 {
            self.samples.drain(..overflow);
        }
        overflow
    }

    /// Number of buffered samples awaiting submission.
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Whether a full step of new audio has accumulated.
    pub fn has_step(&self) -> bool {
        self.samples.len() >= self.n_step
    }

    /// Drain one step of new audio and assemble the next inference window.
    ///
    /// Consumes `min(len, n_step)` samples from the front and replaces the
    /// tail with the assembled window, so the next pass overlaps this one.
    pub fn take_step(&mut self) -> Vec<f32> {
        let n_new = self.samples.len().min(self.n_step);
        self.take(n_new, true)
    }

    /// Drain everything and assemble a final window.
    ///
    /// Used by flush: the same overlap formula with `n_new = len`, after
    /// which both the buffer and the tail are cleared. The next window (if
    /// the stream continues) starts without acoustic history.
    pub fn take_all(&mut self) -> Vec<f32> {
        let n_new = self.samples.len();
        self.take(n_new, false)
    }

    /// Drop all buffered samples and the retained tail.
    pub fn clear(&mut self) {
        self.samples.clear();
        self.tail.clear();
    }

    fn take(&mut self, n_new: usize, retain_tail: bool) -> Vec<f32> {
        let new_samples: Vec<f32> = self.samples.iter().take(n_new).copied().collect();
        let window = assemble(&self.tail, &new_samples, self.n_keep, self.n_len);

        if retain_tail {
            self.tail = window.clone();
            self.samples.drain(..n_new);
        } else {
            self.tail.clear();
            self.samples.clear();
        }

        window
    }
}
