//! Utterance segmentation — the silence-timeout state machine
//!
//! Consumes the frame stream plus per-frame speech classification and buffers
//! one utterance at a time. Recording starts on the first speech frame;
//! trailing silence is kept (it carries word tails) and counted, and when the
//! silent run exceeds the configured timeout the utterance is closed and
//! returned. A cancelled capture abandons the buffer: only a full
//! silence-terminated utterance is ever produced.

use crate::audio::{AudioFrame, FrameSource};
use crate::error::VoiceResult;
use crate::vad::EnergyVad;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::{debug, info};

/// How long `capture_utterance` waits for a single frame before re-checking
/// the cancellation flag.
const FRAME_POLL_TIMEOUT: Duration = Duration::from_millis(250);

/// Configuration for utterance termination
#[derive(Debug, Clone)]
pub struct SegmenterConfig {
    /// Trailing silence after which an utterance is considered finished
    /// (default: 2 seconds)
    pub silence_duration: Duration,

    /// Sample rate of the incoming frames in Hz
    pub sample_rate: u32,

    /// Samples per frame
    pub chunk_size: usize,
}

impl Default for SegmenterConfig {
    fn default() -> Self {
        Self {
            silence_duration: Duration::from_secs(2),
            sample_rate: 16_000,
            chunk_size: 1024,
        }
    }
}

impl SegmenterConfig {
    /// Number of consecutive silent frames the counter must exceed before the
    /// utterance closes.
    pub fn max_silent_frames(&self) -> usize {
        (self.silence_duration.as_secs_f32() * self.sample_rate as f32 / self.chunk_size as f32)
            as usize
    }
}

/// One buffered span of audio judged to contain a spoken turn.
///
/// Closed (frozen) by the segmenter; never reopened or mutated afterwards.
#[derive(Debug, Clone)]
pub struct Utterance {
    frames: Vec<AudioFrame>,
    /// True when at least one frame was classified as speech. Always true for
    /// a closed utterance (recording only starts on speech), kept explicit so
    /// downstream code does not need to re-derive it.
    pub had_speech: bool,
}

impl Utterance {
    pub fn frame_count(&self) -> usize {
        self.frames.len()
    }

    /// Concatenate all frames into one raw sample buffer.
    pub fn samples(&self) -> Vec<i16> {
        let total: usize = self.frames.iter().map(AudioFrame::len).sum();
        let mut out = Vec::with_capacity(total);
        for frame in &self.frames {
            out.extend_from_slice(&frame.samples);
        }
        out
    }

    pub fn duration(&self, sample_rate: u32) -> Duration {
        let samples: usize = self.frames.iter().map(AudioFrame::len).sum();
        Duration::from_secs_f64(samples as f64 / sample_rate as f64)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmenterState {
    /// No speech observed yet; silent frames are discarded.
    Idle,
    /// Speech observed; every frame is buffered until the silence timeout.
    Recording,
}

/// Frame-at-a-time segmentation state machine.
pub struct UtteranceSegmenter {
    config: SegmenterConfig,
    state: SegmenterState,
    buffer: Vec<AudioFrame>,
    silent_run: usize,
}

impl UtteranceSegmenter {
    pub fn new(config: SegmenterConfig) -> Self {
        Self {
            config,
            state: SegmenterState::Idle,
            buffer: Vec::new(),
            silent_run: 0,
        }
    }

    /// Feed one classified frame. Returns the closed utterance when the
    /// silence timeout fires, `None` otherwise.
    pub fn push_frame(&mut self, frame: AudioFrame, is_speech: bool) -> Option<Utterance> {
        match (self.state, is_speech) {
            (SegmenterState::Idle, true) => {
                debug!("speech started, recording");
                self.state = SegmenterState::Recording;
                self.silent_run = 0;
                self.buffer.push(frame);
                None
            }
            (SegmenterState::Idle, false) => None,
            (SegmenterState::Recording, true) => {
                self.silent_run = 0;
                self.buffer.push(frame);
                None
            }
            (SegmenterState::Recording, false) => {
                // Trailing silence is kept to preserve word tails.
                self.buffer.push(frame);
                self.silent_run += 1;
                if self.silent_run > self.config.max_silent_frames() {
                    info!(
                        frames = self.buffer.len(),
                        "silence timeout reached, utterance closed"
                    );
                    return Some(self.take_utterance());
                }
                None
            }
        }
    }

    /// Abandon any buffered frames and return to idle.
    pub fn reset(&mut self) {
        self.state = SegmenterState::Idle;
        self.buffer.clear();
        self.silent_run = 0;
    }

    pub fn state(&self) -> SegmenterState {
        self.state
    }

    pub fn buffered_frames(&self) -> usize {
        self.buffer.len()
    }

    fn take_utterance(&mut self) -> Utterance {
        let frames = std::mem::take(&mut self.buffer);
        self.state = SegmenterState::Idle;
        self.silent_run = 0;
        Utterance {
            frames,
            had_speech: true,
        }
    }
}

/// Run the capture loop until an utterance closes or the conversation is
/// cancelled.
///
/// `Ok(None)` means the stop signal fired: any partially recorded buffer is
/// discarded. A dead frame source surfaces as a capture error; the caller
/// aborts the current utterance and decides whether to keep going.
pub fn capture_utterance(
    source: &mut dyn FrameSource,
    vad: &EnergyVad,
    config: &SegmenterConfig,
    cancel: &AtomicBool,
) -> VoiceResult<Option<Utterance>> {
    let mut segmenter = UtteranceSegmenter::new(config.clone());

    loop {
        if cancel.load(Ordering::Relaxed) {
            if segmenter.buffered_frames() > 0 {
                debug!(
                    frames = segmenter.buffered_frames(),
                    "cancelled mid-recording, discarding partial utterance"
                );
            }
            return Ok(None);
        }

        let frame = match source.poll_frame(FRAME_POLL_TIMEOUT)? {
            Some(frame) => frame,
            None => continue,
        };

        let is_speech = vad.is_speech(&frame);
        if let Some(utterance) = segmenter.push_frame(frame, is_speech) {
            return Ok(Some(utterance));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vad::VadConfig;
    use std::collections::VecDeque;
    use std::sync::atomic::AtomicBool;
    use std::sync::Arc;

    fn silent_frame(config: &SegmenterConfig) -> AudioFrame {
        AudioFrame::new(vec![0i16; config.chunk_size])
    }

    fn speech_frame(config: &SegmenterConfig) -> AudioFrame {
        AudioFrame::new(vec![3000i16; config.chunk_size])
    }

    /// Frame source backed by a scripted frame list. Flips the shared cancel
    /// flag once the script runs out, so capture loops terminate.
    struct ScriptedSource {
        frames: VecDeque<AudioFrame>,
        sample_rate: u32,
        chunk_size: usize,
        cancel: Arc<AtomicBool>,
    }

    impl ScriptedSource {
        fn new(frames: Vec<AudioFrame>, cancel: Arc<AtomicBool>) -> Self {
            Self {
                frames: frames.into(),
                sample_rate: 16_000,
                chunk_size: 1024,
                cancel,
            }
        }
    }

    impl FrameSource for ScriptedSource {
        fn poll_frame(&mut self, _timeout: Duration) -> VoiceResult<Option<AudioFrame>> {
            match self.frames.pop_front() {
                Some(frame) => Ok(Some(frame)),
                None => {
                    self.cancel.store(true, Ordering::Relaxed);
                    Ok(None)
                }
            }
        }

        fn drain(&mut self) {}

        fn sample_rate(&self) -> u32 {
            self.sample_rate
        }

        fn chunk_size(&self) -> usize {
            self.chunk_size
        }
    }

    #[test]
    fn default_timeout_is_just_over_31_frames() {
        let config = SegmenterConfig::default();
        // 2s * 16000Hz / 1024 samples = 31.25 -> counter must exceed 31
        assert_eq!(config.max_silent_frames(), 31);
    }

    #[test]
    fn silence_only_never_produces_an_utterance() {
        let config = SegmenterConfig::default();
        let mut segmenter = UtteranceSegmenter::new(config.clone());

        for _ in 0..200 {
            assert!(segmenter.push_frame(silent_frame(&config), false).is_none());
        }
        assert_eq!(segmenter.state(), SegmenterState::Idle);
        assert_eq!(segmenter.buffered_frames(), 0);
    }

    #[test]
    fn speech_then_silence_closes_one_utterance() {
        let config = SegmenterConfig::default();
        let limit = config.max_silent_frames();
        let mut segmenter = UtteranceSegmenter::new(config.clone());

        for _ in 0..5 {
            assert!(segmenter.push_frame(speech_frame(&config), true).is_none());
        }
        // Exactly `limit` silent frames keep recording; the next one closes.
        for _ in 0..limit {
            assert!(segmenter.push_frame(silent_frame(&config), false).is_none());
        }
        let utterance = segmenter
            .push_frame(silent_frame(&config), false)
            .expect("utterance should close on timeout");

        // Every frame from the first speech frame through the trigger frame.
        assert_eq!(utterance.frame_count(), 5 + limit + 1);
        assert!(utterance.frame_count() >= limit + 1);
        assert!(utterance.had_speech);
        assert_eq!(segmenter.state(), SegmenterState::Idle);
        assert_eq!(segmenter.buffered_frames(), 0);
    }

    #[test]
    fn speech_resumption_resets_the_silent_run() {
        let config = SegmenterConfig::default();
        let limit = config.max_silent_frames();
        let mut segmenter = UtteranceSegmenter::new(config.clone());

        segmenter.push_frame(speech_frame(&config), true);
        for _ in 0..limit {
            assert!(segmenter.push_frame(silent_frame(&config), false).is_none());
        }
        // Resumed speech: the counter starts over.
        assert!(segmenter.push_frame(speech_frame(&config), true).is_none());
        for _ in 0..limit {
            assert!(segmenter.push_frame(silent_frame(&config), false).is_none());
        }
        let utterance = segmenter
            .push_frame(silent_frame(&config), false)
            .expect("second silent run should close the utterance");
        assert_eq!(utterance.frame_count(), 1 + limit + 1 + limit + 1);
    }

    #[test]
    fn utterance_concatenates_samples_in_order() {
        let config = SegmenterConfig {
            silence_duration: Duration::from_secs(0),
            sample_rate: 16_000,
            chunk_size: 4,
        };
        let mut segmenter = UtteranceSegmenter::new(config);
        segmenter.push_frame(AudioFrame::new(vec![1, 2, 3, 4]), true);
        let utterance = segmenter
            .push_frame(AudioFrame::new(vec![0, 0, 0, 0]), false)
            .expect("zero silence duration closes immediately");
        assert_eq!(utterance.samples(), vec![1, 2, 3, 4, 0, 0, 0, 0]);
    }

    #[test]
    fn capture_of_silent_stream_yields_no_utterance() {
        let config = SegmenterConfig::default();
        let cancel = Arc::new(AtomicBool::new(false));
        // ~3 seconds of silence at the default frame size.
        let frames: Vec<AudioFrame> = (0..47).map(|_| silent_frame(&config)).collect();
        let mut source = ScriptedSource::new(frames, Arc::clone(&cancel));
        let vad = EnergyVad::new(VadConfig::default());

        let result = capture_utterance(&mut source, &vad, &config, &cancel).unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn cancellation_mid_recording_discards_the_buffer() {
        let config = SegmenterConfig::default();
        let cancel = Arc::new(AtomicBool::new(false));
        // Speech starts but the script ends before any silence timeout.
        let frames: Vec<AudioFrame> = (0..10).map(|_| speech_frame(&config)).collect();
        let mut source = ScriptedSource::new(frames, Arc::clone(&cancel));
        let vad = EnergyVad::new(VadConfig::default());

        let result = capture_utterance(&mut source, &vad, &config, &cancel).unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn capture_returns_a_complete_utterance() {
        let config = SegmenterConfig::default();
        let limit = config.max_silent_frames();
        let cancel = Arc::new(AtomicBool::new(false));

        let mut frames: Vec<AudioFrame> = (0..8).map(|_| speech_frame(&config)).collect();
        frames.extend((0..limit + 1).map(|_| silent_frame(&config)));
        let mut source = ScriptedSource::new(frames, Arc::clone(&cancel));
        let vad = EnergyVad::new(VadConfig::default());

        let utterance = capture_utterance(&mut source, &vad, &config, &cancel)
            .unwrap()
            .expect("utterance should be committed");
        assert_eq!(utterance.frame_count(), 8 + limit + 1);
    }
}
