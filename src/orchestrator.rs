//! Conversation orchestrator — the turn-taking state machine
//!
//! Drives one full cycle per turn: listen → transcribe → generate → speak →
//! pause, interpreting in-band voice commands and recording completed turns.
//! Only setup errors terminate the run; every per-turn failure is converted
//! into a skipped turn so a bad network call or misheard phrase never kills
//! an open-ended conversation.

use crate::audio::FrameSource;
use crate::error::{ResponseError, VoiceError, VoiceResult};
use crate::history::{ConversationHistory, ConversationTurn};
use crate::response::ResponseClient;
use crate::segmenter::{capture_utterance, SegmenterConfig};
use crate::stt::{transcribe_utterance, Transcriber};
use crate::synth::SpeechSynthesizer;
use crate::vad::{EnergyVad, VadConfig};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Configuration for a conversation run
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    pub vad: VadConfig,

    pub segmenter: SegmenterConfig,

    /// Inter-turn delay, giving the capture device a clean restart boundary
    /// (default: 1 second)
    pub idle_pause: Duration,

    /// Whether replies are spoken aloud at startup; mutable at runtime through
    /// the "mute voice" / "enable voice" commands
    pub voice_responses: bool,

    /// Spoken once before the first turn, when voice responses are enabled
    pub greeting: Option<String>,

    /// Spoken on shutdown, when voice responses are enabled
    pub farewell: Option<String>,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            vad: VadConfig::default(),
            segmenter: SegmenterConfig::default(),
            idle_pause: Duration::from_secs(1),
            voice_responses: true,
            greeting: Some(
                "Hello! I'm your voice assistant. What would you like to talk about?".to_string(),
            ),
            farewell: Some("Goodbye! It was nice talking with you.".to_string()),
        }
    }
}

/// Where the orchestrator currently is in the turn cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConversationState {
    Listening,
    Transcribing,
    GeneratingResponse,
    Speaking,
    IdlePause,
    Stopped,
}

/// How a single turn ended. Anything but `Completed` leaves the history
/// untouched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurnOutcome {
    /// A reply was generated (and spoken, if enabled) and recorded.
    Completed,
    /// Capture failed or yielded nothing usable.
    NoSpeech,
    /// Transcription failed or was too short to act on.
    EmptyTranscript,
    /// The reasoning service returned a typed failure; surfaced, then skipped.
    ResponseFailed(ResponseError),
    /// The stop signal fired during the turn.
    Cancelled,
}

/// The turn-taking state machine. Owns the frame source, the external
/// service clients, and the conversation history for its whole lifetime.
pub struct ConversationOrchestrator {
    config: OrchestratorConfig,
    source: Box<dyn FrameSource>,
    vad: EnergyVad,
    transcriber: Box<dyn Transcriber>,
    responder: Box<dyn ResponseClient>,
    synthesizer: Box<dyn SpeechSynthesizer>,
    history: ConversationHistory,
    voice_responses_enabled: bool,
    cancel: Arc<AtomicBool>,
    state: ConversationState,
}

impl ConversationOrchestrator {
    /// Wire up a conversation. The segmenter's frame geometry must match the
    /// source's, otherwise the silence timeout would be computed for the
    /// wrong frame duration.
    pub fn new(
        config: OrchestratorConfig,
        source: Box<dyn FrameSource>,
        transcriber: Box<dyn Transcriber>,
        responder: Box<dyn ResponseClient>,
        synthesizer: Box<dyn SpeechSynthesizer>,
    ) -> VoiceResult<Self> {
        if config.segmenter.sample_rate != source.sample_rate()
            || config.segmenter.chunk_size != source.chunk_size()
        {
            return Err(VoiceError::Config(format!(
                "segmenter geometry ({} Hz / {} samples) must match the frame source ({} Hz / {} samples)",
                config.segmenter.sample_rate,
                config.segmenter.chunk_size,
                source.sample_rate(),
                source.chunk_size(),
            )));
        }

        let vad = EnergyVad::new(config.vad.clone());
        let voice_responses_enabled = config.voice_responses;

        Ok(Self {
            config,
            source,
            vad,
            transcriber,
            responder,
            synthesizer,
            history: ConversationHistory::new(),
            voice_responses_enabled,
            cancel: Arc::new(AtomicBool::new(false)),
            state: ConversationState::Listening,
        })
    }

    /// Shared stop signal. Setting it unwinds the run to `Stopped` from any
    /// state.
    pub fn cancel_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancel)
    }

    /// Use an externally owned stop signal (e.g. one wired to a Ctrl+C
    /// handler, or shared with a test's scripted frame source).
    pub fn with_cancel_handle(mut self, cancel: Arc<AtomicBool>) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn state(&self) -> ConversationState {
        self.state
    }

    pub fn history(&self) -> &ConversationHistory {
        &self.history
    }

    pub fn voice_responses_enabled(&self) -> bool {
        self.voice_responses_enabled
    }

    /// Run turns until the stop signal fires, then speak the farewell and
    /// emit the conversation summary. The capture device is released when the
    /// orchestrator (and its frame source) is dropped.
    pub fn run(&mut self) -> VoiceResult<()> {
        info!("conversation started");

        if self.voice_responses_enabled {
            if let Some(greeting) = self.config.greeting.clone() {
                self.speak_checked(&greeting);
            }
        }

        loop {
            if self.cancelled() {
                break;
            }

            let outcome = self.run_turn();
            debug!(?outcome, "turn finished");
            if outcome == TurnOutcome::Cancelled {
                break;
            }

            if self.cancelled() {
                break;
            }
            self.state = ConversationState::IdlePause;
            std::thread::sleep(self.config.idle_pause);
        }

        self.shutdown();
        Ok(())
    }

    /// Advance exactly one turn of the conversation.
    pub fn run_turn(&mut self) -> TurnOutcome {
        self.state = ConversationState::Listening;
        info!("listening");
        self.source.drain();

        let utterance = match capture_utterance(
            self.source.as_mut(),
            &self.vad,
            &self.config.segmenter,
            &self.cancel,
        ) {
            Ok(Some(utterance)) => utterance,
            Ok(None) => {
                info!("no speech detected");
                return TurnOutcome::Cancelled;
            }
            Err(e) => {
                warn!(error = %e, "capture failed, aborting this utterance");
                return TurnOutcome::NoSpeech;
            }
        };

        self.state = ConversationState::Transcribing;
        let sample_rate = self.config.segmenter.sample_rate;
        let transcript = transcribe_utterance(self.transcriber.as_ref(), &utterance, sample_rate);
        if transcript.is_empty {
            info!("no clear speech detected");
            return TurnOutcome::EmptyTranscript;
        }
        let user_text = transcript.text;
        info!(user = %user_text, "transcribed");

        self.state = ConversationState::GeneratingResponse;
        let outcome = match self.responder.generate(&user_text) {
            Ok(reply) => {
                info!(chars = reply.len(), "response generated");
                if self.voice_responses_enabled {
                    self.state = ConversationState::Speaking;
                    if let Err(e) = self.synthesizer.speak(&reply) {
                        warn!(error = %e, "synthesis failed, keeping the text reply");
                    }
                }
                self.history
                    .push(ConversationTurn::new(user_text.clone(), reply));
                TurnOutcome::Completed
            }
            Err(e) => {
                warn!(error = %e, "response generation failed, turn skipped");
                TurnOutcome::ResponseFailed(e)
            }
        };

        // Commands apply to every successfully transcribed turn, whether or
        // not a reply came back.
        self.apply_voice_commands(&user_text);
        outcome
    }

    /// Case-insensitive substring match for the spoken control phrases.
    fn apply_voice_commands(&mut self, user_text: &str) {
        let lowered = user_text.to_lowercase();
        if lowered.contains("mute voice") || lowered.contains("disable voice") {
            self.voice_responses_enabled = false;
            info!("voice responses disabled, replying with text only");
        } else if lowered.contains("enable voice") || lowered.contains("unmute voice") {
            self.voice_responses_enabled = true;
            info!("voice responses enabled");
            self.speak_checked("Voice responses are now enabled again.");
        }
    }

    fn speak_checked(&mut self, text: &str) {
        if let Err(e) = self.synthesizer.speak(text) {
            warn!(error = %e, "synthesis failed");
        }
    }

    fn cancelled(&self) -> bool {
        self.cancel.load(Ordering::Relaxed)
    }

    fn shutdown(&mut self) {
        self.state = ConversationState::Stopped;
        self.synthesizer.stop();

        if self.voice_responses_enabled {
            if let Some(farewell) = self.config.farewell.clone() {
                self.speak_checked(&farewell);
            }
        }

        info!("{}", self.history.summary());
        info!(turns = self.history.len(), "conversation ended");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn geometry_mismatch_is_a_setup_error() {
        use crate::audio::AudioFrame;

        struct TinySource;
        impl FrameSource for TinySource {
            fn poll_frame(&mut self, _: Duration) -> VoiceResult<Option<AudioFrame>> {
                Ok(None)
            }
            fn drain(&mut self) {}
            fn sample_rate(&self) -> u32 {
                8_000
            }
            fn chunk_size(&self) -> usize {
                512
            }
        }

        struct NoopTranscriber;
        impl Transcriber for NoopTranscriber {
            fn transcribe(&self, _: &[f32], _: u32) -> VoiceResult<String> {
                Ok(String::new())
            }
        }

        struct NoopResponder;
        impl ResponseClient for NoopResponder {
            fn generate(&self, _: &str) -> Result<String, ResponseError> {
                Ok(String::new())
            }
        }

        struct NoopSynth;
        impl SpeechSynthesizer for NoopSynth {
            fn speak(&mut self, _: &str) -> VoiceResult<()> {
                Ok(())
            }
            fn stop(&mut self) {}
            fn set_voice(&mut self, _: &str) {}
            fn set_rate(&mut self, _: f32) {}
        }

        let result = ConversationOrchestrator::new(
            OrchestratorConfig::default(),
            Box::new(TinySource),
            Box::new(NoopTranscriber),
            Box::new(NoopResponder),
            Box::new(NoopSynth),
        );
        assert!(matches!(result, Err(VoiceError::Config(_))));
    }
}
