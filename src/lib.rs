//! # voiceloop — turn-based spoken conversation pipeline
//!
//! Turns a live microphone stream into a turn-based conversation with a
//! remote reasoning service: listen, decide when an utterance starts and
//! ends, transcribe it, fetch a reply, speak it back.
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────────┐
//! │                  Conversation Orchestrator                     │
//! │  ┌───────────┐   ┌────────────┐   ┌──────────────────────┐   │
//! │  │  Mic In   │ → │ Energy VAD │ → │ Utterance Segmenter  │   │
//! │  │  (cpal)   │   │ (mean amp) │   │ (2s silence timeout) │   │
//! │  └───────────┘   └────────────┘   └──────────┬───────────┘   │
//! │                                              ↓                │
//! │  ┌───────────┐   ┌────────────┐   ┌──────────────────────┐   │
//! │  │ Audio Out │ ← │    TTS     │ ← │  STT → LLM response  │   │
//! │  │  (rodio)  │   │  (HTTP)    │   │  (whisper/OpenRouter)│   │
//! │  └───────────┘   └────────────┘   └──────────────────────┘   │
//! └────────────────────────────────────────────────────────────────┘
//! ```
//!
//! One turn runs fully before the next starts; all external calls are
//! blocking from the orchestrator's point of view. Spoken in-band commands
//! ("mute voice", "enable voice") toggle whether replies are played aloud.

pub mod audio;
pub mod error;
pub mod history;
pub mod orchestrator;
pub mod response;
pub mod segmenter;
pub mod stt;
pub mod synth;
pub mod vad;

pub use audio::{AudioConfig, AudioFrame, CpalFrameSource, FrameSource};
pub use error::{ResponseError, VoiceError, VoiceResult};
pub use history::{ConversationHistory, ConversationTurn};
pub use orchestrator::{
    ConversationOrchestrator, ConversationState, OrchestratorConfig, TurnOutcome,
};
pub use response::{OpenRouterClient, ResponseClient, ResponseConfig};
pub use segmenter::{
    capture_utterance, SegmenterConfig, SegmenterState, Utterance, UtteranceSegmenter,
};
pub use stt::{
    transcribe_utterance, utterance_waveform, HttpTranscriber, PlaceholderTranscriber,
    TranscriptionResult, Transcriber, MIN_TRANSCRIPT_CHARS,
};
#[cfg(feature = "whisper")]
pub use stt::WhisperTranscriber;
pub use synth::{
    HttpSynthesisBackend, NullSynthesis, Speaker, SpeechSynthesizer, SynthesisBackend,
    VoicePlayback,
};
pub use vad::{EnergyVad, VadConfig};
