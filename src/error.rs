//! Error types for the voice conversation pipeline

use thiserror::Error;

/// Result type alias for pipeline operations
pub type VoiceResult<T> = Result<T, VoiceError>;

/// Errors that can occur in the voice conversation pipeline.
///
/// Only `AudioDevice`, `AudioStream` and `Config` are fatal (setup errors);
/// everything else is caught at the turn boundary and converted into a
/// skipped turn by the orchestrator.
#[derive(Error, Debug)]
pub enum VoiceError {
    #[error("audio device error: {0}")]
    AudioDevice(String),

    #[error("audio stream error: {0}")]
    AudioStream(String),

    #[error("audio capture error: {0}")]
    Capture(String),

    #[error("audio playback error: {0}")]
    Playback(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("transcription error: {0}")]
    Transcription(String),

    #[error("speech synthesis error: {0}")]
    Synthesis(String),

    #[error("response error: {0}")]
    Response(#[from] ResponseError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Typed failures from the remote reasoning service.
///
/// A `ResponseError` never terminates the conversation; the orchestrator
/// surfaces it and moves on to the next turn.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ResponseError {
    #[error("invalid API key (401)")]
    Unauthorized,

    #[error("rate limit exceeded (429)")]
    RateLimited,

    #[error("request timed out")]
    Timeout,

    #[error("connection error: {0}")]
    Connection(String),

    #[error("API error {status}: {body}")]
    Api { status: u16, body: String },
}

impl From<cpal::DevicesError> for VoiceError {
    fn from(err: cpal::DevicesError) -> Self {
        VoiceError::AudioDevice(err.to_string())
    }
}

impl From<cpal::DefaultStreamConfigError> for VoiceError {
    fn from(err: cpal::DefaultStreamConfigError) -> Self {
        VoiceError::AudioDevice(err.to_string())
    }
}

impl From<cpal::BuildStreamError> for VoiceError {
    fn from(err: cpal::BuildStreamError) -> Self {
        VoiceError::AudioStream(err.to_string())
    }
}

impl From<cpal::PlayStreamError> for VoiceError {
    fn from(err: cpal::PlayStreamError) -> Self {
        VoiceError::AudioStream(err.to_string())
    }
}
