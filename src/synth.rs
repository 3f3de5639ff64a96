//! Speech synthesis and playback of spoken replies
//!
//! A `SynthesisBackend` turns text into audio bytes; `VoicePlayback` owns the
//! rodio sink that plays them. `Speaker` combines the two behind the
//! `SpeechSynthesizer` trait the orchestrator talks to: blocking `speak`,
//! `stop` for cancelling in-flight playback, and voice/rate parameters that
//! apply to subsequent calls only.

use crate::error::{VoiceError, VoiceResult};
use rodio::{OutputStream, OutputStreamHandle, Sink, Source};
use std::io::Cursor;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Backend turning text into playable audio bytes (WAV/MP3).
pub trait SynthesisBackend: Send {
    /// Synthesize text to audio bytes. Empty output means nothing to play.
    fn synthesize(&self, text: &str) -> VoiceResult<Vec<u8>>;

    /// Change the voice for subsequent synthesis calls.
    fn set_voice(&mut self, _voice: &str) {}

    /// Change the speaking-rate multiplier for subsequent synthesis calls.
    fn set_rate(&mut self, _rate: f32) {}
}

/// Placeholder backend: synthesizes nothing, so no audio plays.
#[derive(Debug, Default)]
pub struct NullSynthesis;

impl SynthesisBackend for NullSynthesis {
    fn synthesize(&self, _text: &str) -> VoiceResult<Vec<u8>> {
        Ok(Vec::new())
    }
}

/// Remote synthesis over an OpenAI-compatible `/audio/speech` endpoint.
#[derive(Debug)]
pub struct HttpSynthesisBackend {
    /// Base URL without trailing slash
    pub base_url: String,
    /// TTS model, e.g. tts-1
    pub model: String,
    voice: String,
    rate: f32,
    api_key: String,
    client: reqwest::blocking::Client,
}

impl HttpSynthesisBackend {
    /// Build from environment: `TTS_API_URL`, `TTS_API_KEY` (or
    /// `OPENROUTER_API_KEY`), `TTS_MODEL`, `TTS_VOICE`.
    pub fn from_env() -> VoiceResult<Self> {
        dotenvy::dotenv().ok();
        let base_url = std::env::var("TTS_API_URL")
            .unwrap_or_else(|_| "https://api.openai.com/v1".to_string());
        let api_key = std::env::var("TTS_API_KEY")
            .or_else(|_| std::env::var("OPENROUTER_API_KEY"))
            .map_err(|_| {
                VoiceError::Config("synthesis requires TTS_API_KEY or OPENROUTER_API_KEY".to_string())
            })?;
        let model = std::env::var("TTS_MODEL").unwrap_or_else(|_| "tts-1".to_string());
        let voice = std::env::var("TTS_VOICE").unwrap_or_else(|_| "alloy".to_string());
        Self::new(base_url, api_key, model, voice)
    }

    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
        voice: impl Into<String>,
    ) -> VoiceResult<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(std::time::Duration::from_secs(60))
            .build()
            .map_err(|e| VoiceError::Synthesis(e.to_string()))?;
        Ok(Self {
            base_url: base_url.into(),
            model: model.into(),
            voice: voice.into(),
            rate: 1.0,
            api_key: api_key.into(),
            client,
        })
    }

    pub fn voice(&self) -> &str {
        &self.voice
    }

    pub fn rate(&self) -> f32 {
        self.rate
    }

    fn request_body(&self, text: &str) -> serde_json::Value {
        serde_json::json!({
            "model": self.model,
            "input": text,
            "voice": self.voice,
            "speed": self.rate,
        })
    }
}

impl SynthesisBackend for HttpSynthesisBackend {
    fn synthesize(&self, text: &str) -> VoiceResult<Vec<u8>> {
        let text = text.trim();
        if text.is_empty() {
            return Ok(Vec::new());
        }
        let url = format!("{}/audio/speech", self.base_url.trim_end_matches('/'));
        let res = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&self.request_body(text))
            .send()
            .map_err(|e| VoiceError::Synthesis(e.to_string()))?;
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().unwrap_or_default();
            return Err(VoiceError::Synthesis(format!(
                "TTS API error {}: {}",
                status, body
            )));
        }
        let bytes = res.bytes().map_err(|e| VoiceError::Synthesis(e.to_string()))?;
        Ok(bytes.to_vec())
    }

    fn set_voice(&mut self, voice: &str) {
        info!(voice, "synthesis voice changed");
        self.voice = voice.to_string();
    }

    fn set_rate(&mut self, rate: f32) {
        info!(rate, "synthesis rate changed");
        self.rate = rate;
    }
}

/// Playback of synthesized audio on the default output device.
pub struct VoicePlayback {
    _stream: OutputStream,
    _stream_handle: OutputStreamHandle,
    sink: Arc<Sink>,
}

impl VoicePlayback {
    pub fn new() -> VoiceResult<Self> {
        let (stream, stream_handle) = OutputStream::try_default()
            .map_err(|e| VoiceError::Playback(e.to_string()))?;
        let sink = Sink::try_new(&stream_handle)
            .map_err(|e| VoiceError::Playback(e.to_string()))?;
        debug!("playback sink ready");
        Ok(Self {
            _stream: stream,
            _stream_handle: stream_handle,
            sink: Arc::new(sink),
        })
    }

    /// Queue decoded audio bytes (WAV/MP3) for playback.
    pub fn play_bytes(&self, bytes: &[u8]) -> VoiceResult<()> {
        if bytes.is_empty() {
            return Ok(());
        }
        let cursor = Cursor::new(bytes.to_vec());
        let source = rodio::Decoder::new(cursor)
            .map_err(|e| VoiceError::Playback(format!("decode failed: {}", e)))?;
        self.sink.append(source.convert_samples::<f32>());
        Ok(())
    }

    /// Stop playback immediately and clear the queue.
    pub fn stop(&self) {
        self.sink.stop();
    }

    pub fn is_playing(&self) -> bool {
        !self.sink.empty()
    }

    /// Block until all queued audio has finished.
    pub fn wait_until_done(&self) {
        self.sink.sleep_until_end();
    }
}

/// The orchestrator-facing synthesis surface. `speak` blocks until playback
/// completes; a failure is recoverable (the text reply still counts).
pub trait SpeechSynthesizer {
    fn speak(&mut self, text: &str) -> VoiceResult<()>;

    /// Cancel in-flight playback.
    fn stop(&mut self);

    fn set_voice(&mut self, voice: &str);

    fn set_rate(&mut self, rate: f32);
}

/// Synthesis backend plus output device.
pub struct Speaker {
    backend: Box<dyn SynthesisBackend>,
    playback: VoicePlayback,
}

impl Speaker {
    /// Open the default output device for the given backend.
    pub fn new(backend: Box<dyn SynthesisBackend>) -> VoiceResult<Self> {
        Ok(Self {
            backend,
            playback: VoicePlayback::new()?,
        })
    }

    /// Queue the synthesized reply without waiting for playback to finish.
    /// The primary conversation loop never uses this; it is for callers that
    /// want fire-and-forget speech.
    pub fn speak_detached(&self, text: &str) -> VoiceResult<()> {
        let bytes = self.backend.synthesize(text)?;
        self.playback.play_bytes(&bytes)
    }
}

impl SpeechSynthesizer for Speaker {
    fn speak(&mut self, text: &str) -> VoiceResult<()> {
        let text = text.trim();
        if text.is_empty() {
            return Ok(());
        }
        debug!(chars = text.len(), "speaking reply");
        let bytes = self.backend.synthesize(text)?;
        if bytes.is_empty() {
            warn!("synthesis produced no audio");
            return Ok(());
        }
        self.playback.play_bytes(&bytes)?;
        self.playback.wait_until_done();
        Ok(())
    }

    fn stop(&mut self) {
        self.playback.stop();
        info!("playback stopped");
    }

    fn set_voice(&mut self, voice: &str) {
        self.backend.set_voice(voice);
    }

    fn set_rate(&mut self, rate: f32) {
        self.backend.set_rate(rate);
    }
}
