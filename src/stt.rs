//! Transcription step — utterance PCM to text
//!
//! Implement `Transcriber` for a local Whisper build or a remote
//! OpenAI-compatible transcription API. `transcribe_utterance` is the
//! turn-boundary wrapper: backend failures are logged and converted into an
//! empty result so a bad transcription never kills the conversation.

use crate::error::{VoiceError, VoiceResult};
use crate::segmenter::Utterance;
use tracing::{debug, warn};

/// Trimmed transcripts at or below this many characters are treated as
/// "no clear speech" and the turn is discarded.
pub const MIN_TRANSCRIPT_CHARS: usize = 2;

/// Outcome of transcribing one utterance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranscriptionResult {
    /// Trimmed transcript text
    pub text: String,
    /// True when the transcript is too short to act on
    pub is_empty: bool,
}

impl TranscriptionResult {
    /// Trim raw backend output and apply the minimum-length guard.
    pub fn from_raw(raw: &str) -> Self {
        let text = raw.trim().to_string();
        let is_empty = text.chars().count() <= MIN_TRANSCRIPT_CHARS;
        Self { text, is_empty }
    }

    /// The result used when transcription failed outright.
    pub fn empty() -> Self {
        Self {
            text: String::new(),
            is_empty: true,
        }
    }
}

/// Backend converting a normalized waveform to text. May be slow (model
/// inference); must not require writing audio to disk.
pub trait Transcriber: Send {
    /// Transcribe mono f32 samples in [-1.0, 1.0) at `sample_rate` Hz.
    fn transcribe(&self, waveform: &[f32], sample_rate: u32) -> VoiceResult<String>;
}

/// Convert an utterance's raw i16 samples to the normalized f32 waveform the
/// transcription backends expect.
pub fn utterance_waveform(utterance: &Utterance) -> Vec<f32> {
    utterance
        .samples()
        .iter()
        .map(|&s| s as f32 / 32768.0)
        .collect()
}

/// Transcribe a closed utterance, absorbing backend failures.
///
/// A backend error is recoverable: it is logged and reported as an empty
/// result, which the orchestrator treats as "no clear speech" for the turn.
pub fn transcribe_utterance(
    backend: &dyn Transcriber,
    utterance: &Utterance,
    sample_rate: u32,
) -> TranscriptionResult {
    let waveform = utterance_waveform(utterance);
    debug!(samples = waveform.len(), "transcribing utterance");

    match backend.transcribe(&waveform, sample_rate) {
        Ok(raw) => {
            let result = TranscriptionResult::from_raw(&raw);
            debug!(text = %result.text, empty = result.is_empty, "transcription complete");
            result
        }
        Err(e) => {
            warn!(error = %e, "transcription failed, treating as no speech");
            TranscriptionResult::empty()
        }
    }
}

/// Encode a normalized f32 waveform as 16-bit mono WAV bytes for API upload.
fn waveform_to_wav(waveform: &[f32], sample_rate: u32) -> Vec<u8> {
    let data_len = (waveform.len() * 2) as u32;
    let mut buf = Vec::with_capacity(44 + data_len as usize);

    buf.extend_from_slice(b"RIFF");
    buf.extend_from_slice(&(36 + data_len).to_le_bytes());
    buf.extend_from_slice(b"WAVE");
    buf.extend_from_slice(b"fmt ");
    buf.extend_from_slice(&16u32.to_le_bytes());
    buf.extend_from_slice(&1u16.to_le_bytes()); // PCM
    buf.extend_from_slice(&1u16.to_le_bytes()); // mono
    buf.extend_from_slice(&sample_rate.to_le_bytes());
    buf.extend_from_slice(&(sample_rate * 2).to_le_bytes()); // byte rate
    buf.extend_from_slice(&2u16.to_le_bytes()); // block align
    buf.extend_from_slice(&16u16.to_le_bytes()); // bits per sample
    buf.extend_from_slice(b"data");
    buf.extend_from_slice(&data_len.to_le_bytes());
    for &s in waveform {
        let i = (s.clamp(-1.0, 1.0) * 32767.0).round() as i16;
        buf.extend_from_slice(&i.to_le_bytes());
    }
    buf
}

/// Placeholder transcriber: returns a fixed string. Lets the pipeline run
/// end-to-end without a Whisper build or API key.
#[derive(Debug, Default)]
pub struct PlaceholderTranscriber {
    /// If set, returned instead of the default message.
    pub response: Option<String>,
}

impl PlaceholderTranscriber {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_response(response: impl Into<String>) -> Self {
        Self {
            response: Some(response.into()),
        }
    }
}

impl Transcriber for PlaceholderTranscriber {
    fn transcribe(&self, waveform: &[f32], _sample_rate: u32) -> VoiceResult<String> {
        if let Some(ref r) = self.response {
            return Ok(r.clone());
        }
        Ok(format!(
            "[transcription placeholder: {} samples — connect Whisper or an STT API]",
            waveform.len()
        ))
    }
}

/// Remote transcription over an OpenAI-compatible `/audio/transcriptions`
/// endpoint (OpenAI Whisper, OpenRouter, etc.). Audio is uploaded from memory
/// as WAV; nothing touches the filesystem.
#[derive(Debug)]
pub struct HttpTranscriber {
    /// Base URL without trailing slash (e.g. https://api.openai.com/v1)
    pub base_url: String,
    /// Model identifier, e.g. whisper-1
    pub model: String,
    api_key: String,
    client: reqwest::blocking::Client,
}

impl HttpTranscriber {
    /// Build from environment: `STT_API_URL`, `STT_API_KEY` (or
    /// `OPENROUTER_API_KEY`), `STT_MODEL`. Missing key is a setup error.
    pub fn from_env() -> VoiceResult<Self> {
        dotenvy::dotenv().ok();
        let base_url = std::env::var("STT_API_URL")
            .unwrap_or_else(|_| "https://api.openai.com/v1".to_string());
        let api_key = std::env::var("STT_API_KEY")
            .or_else(|_| std::env::var("OPENROUTER_API_KEY"))
            .map_err(|_| {
                VoiceError::Config("transcription requires STT_API_KEY or OPENROUTER_API_KEY".to_string())
            })?;
        let model = std::env::var("STT_MODEL").unwrap_or_else(|_| "whisper-1".to_string());
        Self::new(base_url, api_key, model)
    }

    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
    ) -> VoiceResult<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .map_err(|e| VoiceError::Transcription(e.to_string()))?;
        Ok(Self {
            base_url: base_url.into(),
            api_key: api_key.into(),
            model: model.into(),
            client,
        })
    }
}

impl Transcriber for HttpTranscriber {
    fn transcribe(&self, waveform: &[f32], sample_rate: u32) -> VoiceResult<String> {
        if waveform.is_empty() {
            return Ok(String::new());
        }
        let wav = waveform_to_wav(waveform, sample_rate);
        let url = format!("{}/audio/transcriptions", self.base_url.trim_end_matches('/'));
        let part = reqwest::blocking::multipart::Part::bytes(wav)
            .file_name("utterance.wav")
            .mime_str("audio/wav")
            .map_err(|e| VoiceError::Transcription(e.to_string()))?;
        let form = reqwest::blocking::multipart::Form::new()
            .part("file", part)
            .text("model", self.model.clone());

        let res = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .multipart(form)
            .send()
            .map_err(|e| VoiceError::Transcription(e.to_string()))?;
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().unwrap_or_default();
            return Err(VoiceError::Transcription(format!(
                "STT API error {}: {}",
                status, body
            )));
        }
        let json: serde_json::Value = res
            .json()
            .map_err(|e| VoiceError::Transcription(e.to_string()))?;
        Ok(json
            .get("text")
            .and_then(|t| t.as_str())
            .unwrap_or("")
            .to_string())
    }
}

// -----------------------------------------------------------------------------
// Local Whisper transcription (optional feature). Requires whisper.cpp/ggml.
// -----------------------------------------------------------------------------
#[cfg(feature = "whisper")]
mod whisper_backend {
    use super::*;
    use std::sync::Mutex;
    use whisper_rs::{FullParams, SamplingStrategy, WhisperContext, WhisperContextParameters};

    /// On-device Whisper transcription via a ggml quantized model
    /// (e.g. ggml-base.en.bin from ggerganov/whisper.cpp on Hugging Face).
    /// Input must be 16 kHz mono f32.
    pub struct WhisperTranscriber {
        #[allow(dead_code)]
        context: WhisperContext,
        state: Mutex<whisper_rs::WhisperState>,
    }

    impl WhisperTranscriber {
        pub fn new(model_path: &str) -> VoiceResult<Self> {
            let params = WhisperContextParameters::default();
            let context = WhisperContext::new_with_params(model_path, params)
                .map_err(|e| VoiceError::Transcription(format!("whisper load failed: {}", e)))?;
            let state = context
                .create_state()
                .map_err(|e| VoiceError::Transcription(format!("whisper state init failed: {}", e)))?;
            Ok(Self {
                context,
                state: Mutex::new(state),
            })
        }

        /// Build from env: `WHISPER_MODEL_PATH` must point to a .bin model.
        pub fn from_env() -> VoiceResult<Self> {
            dotenvy::dotenv().ok();
            let path = std::env::var("WHISPER_MODEL_PATH")
                .map_err(|_| VoiceError::Config("WHISPER_MODEL_PATH not set".to_string()))?;
            let path = path.trim();
            if path.is_empty() {
                return Err(VoiceError::Config("WHISPER_MODEL_PATH is empty".to_string()));
            }
            Self::new(path)
        }
    }

    impl Transcriber for WhisperTranscriber {
        fn transcribe(&self, waveform: &[f32], sample_rate: u32) -> VoiceResult<String> {
            if waveform.is_empty() {
                return Ok(String::new());
            }
            if sample_rate != 16_000 {
                return Err(VoiceError::Transcription(format!(
                    "whisper expects 16 kHz; got {} Hz",
                    sample_rate
                )));
            }
            let mut params = FullParams::new(SamplingStrategy::Greedy { best_of: 1 });
            params.set_print_progress(false);
            params.set_print_realtime(false);
            params.set_no_timestamps(true);
            params.set_language(Some("en"));

            let mut state = self
                .state
                .lock()
                .map_err(|e| VoiceError::Transcription(format!("whisper lock poisoned: {}", e)))?;
            state
                .full(&params, waveform)
                .map_err(|e| VoiceError::Transcription(format!("whisper inference failed: {}", e)))?;
            let text = state
                .as_iter()
                .filter_map(|seg| seg.to_str().ok())
                .collect::<Vec<_>>()
                .join(" ");
            Ok(text)
        }
    }
}

#[cfg(feature = "whisper")]
pub use whisper_backend::WhisperTranscriber;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::AudioFrame;
    use crate::segmenter::{SegmenterConfig, UtteranceSegmenter};
    use std::time::Duration;

    fn utterance_from(samples: Vec<i16>) -> Utterance {
        let config = SegmenterConfig {
            silence_duration: Duration::from_secs(0),
            sample_rate: 16_000,
            chunk_size: samples.len(),
        };
        let silence = vec![0i16; samples.len()];
        let mut segmenter = UtteranceSegmenter::new(config);
        segmenter.push_frame(AudioFrame::new(samples), true);
        segmenter
            .push_frame(AudioFrame::new(silence), false)
            .expect("zero timeout closes immediately")
    }

    struct FailingTranscriber;

    impl Transcriber for FailingTranscriber {
        fn transcribe(&self, _waveform: &[f32], _sample_rate: u32) -> VoiceResult<String> {
            Err(VoiceError::Transcription("backend exploded".to_string()))
        }
    }

    #[test]
    fn short_transcripts_are_empty() {
        assert!(TranscriptionResult::from_raw("").is_empty);
        assert!(TranscriptionResult::from_raw("  hm ").is_empty);
        assert!(TranscriptionResult::from_raw("ok").is_empty);
        assert!(!TranscriptionResult::from_raw("yes").is_empty);
    }

    #[test]
    fn transcript_is_trimmed() {
        let result = TranscriptionResult::from_raw("  hello there  ");
        assert_eq!(result.text, "hello there");
        assert!(!result.is_empty);
    }

    #[test]
    fn waveform_is_normalized() {
        let utterance = utterance_from(vec![i16::MIN, 0, 16384, i16::MAX]);
        let waveform = utterance_waveform(&utterance);
        assert_eq!(waveform[0], -1.0);
        assert_eq!(waveform[1], 0.0);
        assert_eq!(waveform[2], 0.5);
        assert!(waveform[3] < 1.0);
    }

    #[test]
    fn backend_failure_becomes_empty_result() {
        let utterance = utterance_from(vec![1000i16; 64]);
        let result = transcribe_utterance(&FailingTranscriber, &utterance, 16_000);
        assert!(result.is_empty);
        assert!(result.text.is_empty());
    }

    #[test]
    fn placeholder_uses_fixed_response() {
        let backend = PlaceholderTranscriber::with_response("hello world");
        let utterance = utterance_from(vec![1000i16; 64]);
        let result = transcribe_utterance(&backend, &utterance, 16_000);
        assert_eq!(result.text, "hello world");
        assert!(!result.is_empty);
    }

    #[test]
    fn wav_header_is_well_formed() {
        let wav = waveform_to_wav(&[0.0, 0.5, -0.5, 1.0], 16_000);
        assert_eq!(&wav[0..4], b"RIFF");
        assert_eq!(&wav[8..12], b"WAVE");
        assert_eq!(wav.len(), 44 + 4 * 2);
        // data chunk length field
        assert_eq!(u32::from_le_bytes([wav[40], wav[41], wav[42], wav[43]]), 8);
        // full sample clamps to i16::MAX
        assert_eq!(i16::from_le_bytes([wav[50], wav[51]]), i16::MAX);
    }
}
