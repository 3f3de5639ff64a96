//! Microphone capture using CPAL
//!
//! The capture callback runs on the audio thread and hands fixed-size frames
//! of 16-bit PCM to the conversation thread over a channel. The device is
//! held for the whole conversation and released when the source is dropped.

use crate::error::{VoiceError, VoiceResult};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleRate, Stream, StreamConfig};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Audio capture configuration
#[derive(Debug, Clone)]
pub struct AudioConfig {
    /// Sample rate in Hz (default: 16000, the rate speech models expect)
    pub sample_rate: u32,

    /// Number of channels (default: 1 for mono)
    pub channels: u16,

    /// Frame size in samples (default: 1024, ~64ms at 16kHz)
    pub chunk_size: usize,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            sample_rate: 16_000,
            channels: 1,
            chunk_size: 1024,
        }
    }
}

/// One fixed-size block of signed 16-bit PCM, immutable once captured.
#[derive(Debug, Clone)]
pub struct AudioFrame {
    /// PCM samples (i16, mono)
    pub samples: Vec<i16>,
}

impl AudioFrame {
    pub fn new(samples: Vec<i16>) -> Self {
        Self { samples }
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

/// Produces the infinite frame sequence the segmenter consumes.
///
/// Implemented by `CpalFrameSource` for live capture and by scripted fakes in
/// tests so the orchestrator runs without a microphone.
pub trait FrameSource {
    /// Block up to `timeout` for the next frame.
    ///
    /// `Ok(None)` means the timeout elapsed with no frame (the caller gets a
    /// chance to check for cancellation). An error means the stream has died;
    /// the current utterance is aborted and the turn skipped.
    fn poll_frame(&mut self, timeout: Duration) -> VoiceResult<Option<AudioFrame>>;

    /// Discard frames queued while the pipeline was transcribing or speaking,
    /// so a listening phase starts from live audio.
    fn drain(&mut self);

    fn sample_rate(&self) -> u32;

    fn chunk_size(&self) -> usize;
}

/// Live microphone source. Owns the cpal stream; dropping it releases the
/// capture device.
pub struct CpalFrameSource {
    config: AudioConfig,
    frame_rx: Receiver<AudioFrame>,
    _stream: Stream,
}

impl CpalFrameSource {
    /// Acquire the default input device and start capturing.
    ///
    /// Failure here is a setup error: the conversation never starts without
    /// a working microphone.
    pub fn open(config: AudioConfig) -> VoiceResult<Self> {
        let host = cpal::default_host();
        let device = host
            .default_input_device()
            .ok_or_else(|| VoiceError::AudioDevice("no input device available".to_string()))?;

        info!(
            device = device.name().unwrap_or_else(|_| "unknown".to_string()),
            sample_rate = config.sample_rate,
            chunk_size = config.chunk_size,
            "opening audio capture"
        );

        let stream_config = StreamConfig {
            channels: config.channels,
            sample_rate: SampleRate(config.sample_rate),
            buffer_size: cpal::BufferSize::Default,
        };

        let (frame_tx, frame_rx) = mpsc::channel();
        let stream = build_capture_stream(&device, &stream_config, config.chunk_size, frame_tx)?;
        stream.play()?;

        debug!("audio capture started");

        Ok(Self {
            config,
            frame_rx,
            _stream: stream,
        })
    }

    /// List available input device names.
    pub fn list_input_devices() -> VoiceResult<Vec<String>> {
        let host = cpal::default_host();
        let devices = host.input_devices()?;
        Ok(devices.filter_map(|d| d.name().ok()).collect())
    }
}

fn build_capture_stream(
    device: &cpal::Device,
    stream_config: &StreamConfig,
    chunk_size: usize,
    frame_tx: Sender<AudioFrame>,
) -> VoiceResult<Stream> {
    let mut sample_buffer: Vec<i16> = Vec::with_capacity(chunk_size);

    let stream = device.build_input_stream(
        stream_config,
        move |data: &[i16], _: &cpal::InputCallbackInfo| {
            for &sample in data {
                sample_buffer.push(sample);
                if sample_buffer.len() >= chunk_size {
                    let frame = AudioFrame::new(std::mem::replace(
                        &mut sample_buffer,
                        Vec::with_capacity(chunk_size),
                    ));
                    if frame_tx.send(frame).is_err() {
                        // Receiver gone: conversation has shut down.
                        return;
                    }
                }
            }
        },
        move |err| {
            warn!("audio stream error: {}", err);
        },
        None,
    )?;

    Ok(stream)
}

impl FrameSource for CpalFrameSource {
    fn poll_frame(&mut self, timeout: Duration) -> VoiceResult<Option<AudioFrame>> {
        match self.frame_rx.recv_timeout(timeout) {
            Ok(frame) => Ok(Some(frame)),
            Err(RecvTimeoutError::Timeout) => Ok(None),
            Err(RecvTimeoutError::Disconnected) => {
                Err(VoiceError::Capture("capture stream closed".to_string()))
            }
        }
    }

    fn drain(&mut self) {
        let mut discarded = 0usize;
        while self.frame_rx.try_recv().is_ok() {
            discarded += 1;
        }
        if discarded > 0 {
            debug!(frames = discarded, "drained stale capture frames");
        }
    }

    fn sample_rate(&self) -> u32 {
        self.config.sample_rate
    }

    fn chunk_size(&self) -> usize {
        self.config.chunk_size
    }
}
