/*
 * @file audio.rs
 * @brief Microphone capture and local Whisper transcription for JASP
 * @author Kevin Thomas
 * @date 2025
 *
 * MIT License
 *
 * Copyright (c) 2025 Kevin Thomas
 *
 * Permission is hereby granted, free of charge, to any person obtaining a copy
 * of this software and associated documentation files (the "Software"), to deal
 * in the Software without restriction, including without limitation the rights
 * to use, copy, modify, merge, publish, distribute, sublicense, and/or sell
 * copies of the Software, and to permit persons to whom the Software is
 * furnished to do so, subject to the following conditions:
 *
 * The above copyright notice and this permission notice shall be included in all
 * copies or substantial portions of the Software.
 *
 * THE SOFTWARE IS PROVIDED "AS IS", WITHOUT WARRANTY OF ANY KIND, EXPRESS OR
 * IMPLIED, INCLUDING BUT NOT LIMITED TO THE WARRANTIES OF MERCHANTABILITY,
 * FITNESS FOR A PARTICULAR PURPOSE AND NONINFRINGEMENT. IN NO EVENT SHALL THE
 * AUTHORS OR COPYRIGHT HOLDERS BE LIABLE FOR ANY CLAIM, DAMAGES OR OTHER
 * LIABILITY, WHETHER IN AN ACTION OF CONTRACT, TORT OR OTHERWISE, ARISING FROM,
 * OUT OF OR IN CONNECTION WITH THE SOFTWARE OR THE USE OR OTHER DEALINGS IN THE
 * SOFTWARE.
 */

//! Microphone listener.
//!
//! Records a fixed window from the default input device with CPAL and
//! transcribes it locally with Whisper. Compiled with the `voice` feature.

use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, Stream, StreamConfig, StreamError};
use whisper_rs::{FullParams, SamplingStrategy, WhisperContext, WhisperContextParameters};

use crate::error::{Error, Result};
use crate::listener::{Heard, Listener};

/// Sample rate for audio recording (16kHz), Whisper's native input rate.
const SAMPLE_RATE: u32 = 16000;

/// Number of audio channels (mono).
const CHANNELS: u16 = 1;

/// Amount of time to capture audio for each turn.
const RECORD_DURATION: Duration = Duration::from_secs(5);

/// Minimum RMS amplitude considered speech, on normalized samples.
///
/// Kept low; Whisper filters the remaining background noise.
const SILENCE_RMS_THRESHOLD: f32 = 0.005;

/// Recognition language.
const LANGUAGE: &str = "pt";

type SampleBuffer = Arc<Mutex<Vec<f32>>>;

/// [`Listener`] that records one window per turn and transcribes it.
pub struct WhisperListener {
    ctx: Option<Arc<WhisperContext>>,
    record: Duration,
}

impl WhisperListener {
    /// Loads the GGML model at `model_path`.
    ///
    /// # Errors
    /// Returns an error if the model file is missing or cannot be loaded.
    pub fn new(model_path: &str) -> Result<Self> {
        if !Path::new(model_path).exists() {
            return Err(Error::Config(format!("whisper model not found: {model_path}")));
        }
        let mut params = WhisperContextParameters::default();
        params.use_gpu(false);
        let ctx = WhisperContext::new_with_params(model_path, params)
            .map_err(|err| Error::Audio(format!("whisper init failed: {err}")))?;
        tracing::info!(model = model_path, "whisper model loaded");
        Ok(Self {
            ctx: Some(Arc::new(ctx)),
            record: RECORD_DURATION,
        })
    }

    /// Overrides the per-turn recording window.
    pub fn with_record_duration(mut self, record: Duration) -> Self {
        self.record = record;
        self
    }
}

#[async_trait]
impl Listener for WhisperListener {
    async fn listen(&mut self) -> Result<Heard> {
        let Some(ctx) = self.ctx.clone() else {
            return Ok(Heard::Closed);
        };
        let record = self.record;
        tracing::debug!(seconds = record.as_secs_f32(), "recording");
        tokio::task::spawn_blocking(move || {
            let samples = record_samples(record)?;
            if !contains_speech(&samples) {
                return Ok(Heard::Nothing);
            }
            let text = transcribe(&ctx, &samples)?;
            Ok(if text.is_empty() {
                Heard::Nothing
            } else {
                Heard::Utterance(text)
            })
        })
        .await
        .map_err(|err| Error::Audio(format!("capture task failed: {err}")))?
    }

    fn stop(&mut self) {
        if self.ctx.take().is_some() {
            tracing::debug!("whisper context released");
        }
    }
}

/// Records normalized samples from the default input device.
fn record_samples(duration: Duration) -> Result<Vec<f32>> {
    let device = default_input_device()?;
    let samples = SampleBuffer::default();
    let stream = build_input_stream(&device, &input_config(), Arc::clone(&samples))?;
    stream
        .play()
        .map_err(|err| Error::Audio(err.to_string()))?;
    std::thread::sleep(duration);
    drop(stream);
    let captured = samples
        .lock()
        .map_err(|_| Error::Audio("sample buffer poisoned".into()))?
        .clone();
    Ok(captured)
}

fn default_input_device() -> Result<Device> {
    cpal::default_host()
        .default_input_device()
        .ok_or_else(|| Error::Audio("no input device".into()))
}

/// Mono, 16 kHz, default buffer.
fn input_config() -> StreamConfig {
    StreamConfig {
        channels: CHANNELS,
        sample_rate: cpal::SampleRate(SAMPLE_RATE),
        buffer_size: cpal::BufferSize::Default,
    }
}

fn build_input_stream(device: &Device, config: &StreamConfig, samples: SampleBuffer) -> Result<Stream> {
    device
        .build_input_stream(
            config,
            move |data: &[f32], _: &_| push_samples(&samples, data),
            log_stream_error,
            None,
        )
        .map_err(|err| Error::Audio(err.to_string()))
}

fn push_samples(buffer: &SampleBuffer, data: &[f32]) {
    if let Ok(mut guard) = buffer.lock() {
        guard.extend_from_slice(data);
    }
}

fn log_stream_error(error: StreamError) {
    tracing::warn!(error = %error, "audio stream error");
}

/// Root-mean-square amplitude of `samples`.
fn rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum: f32 = samples.iter().map(|s| s * s).sum();
    (sum / samples.len() as f32).sqrt()
}

fn contains_speech(samples: &[f32]) -> bool {
    let level = rms(samples);
    tracing::debug!(level, "captured window");
    level >= SILENCE_RMS_THRESHOLD
}

/// Runs Whisper and concatenates every segment.
fn transcribe(ctx: &WhisperContext, samples: &[f32]) -> Result<String> {
    let mut params = FullParams::new(SamplingStrategy::Greedy { best_of: 1 });
    params.set_language(Some(LANGUAGE));
    params.set_print_progress(false);
    params.set_print_special(false);
    params.set_print_realtime(false);
    let whisper = |err: whisper_rs::WhisperError| Error::Audio(format!("whisper: {err}"));

    let mut state = ctx.create_state().map_err(whisper)?;
    state.full(params, samples).map_err(whisper)?;
    let segments = state.full_n_segments().map_err(whisper)?;
    let mut text = String::new();
    for i in 0..segments {
        if let Ok(segment) = state.full_get_segment_text(i) {
            text.push_str(&segment);
            text.push(' ');
        }
    }
    Ok(text.trim().to_string())
}
