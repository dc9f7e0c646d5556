//! # podcast-tts
//!
//! Turn a discussion thread into a two-host podcast: a script generator writes
//! the dialogue, the segmenter splits it into speaker turns, a speech engine
//! speaks every turn through a shared audio bus, and the whole session is
//! recorded into a single artifact that lands in the local podcast library.
//!
//! ## Features
//!
//! - **System speech**: espeak-ng based synthesis, always available
//! - **Kokoro TTS** (`kokoro`): Kokoro-82M ONNX model with multiple voices
//! - **Gemini** (`gemini`): script generation through the Gemini API
//! - **Speaker** (`speaker`): hear the podcast while it is being recorded
//!
//! ## Quick Start
//!
//! ```ignore
//! use std::sync::Arc;
//! use podcast_tts::{
//!     audio::AudioBus, library::Library, playback::PlaybackController,
//!     script::{segment, Hosts}, speech::SystemSpeech, Settings,
//! };
//!
//! let settings = Settings::default();
//! let bus = Arc::new(AudioBus::new(24_000));
//! let engine = Arc::new(SystemSpeech::new(bus.clone()));
//! let library = Library::new(Arc::new(podcast_tts::library::FileLibrary::new("podcasts")));
//!
//! let controller = PlaybackController::new(engine, bus, library, settings.playback());
//! controller.load("My podcast", segment("Alex: Hi!\nJamie: Hello!", &Hosts::default())).await?;
//! controller.start().await?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod audio;
pub mod config;
pub mod generate;
pub mod library;
pub mod playback;
pub mod script;
pub mod speech;

pub use config::Settings;
pub use library::AudioArtifact;
pub use playback::{PlaybackController, PlaybackError, PlaybackState};
pub use script::{segment, Hosts, Speaker, Turn};
pub use speech::{SpeakOptions, SpeechEngine, SpeechError, Voice, VoiceSelector};

use std::io::Cursor;
use std::path::Path;

/// A block of mono audio produced by a speech engine or captured from the bus.
#[derive(Debug, Clone, Default)]
pub struct AudioClip {
    /// Raw audio samples as f32 values
    pub samples: Vec<f32>,
    /// Sample rate of the audio
    pub sample_rate: u32,
}

impl AudioClip {
    pub fn new(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self {
            samples,
            sample_rate,
        }
    }

    /// Decode a WAV file held in memory. Integer samples are scaled to [-1, 1].
    pub fn from_wav_bytes(bytes: &[u8]) -> Result<Self, hound::Error> {
        let mut reader = hound::WavReader::new(Cursor::new(bytes))?;
        let spec = reader.spec();
        let channels = spec.channels.max(1) as usize;

        let interleaved: Vec<f32> = match spec.sample_format {
            hound::SampleFormat::Float => reader.samples::<f32>().collect::<Result<_, _>>()?,
            hound::SampleFormat::Int => {
                let scale = (1i64 << (spec.bits_per_sample.saturating_sub(1))) as f32;
                reader
                    .samples::<i32>()
                    .map(|s| s.map(|v| v as f32 / scale))
                    .collect::<Result<_, _>>()?
            }
        };

        // Downmix to mono
        let samples = interleaved
            .chunks(channels)
            .map(|frame| frame.iter().sum::<f32>() / frame.len() as f32)
            .collect();

        Ok(Self {
            samples,
            sample_rate: spec.sample_rate,
        })
    }

    /// Encode the audio as a 16-bit PCM WAV file in memory.
    pub fn to_wav_bytes(&self) -> Result<Vec<u8>, hound::Error> {
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: self.sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut cursor = Cursor::new(Vec::new());
        {
            let mut writer = hound::WavWriter::new(&mut cursor, spec)?;
            for &sample in &self.samples {
                let clamped = sample.clamp(-1.0, 1.0);
                writer.write_sample((clamped * i16::MAX as f32) as i16)?;
            }
            writer.finalize()?;
        }
        Ok(cursor.into_inner())
    }

    /// Write the audio to a 16-bit PCM WAV file.
    pub fn write_wav(&self, path: &Path) -> Result<(), hound::Error> {
        std::fs::write(path, self.to_wav_bytes()?)?;
        Ok(())
    }

    /// Return the clip converted to `target_rate` using linear interpolation.
    pub fn resampled(self, target_rate: u32) -> Self {
        if self.sample_rate == target_rate || self.samples.is_empty() || self.sample_rate == 0 {
            return Self {
                sample_rate: if self.sample_rate == 0 {
                    target_rate
                } else {
                    self.sample_rate
                },
                ..self
            };
        }

        let ratio = self.sample_rate as f64 / target_rate as f64;
        let out_len = ((self.samples.len() as f64) / ratio).round() as usize;
        let last = self.samples.len() - 1;
        let samples = (0..out_len)
            .map(|i| {
                let pos = i as f64 * ratio;
                let idx = (pos.floor() as usize).min(last);
                let next = (idx + 1).min(last);
                let frac = (pos - idx as f64) as f32;
                self.samples[idx] * (1.0 - frac) + self.samples[next] * frac
            })
            .collect();

        Self {
            samples,
            sample_rate: target_rate,
        }
    }

    /// Duration of the audio in seconds.
    pub fn duration_secs(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.samples.len() as f64 / self.sample_rate as f64
    }
}
