//! Speech synthesis adapters.
//!
//! Every backend implements [`SpeechEngine`]: it loads lazily through
//! [`SpeechEngine::initialize`], exposes its voices, speaks one utterance at a
//! time into the shared [`AudioBus`](crate::audio::AudioBus), and can be
//! interrupted with [`SpeechEngine::cancel`].
//!
//! # Available Engines
//!
//! - `system` - espeak-ng, the platform speech engine (always available)
//! - `kokoro` - Kokoro TTS (ONNX format, espeak-ng required, cargo feature `kokoro`)

#[cfg(feature = "kokoro")]
pub mod kokoro;
pub mod system;

pub use system::SystemSpeech;

use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use derive_builder::Builder;
use serde::{Deserialize, Serialize};
use tokio::sync::Notify;

use crate::audio::AudioBus;

#[derive(thiserror::Error, Debug)]
pub enum SpeechError {
    #[error("Speech engine unavailable: {0}")]
    EngineUnavailable(String),
    #[error("Speech synthesis failed: {0}")]
    Synthesis(String),
}

/// Voice gender class, as far as the backend's metadata tells.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Gender {
    Male,
    Female,
}

/// Read-only description of a voice offered by an engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Voice {
    pub id: String,
    pub display_name: String,
    /// BCP-47 style language tag, e.g. `en-us`.
    pub language: String,
    pub gender: Option<Gender>,
}

/// How to pick a voice for an utterance.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", tag = "kind", content = "value")]
pub enum VoiceSelector {
    /// The engine's first voice.
    #[default]
    Default,
    /// The first voice of the given gender class.
    Gender(Gender),
    /// A specific voice id.
    Id(String),
}

/// Pick the voice for `selector`, falling back to the first voice.
pub fn select_voice<'a>(voices: &'a [Voice], selector: &VoiceSelector) -> Option<&'a Voice> {
    let picked = match selector {
        VoiceSelector::Default => None,
        VoiceSelector::Gender(gender) => voices.iter().find(|v| v.gender == Some(*gender)),
        VoiceSelector::Id(id) => voices.iter().find(|v| &v.id == id),
    };
    picked.or_else(|| voices.first())
}

/// Parameters for a single utterance.
#[derive(Debug, Clone, Builder)]
#[builder(default)]
pub struct SpeakOptions {
    pub voice: VoiceSelector,
    /// Speech speed multiplier, 1.0 is the engine's normal rate.
    pub rate: f32,
}

impl Default for SpeakOptions {
    fn default() -> Self {
        Self {
            voice: VoiceSelector::Default,
            rate: 1.0,
        }
    }
}

/// How a `speak` call ended when it did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpeakOutcome {
    /// The whole utterance was played through the bus.
    Finished,
    /// `cancel()` interrupted the utterance.
    Cancelled,
}

/// Common interface for text-to-speech backends.
///
/// `speak` must not be called concurrently on the same engine; the playback
/// controller serializes utterances. `cancel` may be called from any task.
#[async_trait]
pub trait SpeechEngine: Send + Sync {
    /// Load the backend and populate the voice list. Idempotent.
    async fn initialize(&self) -> Result<(), SpeechError>;

    /// Voices offered by the backend; empty until initialized.
    fn voices(&self) -> Vec<Voice>;

    /// Speak `text`, resolving once it has been played through the bus.
    ///
    /// Resolves with [`SpeakOutcome::Cancelled`] when `cancel` interrupts it.
    async fn speak(&self, text: &str, options: &SpeakOptions)
        -> Result<SpeakOutcome, SpeechError>;

    /// Interrupt the in-flight utterance. No-op when nothing is playing.
    fn cancel(&self);

    /// Display name for this engine (e.g. "espeak-ng").
    fn name(&self) -> String;
}

/// Cancellation signal shared between `cancel` and an in-flight `speak`.
///
/// `arm` is taken when an utterance begins; only `trigger` calls made after
/// that point interrupt it.
#[derive(Debug, Default)]
pub struct Interrupt {
    epoch: AtomicU64,
    notify: Notify,
}

impl Interrupt {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arm(&self) -> u64 {
        self.epoch.load(Ordering::SeqCst)
    }

    pub fn trigger(&self) {
        self.epoch.fetch_add(1, Ordering::SeqCst);
        self.notify.notify_waiters();
    }

    pub fn is_triggered(&self, armed: u64) -> bool {
        self.epoch.load(Ordering::SeqCst) != armed
    }

    /// Wait until `trigger` is called after `armed` was taken.
    pub async fn triggered(&self, armed: u64) {
        loop {
            let notified = self.notify.notified();
            if self.is_triggered(armed) {
                return;
            }
            notified.await;
        }
    }
}

/// Which speech backend to build.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// espeak-ng from PATH.
    #[default]
    System,
    /// Kokoro ONNX model loaded from `model_dir`.
    Kokoro { model_dir: PathBuf },
}

/// Build the engine chosen in configuration.
pub fn create_engine(
    backend: &Backend,
    bus: Arc<AudioBus>,
) -> Result<Arc<dyn SpeechEngine>, SpeechError> {
    match backend {
        Backend::System => Ok(Arc::new(SystemSpeech::new(bus))),
        #[cfg(feature = "kokoro")]
        Backend::Kokoro { model_dir } => {
            Ok(Arc::new(kokoro::KokoroSpeech::new(model_dir.clone(), bus)))
        }
        #[cfg(not(feature = "kokoro"))]
        Backend::Kokoro { .. } => Err(SpeechError::EngineUnavailable(
            "built without the `kokoro` feature".to_string(),
        )),
    }
}
