//! Kokoro-82M speech engine.
//!
//! Runs the Kokoro-82M ONNX model locally. The engine uses espeak-ng for
//! phonemization and supports 9 languages.
//!
//! # Model Directory Layout
//!
//! ```text
//! models/kokoro/
//! ├── kokoro-quant-convinteger.onnx   # 8-bit quantized model (88MB, CPU-optimized)
//! ├── voices-v1.0.bin                  # Voice data archive (.npz format)
//! └── config.json                      # Model config with the phoneme vocabulary
//! ```
//!
//! # Voice Naming Convention
//!
//! Voices follow the pattern `{language}{gender}_{name}`, e.g. `af_heart` is
//! an American English female voice and `bm_george` a British English male
//! one. Gender selectors use the second letter of the prefix.

pub mod model;
pub mod phonemizer;
pub mod voices;

pub use model::{KokoroError, KokoroModel};

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::OnceCell;

use super::{select_voice, Interrupt, SpeakOptions, SpeakOutcome, SpeechEngine, SpeechError, Voice};
use crate::audio::AudioBus;

struct Loaded {
    model: Arc<Mutex<KokoroModel>>,
    voices: Vec<Voice>,
}

/// Kokoro text-to-speech engine.
///
/// The model is loaded by `initialize()` on a blocking worker; synthesis also
/// runs on a blocking worker so the async runtime stays responsive.
pub struct KokoroSpeech {
    model_dir: PathBuf,
    num_threads: Option<usize>,
    bus: Arc<AudioBus>,
    loaded: OnceCell<Loaded>,
    interrupt: Interrupt,
}

impl KokoroSpeech {
    pub fn new(model_dir: PathBuf, bus: Arc<AudioBus>) -> Self {
        Self {
            model_dir,
            num_threads: None,
            bus,
            loaded: OnceCell::new(),
            interrupt: Interrupt::new(),
        }
    }

    /// Number of CPU threads for inference; `None` uses the ORT default.
    pub fn with_threads(mut self, num_threads: usize) -> Self {
        self.num_threads = Some(num_threads);
        self
    }

    async fn load(&self) -> Result<Loaded, SpeechError> {
        let dir = self.model_dir.clone();
        let threads = self.num_threads;
        let model = tokio::task::spawn_blocking(move || KokoroModel::load(&dir, threads))
            .await
            .map_err(|e| SpeechError::EngineUnavailable(e.to_string()))?
            .map_err(|e| SpeechError::EngineUnavailable(e.to_string()))?;

        let voices = model.voices();
        Ok(Loaded {
            model: Arc::new(Mutex::new(model)),
            voices,
        })
    }
}

#[async_trait]
impl SpeechEngine for KokoroSpeech {
    async fn initialize(&self) -> Result<(), SpeechError> {
        self.loaded.get_or_try_init(|| self.load()).await?;
        Ok(())
    }

    fn voices(&self) -> Vec<Voice> {
        self.loaded
            .get()
            .map(|l| l.voices.clone())
            .unwrap_or_default()
    }

    async fn speak(
        &self,
        text: &str,
        options: &SpeakOptions,
    ) -> Result<SpeakOutcome, SpeechError> {
        let armed = self.interrupt.arm();
        let loaded = self
            .loaded
            .get()
            .ok_or_else(|| SpeechError::Synthesis("engine not initialized".to_string()))?;
        let voice = select_voice(&loaded.voices, &options.voice)
            .ok_or_else(|| SpeechError::Synthesis("no voice available".to_string()))?
            .id
            .clone();

        let model = loaded.model.clone();
        let text = text.to_string();
        let speed = options.rate;
        let job = tokio::task::spawn_blocking(move || {
            let mut model = model.lock().unwrap_or_else(|e| e.into_inner());
            model.synthesize(&text, &voice, speed)
        });

        // A cancelled job finishes in the background and its audio is dropped.
        let clip = tokio::select! {
            result = job => result
                .map_err(|e| SpeechError::Synthesis(e.to_string()))?
                .map_err(|e| SpeechError::Synthesis(e.to_string()))?,
            _ = self.interrupt.triggered(armed) => return Ok(SpeakOutcome::Cancelled),
        };

        Ok(self.bus.play(clip, &self.interrupt, armed).await)
    }

    fn cancel(&self) {
        self.interrupt.trigger();
    }

    fn name(&self) -> String {
        format!("Kokoro ({})", self.model_dir.display())
    }
}
