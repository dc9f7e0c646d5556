use std::path::{Path, PathBuf};

use ndarray::{Array2, ArrayView2};
use ort::execution_providers::CPUExecutionProvider;
use ort::inputs;
use ort::session::builder::GraphOptimizationLevel;
use ort::session::Session;
use ort::value::TensorRef;

use super::phonemizer::{load_vocab, tokenize, Vocab};
use super::voices::{voice_language, VoiceStyles};
use crate::speech::Voice;
use crate::AudioClip;

/// Maximum number of phoneme tokens per inference call (before padding).
pub const MAX_TOKENS: usize = 510;

/// Style vector dimension for Kokoro.
pub const STYLE_DIM: usize = 256;

/// Output sample rate from the Kokoro model.
pub const SAMPLE_RATE: u32 = 24000;

/// 10ms @ 24kHz
const CROSSFADE: usize = 240;

/// Token ids of `; : , . ! ?`, preferred split points for long inputs.
const PUNCT_IDS: [i64; 6] = [1, 2, 3, 4, 5, 6];

#[derive(thiserror::Error, Debug)]
pub enum KokoroError {
    #[error("ONNX runtime error: {0}")]
    Ort(#[from] ort::Error),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Array shape error: {0}")]
    Shape(#[from] ndarray::ShapeError),
    #[error(
        "espeak-ng not found. Install: Linux: `sudo apt-get install espeak-ng`, \
         macOS: `brew install espeak-ng`, Windows: https://espeak-ng.org/download"
    )]
    EspeakNotFound,
    #[error("Phonemization failed: {0}")]
    PhonemizerFailed(String),
    #[error("Voice '{0}' not found")]
    VoiceNotFound(String),
    #[error("Invalid config.json: {0}")]
    Config(String),
    #[error("Failed to parse voice file: {0}")]
    VoiceParse(String),
    #[error("Missing model file: {0}")]
    MissingFile(PathBuf),
}

/// Loaded Kokoro ONNX session plus its voices and vocabulary.
pub struct KokoroModel {
    session: Session,
    styles: VoiceStyles,
    vocab: Vocab,
    /// "input_ids" or "tokens", depending on the export
    tokens_input: String,
    speed_is_int32: bool,
}

impl KokoroModel {
    /// Load a model directory containing an `.onnx` file, `voices-v1.0.bin`
    /// and `config.json`.
    pub fn load(model_dir: &Path, num_threads: Option<usize>) -> Result<Self, KokoroError> {
        let onnx_path = find_onnx(model_dir)?;
        log::info!("Loading Kokoro model from {}", onnx_path.display());

        let mut builder = Session::builder()?
            .with_optimization_level(GraphOptimizationLevel::Level3)?
            .with_execution_providers(vec![CPUExecutionProvider::default().build()])?;
        if let Some(threads) = num_threads {
            builder = builder.with_intra_threads(threads)?;
        }
        let session = builder.commit_from_file(&onnx_path)?;

        let tokens_input = session
            .inputs()
            .iter()
            .map(|i| i.name())
            .find(|n| *n == "input_ids" || *n == "tokens")
            .unwrap_or("input_ids")
            .to_string();
        let speed_is_int32 = session
            .inputs()
            .iter()
            .find(|i| i.name() == "speed")
            .map(|i| format!("{:?}", i.dtype()).to_lowercase().contains("int32"))
            .unwrap_or(true);

        let styles = VoiceStyles::load(&required(model_dir.join("voices-v1.0.bin"))?)?;
        let vocab = load_vocab(&required(model_dir.join("config.json"))?)?;

        Ok(Self {
            session,
            styles,
            vocab,
            tokens_input,
            speed_is_int32,
        })
    }

    pub fn voices(&self) -> Vec<Voice> {
        self.styles.describe()
    }

    /// Synthesize `text` with `voice` at `speed`.
    pub fn synthesize(
        &mut self,
        text: &str,
        voice: &str,
        speed: f32,
    ) -> Result<AudioClip, KokoroError> {
        let ids = tokenize(text, voice_language(voice), &self.vocab)?;
        if ids.is_empty() {
            log::warn!("No phoneme tokens produced for text: {text:?}");
            return Ok(AudioClip::new(Vec::new(), SAMPLE_RATE));
        }

        // One style index for the whole text keeps prosody stable across chunks.
        let style = *self.styles.style(voice, ids.len())?;
        let mut samples: Vec<f32> = Vec::with_capacity(ids.len() * 300);
        for chunk in split_tokens(&ids) {
            let audio = self.infer(chunk, &style, speed)?;
            crossfade_append(&mut samples, &audio);
        }
        Ok(AudioClip::new(samples, SAMPLE_RATE))
    }

    fn infer(
        &mut self,
        tokens: &[i64],
        style: &[f32; STYLE_DIM],
        speed: f32,
    ) -> Result<Vec<f32>, KokoroError> {
        // [[0, t1..tN, 0]]
        let mut padded = Vec::with_capacity(tokens.len() + 2);
        padded.push(0);
        padded.extend_from_slice(tokens);
        padded.push(0);
        let tokens = Array2::from_shape_vec((1, padded.len()), padded)?;
        let style = ArrayView2::from_shape((1, STYLE_DIM), style.as_slice())?;

        let outputs = if self.speed_is_int32 {
            let speed = ndarray::arr1(&[speed.round() as i32]);
            self.session.run(inputs![
                self.tokens_input.as_str() => TensorRef::from_array_view(tokens.view())?,
                "style" => TensorRef::from_array_view(style)?,
                "speed" => TensorRef::from_array_view(speed.view())?,
            ])?
        } else {
            let speed = ndarray::arr1(&[speed]);
            self.session.run(inputs![
                self.tokens_input.as_str() => TensorRef::from_array_view(tokens.view())?,
                "style" => TensorRef::from_array_view(style)?,
                "speed" => TensorRef::from_array_view(speed.view())?,
            ])?
        };

        let (_, waveform) = outputs
            .iter()
            .next()
            .ok_or_else(|| KokoroError::Ort(ort::Error::new("model produced no output")))?;
        let waveform = waveform.try_extract_array::<f32>()?;
        Ok(waveform.iter().copied().collect())
    }
}

fn required(path: PathBuf) -> Result<PathBuf, KokoroError> {
    if path.exists() {
        Ok(path)
    } else {
        Err(KokoroError::MissingFile(path))
    }
}

/// Prefer the CPU-quantized export, else the first `.onnx` file.
fn find_onnx(model_dir: &Path) -> Result<PathBuf, KokoroError> {
    let preferred = model_dir.join("kokoro-quant-convinteger.onnx");
    if preferred.exists() {
        return Ok(preferred);
    }
    for entry in std::fs::read_dir(model_dir)? {
        let path = entry?.path();
        if path.extension().is_some_and(|e| e == "onnx") {
            return Ok(path);
        }
    }
    Err(KokoroError::MissingFile(model_dir.join("*.onnx")))
}

/// Split token ids into runs of at most `MAX_TOKENS`, cutting after the last
/// punctuation token when possible.
fn split_tokens(ids: &[i64]) -> Vec<&[i64]> {
    let mut chunks = Vec::new();
    let mut rest = ids;
    while rest.len() > MAX_TOKENS {
        let cut = rest[..MAX_TOKENS]
            .iter()
            .rposition(|id| PUNCT_IDS.contains(id))
            .map(|i| i + 1)
            .unwrap_or(MAX_TOKENS);
        let (head, tail) = rest.split_at(cut);
        chunks.push(head);
        rest = tail;
    }
    if !rest.is_empty() {
        chunks.push(rest);
    }
    chunks
}

fn crossfade_append(dst: &mut Vec<f32>, src: &[f32]) {
    let overlap = CROSSFADE.min(dst.len()).min(src.len());
    let start = dst.len() - overlap;
    for (i, &s) in src[..overlap].iter().enumerate() {
        let t = (i + 1) as f32 / (overlap as f32 + 1.0);
        dst[start + i] = dst[start + i] * (1.0 - t) + s * t;
    }
    dst.extend_from_slice(&src[overlap..]);
}
