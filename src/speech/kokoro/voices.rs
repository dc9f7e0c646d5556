use std::collections::BTreeMap;
use std::fs::File;
use std::io::Read;
use std::path::Path;

use super::model::{KokoroError, STYLE_DIM};
use crate::speech::{Gender, Voice};

type Style = [f32; STYLE_DIM];

/// Style vectors for every voice in a `voices-v1.0.bin` archive.
///
/// A voice has one style vector per phoneme sequence length; picking the
/// vector by token count keeps prosody consistent.
pub struct VoiceStyles {
    styles: BTreeMap<String, Vec<Style>>,
}

impl VoiceStyles {
    /// Load the `.npz` archive; each `<voice>.npy` entry is a float32 `[N, 256]` array.
    pub fn load(path: &Path) -> Result<Self, KokoroError> {
        let mut archive = zip::ZipArchive::new(File::open(path)?)
            .map_err(|e| KokoroError::VoiceParse(format!("not a zip archive: {e}")))?;

        let mut styles = BTreeMap::new();
        for i in 0..archive.len() {
            let mut entry = archive
                .by_index(i)
                .map_err(|e| KokoroError::VoiceParse(format!("entry {i}: {e}")))?;
            if entry.is_dir() {
                continue;
            }
            let Some(name) = entry.name().strip_suffix(".npy").map(str::to_string) else {
                continue;
            };

            let mut data = Vec::with_capacity(entry.size() as usize);
            entry
                .read_to_end(&mut data)
                .map_err(|e| KokoroError::VoiceParse(format!("{name}: {e}")))?;
            styles.insert(name.clone(), read_npy_styles(&data, &name)?);
        }

        log::info!("Loaded {} Kokoro voices", styles.len());
        Ok(Self { styles })
    }

    /// Style vector for `voice`; `index` is clamped to the available range.
    pub fn style(&self, voice: &str, index: usize) -> Result<&Style, KokoroError> {
        let styles = self
            .styles
            .get(voice)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| KokoroError::VoiceNotFound(voice.to_string()))?;
        Ok(&styles[index.min(styles.len() - 1)])
    }

    /// Voice descriptors in name order.
    pub fn describe(&self) -> Vec<Voice> {
        self.styles.keys().map(|name| describe_voice(name)).collect()
    }
}

/// Kokoro voice names are `{language}{gender}_{name}`, e.g. `af_heart` is an
/// American English female voice.
pub fn describe_voice(name: &str) -> Voice {
    let mut prefix = name.chars();
    let gender = match prefix.nth(1) {
        Some('f') => Some(Gender::Female),
        Some('m') => Some(Gender::Male),
        _ => None,
    };
    let display_name = name
        .split_once('_')
        .map(|(_, n)| {
            let mut chars = n.chars();
            chars
                .next()
                .map(|c| c.to_uppercase().chain(chars).collect::<String>())
                .unwrap_or_default()
        })
        .unwrap_or_else(|| name.to_string());

    Voice {
        id: name.to_string(),
        display_name,
        language: voice_language(name).to_string(),
        gender,
    }
}

/// espeak-ng language code for a voice name.
pub fn voice_language(voice: &str) -> &'static str {
    match voice.chars().next() {
        Some('a') => "en-us",
        Some('b') => "en-gb",
        Some('e') => "es",
        Some('f') => "fr",
        Some('h') => "hi",
        Some('i') => "it",
        Some('j') => "ja",
        Some('p') => "pt-br",
        Some('z') => "cmn",
        _ => "en-us",
    }
}

fn read_npy_styles(data: &[u8], name: &str) -> Result<Vec<Style>, KokoroError> {
    let bad = |msg: String| KokoroError::VoiceParse(format!("{name}: {msg}"));

    if data.len() < 10 || !data.starts_with(b"\x93NUMPY") {
        return Err(bad("missing numpy header".to_string()));
    }
    let header_len = u16::from_le_bytes([data[8], data[9]]) as usize;
    let payload = data
        .get(10 + header_len..)
        .ok_or_else(|| bad("header truncated".to_string()))?;

    let row_bytes = STYLE_DIM * 4;
    if payload.len() % row_bytes != 0 {
        return Err(bad(format!(
            "{} payload bytes is not a whole number of {STYLE_DIM}-float rows",
            payload.len()
        )));
    }

    Ok(payload
        .chunks_exact(row_bytes)
        .map(|row| {
            let mut style = [0f32; STYLE_DIM];
            for (dst, bytes) in style.iter_mut().zip(row.chunks_exact(4)) {
                *dst = f32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
            }
            style
        })
        .collect())
}
