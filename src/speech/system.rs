//! Platform speech through espeak-ng.
//!
//! The voice list comes from `espeak-ng --voices`. espeak-ng reports almost
//! every voice as male, so each voice is also offered with the `+f3` female
//! variant to give the two hosts distinguishable voices.

use std::process::Stdio;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tokio::sync::OnceCell;

use super::{
    select_voice, Gender, Interrupt, SpeakOptions, SpeakOutcome, SpeechEngine, SpeechError, Voice,
};
use crate::audio::AudioBus;
use crate::AudioClip;

/// espeak-ng words per minute at rate 1.0.
const BASE_WPM: f32 = 175.0;

const FEMALE_VARIANT: &str = "+f3";

/// espeak-ng speech engine.
pub struct SystemSpeech {
    program: String,
    bus: Arc<AudioBus>,
    voices: OnceCell<Vec<Voice>>,
    interrupt: Interrupt,
}

impl SystemSpeech {
    /// Use `espeak-ng` from PATH.
    pub fn new(bus: Arc<AudioBus>) -> Self {
        Self::with_program("espeak-ng", bus)
    }

    /// Use an explicit espeak-ng binary, e.g. a bundled one.
    pub fn with_program(program: impl Into<String>, bus: Arc<AudioBus>) -> Self {
        Self {
            program: program.into(),
            bus,
            voices: OnceCell::new(),
            interrupt: Interrupt::new(),
        }
    }

    async fn load_voices(&self) -> Result<Vec<Voice>, SpeechError> {
        let output = Command::new(&self.program)
            .arg("--voices")
            .output()
            .await
            .map_err(|e| {
                SpeechError::EngineUnavailable(format!("failed to run {}: {e}", self.program))
            })?;

        if !output.status.success() {
            return Err(SpeechError::EngineUnavailable(format!(
                "{} --voices exited with code {:?}",
                self.program,
                output.status.code()
            )));
        }

        let voices = parse_voice_list(&String::from_utf8_lossy(&output.stdout));
        if voices.is_empty() {
            return Err(SpeechError::EngineUnavailable(
                "espeak-ng reported no voices".to_string(),
            ));
        }
        log::info!("Loaded {} voices", voices.len());
        Ok(voices)
    }

    async fn synthesize(
        &self,
        text: &str,
        voice: &str,
        rate: f32,
    ) -> Result<AudioClip, SpeechError> {
        let wpm = (BASE_WPM * rate).round().max(80.0) as u32;
        let mut child = Command::new(&self.program)
            .args(["--stdout", "--stdin", "-q", "-v", voice, "-s", &wpm.to_string()])
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| SpeechError::Synthesis(format!("failed to spawn espeak-ng: {e}")))?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(format!("{text}\n").as_bytes())
                .await
                .map_err(|e| SpeechError::Synthesis(e.to_string()))?;
        }

        let output = child
            .wait_with_output()
            .await
            .map_err(|e| SpeechError::Synthesis(e.to_string()))?;
        if !output.status.success() {
            return Err(SpeechError::Synthesis(format!(
                "espeak-ng exited with code {:?}: {}",
                output.status.code(),
                String::from_utf8_lossy(&output.stderr)
            )));
        }

        let mut wav = output.stdout;
        fix_stream_header(&mut wav);
        AudioClip::from_wav_bytes(&wav)
            .map_err(|e| SpeechError::Synthesis(format!("invalid WAV from espeak-ng: {e}")))
    }
}

#[async_trait]
impl SpeechEngine for SystemSpeech {
    async fn initialize(&self) -> Result<(), SpeechError> {
        self.voices.get_or_try_init(|| self.load_voices()).await?;
        Ok(())
    }

    fn voices(&self) -> Vec<Voice> {
        self.voices.get().cloned().unwrap_or_default()
    }

    async fn speak(
        &self,
        text: &str,
        options: &SpeakOptions,
    ) -> Result<SpeakOutcome, SpeechError> {
        let armed = self.interrupt.arm();
        let voices = self
            .voices
            .get()
            .ok_or_else(|| SpeechError::Synthesis("engine not initialized".to_string()))?;
        let voice = select_voice(voices, &options.voice)
            .ok_or_else(|| SpeechError::Synthesis("no voice available".to_string()))?;

        log::debug!("Speaking {} chars with voice {}", text.len(), voice.id);

        // Dropping the synthesis future kills espeak-ng.
        let clip = tokio::select! {
            clip = self.synthesize(text, &voice.id, options.rate) => clip?,
            _ = self.interrupt.triggered(armed) => return Ok(SpeakOutcome::Cancelled),
        };

        Ok(self.bus.play(clip, &self.interrupt, armed).await)
    }

    fn cancel(&self) {
        self.interrupt.trigger();
    }

    fn name(&self) -> String {
        "espeak-ng".to_string()
    }
}

/// Rewrite the RIFF and `data` chunk sizes from the buffer length.
///
/// With `--stdout` espeak-ng cannot seek back to finish the header and leaves
/// placeholder sizes (0x7ffff024 / 0x7ffff000) that overrun the buffer.
fn fix_stream_header(wav: &mut [u8]) {
    if wav.len() < 12 || &wav[0..4] != b"RIFF" || &wav[8..12] != b"WAVE" {
        return;
    }
    let riff_len = (wav.len() - 8) as u32;
    wav[4..8].copy_from_slice(&riff_len.to_le_bytes());

    let mut block_align = 1usize;
    let mut pos = 12usize;
    while pos + 8 <= wav.len() {
        let id = [wav[pos], wav[pos + 1], wav[pos + 2], wav[pos + 3]];
        let size = u32::from_le_bytes([wav[pos + 4], wav[pos + 5], wav[pos + 6], wav[pos + 7]]);
        let body = pos + 8;

        if &id == b"fmt " && body + 14 <= wav.len() {
            block_align = u16::from_le_bytes([wav[body + 12], wav[body + 13]]).max(1) as usize;
        }
        if &id == b"data" {
            let available = wav.len() - body;
            let data_len = (available - available % block_align) as u32;
            wav[pos + 4..pos + 8].copy_from_slice(&data_len.to_le_bytes());
            return;
        }
        // Chunks are word aligned.
        let size = size as usize;
        pos = body.saturating_add(size).saturating_add(size & 1);
    }
}

/// Parse the table printed by `espeak-ng --voices`:
///
/// ```text
/// Pty Language       Age/Gender VoiceName          File                 Other Languages
///  5  af              --/M      Afrikaans          gmw/af
///  2  en-us           --/M      English_(America)  gmw/en-US            (en 3)
/// ```
fn parse_voice_list(table: &str) -> Vec<Voice> {
    let mut voices: Vec<Voice> = Vec::new();

    for line in table.lines().skip(1) {
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() < 4 {
            continue;
        }
        let language = fields[1];
        let gender = match fields[2].rsplit('/').next() {
            Some("M") => Some(Gender::Male),
            Some("F") => Some(Gender::Female),
            _ => None,
        };
        let display_name = fields[3].replace('_', " ");

        if voices.iter().any(|v| v.id == language) {
            continue;
        }
        voices.push(Voice {
            id: language.to_string(),
            display_name,
            language: language.to_string(),
            gender,
        });
    }

    let variants: Vec<Voice> = voices
        .iter()
        .filter(|v| v.gender != Some(Gender::Female))
        .map(|v| Voice {
            id: format!("{}{FEMALE_VARIANT}", v.id),
            display_name: format!("{} (female)", v.display_name),
            language: v.language.clone(),
            gender: Some(Gender::Female),
        })
        .collect();
    voices.extend(variants);

    // The table is alphabetical; English voices go first so gender selectors
    // land on them.
    voices.sort_by_key(|v| !v.language.starts_with("en"));
    voices
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::CaptureSink;
    use crate::speech::VoiceSelector;

    const TABLE: &str = "\
Pty Language       Age/Gender VoiceName          File                 Other Languages
 5  af              --/M      Afrikaans          gmw/af
 2  en-us           --/M      English_(America)  gmw/en-US            (en 3)
 5  en-us           --/M      English_(America)  gmw/en-US-nyc
 5  fr-fr           --/F      French_(France)    roa/fr
";

    /// Overwrite the chunk sizes the way `espeak-ng --stdout` leaves them.
    fn with_placeholder_sizes(mut wav: Vec<u8>) -> Vec<u8> {
        wav[4..8].copy_from_slice(&0x7fff_f024u32.to_le_bytes());
        let data = wav.windows(4).position(|w| w == b"data").unwrap();
        wav[data + 4..data + 8].copy_from_slice(&0x7fff_f000u32.to_le_bytes());
        wav
    }

    #[test]
    fn parses_voice_table_with_female_variants() {
        let voices = parse_voice_list(TABLE);
        let ids: Vec<&str> = voices.iter().map(|v| v.id.as_str()).collect();
        assert_eq!(ids, vec!["en-us", "en-us+f3", "af", "fr-fr", "af+f3"]);
        assert_eq!(voices[0].display_name, "English (America)");
        assert_eq!(voices[3].gender, Some(Gender::Female));
    }

    #[test]
    fn gender_selection_prefers_english_voices() {
        let voices = parse_voice_list(TABLE);
        let male = select_voice(&voices, &VoiceSelector::Gender(Gender::Male)).unwrap();
        let female = select_voice(&voices, &VoiceSelector::Gender(Gender::Female)).unwrap();
        assert_eq!(male.id, "en-us");
        assert_eq!(female.id, "en-us+f3");
    }

    #[test]
    fn decodes_wav_with_streamed_header() {
        let clip = AudioClip::new(vec![0.1; 2205], 22_050);
        let mut wav = with_placeholder_sizes(clip.to_wav_bytes().unwrap());
        assert!(AudioClip::from_wav_bytes(&wav).is_err());

        fix_stream_header(&mut wav);
        let decoded = AudioClip::from_wav_bytes(&wav).unwrap();
        assert_eq!(decoded.samples.len(), 2205);
        assert_eq!(decoded.sample_rate, 22_050);
    }

    #[test]
    fn stream_header_drops_trailing_partial_sample() {
        let clip = AudioClip::new(vec![0.1; 100], 8_000);
        let mut wav = with_placeholder_sizes(clip.to_wav_bytes().unwrap());
        wav.push(0x7f);

        fix_stream_header(&mut wav);
        assert_eq!(AudioClip::from_wav_bytes(&wav).unwrap().samples.len(), 100);
    }

    #[test]
    fn non_wav_output_is_left_alone() {
        let mut junk = b"not a wav file".to_vec();
        fix_stream_header(&mut junk);
        assert_eq!(junk, b"not a wav file");
    }

    /// A shell script standing in for espeak-ng: prints `TABLE` for
    /// `--voices` (logging each call) and otherwise emits a streamed WAV.
    #[cfg(unix)]
    fn fake_espeak(dir: &std::path::Path) -> (String, std::path::PathBuf) {
        use std::os::unix::fs::PermissionsExt;

        let table = dir.join("voices.txt");
        std::fs::write(&table, TABLE).unwrap();
        let wav = dir.join("utterance.wav");
        let clip = AudioClip::new(vec![0.25; 2205], 22_050);
        std::fs::write(&wav, with_placeholder_sizes(clip.to_wav_bytes().unwrap())).unwrap();
        let calls = dir.join("voices.log");

        let script = format!(
            "#!/bin/sh\n\
             if [ \"$1\" = \"--voices\" ]; then\n\
             \x20 echo voices >> '{calls}'\n\
             \x20 cat '{table}'\n\
             \x20 exit 0\n\
             fi\n\
             cat > /dev/null\n\
             cat '{wav}'\n",
            calls = calls.display(),
            table = table.display(),
            wav = wav.display(),
        );
        let program = dir.join("espeak-ng");
        std::fs::write(&program, script).unwrap();
        std::fs::set_permissions(&program, std::fs::Permissions::from_mode(0o755)).unwrap();
        (program.to_string_lossy().into_owned(), calls)
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn initialize_loads_voices_once() {
        let dir = tempfile::tempdir().unwrap();
        let (program, calls) = fake_espeak(dir.path());
        let engine = SystemSpeech::with_program(program, Arc::new(AudioBus::new(22_050)));

        let (first, second) = tokio::join!(engine.initialize(), engine.initialize());
        first.unwrap();
        second.unwrap();
        let voices = engine.voices();
        engine.initialize().await.unwrap();

        assert_eq!(voices, engine.voices());
        assert_eq!(voices.len(), 5);
        let log = std::fs::read_to_string(&calls).unwrap();
        assert_eq!(log.lines().count(), 1);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn speaks_into_the_bus() {
        let dir = tempfile::tempdir().unwrap();
        let (program, _) = fake_espeak(dir.path());
        let bus = Arc::new(AudioBus::new(22_050).unpaced());
        let engine = SystemSpeech::with_program(program, bus.clone());
        engine.initialize().await.unwrap();

        let mut sink = CaptureSink::new(bus);
        sink.start().unwrap();
        let options = SpeakOptions {
            voice: VoiceSelector::Gender(Gender::Female),
            rate: 1.0,
        };
        let outcome = engine.speak("Hello there.", &options).await.unwrap();
        let recording = sink.stop().await.unwrap();

        assert_eq!(outcome, SpeakOutcome::Finished);
        let captured = AudioClip::from_wav_bytes(&recording.bytes).unwrap();
        assert_eq!(captured.samples.len(), 2205);
        assert!((captured.samples[0] - 0.25).abs() < 1e-3);
    }

    #[tokio::test]
    async fn missing_binary_is_engine_unavailable() {
        let engine = SystemSpeech::with_program(
            "definitely-not-espeak-ng",
            Arc::new(AudioBus::new(22_050)),
        );
        assert!(matches!(
            engine.initialize().await,
            Err(SpeechError::EngineUnavailable(_))
        ));
        assert!(engine.voices().is_empty());
    }

    #[tokio::test]
    async fn speak_before_initialize_is_a_synthesis_error() {
        let engine = SystemSpeech::new(Arc::new(AudioBus::new(22_050)));
        let result = engine.speak("hello", &SpeakOptions::default()).await;
        assert!(matches!(result, Err(SpeechError::Synthesis(_))));
    }
}
