//! Text to Kokoro token ids, through espeak-ng IPA output.

use std::collections::HashMap;
use std::io::Write;
use std::path::Path;
use std::process::{Command, Stdio};

use super::model::KokoroError;

/// Mapping from IPA characters to Kokoro token ids.
pub type Vocab = HashMap<char, i64>;

/// Load the `"vocab"` table of a Kokoro `config.json`.
pub fn load_vocab(config_path: &Path) -> Result<Vocab, KokoroError> {
    let content = std::fs::read_to_string(config_path)?;
    let json: serde_json::Value = serde_json::from_str(&content)
        .map_err(|e| KokoroError::Config(format!("invalid JSON: {e}")))?;

    let table = json
        .get("vocab")
        .and_then(|v| v.as_object())
        .ok_or_else(|| KokoroError::Config("missing \"vocab\" object".to_string()))?;

    table
        .iter()
        .map(|(key, id)| {
            let ch = key
                .chars()
                .next()
                .ok_or_else(|| KokoroError::Config("empty vocab key".to_string()))?;
            let id = id
                .as_i64()
                .ok_or_else(|| KokoroError::Config(format!("non-integer id for {key:?}")))?;
            Ok((ch, id))
        })
        .collect()
}

/// Punctuation that Kokoro models as its own tokens; espeak-ng drops it.
fn is_boundary(ch: char) -> bool {
    matches!(
        ch,
        '.' | '!' | '?' | ',' | ';' | ':' | '—' | '…' | '"' | '(' | ')' | '\u{201c}' | '\u{201d}'
    )
}

/// Split text into runs of words and single boundary punctuation marks.
///
/// A `.` or `,` between two digits stays inside the word run ("2.0", "1,000").
fn split_runs(text: &str) -> Vec<(bool, String)> {
    let chars: Vec<char> = text.chars().collect();
    let mut runs: Vec<(bool, String)> = Vec::new();
    let mut word = String::new();

    let flush = |word: &mut String, runs: &mut Vec<(bool, String)>| {
        let trimmed = word.split_whitespace().collect::<Vec<_>>().join(" ");
        if !trimmed.is_empty() {
            runs.push((false, trimmed));
        }
        word.clear();
    };

    for (i, &ch) in chars.iter().enumerate() {
        let numeric = matches!(ch, '.' | ',')
            && i > 0
            && chars[i - 1].is_ascii_digit()
            && chars.get(i + 1).is_some_and(|c| c.is_ascii_digit());

        if is_boundary(ch) && !numeric {
            flush(&mut word, &mut runs);
            runs.push((true, ch.to_string()));
        } else if ch == '\n' || ch == '\r' {
            flush(&mut word, &mut runs);
            runs.push((true, ".".to_string()));
        } else {
            word.push(ch);
        }
    }
    flush(&mut word, &mut runs);
    runs
}

/// Convert text to token ids. Characters missing from `vocab` are dropped.
pub fn tokenize(text: &str, lang: &str, vocab: &Vocab) -> Result<Vec<i64>, KokoroError> {
    let runs = split_runs(text);
    let words: Vec<&str> = runs
        .iter()
        .filter(|(punct, _)| !punct)
        .map(|(_, s)| s.as_str())
        .collect();
    if words.is_empty() {
        return Ok(runs
            .iter()
            .filter_map(|(_, s)| s.chars().next().and_then(|c| vocab.get(&c).copied()))
            .collect());
    }

    // One espeak-ng call for all word runs, one output line per input line.
    let ipa = run_espeak(&words.join("\n"), lang)?;
    let mut ipa_lines: Vec<String> = ipa.lines().map(str::to_string).collect();
    if ipa_lines.len() != words.len() {
        log::debug!("espeak-ng line count mismatch, phonemizing runs one by one");
        ipa_lines = words
            .iter()
            .map(|w| run_espeak(w, lang).map(|s| s.lines().collect::<Vec<_>>().join(" ")))
            .collect::<Result<_, _>>()?;
    }

    let mut ipa_iter = ipa_lines.iter();
    let mut ids = Vec::new();
    for (punct, run) in &runs {
        let symbols = if *punct {
            run.as_str()
        } else {
            ipa_iter.next().map(|s| s.trim()).unwrap_or_default()
        };
        ids.extend(
            symbols
                .chars()
                .filter(|&c| c != '_')
                .filter_map(|c| vocab.get(&c).copied()),
        );
    }
    Ok(ids)
}

fn run_espeak(input: &str, lang: &str) -> Result<String, KokoroError> {
    let mut child = Command::new("espeak-ng")
        .args(["--ipa", "--stdin", "-q", "-v", lang])
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => KokoroError::EspeakNotFound,
            _ => KokoroError::Io(e),
        })?;

    if let Some(mut stdin) = child.stdin.take() {
        // Without a trailing newline espeak-ng can drop the last token.
        stdin.write_all(input.as_bytes())?;
        if !input.ends_with('\n') {
            stdin.write_all(b"\n")?;
        }
    }

    let output = child.wait_with_output()?;
    if !output.status.success() {
        return Err(KokoroError::PhonemizerFailed(format!(
            "espeak-ng exited with code {:?}: {}",
            output.status.code(),
            String::from_utf8_lossy(&output.stderr)
        )));
    }
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}
