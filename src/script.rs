//! Splitting a generated two-host script into speaker turns.

use serde::{Deserialize, Serialize};

/// One of the two podcast hosts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Speaker {
    A,
    B,
}

/// One speaker's contiguous block of dialogue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Turn {
    pub speaker: Speaker,
    pub text: String,
}

impl Turn {
    pub fn new(speaker: Speaker, text: impl Into<String>) -> Self {
        Self {
            speaker,
            text: text.into(),
        }
    }
}

/// Display names of the two hosts.
///
/// The names are what the script generator is told to use, and what the
/// segmenter recognises as speaker labels. The literal labels `A` and `B`
/// are always accepted too.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Hosts {
    pub a: String,
    pub b: String,
}

impl Default for Hosts {
    fn default() -> Self {
        Self {
            a: "Alex".to_string(),
            b: "Jamie".to_string(),
        }
    }
}

impl Hosts {
    pub fn name(&self, speaker: Speaker) -> &str {
        match speaker {
            Speaker::A => &self.a,
            Speaker::B => &self.b,
        }
    }

    /// Match a speaker label at the start of `line`, returning the speaker
    /// and the text after the colon.
    fn match_label<'a>(&self, line: &'a str) -> Option<(Speaker, &'a str)> {
        let (label, rest) = line.split_once(':')?;
        let label = label.trim();
        let candidates = [
            (Speaker::A, self.a.as_str()),
            (Speaker::B, self.b.as_str()),
            (Speaker::A, "A"),
            (Speaker::B, "B"),
        ];
        candidates
            .iter()
            .find(|(_, name)| !name.is_empty() && label.eq_ignore_ascii_case(name))
            .map(|&(speaker, _)| (speaker, rest))
    }
}

/// Split a raw script into turns in playback order.
///
/// Turns of the two hosts are interleaved pairwise by position, so the
/// output alternates A, B, A, B, ... for as long as both hosts have turns
/// left. A script without any recognised label degrades to a single turn
/// for host A.
pub fn segment(script: &str, hosts: &Hosts) -> Vec<Turn> {
    let mut a_turns = Vec::new();
    let mut b_turns = Vec::new();
    let mut open: Option<(Speaker, Vec<String>)> = None;
    let mut saw_label = false;

    let mut flush = |open: &mut Option<(Speaker, Vec<String>)>| {
        if let Some((speaker, parts)) = open.take() {
            let text = parts.join(" ");
            if text.is_empty() {
                return;
            }
            match speaker {
                Speaker::A => a_turns.push(text),
                Speaker::B => b_turns.push(text),
            }
        }
    };

    for raw in script.lines() {
        let line = strip_markup(raw);
        if let Some((speaker, rest)) = hosts.match_label(&line) {
            saw_label = true;
            flush(&mut open);
            open = Some((speaker, Vec::new()));
            push_text(&mut open, rest);
        } else if open.is_some() {
            push_text(&mut open, &line);
        }
    }
    flush(&mut open);

    if !saw_label {
        let text = script
            .lines()
            .map(strip_markup)
            .map(|l| l.trim().to_string())
            .filter(|l| !l.is_empty())
            .collect::<Vec<_>>()
            .join(" ");
        log::warn!("No speaker labels found in script, using it as a single turn");
        if text.is_empty() {
            return Vec::new();
        }
        return vec![Turn::new(Speaker::A, text)];
    }

    interleave(a_turns, b_turns)
}

fn push_text(open: &mut Option<(Speaker, Vec<String>)>, text: &str) {
    let text = text.trim();
    if text.is_empty() {
        return;
    }
    if let Some((_, parts)) = open.as_mut() {
        parts.push(text.to_string());
    }
}

fn interleave(a_turns: Vec<String>, b_turns: Vec<String>) -> Vec<Turn> {
    let mut turns = Vec::with_capacity(a_turns.len() + b_turns.len());
    let mut a_iter = a_turns.into_iter();
    let mut b_iter = b_turns.into_iter();
    loop {
        let a = a_iter.next();
        let b = b_iter.next();
        if a.is_none() && b.is_none() {
            break;
        }
        turns.extend(a.map(|text| Turn::new(Speaker::A, text)));
        turns.extend(b.map(|text| Turn::new(Speaker::B, text)));
    }
    turns
}

/// Remove decorative markup that LLMs like to add around dialogue:
/// emphasis markers, heading hashes and brackets around speaker labels.
fn strip_markup(line: &str) -> String {
    let line = line.trim_start();
    let line = line.trim_start_matches('#').trim_start();
    let mut out = line.replace("**", "").replace("__", "").replace('*', "");

    // "[Alex]: hi" -> "Alex: hi"
    if out.starts_with('[') {
        if let Some(close) = out.find(']') {
            if out[close + 1..].trim_start().starts_with(':') {
                let label = out[1..close].to_string();
                let rest = out[close + 1..].trim_start().to_string();
                out = format!("{label}{rest}");
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn speakers(turns: &[Turn]) -> Vec<Speaker> {
        turns.iter().map(|t| t.speaker).collect()
    }

    #[test]
    fn segments_alex_and_jamie_dialogue() {
        let turns = segment(
            "Alex: Hello there.\nJamie: Hi Alex!\nAlex: How are you?",
            &Hosts::default(),
        );
        assert_eq!(
            turns,
            vec![
                Turn::new(Speaker::A, "Hello there."),
                Turn::new(Speaker::B, "Hi Alex!"),
                Turn::new(Speaker::A, "How are you?"),
            ]
        );
    }

    #[test]
    fn balanced_labels_alternate() {
        let script = "A: one\nB: two\nA: three\nB: four\nA: five\nB: six";
        let turns = segment(script, &Hosts::default());
        assert_eq!(turns.len(), 6);
        assert_eq!(
            speakers(&turns),
            vec![
                Speaker::A,
                Speaker::B,
                Speaker::A,
                Speaker::B,
                Speaker::A,
                Speaker::B
            ]
        );
    }

    #[test]
    fn single_speaker_keeps_order_without_alternation() {
        let turns = segment("Alex: first\nAlex: second\nAlex: third", &Hosts::default());
        assert_eq!(
            turns,
            vec![
                Turn::new(Speaker::A, "first"),
                Turn::new(Speaker::A, "second"),
                Turn::new(Speaker::A, "third"),
            ]
        );
    }

    #[test]
    fn uneven_labels_are_interleaved_by_position() {
        let script = "Alex: a1\nAlex: a2\nJamie: b1\nAlex: a3";
        let turns = segment(script, &Hosts::default());
        let texts: Vec<&str> = turns.iter().map(|t| t.text.as_str()).collect();
        assert_eq!(texts, vec!["a1", "b1", "a2", "a3"]);
    }

    #[test]
    fn continuation_lines_join_with_single_spaces() {
        let script = "Jamie: So this\n   post is about\n\n  Rust.\nAlex: Nice.";
        let turns = segment(script, &Hosts::default());
        assert_eq!(
            turns,
            vec![
                Turn::new(Speaker::A, "Nice."),
                Turn::new(Speaker::B, "So this post is about Rust."),
            ]
        );
    }

    #[test]
    fn leading_unlabeled_text_is_discarded() {
        let script = "Podcast Script: Episode 1\n\nAlex: Welcome!\nJamie: Thanks.";
        let turns = segment(script, &Hosts::default());
        assert_eq!(turns.len(), 2);
        assert_eq!(turns[0].text, "Welcome!");
    }

    #[test]
    fn strips_emphasis_and_bracketed_labels() {
        let script = "**Alex:** This is *really* good.\n[Jamie]: __Agreed__.\n## Alex: Bye";
        let turns = segment(script, &Hosts::default());
        assert_eq!(
            turns,
            vec![
                Turn::new(Speaker::A, "This is really good."),
                Turn::new(Speaker::B, "Agreed."),
                Turn::new(Speaker::A, "Bye"),
            ]
        );
    }

    #[test]
    fn custom_host_names_and_case_insensitive_labels() {
        let hosts = Hosts {
            a: "Sam".to_string(),
            b: "Robin".to_string(),
        };
        let turns = segment("sam: hi\nROBIN: hey", &hosts);
        assert_eq!(speakers(&turns), vec![Speaker::A, Speaker::B]);
    }

    #[test]
    fn unlabeled_script_degrades_to_single_turn() {
        let turns = segment("Just some text\nwith no labels.", &Hosts::default());
        assert_eq!(
            turns,
            vec![Turn::new(Speaker::A, "Just some text with no labels.")]
        );
        assert!(segment("   \n\n", &Hosts::default()).is_empty());
    }

    #[test]
    fn empty_labeled_turns_are_skipped() {
        let turns = segment("Alex:\nJamie: hello", &Hosts::default());
        assert_eq!(turns, vec![Turn::new(Speaker::B, "hello")]);
    }
}
