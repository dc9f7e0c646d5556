//! Podcast script generation from thread content.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::script::Hosts;

#[derive(thiserror::Error, Debug)]
pub enum GenerateError {
    #[error("API key is required for script generation")]
    MissingApiKey,
    #[error("Script generation request failed: {0}")]
    Request(String),
    #[error("Script generation API error: {0}")]
    Api(String),
    #[error("No script was generated. Please try again.")]
    EmptyScript,
}

/// A discussion thread: title, body and comments in display order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Content {
    pub title: String,
    pub body_text: String,
    pub comments: Vec<String>,
}

impl Content {
    /// Keep the first `max_comments` non-empty comments, optionally dropping a
    /// leading `"<user> writes: "` attribution.
    pub fn trimmed(mut self, max_comments: usize, skip_usernames: bool) -> Self {
        self.comments = self
            .comments
            .into_iter()
            .map(|c| {
                let text = if skip_usernames {
                    c.split_once(" writes: ")
                        .map(|(_, rest)| rest.to_string())
                        .unwrap_or(c)
                } else {
                    c
                };
                text.trim().to_string()
            })
            .filter(|c| !c.is_empty())
            .take(max_comments)
            .collect();
        self
    }
}

/// System instruction sent with every generation request.
pub const SYSTEM_INSTRUCTION: &str = "You are a podcast script creator who specializes in \
converting discussion threads into entertaining dialogues between two hosts.";

/// Build the user prompt asking for a two-host dialogue about `content`.
pub fn build_prompt(content: &Content, hosts: &Hosts) -> String {
    let body = if content.body_text.trim().is_empty() {
        "(No post content available)"
    } else {
        content.body_text.trim()
    };
    let comments = if content.comments.is_empty() {
        "(No comments available)".to_string()
    } else {
        content
            .comments
            .iter()
            .enumerate()
            .map(|(i, c)| {
                let flat = c.split_whitespace().collect::<Vec<_>>().join(" ");
                format!("Comment {}: {}", i + 1, flat)
            })
            .collect::<Vec<_>>()
            .join("\n\n")
    };

    format!(
        "Create an engaging podcast script from this discussion thread. Format it as a \
conversation between two hosts named {a} and {b}. Start every line of dialogue with the \
host's name followed by a colon, like \"{a}: ...\". Make it sound natural and entertaining \
while covering these key points:

Title: {title}
Main Content: {body}
Comments: {comments}

Keep the tone conversational and include some light banter between hosts. Create a complete \
podcast discussion that explores multiple viewpoints from the comments.",
        a = hosts.a,
        b = hosts.b,
        title = content.title.trim(),
    )
}

/// Something that writes a two-host script for a thread.
#[async_trait]
pub trait ScriptGenerator: Send + Sync {
    async fn generate(&self, content: &Content, hosts: &Hosts) -> Result<String, GenerateError>;
}

/// A generator that always returns the same script, e.g. one the user wrote.
pub struct FixedScript(pub String);

#[async_trait]
impl ScriptGenerator for FixedScript {
    async fn generate(&self, _content: &Content, _hosts: &Hosts) -> Result<String, GenerateError> {
        if self.0.trim().is_empty() {
            return Err(GenerateError::EmptyScript);
        }
        Ok(self.0.clone())
    }
}

#[cfg(feature = "gemini")]
pub use gemini::Gemini;

#[cfg(feature = "gemini")]
mod gemini {
    use async_trait::async_trait;
    use serde_json::{json, Value};

    use super::{build_prompt, Content, GenerateError, ScriptGenerator, SYSTEM_INSTRUCTION};
    use crate::script::Hosts;

    const MODEL: &str = "gemini-2.0-flash";
    const API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta/models";

    /// Gemini `generateContent` client.
    pub struct Gemini {
        api_key: String,
        client: reqwest::Client,
    }

    impl Gemini {
        pub fn new(api_key: impl Into<String>) -> Result<Self, GenerateError> {
            let api_key = api_key.into();
            if api_key.trim().is_empty() {
                return Err(GenerateError::MissingApiKey);
            }
            Ok(Self {
                api_key,
                client: reqwest::Client::new(),
            })
        }
    }

    pub(super) fn request_body(prompt: &str) -> Value {
        json!({
            "contents": [{ "role": "user", "parts": [{ "text": prompt }] }],
            "systemInstruction": { "role": "user", "parts": [{ "text": SYSTEM_INSTRUCTION }] },
            "generationConfig": {
                "temperature": 0.8,
                "topK": 40,
                "topP": 0.95,
                "maxOutputTokens": 8192,
                "responseMimeType": "text/plain"
            }
        })
    }

    pub(super) fn error_message(body: &Value, status: u16) -> String {
        body.pointer("/error/message")
            .or_else(|| body.pointer("/error/details/0/message"))
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| format!("HTTP error {status}"))
    }

    pub(super) fn script_text(body: &Value) -> Result<String, GenerateError> {
        body.pointer("/candidates/0/content/parts/0/text")
            .and_then(Value::as_str)
            .filter(|t| !t.trim().is_empty())
            .map(str::to_string)
            .ok_or(GenerateError::EmptyScript)
    }

    #[async_trait]
    impl ScriptGenerator for Gemini {
        async fn generate(
            &self,
            content: &Content,
            hosts: &Hosts,
        ) -> Result<String, GenerateError> {
            log::info!(
                "Generating script for {:?} ({} comments)",
                content.title,
                content.comments.len()
            );
            let url = format!(
                "{API_BASE}/{MODEL}:generateContent?key={}",
                self.api_key
            );
            let response = self
                .client
                .post(&url)
                .json(&request_body(&build_prompt(content, hosts)))
                .send()
                .await
                .map_err(|e| GenerateError::Request(e.without_url().to_string()))?;

            let status = response.status();
            let body: Value = response
                .json()
                .await
                .map_err(|e| GenerateError::Request(e.without_url().to_string()))?;

            if !status.is_success() {
                return Err(GenerateError::Api(error_message(&body, status.as_u16())));
            }
            if let Some(reason) = body
                .pointer("/promptFeedback/blockReason")
                .and_then(Value::as_str)
            {
                log::warn!("Gemini flagged the prompt: {reason}");
            }
            script_text(&body)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn content() -> Content {
        Content {
            title: "Is Rust worth learning?".to_string(),
            body_text: "Thinking about it.".to_string(),
            comments: vec![
                "bob writes: Yes,\n\nabsolutely.".to_string(),
                "   ".to_string(),
                "alice writes: It depends.".to_string(),
                "carol writes: Third".to_string(),
            ],
        }
    }

    #[test]
    fn trims_comments_and_usernames() {
        let trimmed = content().trimmed(2, true);
        assert_eq!(trimmed.comments, vec!["Yes,\n\nabsolutely.", "It depends."]);

        let kept = content().trimmed(10, false);
        assert_eq!(kept.comments[0], "bob writes: Yes,\n\nabsolutely.");
        assert_eq!(kept.comments.len(), 3);
    }

    #[test]
    fn prompt_names_hosts_and_flattens_comments() {
        let prompt = build_prompt(&content().trimmed(10, true), &Hosts::default());
        assert!(prompt.contains("two hosts named Alex and Jamie"));
        assert!(prompt.contains("Title: Is Rust worth learning?"));
        assert!(prompt.contains("Comment 1: Yes, absolutely."));
        assert!(prompt.contains("Comment 3: Third"));
    }

    #[test]
    fn prompt_marks_missing_body_and_comments() {
        let prompt = build_prompt(&Content::default(), &Hosts::default());
        assert!(prompt.contains("(No post content available)"));
        assert!(prompt.contains("(No comments available)"));
    }

    #[tokio::test]
    async fn fixed_script_rejects_empty_text() {
        let empty = FixedScript("  ".to_string());
        assert!(matches!(
            empty.generate(&Content::default(), &Hosts::default()).await,
            Err(GenerateError::EmptyScript)
        ));
        let script = FixedScript("Alex: hi".to_string());
        assert_eq!(
            script.generate(&Content::default(), &Hosts::default()).await.unwrap(),
            "Alex: hi"
        );
    }

    #[cfg(feature = "gemini")]
    #[test]
    fn parses_gemini_responses() {
        use serde_json::json;

        let ok = json!({"candidates": [{"content": {"parts": [{"text": "Alex: hi"}]}}]});
        assert_eq!(gemini::script_text(&ok).unwrap(), "Alex: hi");
        assert!(matches!(
            gemini::script_text(&json!({"candidates": []})),
            Err(GenerateError::EmptyScript)
        ));

        let err = json!({"error": {"message": "API key not valid"}});
        assert_eq!(gemini::error_message(&err, 400), "API key not valid");
        assert_eq!(gemini::error_message(&json!({}), 503), "HTTP error 503");

        let body = gemini::request_body("prompt");
        assert_eq!(body["generationConfig"]["maxOutputTokens"], 8192);
        assert_eq!(body["contents"][0]["parts"][0]["text"], "prompt");
    }

    #[cfg(feature = "gemini")]
    #[test]
    fn gemini_requires_api_key() {
        assert!(matches!(Gemini::new(""), Err(GenerateError::MissingApiKey)));
    }
}
