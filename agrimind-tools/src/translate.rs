//! Translation tool backed by the configured LLM provider.
//!
//! The target language comes from the `target_language` argument or from a
//! phrase in the input ("into Hindi", "to Marathi"); the instruction itself
//! is removed before the text is sent to the model.

use agrimind_core::brain::{Brain, LlmProvider, ThinkOptions};
use agrimind_core::error::ToolError;
use agrimind_core::registry::{Tool, require_text_input};
use agrimind_core::types::{Message, ToolOutput};
use async_trait::async_trait;
use regex::Regex;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

const DEFAULT_LANGUAGE: &str = "English";

/// Languages recognised in free-text requests.
pub const LANGUAGES: &[&str] = &[
    "hindi", "marathi", "tamil", "telugu", "bengali", "kannada", "gujarati", "punjabi",
    "malayalam", "odia", "urdu", "english", "french", "spanish", "swahili", "german",
    "portuguese",
];

/// A translation request split into target language and source text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranslationRequest {
    pub target_language: Option<String>,
    pub text: String,
}

/// Splits "Translate 'x' into Hindi" style requests.
pub struct RequestParser {
    language: Option<Regex>,
    instruction: Option<Regex>,
    header: Option<Regex>,
    header_language: Option<Regex>,
    verb: Option<Regex>,
}

impl RequestParser {
    pub fn new() -> Self {
        let language = Regex::new(&format!(
            r"(?i)\b(?:to|into|in)\s+({})\b",
            LANGUAGES.join("|")
        ))
        .ok();
        let instruction = Regex::new(r"(?i)^\s*(?:please\s+)?translate\b").ok();
        // The colon must close the instruction, before any quoted text.
        let header = Regex::new(
            "(?i)^\\s*(?:please\\s+)?translate\\b[^:\\n'\"\u{201c}\u{2018}]*:",
        )
        .ok();
        // Any one- or two-word language name may follow the last "into".
        let header_language = Regex::new(
            r"(?i)^.*\b(?:to|into|in)\s+(\p{L}[\p{L}\-]*(?:\s+\p{L}[\p{L}\-]*)?)\s*:$",
        )
        .ok();
        let verb = Regex::new(
            r"(?i)^\s*(?:please\s+)?translate(?:\s+(?:this|the\s+following)(?:\s+(?:text|sentence|phrase|word))?)?\s*",
        )
        .ok();
        Self {
            language,
            instruction,
            header,
            header_language,
            verb,
        }
    }

    pub fn parse(&self, input: &str) -> TranslationRequest {
        let trimmed = input.trim();
        let target_language = self
            .language
            .as_ref()
            .and_then(|re| re.captures(trimmed))
            .and_then(|c| c.get(1))
            .map(|m| capitalize(m.as_str()));

        // "Translate the following text into Hindi:\n<text>"
        if let Some(header) = self.header.as_ref().and_then(|re| re.find(trimmed)) {
            let body = &trimmed[header.end()..];
            if !body.trim().is_empty() {
                let header_language = self
                    .header_language
                    .as_ref()
                    .and_then(|re| re.captures(header.as_str()))
                    .and_then(|c| c.get(1))
                    .map(|m| capitalize(m.as_str()));
                return TranslationRequest {
                    target_language: header_language.or(target_language),
                    text: strip_quotes(body),
                };
            }
        }

        let is_instruction = self
            .instruction
            .as_ref()
            .is_some_and(|re| re.is_match(trimmed));
        let mut text = trimmed.to_string();
        if target_language.is_some()
            && let Some(re) = &self.language
        {
            text = re.replacen(&text, 1, "").into_owned();
        }
        if is_instruction && let Some(re) = &self.verb {
            text = re.replacen(&text, 1, "").into_owned();
        }
        TranslationRequest {
            target_language,
            text: strip_quotes(&text),
        }
    }
}

impl Default for RequestParser {
    fn default() -> Self {
        Self::new()
    }
}

fn capitalize(name: &str) -> String {
    name.split_whitespace()
        .map(|word| {
            let lower = word.to_lowercase();
            let mut chars = lower.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<String>>()
        .join(" ")
}

fn strip_quotes(text: &str) -> String {
    text.trim()
        .trim_matches(|c: char| matches!(c, '"' | '\'' | '\u{201c}' | '\u{201d}' | '\u{2018}' | '\u{2019}'))
        .trim()
        .to_string()
}

/// Translates text between languages.
pub struct TranslateTool {
    provider: Arc<dyn LlmProvider>,
    parser: RequestParser,
    max_retries: usize,
    timeout: Duration,
}

impl TranslateTool {
    pub fn new(provider: Arc<dyn LlmProvider>) -> Self {
        Self {
            provider,
            parser: RequestParser::new(),
            max_retries: 2,
            timeout: Duration::from_secs(60),
        }
    }

    pub fn with_max_retries(mut self, max_retries: usize) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[async_trait]
impl Tool for TranslateTool {
    fn name(&self) -> &str {
        "translate"
    }

    fn description(&self) -> &str {
        "Translate text into another language, e.g. 'Translate \"wheat rust\" into Hindi'. \
         Defaults to English when no target language is given."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "input": { "type": "string", "description": "Text to translate, optionally with 'into <language>'" },
                "target_language": { "type": "string", "description": "Language to translate into" }
            },
            "required": ["input"]
        })
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }

    async fn execute(&self, args: serde_json::Value) -> Result<ToolOutput, ToolError> {
        let input = require_text_input(self.name(), &args)?;
        let request = self.parser.parse(&input);
        let language = args
            .get("target_language")
            .and_then(|v| v.as_str())
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
            .map(capitalize)
            .or(request.target_language)
            .unwrap_or_else(|| DEFAULT_LANGUAGE.to_string());

        if request.text.is_empty() {
            return Err(ToolError::InvalidArguments {
                name: self.name().to_string(),
                reason: "nothing to translate".to_string(),
            });
        }

        let system = format!(
            "You translate agricultural text for farmers. Translate the user's text into \
             {language}. Keep crop, pest and chemical names accurate. Reply with the translation only."
        );
        let mut brain = Brain::new(Arc::clone(&self.provider), system);
        let response = brain
            .think_with_retry(
                &[Message::user(request.text.as_str())],
                &ThinkOptions::default().with_temperature(0.2),
                self.max_retries,
            )
            .await
            .map_err(|e| ToolError::ExecutionFailed {
                name: self.name().to_string(),
                message: e.to_string(),
            })?;

        debug!(%language, chars = request.text.len(), "Translated text");
        Ok(ToolOutput::text(response.text().trim())
            .with_metadata("target_language", serde_json::json!(language)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agrimind_core::brain::MockLlmProvider;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parse_quoted_phrase() {
        let req = RequestParser::new().parse("Translate 'wheat rust' into Hindi");
        assert_eq!(req.target_language.as_deref(), Some("Hindi"));
        assert_eq!(req.text, "wheat rust");
    }

    #[test]
    fn test_parse_instruction_with_colon() {
        let req = RequestParser::new()
            .parse("Translate the following text into Marathi:\nSow wheat in November.");
        assert_eq!(req.target_language.as_deref(), Some("Marathi"));
        assert_eq!(req.text, "Sow wheat in November.");
    }

    #[test]
    fn test_parse_plain_text_without_language() {
        let req = RequestParser::new().parse("धान की खेती");
        assert_eq!(req.target_language, None);
        assert_eq!(req.text, "धान की खेती");
    }

    #[test]
    fn test_parse_translate_this() {
        let req = RequestParser::new().parse("please translate this sentence to tamil: \"use neem oil\"");
        assert_eq!(req.target_language.as_deref(), Some("Tamil"));
        assert_eq!(req.text, "use neem oil");
    }

    #[test]
    fn test_parse_keeps_colon_inside_quoted_text() {
        let req = RequestParser::new().parse("Translate 'Mix urea and DAP in 1:2 ratio' into Hindi");
        assert_eq!(req.target_language.as_deref(), Some("Hindi"));
        assert_eq!(req.text, "Mix urea and DAP in 1:2 ratio");
    }

    #[test]
    fn test_parse_instruction_accepts_unlisted_language() {
        let parser = RequestParser::new();
        let req = parser.parse("Translate the following text into Japanese:\nSow wheat in November.");
        assert_eq!(req.target_language.as_deref(), Some("Japanese"));
        assert_eq!(req.text, "Sow wheat in November.");

        let req = parser.parse("Translate into brazilian portuguese: Apply 2:1 NPK");
        assert_eq!(req.target_language.as_deref(), Some("Brazilian Portuguese"));
        assert_eq!(req.text, "Apply 2:1 NPK");
    }

    #[tokio::test]
    async fn test_translate_sends_text_and_language() {
        let mock = Arc::new(MockLlmProvider::with_responses(["गेहूं का रतुआ"]));
        let tool = TranslateTool::new(mock.clone());
        let output = tool
            .execute(serde_json::json!({"input": "Translate 'wheat rust' into Hindi"}))
            .await
            .unwrap();
        assert_eq!(output.content, "गेहूं का रतुआ");
        assert_eq!(output.metadata["target_language"], "Hindi");

        let request = &mock.recorded_requests()[0];
        assert!(request.messages[0].content.contains("into Hindi"));
        assert_eq!(request.messages[1].content, "wheat rust");
    }

    #[tokio::test]
    async fn test_translate_explicit_language_and_default() {
        let mock = Arc::new(MockLlmProvider::with_responses(["a", "b"]));
        let tool = TranslateTool::new(mock.clone());
        let first = tool
            .execute(serde_json::json!({"input": "kharif", "target_language": "swahili"}))
            .await
            .unwrap();
        assert_eq!(first.metadata["target_language"], "Swahili");
        let second = tool
            .execute(serde_json::json!({"input": "kharif"}))
            .await
            .unwrap();
        assert_eq!(second.metadata["target_language"], "English");
    }

    #[tokio::test]
    async fn test_translate_pipeline_style_input_keeps_language() {
        let mock = Arc::new(MockLlmProvider::with_responses(["11月に小麦を播く。"]));
        let tool = TranslateTool::new(mock.clone());
        let output = tool
            .execute(serde_json::json!({
                "input": "Translate the following text into Japanese:\nSow wheat in November."
            }))
            .await
            .unwrap();
        assert_eq!(output.metadata["target_language"], "Japanese");
        let request = &mock.recorded_requests()[0];
        assert!(request.messages[0].content.contains("into Japanese"));
        assert_eq!(request.messages[1].content, "Sow wheat in November.");
    }

    #[tokio::test]
    async fn test_translate_instruction_only_is_invalid() {
        let tool = TranslateTool::new(Arc::new(MockLlmProvider::new()));
        let err = tool
            .execute(serde_json::json!({"input": "translate into Hindi"}))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::InvalidArguments { .. }));
    }
}
