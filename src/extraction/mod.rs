//! Structured receipt extraction through a chat-completion model.
//!
//! The model is asked for JSON but nothing guarantees it; the first balanced
//! `{...}` in the reply is taken as the answer.

mod client;

use std::sync::Arc;

use serde_json::Value;
use thiserror::Error;
use time::Date;
use tracing::{debug, warn};

pub use client::{ChatMessage, Completion, LlmClient, OpenAiClient};

const SYSTEM_PROMPT: &str = "You are an intelligent receipt parser.";

#[derive(Error, Debug)]
pub enum ExtractionError {
    #[error("language model request failed: {0}")]
    Api(String),

    #[error("language model returned no choices")]
    NoChoices,

    #[error("no JSON object found in model output")]
    NoJsonObject,

    #[error("model output is not valid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),
}

pub struct StructuredExtractor {
    client: Arc<dyn LlmClient>,
    fallback_date: Date,
}

impl StructuredExtractor {
    pub fn new(client: Arc<dyn LlmClient>, fallback_date: Date) -> Self {
        Self {
            client,
            fallback_date,
        }
    }

    /// Ask the model for the receipt fields and return the JSON object it produced.
    pub async fn extract(&self, ocr_text: &str) -> Result<Value, ExtractionError> {
        let messages = vec![
            ChatMessage::system(SYSTEM_PROMPT),
            ChatMessage::user(build_prompt(ocr_text, self.fallback_date)),
        ];

        let completion = self.client.complete(messages).await?;
        let content = completion
            .choices
            .into_iter()
            .next()
            .ok_or(ExtractionError::NoChoices)?;
        debug!(model = ?completion.model, chars = content.len(), "model output received");

        let Some(object) = find_json_object(&content) else {
            warn!(output = %content, "no JSON object in model output");
            return Err(ExtractionError::NoJsonObject);
        };
        Ok(serde_json::from_str(object)?)
    }
}

pub fn build_prompt(ocr_text: &str, fallback_date: Date) -> String {
    format!(
        r#"You will be given raw OCR text from a receipt. Extract the following fields and return them as strict JSON:

{{
  "merchant": string,
  "date": string (YYYY-MM-DD),
  "items": [{{ "name": string, "quantity": int, "price": float }}],
  "total": float
}}

Respond with only valid JSON.

If the receipt date is missing, set "date" to "{fallback}".

Text:
---
{text}
"#,
        fallback = fallback_date,
        text = ocr_text.trim(),
    )
}

/// First top-level balanced `{...}` in `s`. Braces inside JSON string
/// literals are ignored.
pub fn find_json_object(s: &str) -> Option<&str> {
    let start = s.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, ch) in s[start..].char_indices() {
        if in_string {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&s[start..start + offset + 1]);
                }
            }
            _ => {}
        }
    }
    None
}


#[cfg(test)]
mod tests {
    use super::fakes::CannedLlm;
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn extractor(llm: CannedLlm) -> (Arc<CannedLlm>, StructuredExtractor) {
        let llm = Arc::new(llm);
        let ex = StructuredExtractor::new(llm.clone(), time::macros::date!(2025 - 08 - 02));
        (llm, ex)
    }

    #[test]
    fn finds_object_wrapped_in_prose_and_fences() {
        let out = "Sure! Here you go:\n```json\n{\"merchant\": \"Cafe {Blue}\", \"total\": 3.5}\n```\nAnything else? {not json}";
        assert_eq!(
            find_json_object(out),
            Some("{\"merchant\": \"Cafe {Blue}\", \"total\": 3.5}")
        );
    }

    #[test]
    fn handles_nesting_and_escaped_quotes() {
        let out = r#"{"a": {"b": "say \"}\""}, "c": [1, {"d": 2}]} trailing"#;
        assert_eq!(
            find_json_object(out),
            Some(r#"{"a": {"b": "say \"}\""}, "c": [1, {"d": 2}]}"#)
        );
    }

    #[test]
    fn none_without_balanced_object() {
        assert_eq!(find_json_object("no json here"), None);
        assert_eq!(find_json_object("{\"unterminated\": 1"), None);
        assert_eq!(find_json_object("} stray close"), None);
    }

    #[test]
    fn prompt_embeds_trimmed_text_and_fallback() {
        let p = build_prompt("  ACME MART\nTOTAL 4.20 \n", time::macros::date!(2025 - 08 - 02));
        assert!(p.contains("---\nACME MART\nTOTAL 4.20\n"));
        assert!(p.contains(r#"set "date" to "2025-08-02""#));
        assert!(p.contains(r#""items": [{ "name": string"#));
    }

    #[tokio::test]
    async fn extracts_first_object() {
        let (llm, ex) = extractor(CannedLlm::replying(
            "```json\n{\"merchant\":\"ACME\",\"date\":\"2024-01-05\",\"items\":[],\"total\":0}\n```",
        ));
        let v = ex.extract("ACME").await.unwrap();
        assert_eq!(
            v,
            json!({"merchant": "ACME", "date": "2024-01-05", "items": [], "total": 0})
        );

        let seen = llm.seen.lock().unwrap();
        assert_eq!(seen[0][0], ChatMessage::system(SYSTEM_PROMPT));
        assert!(seen[0][1].content.contains("ACME"));
    }

    #[tokio::test]
    async fn no_choices_is_typed() {
        let (_, ex) = extractor(CannedLlm::with_choices(vec![]));
        assert!(matches!(ex.extract("x").await, Err(ExtractionError::NoChoices)));
    }

    #[tokio::test]
    async fn prose_only_reply_is_typed() {
        let (_, ex) = extractor(CannedLlm::replying("I could not read this receipt."));
        assert!(matches!(ex.extract("x").await, Err(ExtractionError::NoJsonObject)));
    }

    #[tokio::test]
    async fn malformed_object_is_typed() {
        let (_, ex) = extractor(CannedLlm::replying("{\"merchant\": ACME}"));
        assert!(matches!(ex.extract("x").await, Err(ExtractionError::InvalidJson(_))));
    }

    #[tokio::test]
    async fn api_failure_propagates() {
        let (_, ex) = extractor(CannedLlm::failing("provider returned 429"));
        assert!(matches!(ex.extract("x").await, Err(ExtractionError::Api(_))));
    }
}
