//! Model provider contract (§6): the one seam where an LLM call enters the
//! pipeline, plus a deterministic fallback so the rest of the engine never
//! has to special-case a parse failure.

use async_trait::async_trait;

use crate::error::{MemoryError, Result};
use crate::types::{Classification, Importance};

#[derive(Debug, Clone)]
pub struct ChatTurn {
    pub user_input: String,
    pub ai_output: String,
    pub namespace: String,
}

/// Fields a provider is expected to return for one chat turn, lifted
/// straight onto a [`crate::types::MemoryRecord`] by the caller.
#[derive(Debug, Clone, serde::Deserialize)]
pub struct ExtractedMemory {
    pub content: String,
    pub summary: String,
    pub classification: String,
    pub importance: String,
    pub topic: Option<String>,
    #[serde(default)]
    pub entities: Vec<String>,
    #[serde(default)]
    pub keywords: Vec<String>,
    #[serde(rename = "confidenceScore", alias = "confidence_score", default = "default_confidence")]
    pub confidence_score: f64,
    #[serde(rename = "classificationReason", alias = "classification_reason", default)]
    pub classification_reason: String,
}

fn default_confidence() -> f64 {
    0.5
}

/// A pluggable chat-completion backend. Exactly the seam the teacher's
/// `embedding::EmbeddingProvider` trait occupies — one async method, swapped
/// out freely between a live API client and a test double.
#[async_trait]
pub trait ModelProvider: Send + Sync {
    async fn chat_completion(&self, turn: &ChatTurn) -> Result<String>;
}

/// Always errors. Used when no provider is configured and the caller wants
/// extraction to fall through to [`fallback_extraction`] every time.
pub struct NullProvider;

#[async_trait]
impl ModelProvider for NullProvider {
    async fn chat_completion(&self, _turn: &ChatTurn) -> Result<String> {
        Err(MemoryError::Config("no model provider configured".into()))
    }
}

/// Returns a fixed canned response regardless of input. Used by tests that
/// need a provider but not a real model call.
pub struct StaticProvider {
    pub response: String,
}

#[async_trait]
impl ModelProvider for StaticProvider {
    async fn chat_completion(&self, _turn: &ChatTurn) -> Result<String> {
        Ok(self.response.clone())
    }
}

/// Strip a fenced code block if present, then take the first balanced
/// `{...}` substring — tolerates a model wrapping JSON in prose or
/// markdown, which real responses do often enough to need handling.
fn extract_json_object(raw: &str) -> Option<&str> {
    let text = raw.trim();
    let text = text
        .strip_prefix("```json")
        .or_else(|| text.strip_prefix("```"))
        .map(|s| s.trim())
        .unwrap_or(text);
    let text = text.strip_suffix("```").map(|s| s.trim()).unwrap_or(text);

    let start = text.find('{')?;
    let mut depth = 0i32;
    for (offset, ch) in text[start..].char_indices() {
        match ch {
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..start + offset + 1]);
                }
            }
            _ => {}
        }
    }
    None
}

/// Parse a provider's raw response into an [`ExtractedMemory`], normalizing
/// classification/importance case before validation.
pub fn parse_response(raw: &str) -> Result<ExtractedMemory> {
    let json = extract_json_object(raw).ok_or_else(|| MemoryError::Parse("no JSON object found in response".into()))?;
    let mut parsed: ExtractedMemory = serde_json::from_str(json).map_err(|e| MemoryError::Parse(e.to_string()))?;
    parsed.classification = parsed.classification.to_lowercase();
    parsed.importance = parsed.importance.to_lowercase();
    parsed.classification.parse::<Classification>().map_err(MemoryError::Parse)?;
    parsed.importance.parse::<Importance>().map_err(MemoryError::Parse)?;
    Ok(parsed)
}

/// Deterministic record built when a provider call fails or its response
/// can't be parsed — the pipeline always produces a record, never drops
/// a chat turn silently.
pub fn fallback_extraction(turn: &ChatTurn) -> ExtractedMemory {
    let content = format!("{} {}", turn.user_input, turn.ai_output);
    let summary: String = content.chars().take(100).collect();
    let summary = if content.chars().count() > 100 { format!("{summary}...") } else { summary };
    ExtractedMemory {
        content,
        summary,
        classification: "conversational".to_string(),
        importance: "medium".to_string(),
        topic: None,
        entities: vec![],
        keywords: vec![],
        confidence_score: 0.5,
        classification_reason: "Fallback processing due to error".to_string(),
    }
}
