use crate::config::Settings;
use crate::llm::error::LlmDiagnosticsError;
use crate::llm::{BackendKind, Prompt, ReasoningBackend};
use anyhow::Context;
use reqwest::header::{HeaderMap, HeaderValue};
use serde::Serialize;
use serde_json::Value;
use std::time::Duration;

const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";
const DEFAULT_MODEL: &str = "gemini-2.0-flash";
const DEFAULT_MAX_OUTPUT_TOKENS: u32 = 2048;
const DEFAULT_TIMEOUT_SECS: u64 = 60;
const TEMPERATURE: f32 = 0.7;
const TOP_P: f32 = 0.8;

const SAFETY_CATEGORIES: [&str; 4] = [
    "HARM_CATEGORY_HARASSMENT",
    "HARM_CATEGORY_HATE_SPEECH",
    "HARM_CATEGORY_SEXUALLY_EXPLICIT",
    "HARM_CATEGORY_DANGEROUS_CONTENT",
];

#[derive(Debug, Clone)]
pub struct GeminiClient {
    http: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
    max_output_tokens: u32,
}

impl GeminiClient {
    pub fn from_settings(settings: &Settings) -> anyhow::Result<Self> {
        let api_key = settings.require_google_api_key()?.to_string();
        let base_url =
            std::env::var("GEMINI_BASE_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.to_string());
        let model = std::env::var("GEMINI_MODEL").unwrap_or_else(|_| DEFAULT_MODEL.to_string());
        let max_output_tokens = std::env::var("GEMINI_MAX_OUTPUT_TOKENS")
            .ok()
            .and_then(|s| s.parse::<u32>().ok())
            .unwrap_or(DEFAULT_MAX_OUTPUT_TOKENS);

        let timeout_secs = std::env::var("GEMINI_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(DEFAULT_TIMEOUT_SECS);

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .context("failed to build reqwest client")?;

        Ok(Self {
            http,
            api_key,
            base_url,
            model,
            max_output_tokens,
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn request(&self, prompt: &Prompt) -> GenerateContentRequest {
        GenerateContentRequest {
            system_instruction: Content {
                role: None,
                parts: vec![Part {
                    text: prompt.system.clone(),
                }],
            },
            contents: vec![Content {
                role: Some("user"),
                parts: vec![Part {
                    text: prompt.user.clone(),
                }],
            }],
            generation_config: GenerationConfig {
                temperature: TEMPERATURE,
                top_p: TOP_P,
                max_output_tokens: self.max_output_tokens,
                candidate_count: 1,
            },
            safety_settings: SAFETY_CATEGORIES
                .iter()
                .map(|&category| SafetySetting {
                    category,
                    threshold: "BLOCK_MEDIUM_AND_ABOVE",
                })
                .collect(),
        }
    }

    async fn generate_content(&self, req: &GenerateContentRequest) -> anyhow::Result<Value> {
        let mut headers = HeaderMap::new();
        headers.insert("x-goog-api-key", HeaderValue::from_str(&self.api_key)?);

        let url = format!(
            "{}/v1beta/models/{}:generateContent",
            self.base_url.trim_end_matches('/'),
            self.model
        );
        let res = self
            .http
            .post(url)
            .headers(headers)
            .json(req)
            .send()
            .await
            .context("Gemini request failed")?;

        let status = res.status();
        let text = res
            .text()
            .await
            .context("failed to read Gemini response body")?;
        if !status.is_success() {
            return Err(
                LlmDiagnosticsError::new(BackendKind::Hosted, "http", format!("status={status}"))
                    .with_raw(text)
                    .into(),
            );
        }

        serde_json::from_str::<Value>(&text)
            .with_context(|| format!("failed to parse Gemini response JSON: {text}"))
    }
}

#[async_trait::async_trait]
impl ReasoningBackend for GeminiClient {
    fn kind(&self) -> BackendKind {
        BackendKind::Hosted
    }

    async fn generate(&self, prompt: &Prompt) -> anyhow::Result<String> {
        let raw = self.generate_content(&self.request(prompt)).await?;
        match normalize_response_text(&raw) {
            Some(text) => Ok(text),
            None => {
                let reason = raw
                    .pointer("/promptFeedback/blockReason")
                    .and_then(Value::as_str)
                    .unwrap_or("no text in response");
                tracing::warn!(model = %self.model, reason, "Gemini returned no usable text");
                Err(LlmDiagnosticsError {
                    backend: BackendKind::Hosted,
                    stage: "extract",
                    detail: reason.to_string(),
                    raw_output: None,
                    raw_response_json: Some(raw),
                }
                .into())
            }
        }
    }
}

/// Collapses the response shapes providers use (plain string, list of blocks, `parts`,
/// nested `candidates`) into one string. `None` when no text is present at all.
pub fn normalize_response_text(value: &Value) -> Option<String> {
    let text = raw_text(value)?;
    let text = text.trim();
    (!text.is_empty()).then(|| text.to_string())
}

fn raw_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Array(blocks) => {
            let texts: Vec<String> = blocks.iter().filter_map(raw_text).collect();
            (!texts.is_empty()).then(|| texts.concat())
        }
        Value::Object(map) => {
            if let Some(Value::String(text)) = map.get("text") {
                Some(text.clone())
            } else if let Some(parts) = map.get("parts") {
                raw_text(parts)
            } else if let Some(content) = map.get("content") {
                raw_text(content)
            } else if let Some(Value::Array(candidates)) = map.get("candidates") {
                candidates.iter().find_map(raw_text)
            } else {
                None
            }
        }
        _ => None,
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest {
    system_instruction: Content,
    contents: Vec<Content>,
    generation_config: GenerationConfig,
    safety_settings: Vec<SafetySetting>,
}

#[derive(Debug, Clone, Serialize)]
struct Content {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<&'static str>,
    parts: Vec<Part>,
}

#[derive(Debug, Clone, Serialize)]
struct Part {
    text: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    top_p: f32,
    max_output_tokens: u32,
    candidate_count: u32,
}

#[derive(Debug, Clone, Serialize)]
struct SafetySetting {
    category: &'static str,
    threshold: &'static str,
}
