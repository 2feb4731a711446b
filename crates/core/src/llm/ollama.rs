use crate::config::Settings;
use crate::llm::error::LlmDiagnosticsError;
use crate::llm::{BackendKind, LocalTier, ModelLoader, Prompt, ReasoningBackend};
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

const DEFAULT_KEEP_ALIVE: &str = "30m";
const DEFAULT_GENERATE_TIMEOUT_SECS: u64 = 120;

fn default_model(tier: LocalTier) -> &'static str {
    match tier {
        LocalTier::Primary => "llama3:8b-instruct-q4_K_M",
        LocalTier::Secondary => "phi3:3.8b-mini-4k-instruct-fp16",
        LocalTier::Tertiary => "tinyllama:1.1b",
    }
}

fn model_env(tier: LocalTier) -> &'static str {
    match tier {
        LocalTier::Primary => "OLLAMA_PRIMARY_MODEL",
        LocalTier::Secondary => "OLLAMA_SECONDARY_MODEL",
        LocalTier::Tertiary => "OLLAMA_TERTIARY_MODEL",
    }
}

fn options(tier: LocalTier) -> GenerateOptions {
    match tier {
        LocalTier::Primary => GenerateOptions {
            temperature: 0.5,
            top_p: 0.9,
            num_predict: 256,
        },
        LocalTier::Secondary => GenerateOptions {
            temperature: 0.7,
            top_p: 0.9,
            num_predict: 192,
        },
        LocalTier::Tertiary => GenerateOptions {
            temperature: 0.7,
            top_p: 0.9,
            num_predict: 128,
        },
    }
}

#[derive(Debug, Clone)]
pub struct OllamaLoader {
    http: reqwest::Client,
    host: String,
    model: String,
    tier: LocalTier,
    keep_alive: String,
    generate_timeout: Duration,
}

impl OllamaLoader {
    pub fn cascade(settings: &Settings) -> anyhow::Result<Vec<Arc<dyn ModelLoader>>> {
        let http = reqwest::Client::builder()
            .build()
            .context("failed to build reqwest client")?;
        let keep_alive =
            std::env::var("OLLAMA_KEEP_ALIVE").unwrap_or_else(|_| DEFAULT_KEEP_ALIVE.to_string());
        let generate_timeout = Duration::from_secs(
            std::env::var("OLLAMA_GENERATE_TIMEOUT_SECS")
                .ok()
                .and_then(|s| s.parse::<u64>().ok())
                .unwrap_or(DEFAULT_GENERATE_TIMEOUT_SECS),
        );

        Ok(LocalTier::CASCADE
            .iter()
            .map(|&tier| {
                let model = std::env::var(model_env(tier))
                    .unwrap_or_else(|_| default_model(tier).to_string());
                Arc::new(OllamaLoader {
                    http: http.clone(),
                    host: settings.ollama_host.trim_end_matches('/').to_string(),
                    model,
                    tier,
                    keep_alive: keep_alive.clone(),
                    generate_timeout,
                }) as Arc<dyn ModelLoader>
            })
            .collect())
    }

    fn generate_url(&self) -> String {
        format!("{}/api/generate", self.host)
    }
}

#[async_trait::async_trait]
impl ModelLoader for OllamaLoader {
    fn tier(&self) -> LocalTier {
        self.tier
    }

    fn model_name(&self) -> &str {
        &self.model
    }

    async fn load(&self) -> anyhow::Result<Arc<dyn ReasoningBackend>> {
        let kind = BackendKind::Local(self.tier);
        let req = GenerateRequest {
            model: &self.model,
            system: None,
            prompt: "",
            stream: false,
            keep_alive: &self.keep_alive,
            options: None,
        };
        let res = self
            .http
            .post(self.generate_url())
            .json(&req)
            .send()
            .await
            .with_context(|| format!("Ollama unreachable at {}", self.host))?;

        let status = res.status();
        if !status.is_success() {
            let text = res.text().await.unwrap_or_default();
            return Err(LlmDiagnosticsError::new(kind, "load", format!("status={status}"))
                .with_raw(text)
                .into());
        }

        tracing::info!(model = %self.model, tier = self.tier.as_str(), "local model loaded");
        Ok(Arc::new(OllamaBackend {
            loader: self.clone(),
        }))
    }
}

pub struct OllamaBackend {
    loader: OllamaLoader,
}

#[async_trait::async_trait]
impl ReasoningBackend for OllamaBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Local(self.loader.tier)
    }

    async fn generate(&self, prompt: &Prompt) -> anyhow::Result<String> {
        let loader = &self.loader;
        let req = GenerateRequest {
            model: &loader.model,
            system: Some(&prompt.system),
            prompt: &prompt.user,
            stream: false,
            keep_alive: &loader.keep_alive,
            options: Some(options(loader.tier)),
        };
        let res = loader
            .http
            .post(loader.generate_url())
            .timeout(loader.generate_timeout)
            .json(&req)
            .send()
            .await
            .context("Ollama generate request failed")?;

        let status = res.status();
        let text = res
            .text()
            .await
            .context("failed to read Ollama response body")?;
        if !status.is_success() {
            return Err(LlmDiagnosticsError::new(self.kind(), "http", format!("status={status}"))
                .with_raw(text)
                .into());
        }

        let parsed = serde_json::from_str::<GenerateResponse>(&text)
            .with_context(|| format!("failed to decode Ollama response: {text}"))?;
        if !parsed.done {
            tracing::warn!(model = %loader.model, "Ollama response not marked done");
        }
        Ok(parsed.response)
    }
}

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<&'a str>,
    prompt: &'a str,
    stream: bool,
    keep_alive: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    options: Option<GenerateOptions>,
}

#[derive(Debug, Clone, Copy, Serialize)]
struct GenerateOptions {
    temperature: f32,
    top_p: f32,
    num_predict: u32,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    response: String,
    #[serde(default)]
    done: bool,
}
