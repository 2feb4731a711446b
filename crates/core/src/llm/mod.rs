pub mod error;
pub mod gemini;
pub mod ollama;
pub mod parse;
pub mod prompt;

use std::fmt;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LocalTier {
    Primary,
    Secondary,
    Tertiary,
}

impl LocalTier {
    pub const CASCADE: [LocalTier; 3] = [LocalTier::Primary, LocalTier::Secondary, LocalTier::Tertiary];

    pub fn as_str(self) -> &'static str {
        match self {
            LocalTier::Primary => "primary",
            LocalTier::Secondary => "secondary",
            LocalTier::Tertiary => "tertiary",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BackendKind {
    Hosted,
    Local(LocalTier),
}

impl BackendKind {
    pub fn default_conviction(self) -> u8 {
        match self {
            BackendKind::Hosted | BackendKind::Local(LocalTier::Primary) => 50,
            BackendKind::Local(LocalTier::Secondary | LocalTier::Tertiary) => 60,
        }
    }

    pub fn display_name(self) -> &'static str {
        match self {
            BackendKind::Hosted => "hosted Gemini model",
            BackendKind::Local(LocalTier::Primary) => "local quantized model",
            BackendKind::Local(LocalTier::Secondary) => "local full-precision model",
            BackendKind::Local(LocalTier::Tertiary) => "local ultra-small model",
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendKind::Hosted => f.write_str("hosted"),
            BackendKind::Local(tier) => write!(f, "local-{}", tier.as_str()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prompt {
    pub system: String,
    pub user: String,
}

#[async_trait::async_trait]
pub trait ReasoningBackend: Send + Sync {
    fn kind(&self) -> BackendKind;

    async fn generate(&self, prompt: &Prompt) -> anyhow::Result<String>;
}

#[async_trait::async_trait]
pub trait ModelLoader: Send + Sync {
    fn tier(&self) -> LocalTier;

    fn model_name(&self) -> &str;

    async fn load(&self) -> anyhow::Result<Arc<dyn ReasoningBackend>>;
}
