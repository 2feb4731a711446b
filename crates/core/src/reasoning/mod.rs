pub mod symbol;

use crate::config::Settings;
use crate::context::MarketContext;
use crate::domain::Recommendation;
use crate::llm::gemini::GeminiClient;
use crate::llm::ollama::OllamaLoader;
use crate::llm::parse::{parse_recommendation, ParseDefaults};
use crate::llm::prompt::build_prompt;
use crate::llm::{LocalTier, ModelLoader, ReasoningBackend};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendState {
    Unselected,
    HostedConfigured,
    LocalPrimaryLoaded,
    LocalSecondaryLoaded,
    LocalTertiaryLoaded,
    LoadFailed,
}

impl BackendState {
    fn loaded(tier: LocalTier) -> Self {
        match tier {
            LocalTier::Primary => BackendState::LocalPrimaryLoaded,
            LocalTier::Secondary => BackendState::LocalSecondaryLoaded,
            LocalTier::Tertiary => BackendState::LocalTertiaryLoaded,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum LoadFailureReason {
    TimedOut(Duration),
    Failed(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct LoadFailure {
    pub tier: LocalTier,
    pub model: String,
    pub reason: LoadFailureReason,
}

impl fmt::Display for LoadFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.reason {
            LoadFailureReason::TimedOut(after) => write!(
                f,
                "{} model {} timed out after {}s",
                self.tier.as_str(),
                self.model,
                after.as_secs()
            ),
            LoadFailureReason::Failed(err) => {
                write!(f, "{} model {} failed: {err}", self.tier.as_str(), self.model)
            }
        }
    }
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum ReasoningError {
    #[error("hosted backend configuration error: {0}")]
    Config(String),

    #[error("no local model could be loaded ({})", join_failures(.failures))]
    BackendLoad { failures: Vec<LoadFailure> },

    #[error("analysis timed out after {}s", .0.as_secs())]
    Timeout(Duration),
}

fn join_failures(failures: &[LoadFailure]) -> String {
    failures
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

pub type HostedFactory = Arc<dyn Fn() -> anyhow::Result<Arc<dyn ReasoningBackend>> + Send + Sync>;

#[derive(Clone)]
pub enum BackendSelection {
    Hosted(HostedFactory),
    Local(Vec<Arc<dyn ModelLoader>>),
}

impl BackendSelection {
    pub fn from_settings(settings: &Settings) -> anyhow::Result<Self> {
        if settings.use_hosted {
            let settings = settings.clone();
            let factory: HostedFactory = Arc::new(move || -> anyhow::Result<Arc<dyn ReasoningBackend>> {
                let client = GeminiClient::from_settings(&settings)?;
                tracing::info!(model = client.model(), "hosted backend configured");
                Ok(Arc::new(client) as Arc<dyn ReasoningBackend>)
            });
            Ok(BackendSelection::Hosted(factory))
        } else {
            Ok(BackendSelection::Local(OllamaLoader::cascade(settings)?))
        }
    }
}

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub max_retries: u32,
    pub min_conviction: u8,
    pub load_timeout: Duration,
}

impl PipelineConfig {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            max_retries: settings.max_retries,
            min_conviction: settings.min_conviction,
            load_timeout: settings.load_timeout,
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self::from_settings(&Settings::default())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum AnalysisOutcome {
    Completed(Recommendation),
    TimedOut { after: Duration },
}

impl AnalysisOutcome {
    pub fn into_result(self) -> Result<Recommendation, ReasoningError> {
        match self {
            AnalysisOutcome::Completed(rec) => Ok(rec),
            AnalysisOutcome::TimedOut { after } => Err(ReasoningError::Timeout(after)),
        }
    }

    pub fn render(&self) -> String {
        match self {
            AnalysisOutcome::Completed(rec) => rec.render(),
            AnalysisOutcome::TimedOut { after } => format!(
                "⏳ Analysis timed out after {}s. Market data or the model took too long to respond; please try again.",
                after.as_secs()
            ),
        }
    }
}

#[derive(Default)]
struct Slot {
    backend: Option<Arc<dyn ReasoningBackend>>,
    failures: Vec<LoadFailure>,
}

pub struct ReasoningPipeline {
    selection: BackendSelection,
    config: PipelineConfig,
    context: Option<Arc<dyn MarketContext>>,
    // Held for the whole of configure() so concurrent first callers share one load.
    slot: Mutex<Slot>,
    state: watch::Sender<BackendState>,
    retries: AtomicU64,
}

impl ReasoningPipeline {
    pub fn new(selection: BackendSelection, config: PipelineConfig) -> Self {
        let (state, _) = watch::channel(BackendState::Unselected);
        Self {
            selection,
            config,
            context: None,
            slot: Mutex::new(Slot::default()),
            state,
            retries: AtomicU64::new(0),
        }
    }

    pub fn from_settings(settings: &Settings) -> anyhow::Result<Self> {
        Ok(Self::new(
            BackendSelection::from_settings(settings)?,
            PipelineConfig::from_settings(settings),
        ))
    }

    pub fn with_context(mut self, context: Arc<dyn MarketContext>) -> Self {
        self.context = Some(context);
        self
    }

    pub fn state(&self) -> BackendState {
        *self.state.borrow()
    }

    pub fn retry_count(&self) -> u64 {
        self.retries.load(Ordering::SeqCst)
    }

    pub async fn configure(&self) -> Result<BackendState, ReasoningError> {
        self.active_backend().await.map(|_| self.state())
    }

    pub async fn reset(&self) {
        let mut slot = self.slot.lock().await;
        *slot = Slot::default();
        self.state.send_replace(BackendState::Unselected);
        tracing::info!("reasoning backend reset");
    }

    pub async fn analyze(&self, query: &str) -> Recommendation {
        let backend = match self.active_backend().await {
            Ok(backend) => backend,
            Err(ReasoningError::Config(msg)) => {
                return Recommendation::fallback(format!("Configuration error: {msg}"));
            }
            Err(err) => {
                tracing::debug!(error = %err, "no reasoning backend; returning degraded recommendation");
                return Recommendation::model_unavailable();
            }
        };

        let kind = backend.kind();
        let defaults = ParseDefaults::for_backend(kind);
        let symbol = symbol::detect_symbol(query);
        if symbol.is_none() {
            tracing::debug!(query, "no ticker detected; skipping market context");
        }

        for attempt in 1..=self.config.max_retries {
            let context = match (&symbol, &self.context) {
                (Some(symbol), Some(source)) => Some(source.build_context(symbol).await),
                _ => None,
            };
            let prompt = build_prompt(kind, query, context.as_deref());

            match backend.generate(&prompt).await {
                Ok(text) => {
                    let rec = parse_recommendation(&text, &defaults);
                    if rec.conviction() >= self.config.min_conviction {
                        tracing::info!(
                            backend = %kind,
                            attempt,
                            action = %rec.action(),
                            conviction = rec.conviction(),
                            "recommendation accepted"
                        );
                        return rec;
                    }
                    tracing::info!(
                        backend = %kind,
                        attempt,
                        conviction = rec.conviction(),
                        min_conviction = self.config.min_conviction,
                        "conviction below threshold; retrying"
                    );
                }
                Err(err) => {
                    tracing::warn!(
                        backend = %kind,
                        attempt,
                        error = %format!("{err:#}"),
                        "backend generation failed"
                    );
                }
            }
            self.retries.fetch_add(1, Ordering::SeqCst);
        }

        tracing::warn!(
            backend = %kind,
            max_retries = self.config.max_retries,
            "accuracy gate not met; returning fallback"
        );
        Recommendation::insufficient_confidence()
    }

    /// [`analyze`](Self::analyze) bounded by `timeout`. Expiry abandons the wait without
    /// cancelling work already handed to the backend.
    pub async fn analyze_within(&self, query: &str, timeout: Duration) -> AnalysisOutcome {
        match tokio::time::timeout(timeout, self.analyze(query)).await {
            Ok(rec) => AnalysisOutcome::Completed(rec),
            Err(_) => {
                tracing::warn!(query, timeout_secs = timeout.as_secs(), "analysis timed out");
                AnalysisOutcome::TimedOut { after: timeout }
            }
        }
    }

    async fn active_backend(&self) -> Result<Arc<dyn ReasoningBackend>, ReasoningError> {
        let mut slot = self.slot.lock().await;
        if let Some(backend) = slot.backend.as_ref() {
            return Ok(Arc::clone(backend));
        }
        if self.state() == BackendState::LoadFailed {
            return Err(ReasoningError::BackendLoad {
                failures: slot.failures.clone(),
            });
        }

        match &self.selection {
            BackendSelection::Hosted(factory) => match factory() {
                Ok(backend) => {
                    slot.backend = Some(Arc::clone(&backend));
                    self.state.send_replace(BackendState::HostedConfigured);
                    Ok(backend)
                }
                Err(err) => {
                    let msg = format!("{err:#}");
                    tracing::error!(error = %msg, "hosted backend configuration failed");
                    Err(ReasoningError::Config(msg))
                }
            },
            BackendSelection::Local(loaders) => {
                let mut failures = Vec::new();
                for loader in loaders {
                    let tier = loader.tier();
                    let reason = match tokio::time::timeout(self.config.load_timeout, loader.load()).await {
                        Ok(Ok(backend)) => {
                            slot.backend = Some(Arc::clone(&backend));
                            self.state.send_replace(BackendState::loaded(tier));
                            tracing::info!(tier = tier.as_str(), model = loader.model_name(), "reasoning backend ready");
                            return Ok(backend);
                        }
                        Ok(Err(err)) => LoadFailureReason::Failed(format!("{err:#}")),
                        Err(_) => LoadFailureReason::TimedOut(self.config.load_timeout),
                    };
                    let failure = LoadFailure {
                        tier,
                        model: loader.model_name().to_string(),
                        reason,
                    };
                    tracing::warn!(failure = %failure, "model load failed; trying next tier");
                    failures.push(failure);
                }

                tracing::error!(attempts = failures.len(), "every local model failed to load; entering degraded mode");
                slot.failures = failures.clone();
                self.state.send_replace(BackendState::LoadFailed);
                Err(ReasoningError::BackendLoad { failures })
            }
        }
    }
}
