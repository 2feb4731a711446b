use crate::browser::chromium::ChromiumLauncher;
use crate::browser::driver::BrowserLauncher;
use crate::browser::{BrowserSession, BrowserSessionConfig};
use crate::config::Settings;
use crate::context::MarketContextAggregator;
use crate::reasoning::{BackendSelection, PipelineConfig, ReasoningPipeline};
use crate::tools::news::{DuckDuckGoNews, NewsSearch};
use crate::tools::ToolDispatcher;
use std::sync::Arc;

pub struct TradeDesk {
    pub browser: Arc<BrowserSession>,
    pub tools: Arc<ToolDispatcher>,
    pub reasoner: Arc<ReasoningPipeline>,
}

impl TradeDesk {
    pub fn from_settings(settings: &Settings) -> anyhow::Result<Self> {
        Self::with_launcher(Arc::new(ChromiumLauncher::from_env()), settings)
    }

    pub fn assemble(
        browser: Arc<BrowserSession>,
        news: Arc<dyn NewsSearch>,
        selection: BackendSelection,
        config: PipelineConfig,
    ) -> Self {
        let tools = Arc::new(ToolDispatcher::new(Arc::clone(&browser), news));
        let context = Arc::new(MarketContextAggregator::new(Arc::clone(&tools)));
        let reasoner = Arc::new(ReasoningPipeline::new(selection, config).with_context(context));
        Self {
            browser,
            tools,
            reasoner,
        }
    }

    pub fn with_launcher(
        launcher: Arc<dyn BrowserLauncher>,
        settings: &Settings,
    ) -> anyhow::Result<Self> {
        let browser = Arc::new(BrowserSession::new(
            launcher,
            BrowserSessionConfig::from_settings(settings),
        ));
        let news = Arc::new(DuckDuckGoNews::new(Arc::clone(&browser)));
        Ok(Self::assemble(
            browser,
            news,
            BackendSelection::from_settings(settings)?,
            PipelineConfig::from_settings(settings),
        ))
    }

    pub async fn shutdown(&self) {
        self.browser.close().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::browser::testing::{FakeLauncher, FakePage};
    use crate::domain::Recommendation;
    use crate::reasoning::BackendState;
    use crate::tools::ToolOutput;
    use serde_json::json;

    #[tokio::test]
    async fn empty_cascade_degrades_but_tools_still_work() {
        let browser = Arc::new(BrowserSession::new(
            Arc::new(FakeLauncher::with_page(FakePage::default())),
            BrowserSessionConfig::default(),
        ));
        let news = Arc::new(DuckDuckGoNews::new(Arc::clone(&browser)));
        let desk = TradeDesk::assemble(
            browser,
            news,
            BackendSelection::Local(Vec::new()),
            PipelineConfig::default(),
        );

        assert_eq!(desk.reasoner.analyze("AAPL?").await, Recommendation::model_unavailable());
        assert_eq!(desk.reasoner.state(), BackendState::LoadFailed);

        let out = desk
            .tools
            .dispatch("message_history", &json!({"limit": 2}))
            .await
            .unwrap();
        assert!(matches!(out, ToolOutput::History(ref msgs) if msgs.len() == 2));

        desk.shutdown().await;
        desk.shutdown().await;
    }
}
