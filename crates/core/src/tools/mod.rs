pub mod insider;
pub mod news;
pub mod quote;
pub mod stubs;

use crate::browser::BrowserSession;
use crate::domain::{EmotionReading, HistoryMessage, InsiderTransaction, NewsItem, QuoteResult};
use news::NewsSearch;
use serde::Serialize;
use serde_json::{json, Value};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolName {
    ScrapeInsider,
    ScrapeQuote,
    NewsSearch,
    AudioEmotion,
    MessageHistory,
}

impl ToolName {
    pub const ALL: [ToolName; 5] = [
        ToolName::ScrapeInsider,
        ToolName::ScrapeQuote,
        ToolName::NewsSearch,
        ToolName::AudioEmotion,
        ToolName::MessageHistory,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ToolName::ScrapeInsider => "scrape_insider",
            ToolName::ScrapeQuote => "scrape_quote",
            ToolName::NewsSearch => "news_search",
            ToolName::AudioEmotion => "audio_emotion",
            ToolName::MessageHistory => "message_history",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            ToolName::ScrapeInsider => "Recent insider transactions for a ticker",
            ToolName::ScrapeQuote => "Current quote snapshot for a ticker",
            ToolName::NewsSearch => "Web news search for a query",
            ToolName::AudioEmotion => "Emotion detected in an audio file (stubbed)",
            ToolName::MessageHistory => "Recent chat messages (stubbed)",
        }
    }

    pub fn argument(&self) -> &'static str {
        match self {
            ToolName::ScrapeInsider | ToolName::ScrapeQuote => "symbol",
            ToolName::NewsSearch => "query",
            ToolName::AudioEmotion => "file",
            ToolName::MessageHistory => "limit",
        }
    }
}

impl fmt::Display for ToolName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ToolName {
    type Err = ToolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "scrape_insider" | "browser_scrape_openinsider" => Ok(ToolName::ScrapeInsider),
            "scrape_quote" | "browser_scrape_yahoo" => Ok(ToolName::ScrapeQuote),
            "news_search" | "ddg_news" => Ok(ToolName::NewsSearch),
            "audio_emotion" => Ok(ToolName::AudioEmotion),
            "message_history" | "telegram_history" => Ok(ToolName::MessageHistory),
            other => Err(ToolError::UnknownTool(other.to_string())),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    #[error("unknown tool: {0} (available: scrape_insider, scrape_quote, news_search, audio_emotion, message_history)")]
    UnknownTool(String),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ToolOutput {
    Insider(Vec<InsiderTransaction>),
    Quote(QuoteResult),
    News(Vec<NewsItem>),
    Emotion(EmotionReading),
    History(Vec<HistoryMessage>),
}

pub fn tool_specs() -> Value {
    Value::Array(
        ToolName::ALL
            .iter()
            .map(|tool| {
                json!({
                    "name": tool.as_str(),
                    "description": tool.description(),
                    "args": [tool.argument()],
                })
            })
            .collect(),
    )
}

pub struct ToolDispatcher {
    browser: Arc<BrowserSession>,
    news: Arc<dyn NewsSearch>,
}

impl ToolDispatcher {
    pub fn new(browser: Arc<BrowserSession>, news: Arc<dyn NewsSearch>) -> Self {
        Self { browser, news }
    }

    pub async fn dispatch(&self, name: &str, args: &Value) -> Result<ToolOutput, ToolError> {
        let tool: ToolName = name.parse()?;
        tracing::debug!(tool = %tool, "dispatching tool call");
        Ok(match tool {
            ToolName::ScrapeInsider => ToolOutput::Insider(self.insider(str_arg(args, "symbol")).await),
            ToolName::ScrapeQuote => ToolOutput::Quote(self.quote(str_arg(args, "symbol")).await),
            ToolName::NewsSearch => ToolOutput::News(self.news(str_arg(args, "query")).await),
            ToolName::AudioEmotion => ToolOutput::Emotion(stubs::audio_emotion(args)),
            ToolName::MessageHistory => ToolOutput::History(stubs::message_history(args)),
        })
    }

    pub async fn insider(&self, symbol: &str) -> Vec<InsiderTransaction> {
        if symbol.is_empty() {
            tracing::warn!("scrape_insider called without a symbol");
            return Vec::new();
        }
        insider::scrape_insider(&self.browser, symbol).await
    }

    pub async fn quote(&self, symbol: &str) -> QuoteResult {
        if symbol.is_empty() {
            return QuoteResult::failed("", "missing required argument: symbol");
        }
        quote::scrape_quote(&self.browser, symbol).await
    }

    pub async fn news(&self, query: &str) -> Vec<NewsItem> {
        news::news_search(self.news.as_ref(), query).await
    }
}

fn str_arg<'a>(args: &'a Value, key: &str) -> &'a str {
    args.get(key).and_then(Value::as_str).map(str::trim).unwrap_or_default()
}
