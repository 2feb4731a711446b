use crate::domain::{InsiderTransaction, NewsItem, QuoteResult};
use crate::tools::ToolDispatcher;
use async_trait::async_trait;
use std::sync::Arc;

pub const MAX_INSIDER_ROWS: usize = 5;
pub const MAX_HEADLINES: usize = 3;
pub const MAX_RESEARCH_SNIPPETS: usize = 2;
pub const RESEARCH_SNIPPET_CHARS: usize = 200;

#[async_trait]
pub trait MarketContext: Send + Sync {
    async fn build_context(&self, symbol: &str) -> String;
}

pub struct MarketContextAggregator {
    tools: Arc<ToolDispatcher>,
}

impl MarketContextAggregator {
    pub fn new(tools: Arc<ToolDispatcher>) -> Self {
        Self { tools }
    }
}

#[async_trait]
impl MarketContext for MarketContextAggregator {
    async fn build_context(&self, symbol: &str) -> String {
        let quote = self.tools.quote(symbol).await;
        let insider = self.tools.insider(symbol).await;
        let news = self.tools.news(&format!("{symbol} stock news")).await;
        let research = self
            .tools
            .news(&format!(
                "{symbol} stock analysis financials fundamentals technical analysis"
            ))
            .await;

        let sections = [
            quote_section(symbol, &quote),
            insider_section(symbol, &insider),
            news_section(symbol, &news),
            research_section(symbol, &research),
        ];
        tracing::debug!(symbol, insider = insider.len(), news = news.len(), "market context built");
        sections.join("\n\n")
    }
}

fn quote_section(symbol: &str, quote: &QuoteResult) -> String {
    let quote = match quote {
        QuoteResult::Data(q) if q.has_data() => q,
        QuoteResult::Data(_) => return format!("No current quote data found for {symbol}."),
        QuoteResult::Failed { error, .. } => {
            tracing::warn!(symbol, error = %error, "quote unavailable for context");
            return format!("Could not fetch current market data for {symbol}.");
        }
    };

    let mut lines = vec![format!("Current stock data for {symbol}:")];
    let fields = [
        ("Current Price", &quote.price),
        ("Change", &quote.change),
        ("Change %", &quote.change_percent),
        ("Volume", &quote.volume),
        ("Market Cap", &quote.market_cap),
        ("P/E Ratio", &quote.pe_ratio),
    ];
    for (label, value) in fields {
        if let Some(value) = value {
            lines.push(format!("- {label}: {value}"));
        }
    }
    lines.join("\n")
}

fn insider_section(symbol: &str, rows: &[InsiderTransaction]) -> String {
    if rows.is_empty() {
        return format!("No recent insider trading data found for {symbol}.");
    }
    let mut lines = vec![format!("Recent insider trading activity for {symbol}:")];
    lines.extend(rows.iter().take(MAX_INSIDER_ROWS).map(|tx| {
        format!(
            "- {}: {} ({}) {} {} shares at {}",
            tx.date, tx.insider, tx.title, tx.transaction_type, tx.qty, tx.price
        )
    }));
    lines.join("\n")
}

fn news_section(symbol: &str, items: &[NewsItem]) -> String {
    if items.is_empty() {
        return format!("No recent news found for {symbol}.");
    }
    let mut lines = vec![format!("Recent news for {symbol}:")];
    lines.extend(items.iter().take(MAX_HEADLINES).map(|item| format!("- {}", item.title)));
    lines.join("\n")
}

fn research_section(symbol: &str, items: &[NewsItem]) -> String {
    if items.is_empty() {
        return format!("No research insights found for {symbol}.");
    }
    let mut lines = vec![format!("Deep research insights for {symbol}:")];
    lines.extend(
        items
            .iter()
            .take(MAX_RESEARCH_SNIPPETS)
            .map(|item| format!("- {}: {}", item.title, truncate_snippet(&item.snippet))),
    );
    lines.join("\n")
}

fn truncate_snippet(snippet: &str) -> String {
    match snippet.char_indices().nth(RESEARCH_SNIPPET_CHARS) {
        Some((idx, _)) => format!("{}...", &snippet[..idx]),
        None => snippet.to_string(),
    }
}
