use crate::browser::BrowserSession;
use crate::domain::NewsItem;
use anyhow::Context;
use async_trait::async_trait;
use std::sync::Arc;

pub const DEFAULT_MAX_RESULTS: usize = 5;

const SEARCH_URL: &str = "https://html.duckduckgo.com/html/";
const RESULT_SELECTOR: &str = "div.result";
const RESULT_FIELDS: [&str; 3] = ["a.result__a", ".result__url", ".result__snippet"];

#[async_trait]
pub trait NewsSearch: Send + Sync {
    fn provider_name(&self) -> &'static str;

    async fn search(&self, query: &str, max_results: usize) -> anyhow::Result<Vec<NewsItem>>;
}

pub struct DuckDuckGoNews {
    browser: Arc<BrowserSession>,
}

impl DuckDuckGoNews {
    pub fn new(browser: Arc<BrowserSession>) -> Self {
        Self { browser }
    }

    fn url(query: &str) -> anyhow::Result<String> {
        let url = reqwest::Url::parse_with_params(SEARCH_URL, &[("q", query), ("kl", "us-en")])
            .context("failed to build search url")?;
        Ok(url.to_string())
    }
}

#[async_trait]
impl NewsSearch for DuckDuckGoNews {
    fn provider_name(&self) -> &'static str {
        "duckduckgo"
    }

    async fn search(&self, query: &str, max_results: usize) -> anyhow::Result<Vec<NewsItem>> {
        let url = Self::url(query)?;
        let page = self.browser.acquire_page().await?;
        let scraped = match page.goto(&url, self.browser.nav_timeout()).await {
            Ok(()) => page.records(RESULT_SELECTOR, &RESULT_FIELDS).await,
            Err(err) => Err(err),
        };
        if let Err(err) = page.close().await {
            tracing::debug!(error = %err, "failed to close search page");
        }

        let mut out = Vec::new();
        for row in scraped? {
            let cells = match row {
                Ok(cells) => cells,
                Err(err) => {
                    tracing::debug!(error = %err, "skipping unreadable search result");
                    continue;
                }
            };
            let mut cells = cells.into_iter();
            let (Some(Some(title)), url, snippet) = (cells.next(), cells.next(), cells.next()) else {
                continue;
            };
            out.push(NewsItem {
                title,
                url: normalize_url(url.flatten().unwrap_or_default()),
                snippet: snippet.flatten().unwrap_or_default(),
            });
            if out.len() >= max_results {
                break;
            }
        }
        Ok(out)
    }
}

fn normalize_url(raw: String) -> String {
    let raw = raw.trim();
    if raw.is_empty() || raw.starts_with("http://") || raw.starts_with("https://") {
        raw.to_string()
    } else {
        format!("https://{raw}")
    }
}

pub async fn news_search(search: &dyn NewsSearch, query: &str) -> Vec<NewsItem> {
    match search.search(query, DEFAULT_MAX_RESULTS).await {
        Ok(items) if !items.is_empty() => items,
        Ok(_) => {
            tracing::info!(query, provider = search.provider_name(), "news search returned nothing");
            vec![NewsItem::placeholder(query)]
        }
        Err(err) => {
            tracing::error!(
                query,
                provider = search.provider_name(),
                error = %format!("{err:#}"),
                "news search failed"
            );
            vec![NewsItem::placeholder(query)]
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::browser::testing::{FakeLauncher, FakePage};
    use crate::browser::BrowserSessionConfig;

    struct FailingSearch;

    #[async_trait]
    impl NewsSearch for FailingSearch {
        fn provider_name(&self) -> &'static str {
            "failing"
        }

        async fn search(&self, _query: &str, _max_results: usize) -> anyhow::Result<Vec<NewsItem>> {
            anyhow::bail!("rate limited")
        }
    }

    fn cells(title: &str, url: &str, snippet: &str) -> Option<Vec<Option<String>>> {
        Some(vec![
            Some(title.to_string()),
            Some(url.to_string()),
            Some(snippet.to_string()),
        ])
    }

    #[tokio::test]
    async fn failure_yields_single_placeholder() {
        let items = news_search(&FailingSearch, "AAPL stock news").await;
        assert_eq!(items, vec![NewsItem::placeholder("AAPL stock news")]);
    }

    #[tokio::test]
    async fn scrapes_results_through_browser() {
        let page = FakePage::default().with_rows(
            RESULT_SELECTOR,
            vec![
                cells("Apple beats estimates", "www.reuters.com/apple", "Apple reported..."),
                None,
                Some(vec![None, Some("example.com".to_string()), None]),
                cells("iPhone demand", "https://www.cnbc.com/iphone", "Demand for..."),
            ],
        );
        let launcher = Arc::new(FakeLauncher::with_page(page.clone()));
        let browser = Arc::new(BrowserSession::new(launcher, BrowserSessionConfig::default()));
        let search = DuckDuckGoNews::new(browser);

        let items = search.search("AAPL stock news", 5).await.unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].url, "https://www.reuters.com/apple");
        assert_eq!(items[1].title, "iPhone demand");
        assert!(page.visited()[0].contains("q=AAPL+stock+news"));
        assert_eq!(page.closed_count(), 1);
    }

    #[tokio::test]
    async fn respects_max_results() {
        let rows = (0..8).map(|i| cells(&format!("t{i}"), "u", "s")).collect();
        let page = FakePage::default().with_rows(RESULT_SELECTOR, rows);
        let launcher = Arc::new(FakeLauncher::with_page(page));
        let browser = Arc::new(BrowserSession::new(launcher, BrowserSessionConfig::default()));
        let items = DuckDuckGoNews::new(browser).search("q", 3).await.unwrap();
        assert_eq!(items.len(), 3);
    }
}
