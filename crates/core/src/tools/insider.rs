use crate::browser::BrowserSession;
use crate::domain::InsiderTransaction;

const SCREENER_URL: &str = "http://openinsider.com/screener";
pub(crate) const ROW_SELECTOR: &str = "table.tinytable tbody tr";
pub(crate) const CELL_SELECTORS: [&str; 9] = [
    "td:nth-child(2)",
    "td:nth-child(3)",
    "td:nth-child(4)",
    "td:nth-child(5)",
    "td:nth-child(6)",
    "td:nth-child(7)",
    "td:nth-child(8)",
    "td:nth-child(9)",
    "td:nth-child(10)",
];

pub async fn scrape_insider(browser: &BrowserSession, symbol: &str) -> Vec<InsiderTransaction> {
    let page = match browser.acquire_page().await {
        Ok(page) => page,
        Err(err) => {
            tracing::error!(symbol, error = %err, "insider scrape could not acquire a page");
            return Vec::new();
        }
    };

    let url = format!("{SCREENER_URL}?s={symbol}");
    let scraped = match page.goto(&url, browser.nav_timeout()).await {
        Ok(()) => page.records(ROW_SELECTOR, &CELL_SELECTORS).await,
        Err(err) => Err(err),
    };
    if let Err(err) = page.close().await {
        tracing::debug!(symbol, error = %err, "failed to close insider page");
    }

    let rows = match scraped {
        Ok(rows) => rows,
        Err(err) => {
            tracing::error!(symbol, error = %err, "insider scrape failed");
            return Vec::new();
        }
    };

    let mut out = Vec::with_capacity(rows.len());
    for (idx, row) in rows.into_iter().enumerate() {
        match row {
            Ok(cells) => match transaction_from_cells(cells) {
                Some(tx) => out.push(tx),
                None => tracing::debug!(symbol, idx, "insider row missing cells; skipping"),
            },
            Err(err) => {
                tracing::warn!(symbol, idx, error = %err, "error processing insider row; skipping");
            }
        }
    }
    out
}

fn transaction_from_cells(cells: Vec<Option<String>>) -> Option<InsiderTransaction> {
    let cells: Option<Vec<String>> = cells.into_iter().collect();
    let [date, ticker, company, insider, title, transaction_type, price, qty, value]: [String; 9] =
        cells?.try_into().ok()?;
    Some(InsiderTransaction {
        date,
        ticker,
        company,
        insider,
        title,
        transaction_type,
        price,
        qty,
        value,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::browser::testing::{FakeLauncher, FakePage};
    use crate::browser::BrowserSessionConfig;
    use std::sync::Arc;

    fn row(values: [&str; 9]) -> Option<Vec<Option<String>>> {
        Some(values.iter().map(|v| Some(v.to_string())).collect())
    }

    #[tokio::test]
    async fn skips_failed_and_incomplete_rows() {
        let page = FakePage::default().with_rows(
            ROW_SELECTOR,
            vec![
                row(["2025-10-01", "AAPL", "Apple Inc", "Cook Tim", "CEO", "S - Sale", "$225.10", "-10,000", "-$2,251,000"]),
                None,
                Some(vec![Some("2025-09-30".to_string()), None]),
                row(["2025-09-28", "AAPL", "Apple Inc", "Adams Katherine", "GC", "P - Purchase", "$220.00", "+500", "+$110,000"]),
            ],
        );
        let launcher = Arc::new(FakeLauncher::with_page(page.clone()));
        let session = BrowserSession::new(launcher, BrowserSessionConfig::default());

        let txs = scrape_insider(&session, "AAPL").await;
        assert_eq!(txs.len(), 2);
        assert_eq!(txs[0].insider, "Cook Tim");
        assert_eq!(txs[1].transaction_type, "P - Purchase");
        assert_eq!(page.closed_count(), 1);
        assert_eq!(page.visited(), vec!["http://openinsider.com/screener?s=AAPL".to_string()]);
    }

    #[tokio::test]
    async fn navigation_failure_yields_empty_list_and_closes_page() {
        let page = FakePage::failing_navigation();
        let launcher = Arc::new(FakeLauncher::with_page(page.clone()));
        let session = BrowserSession::new(launcher, BrowserSessionConfig::default());

        assert!(scrape_insider(&session, "AAPL").await.is_empty());
        assert_eq!(page.closed_count(), 1);
    }

    #[tokio::test]
    async fn launch_failure_yields_empty_list() {
        let launcher = Arc::new(FakeLauncher::scripted([false]));
        let session = BrowserSession::new(launcher, BrowserSessionConfig::default());
        assert!(scrape_insider(&session, "AAPL").await.is_empty());
        assert_eq!(session.failure_count(), 1);
    }
}
