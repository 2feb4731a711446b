use crate::browser::driver::PageHandle;
use crate::browser::BrowserSession;
use crate::domain::{Quote, QuoteResult};

const QUOTE_URL: &str = "https://finance.yahoo.com/quote";

pub(crate) const PRICE: &str = "[data-field='regularMarketPrice']";
pub(crate) const CHANGE: &str = "[data-field='regularMarketChange']";
pub(crate) const CHANGE_PERCENT: &str = "[data-field='regularMarketChangePercent']";
pub(crate) const MARKET_CAP: &str = "[data-field='marketCap']";
pub(crate) const VOLUME: &str = "[data-field='regularMarketVolume']";
pub(crate) const PE_RATIO: &str = "[data-field='trailingPE']";

pub async fn scrape_quote(browser: &BrowserSession, symbol: &str) -> QuoteResult {
    let page = match browser.acquire_page().await {
        Ok(page) => page,
        Err(err) => {
            tracing::error!(symbol, error = %err, "quote scrape could not acquire a page");
            return QuoteResult::failed(symbol, err.to_string());
        }
    };

    let url = format!("{QUOTE_URL}/{symbol}");
    let result = match page.goto(&url, browser.nav_timeout()).await {
        Ok(()) => QuoteResult::Data(read_quote(page.as_ref(), symbol).await),
        Err(err) => {
            tracing::error!(symbol, error = %format!("{err:#}"), "quote scrape failed");
            QuoteResult::failed(symbol, format!("{err:#}"))
        }
    };
    if let Err(err) = page.close().await {
        tracing::debug!(symbol, error = %err, "failed to close quote page");
    }
    result
}

async fn read_quote(page: &dyn PageHandle, symbol: &str) -> Quote {
    Quote {
        symbol: symbol.to_string(),
        price: field(page, symbol, PRICE).await,
        change: field(page, symbol, CHANGE).await,
        change_percent: field(page, symbol, CHANGE_PERCENT).await,
        market_cap: field(page, symbol, MARKET_CAP).await,
        volume: field(page, symbol, VOLUME).await,
        pe_ratio: field(page, symbol, PE_RATIO).await,
    }
}

async fn field(page: &dyn PageHandle, symbol: &str, selector: &str) -> Option<String> {
    match page.text(selector).await {
        Ok(value) => value,
        Err(err) => {
            tracing::warn!(symbol, selector, error = %err, "failed to extract quote field");
            None
        }
    }
}
