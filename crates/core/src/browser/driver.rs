use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

pub type ScrapedRow = anyhow::Result<Vec<Option<String>>>;

#[async_trait]
pub trait BrowserLauncher: Send + Sync {
    async fn launch(&self) -> anyhow::Result<Arc<dyn BrowserHandle>>;
}

#[async_trait]
pub trait BrowserHandle: Send + Sync {
    fn is_connected(&self) -> bool;

    async fn new_page(&self) -> anyhow::Result<Box<dyn PageHandle>>;

    async fn close(&self) -> anyhow::Result<()>;
}

#[async_trait]
pub trait PageHandle: Send + Sync {
    async fn goto(&self, url: &str, timeout: Duration) -> anyhow::Result<()>;

    async fn text(&self, selector: &str) -> anyhow::Result<Option<String>>;

    /// For every element matching `row_selector`, the inner text of each field selector
    /// evaluated relative to that element.
    async fn records(&self, row_selector: &str, fields: &[&str]) -> anyhow::Result<Vec<ScrapedRow>>;

    async fn close(&self) -> anyhow::Result<()>;
}
