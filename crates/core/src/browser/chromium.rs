use crate::browser::driver::{BrowserHandle, BrowserLauncher, PageHandle, ScrapedRow};
use anyhow::Context;
use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::element::Element;
use chromiumoxide::page::Page;
use futures::StreamExt;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;

const DEFAULT_LAUNCH_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Clone)]
pub struct ChromiumLauncher {
    executable: Option<PathBuf>,
    headless: bool,
    launch_timeout: Duration,
}

impl ChromiumLauncher {
    pub fn from_env() -> Self {
        let executable = std::env::var("CHROME_PATH")
            .ok()
            .filter(|s| !s.trim().is_empty())
            .map(PathBuf::from);
        let headless = std::env::var("BROWSER_HEADFUL").is_err();
        let launch_timeout = std::env::var("BROWSER_LAUNCH_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(DEFAULT_LAUNCH_TIMEOUT_SECS);

        Self {
            executable,
            headless,
            launch_timeout: Duration::from_secs(launch_timeout),
        }
    }

    fn browser_config(&self) -> anyhow::Result<BrowserConfig> {
        let mut builder = BrowserConfig::builder()
            .no_sandbox()
            .arg("--disable-dev-shm-usage");
        if !self.headless {
            builder = builder.with_head();
        }
        if let Some(path) = &self.executable {
            builder = builder.chrome_executable(path);
        }
        builder
            .build()
            .map_err(anyhow::Error::msg)
            .context("invalid chromium configuration")
    }
}

#[async_trait]
impl BrowserLauncher for ChromiumLauncher {
    async fn launch(&self) -> anyhow::Result<Arc<dyn BrowserHandle>> {
        let config = self.browser_config()?;
        let (browser, mut handler) = tokio::time::timeout(self.launch_timeout, Browser::launch(config))
            .await
            .with_context(|| format!("chromium launch timed out after {:?}", self.launch_timeout))?
            .context("failed to launch chromium")?;

        let handler_task = tokio::spawn(async move {
            drive_handler(&mut handler).await;
        });

        tracing::info!(headless = self.headless, "chromium launched");
        Ok(Arc::new(ChromiumBrowser {
            browser: RwLock::new(Some(browser)),
            handler_task,
            closed: AtomicBool::new(false),
        }))
    }
}

// The handler drives the websocket connection. Individual errors (undecodable events and
// the like) are not fatal; the browser is gone only once the stream ends.
async fn drive_handler<S, T, E>(handler: &mut S) -> u64
where
    S: futures::Stream<Item = Result<T, E>> + Unpin,
    E: std::fmt::Display,
{
    let mut errors = 0;
    while let Some(event) = handler.next().await {
        if let Err(err) = event {
            errors += 1;
            tracing::debug!(error = %err, "chromium handler error");
        }
    }
    tracing::debug!(errors, "chromium handler stream ended");
    errors
}

struct ChromiumBrowser {
    browser: RwLock<Option<Browser>>,
    handler_task: JoinHandle<()>,
    closed: AtomicBool,
}

#[async_trait]
impl BrowserHandle for ChromiumBrowser {
    fn is_connected(&self) -> bool {
        !self.closed.load(Ordering::SeqCst) && !self.handler_task.is_finished()
    }

    async fn new_page(&self) -> anyhow::Result<Box<dyn PageHandle>> {
        let guard = self.browser.read().await;
        let browser = guard.as_ref().context("browser already closed")?;
        let page = browser
            .new_page("about:blank")
            .await
            .context("failed to create page")?;
        Ok(Box::new(ChromiumPage { page }))
    }

    async fn close(&self) -> anyhow::Result<()> {
        self.closed.store(true, Ordering::SeqCst);
        let taken = self.browser.write().await.take();
        if let Some(mut browser) = taken {
            if let Err(err) = browser.close().await {
                tracing::debug!(error = %err, "chromium close command failed");
            }
            if let Err(err) = browser.wait().await {
                tracing::debug!(error = %err, "waiting for chromium exit failed");
            }
        }
        self.handler_task.abort();
        Ok(())
    }
}

struct ChromiumPage {
    page: Page,
}

impl ChromiumPage {
    async fn element_text(element: &Element) -> anyhow::Result<Option<String>> {
        let text = element
            .inner_text()
            .await
            .context("failed to read element text")?;
        Ok(text
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty()))
    }
}

#[async_trait]
impl PageHandle for ChromiumPage {
    async fn goto(&self, url: &str, timeout: Duration) -> anyhow::Result<()> {
        tokio::time::timeout(timeout, self.page.goto(url))
            .await
            .with_context(|| format!("navigation to {url} timed out after {timeout:?}"))?
            .with_context(|| format!("navigation to {url} failed"))?;
        Ok(())
    }

    async fn text(&self, selector: &str) -> anyhow::Result<Option<String>> {
        match self.page.find_element(selector).await {
            Ok(element) => Self::element_text(&element).await,
            Err(err) => {
                tracing::debug!(selector, error = %err, "selector not found");
                Ok(None)
            }
        }
    }

    async fn records(&self, row_selector: &str, fields: &[&str]) -> anyhow::Result<Vec<ScrapedRow>> {
        let rows = self
            .page
            .find_elements(row_selector)
            .await
            .with_context(|| format!("no rows matched {row_selector}"))?;

        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            let mut cells = Vec::with_capacity(fields.len());
            let mut failed = None;
            for field in fields {
                match row.find_element(*field).await {
                    Ok(element) => match Self::element_text(&element).await {
                        Ok(text) => cells.push(text),
                        Err(err) => {
                            failed = Some(err.context(format!("field {field}")));
                            break;
                        }
                    },
                    Err(_) => cells.push(None),
                }
            }
            out.push(match failed {
                Some(err) => Err(err),
                None => Ok(cells),
            });
        }
        Ok(out)
    }

    async fn close(&self) -> anyhow::Result<()> {
        self.page
            .clone()
            .close()
            .await
            .context("failed to close page")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn handler_survives_errors_until_stream_ends() {
        let events: Vec<Result<(), String>> = vec![
            Ok(()),
            Err("undecodable event".to_string()),
            Ok(()),
            Err("unknown method".to_string()),
            Ok(()),
        ];
        let mut stream = futures::stream::iter(events);
        assert_eq!(drive_handler(&mut stream).await, 2);
        assert!(stream.next().await.is_none());
    }
}
