use crate::browser::driver::{BrowserHandle, BrowserLauncher, PageHandle, ScrapedRow};
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Debug, Clone, Copy)]
pub enum Navigation {
    Ok,
    Fail,
    Hang,
}

#[derive(Debug, Clone)]
pub struct FakePage {
    navigation: Navigation,
    texts: HashMap<String, String>,
    failing_texts: Vec<String>,
    records: HashMap<String, Vec<Option<Vec<Option<String>>>>>,
    visited: Arc<Mutex<Vec<String>>>,
    closed: Arc<AtomicU32>,
}

impl Default for FakePage {
    fn default() -> Self {
        Self {
            navigation: Navigation::Ok,
            texts: HashMap::new(),
            failing_texts: Vec::new(),
            records: HashMap::new(),
            visited: Arc::new(Mutex::new(Vec::new())),
            closed: Arc::new(AtomicU32::new(0)),
        }
    }
}

impl FakePage {
    pub fn failing_navigation() -> Self {
        Self {
            navigation: Navigation::Fail,
            ..Self::default()
        }
    }

    pub fn hanging_navigation() -> Self {
        Self {
            navigation: Navigation::Hang,
            ..Self::default()
        }
    }

    pub fn with_text(mut self, selector: &str, text: &str) -> Self {
        self.texts.insert(selector.to_string(), text.to_string());
        self
    }

    pub fn with_failing_text(mut self, selector: &str) -> Self {
        self.failing_texts.push(selector.to_string());
        self
    }

    pub fn with_rows(mut self, row_selector: &str, rows: Vec<Option<Vec<Option<String>>>>) -> Self {
        self.records.insert(row_selector.to_string(), rows);
        self
    }

    pub fn closed_count(&self) -> u32 {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn visited(&self) -> Vec<String> {
        self.visited.lock().unwrap().clone()
    }
}

#[async_trait]
impl PageHandle for FakePage {
    async fn goto(&self, url: &str, timeout: Duration) -> anyhow::Result<()> {
        self.visited.lock().unwrap().push(url.to_string());
        match self.navigation {
            Navigation::Ok => Ok(()),
            Navigation::Fail => anyhow::bail!("net::ERR_NAME_NOT_RESOLVED at {url}"),
            Navigation::Hang => {
                tokio::time::sleep(timeout * 4).await;
                anyhow::bail!("navigation to {url} timed out")
            }
        }
    }

    async fn text(&self, selector: &str) -> anyhow::Result<Option<String>> {
        if self.failing_texts.iter().any(|s| s == selector) {
            anyhow::bail!("detached node for {selector}");
        }
        Ok(self.texts.get(selector).cloned())
    }

    async fn records(&self, row_selector: &str, fields: &[&str]) -> anyhow::Result<Vec<ScrapedRow>> {
        let rows = self.records.get(row_selector).cloned().unwrap_or_default();
        Ok(rows
            .into_iter()
            .map(|row| match row {
                Some(mut cells) => {
                    cells.resize(fields.len(), None);
                    Ok(cells)
                }
                None => Err(anyhow::anyhow!("stale row")),
            })
            .collect())
    }

    async fn close(&self) -> anyhow::Result<()> {
        self.closed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

pub struct FakeBrowser {
    page: FakePage,
    connected: AtomicBool,
}

#[async_trait]
impl BrowserHandle for FakeBrowser {
    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn new_page(&self) -> anyhow::Result<Box<dyn PageHandle>> {
        Ok(Box::new(self.page.clone()))
    }

    async fn close(&self) -> anyhow::Result<()> {
        self.connected.store(false, Ordering::SeqCst);
        Ok(())
    }
}

pub struct FakeLauncher {
    script: Mutex<VecDeque<bool>>,
    default_ok: bool,
    page: FakePage,
    launches: AtomicU32,
    browsers: Mutex<Vec<Arc<FakeBrowser>>>,
}

impl FakeLauncher {
    pub fn healthy() -> Self {
        Self::with_page(FakePage::default())
    }

    pub fn with_page(page: FakePage) -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            default_ok: true,
            page,
            launches: AtomicU32::new(0),
            browsers: Mutex::new(Vec::new()),
        }
    }

    pub fn scripted(outcomes: impl IntoIterator<Item = bool>) -> Self {
        Self {
            script: Mutex::new(outcomes.into_iter().collect()),
            default_ok: false,
            ..Self::healthy()
        }
    }

    pub fn launches(&self) -> u32 {
        self.launches.load(Ordering::SeqCst)
    }

    pub fn disconnect_all(&self) {
        for browser in self.browsers.lock().unwrap().iter() {
            browser.connected.store(false, Ordering::SeqCst);
        }
    }
}

#[async_trait]
impl BrowserLauncher for FakeLauncher {
    async fn launch(&self) -> anyhow::Result<Arc<dyn BrowserHandle>> {
        self.launches.fetch_add(1, Ordering::SeqCst);
        let ok = self
            .script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(self.default_ok);
        if !ok {
            anyhow::bail!("chromium exited before exposing devtools websocket url");
        }
        let browser = Arc::new(FakeBrowser {
            page: self.page.clone(),
            connected: AtomicBool::new(true),
        });
        self.browsers.lock().unwrap().push(Arc::clone(&browser));
        Ok(browser)
    }
}
