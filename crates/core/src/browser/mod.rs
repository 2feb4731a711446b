pub mod chromium;
pub mod driver;
#[cfg(test)]
pub(crate) mod testing;

use crate::config::Settings;
use driver::{BrowserHandle, BrowserLauncher, PageHandle};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex};

pub const DEFAULT_HEALTH_URL: &str = "https://finance.yahoo.com";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BrowserSessionState {
    Stopped,
    Running,
    FatallyFailed,
}

#[derive(Debug, thiserror::Error)]
pub enum BrowserError {
    #[error("browser launch failed: {0}")]
    Launch(String),

    #[error("failed to open page: {0}")]
    Page(String),

    #[error("navigation failed: {0}")]
    Navigation(String),

    #[error("browser session fatally failed after {failures} consecutive failures: {last}")]
    Fatal { failures: u32, last: String },
}

impl BrowserError {
    pub fn is_fatal(&self) -> bool {
        matches!(self, BrowserError::Fatal { .. })
    }
}

#[derive(Debug, Clone)]
pub struct BrowserSessionConfig {
    pub max_failures: u32,
    pub health_url: String,
    pub health_timeout: Duration,
    pub nav_timeout: Duration,
}

impl Default for BrowserSessionConfig {
    fn default() -> Self {
        Self::from_settings(&Settings::default())
    }
}

impl BrowserSessionConfig {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            max_failures: settings.browser_max_failures.max(1),
            health_url: DEFAULT_HEALTH_URL.to_string(),
            health_timeout: settings.browser_health_timeout,
            nav_timeout: settings.browser_nav_timeout,
        }
    }
}

pub struct BrowserSession {
    launcher: Arc<dyn BrowserLauncher>,
    browser: Mutex<Option<Arc<dyn BrowserHandle>>>,
    failure_count: AtomicU32,
    state: watch::Sender<BrowserSessionState>,
    config: BrowserSessionConfig,
}

impl BrowserSession {
    pub fn new(launcher: Arc<dyn BrowserLauncher>, config: BrowserSessionConfig) -> Self {
        let (state, _) = watch::channel(BrowserSessionState::Stopped);
        Self {
            launcher,
            browser: Mutex::new(None),
            failure_count: AtomicU32::new(0),
            state,
            config,
        }
    }

    pub fn state(&self) -> BrowserSessionState {
        *self.state.borrow()
    }

    pub fn failure_count(&self) -> u32 {
        self.failure_count.load(Ordering::SeqCst)
    }

    pub fn nav_timeout(&self) -> Duration {
        self.config.nav_timeout
    }

    pub async fn fatally_failed(&self) {
        let mut rx = self.state.subscribe();
        let _ = rx
            .wait_for(|state| *state == BrowserSessionState::FatallyFailed)
            .await;
    }

    pub async fn start(&self) -> Result<(), BrowserError> {
        self.connected_browser().await?;
        self.reset_failures();
        Ok(())
    }

    pub async fn acquire_page(&self) -> Result<Box<dyn PageHandle>, BrowserError> {
        let page = self.open_page().await?;
        self.reset_failures();
        Ok(page)
    }

    /// Load the canonical target on a throwaway page. `Ok(false)` is a counted, recoverable
    /// failure; `Err` is returned only once the session is fatally failed.
    pub async fn health_check(&self) -> Result<bool, BrowserError> {
        let page = match self.open_page().await {
            Ok(page) => page,
            Err(err) if err.is_fatal() => return Err(err),
            Err(err) => {
                tracing::warn!(error = %err, "browser health check could not open a page");
                return Ok(false);
            }
        };

        let timeout = self.config.health_timeout;
        let nav = tokio::time::timeout(timeout, page.goto(&self.config.health_url, timeout)).await;
        if let Err(err) = page.close().await {
            tracing::debug!(error = %err, "failed to close health check page");
        }

        let failure = match nav {
            Ok(Ok(())) => {
                self.reset_failures();
                return Ok(true);
            }
            Ok(Err(err)) => format!("{err:#}"),
            Err(_) => format!("health check timed out after {timeout:?}"),
        };

        match self.record_failure(BrowserError::Navigation(failure)) {
            err @ BrowserError::Fatal { .. } => Err(err),
            err => {
                tracing::warn!(error = %err, "browser health check failed");
                Ok(false)
            }
        }
    }

    pub async fn close(&self) {
        let taken = self.browser.lock().await.take();
        if let Some(browser) = taken {
            if let Err(err) = browser.close().await {
                tracing::warn!(error = %err, "failed to close browser cleanly");
            }
            tracing::info!("browser closed");
        }
        if self.state() != BrowserSessionState::FatallyFailed {
            self.state.send_replace(BrowserSessionState::Stopped);
        }
    }

    async fn open_page(&self) -> Result<Box<dyn PageHandle>, BrowserError> {
        let browser = self.connected_browser().await?;
        browser
            .new_page()
            .await
            .map_err(|err| self.record_failure(BrowserError::Page(format!("{err:#}"))))
    }

    async fn connected_browser(&self) -> Result<Arc<dyn BrowserHandle>, BrowserError> {
        self.ensure_not_fatal()?;

        let mut slot = self.browser.lock().await;
        if let Some(browser) = slot.as_ref() {
            if browser.is_connected() {
                return Ok(Arc::clone(browser));
            }
        }

        // Re-check under the lock: another caller may have escalated while we waited.
        self.ensure_not_fatal()?;

        if let Some(stale) = slot.take() {
            tracing::warn!("browser disconnected; respawning");
            if let Err(err) = stale.close().await {
                tracing::debug!(error = %err, "failed to close stale browser");
            }
        }

        match self.launcher.launch().await {
            Ok(browser) => {
                *slot = Some(Arc::clone(&browser));
                self.reset_failures();
                self.state.send_replace(BrowserSessionState::Running);
                tracing::info!("browser started");
                Ok(browser)
            }
            Err(err) => {
                if self.state() == BrowserSessionState::Running {
                    self.state.send_replace(BrowserSessionState::Stopped);
                }
                Err(self.record_failure(BrowserError::Launch(format!("{err:#}"))))
            }
        }
    }

    fn ensure_not_fatal(&self) -> Result<(), BrowserError> {
        if self.state() == BrowserSessionState::FatallyFailed {
            return Err(BrowserError::Fatal {
                failures: self.failure_count(),
                last: "session already fatally failed".to_string(),
            });
        }
        Ok(())
    }

    fn reset_failures(&self) {
        self.failure_count.store(0, Ordering::SeqCst);
    }

    fn record_failure(&self, err: BrowserError) -> BrowserError {
        let failures = self.failure_count.fetch_add(1, Ordering::SeqCst) + 1;
        if failures >= self.config.max_failures {
            tracing::error!(
                failures,
                max_failures = self.config.max_failures,
                error = %err,
                "browser failure threshold reached; session is fatally failed"
            );
            self.state.send_replace(BrowserSessionState::FatallyFailed);
            return BrowserError::Fatal {
                failures,
                last: err.to_string(),
            };
        }
        tracing::warn!(
            failures,
            max_failures = self.config.max_failures,
            error = %err,
            "browser operation failed"
        );
        err
    }
}

#[cfg(test)]
mod tests {
    use super::testing::{FakeLauncher, FakePage};
    use super::*;

    fn session(launcher: Arc<FakeLauncher>) -> BrowserSession {
        BrowserSession::new(
            launcher,
            BrowserSessionConfig {
                max_failures: 3,
                health_url: "https://example.test".to_string(),
                health_timeout: Duration::from_millis(200),
                nav_timeout: Duration::from_millis(200),
            },
        )
    }

    #[tokio::test]
    async fn starts_stopped_with_zero_failures() {
        let s = session(Arc::new(FakeLauncher::healthy()));
        assert_eq!(s.state(), BrowserSessionState::Stopped);
        assert_eq!(s.failure_count(), 0);
    }

    #[tokio::test]
    async fn acquire_page_starts_browser_implicitly() {
        let launcher = Arc::new(FakeLauncher::healthy());
        let s = session(launcher.clone());
        let page = s.acquire_page().await.unwrap();
        page.close().await.unwrap();
        assert_eq!(s.state(), BrowserSessionState::Running);
        assert_eq!(launcher.launches(), 1);

        // Second page reuses the connected browser.
        let _page = s.acquire_page().await.unwrap();
        assert_eq!(launcher.launches(), 1);
    }

    #[tokio::test]
    async fn three_consecutive_launch_failures_are_fatal() {
        let launcher = Arc::new(FakeLauncher::scripted([false, false, false, true]));
        let s = session(launcher.clone());

        let first = s.acquire_page().await.err().unwrap();
        assert!(!first.is_fatal());
        assert_eq!(s.failure_count(), 1);

        let second = s.acquire_page().await.err().unwrap();
        assert!(!second.is_fatal());
        assert_eq!(s.failure_count(), 2);

        let third = s.acquire_page().await.err().unwrap();
        assert!(third.is_fatal());
        assert_eq!(s.state(), BrowserSessionState::FatallyFailed);

        // Terminal: no further launch is attempted.
        assert!(s.acquire_page().await.err().unwrap().is_fatal());
        assert_eq!(launcher.launches(), 3);
    }

    #[tokio::test]
    async fn two_failures_then_success_resets_count() {
        let launcher = Arc::new(FakeLauncher::scripted([false, false, true]));
        let s = session(launcher);

        assert!(s.acquire_page().await.is_err());
        assert!(s.acquire_page().await.is_err());
        assert_eq!(s.failure_count(), 2);

        assert!(s.acquire_page().await.is_ok());
        assert_eq!(s.failure_count(), 0);
        assert_eq!(s.state(), BrowserSessionState::Running);
    }

    #[tokio::test]
    async fn three_failed_health_checks_are_fatal() {
        let launcher = Arc::new(FakeLauncher::with_page(FakePage::failing_navigation()));
        let s = session(launcher);

        assert!(!s.health_check().await.unwrap());
        assert!(!s.health_check().await.unwrap());
        assert_eq!(s.failure_count(), 2);

        let err = s.health_check().await.unwrap_err();
        assert!(err.is_fatal());
        assert_eq!(s.state(), BrowserSessionState::FatallyFailed);
    }

    #[tokio::test]
    async fn successful_health_check_resets_failures() {
        let launcher = Arc::new(FakeLauncher::scripted([false, true]));
        let s = session(launcher);

        assert!(s.start().await.is_err());
        assert_eq!(s.failure_count(), 1);
        assert!(s.health_check().await.unwrap());
        assert_eq!(s.failure_count(), 0);
    }

    #[tokio::test]
    async fn start_on_running_browser_resets_failures() {
        let launcher = Arc::new(FakeLauncher::with_page(FakePage::failing_navigation()));
        let s = session(launcher.clone());

        assert!(!s.health_check().await.unwrap());
        assert!(!s.health_check().await.unwrap());
        assert_eq!(s.failure_count(), 2);

        s.start().await.unwrap();
        assert_eq!(s.failure_count(), 0);
        assert_eq!(launcher.launches(), 1);

        assert!(!s.health_check().await.unwrap());
        assert_eq!(s.failure_count(), 1);
        assert_eq!(s.state(), BrowserSessionState::Running);
    }

    #[tokio::test]
    async fn health_check_times_out() {
        let launcher = Arc::new(FakeLauncher::with_page(FakePage::hanging_navigation()));
        let s = session(launcher);
        assert!(!s.health_check().await.unwrap());
        assert_eq!(s.failure_count(), 1);
    }

    #[tokio::test]
    async fn disconnected_browser_is_respawned() {
        let launcher = Arc::new(FakeLauncher::healthy());
        let s = session(launcher.clone());
        s.start().await.unwrap();
        launcher.disconnect_all();

        s.acquire_page().await.unwrap();
        assert_eq!(launcher.launches(), 2);
    }

    #[tokio::test]
    async fn close_is_idempotent() {
        let launcher = Arc::new(FakeLauncher::healthy());
        let s = session(launcher);
        s.start().await.unwrap();
        s.close().await;
        s.close().await;
        assert_eq!(s.state(), BrowserSessionState::Stopped);
    }

    #[tokio::test]
    async fn fatal_state_is_published() {
        let launcher = Arc::new(FakeLauncher::scripted([false, false, false]));
        let s = Arc::new(session(launcher));
        let watcher = {
            let s = Arc::clone(&s);
            tokio::spawn(async move { s.fatally_failed().await })
        };
        for _ in 0..3 {
            let _ = s.start().await;
        }
        tokio::time::timeout(Duration::from_secs(1), watcher)
            .await
            .unwrap()
            .unwrap();
    }
}
