//! Headless Chromium sessions over the DevTools protocol.

use super::{BrowserError, BrowserLauncher, BrowserSession, ElementTarget};
use crate::models::Config;
use async_trait::async_trait;
use chromiumoxide::error::CdpError;
use chromiumoxide::{Browser, BrowserConfig, Page};
use futures::StreamExt;
use std::path::PathBuf;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Launches one headless Chromium process per session.
#[derive(Debug, Clone, Default)]
pub struct ChromiumLauncher {
    executable: Option<PathBuf>,
    user_agent: Option<String>,
    request_timeout: Option<Duration>,
    no_sandbox: bool,
}

impl ChromiumLauncher {
    pub fn new(config: &Config) -> Self {
        Self {
            executable: None,
            user_agent: Some(config.user_agent.clone()),
            request_timeout: Some(config.page_load_timeout),
            no_sandbox: std::env::var("CI").is_ok() || std::env::var("NO_SANDBOX").is_ok(),
        }
    }

    /// Use a specific Chrome/Chromium binary instead of auto-detection.
    pub fn executable(mut self, path: impl Into<PathBuf>) -> Self {
        self.executable = Some(path.into());
        self
    }

    fn browser_config(&self) -> Result<BrowserConfig, BrowserError> {
        let mut args = vec![
            "--disable-dev-shm-usage".to_string(),
            "--disable-gpu".to_string(),
            "--disable-extensions".to_string(),
        ];
        if self.no_sandbox {
            args.push("--no-sandbox".to_string());
        }
        if let Some(ua) = &self.user_agent {
            args.push(format!("--user-agent={ua}"));
        }

        let mut builder = BrowserConfig::builder().args(args);
        if let Some(bin) = &self.executable {
            builder = builder.chrome_executable(bin);
        }
        if let Some(timeout) = self.request_timeout {
            builder = builder.request_timeout(timeout);
        }
        builder.build().map_err(BrowserError::Launch)
    }
}

#[async_trait]
impl BrowserLauncher for ChromiumLauncher {
    async fn launch(&self) -> Result<Box<dyn BrowserSession>, BrowserError> {
        let config = self.browser_config()?;
        let (browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|e| BrowserError::Launch(e.to_string()))?;
        info!("chromium launched");

        let events = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if event.is_err() {
                    break;
                }
            }
            debug!("chromium event loop exited");
        });

        let page = browser
            .new_page("about:blank")
            .await
            .map_err(|e| BrowserError::Internal(format!("failed to create page: {e}")))?;

        Ok(Box::new(ChromiumSession {
            browser,
            page: Some(page),
            events,
        }))
    }
}

/// CDP request timeouts stay distinguishable from other protocol faults.
fn map_cdp(err: CdpError, other: impl FnOnce(String) -> BrowserError) -> BrowserError {
    match err {
        CdpError::Timeout => BrowserError::Timeout,
        err => other(err.to_string()),
    }
}

struct ChromiumSession {
    browser: Browser,
    page: Option<Page>,
    events: JoinHandle<()>,
}

impl ChromiumSession {
    fn page(&self) -> Result<&Page, BrowserError> {
        self.page
            .as_ref()
            .ok_or_else(|| BrowserError::Internal("no active page".into()))
    }
}

#[async_trait]
impl BrowserSession for ChromiumSession {
    async fn navigate(&mut self, url: &str) -> Result<(), BrowserError> {
        let page = self.page()?;
        let navigation = |details| BrowserError::Navigation {
            url: url.into(),
            details,
        };
        page.goto(url)
            .await
            .map_err(|e| map_cdp(e, navigation))?
            .wait_for_navigation()
            .await
            .map_err(|e| map_cdp(e, navigation))?;
        Ok(())
    }

    async fn current_url(&mut self) -> Result<String, BrowserError> {
        let url = self
            .page()?
            .url()
            .await
            .map_err(|e| map_cdp(e, BrowserError::Internal))?;
        Ok(url.unwrap_or_default())
    }

    async fn content(&mut self) -> Result<String, BrowserError> {
        self.page()?
            .content()
            .await
            .map_err(|e| map_cdp(e, BrowserError::Internal))
    }

    async fn click(&mut self, target: &ElementTarget) -> Result<(), BrowserError> {
        let elements = self
            .page()?
            .find_elements(target.selector.as_str())
            .await
            .map_err(|e| map_cdp(e, |msg| BrowserError::Element(format!("{target}: {msg}"))))?;
        let element = elements
            .get(target.index)
            .ok_or_else(|| BrowserError::Element(target.to_string()))?;
        element
            .click()
            .await
            .map_err(|e| map_cdp(e, |msg| BrowserError::Internal(format!("click failed: {msg}"))))?;
        Ok(())
    }

    async fn close(&mut self) -> Result<(), BrowserError> {
        if let Some(page) = self.page.take() {
            if let Err(err) = page.close().await {
                warn!("failed to close page: {err}");
            }
        }
        let closed = self
            .browser
            .close()
            .await
            .map(|_| ())
            .map_err(|e| BrowserError::Internal(e.to_string()));
        if let Err(err) = self.browser.wait().await {
            debug!("chromium process wait failed: {err}");
        }
        self.events.abort();
        closed
    }
}
