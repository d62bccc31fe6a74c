//! Browser automation capability and the session pool that owns it.
//!
//! The removal engine only sees [`BrowserSession`]: navigate, read the page,
//! click an element. Sessions come from a [`SessionPool`], which bounds how
//! many automation sessions exist at once and closes each one on release.

use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::{debug, warn};

#[cfg(feature = "chromium")]
pub mod chromium;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum BrowserError {
    #[error("page load timed out")]
    Timeout,
    #[error("failed to launch browser: {0}")]
    Launch(String),
    #[error("failed to navigate to {url}: {details}")]
    Navigation { url: String, details: String },
    #[error("element {0} not found")]
    Element(String),
    #[error("browser internal error: {0}")]
    Internal(String),
}

/// The `index`-th element (document order) matching a CSS `selector`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ElementTarget {
    pub selector: String,
    pub index: usize,
}

impl ElementTarget {
    pub fn new(selector: impl Into<String>, index: usize) -> Self {
        Self {
            selector: selector.into(),
            index,
        }
    }
}

impl std::fmt::Display for ElementTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}[{}]", self.selector, self.index)
    }
}

/// One exclusive automated-browser page.
#[async_trait]
pub trait BrowserSession: Send {
    /// Load `url` and wait for navigation to finish.
    async fn navigate(&mut self, url: &str) -> Result<(), BrowserError>;

    /// URL currently shown, after any redirects.
    async fn current_url(&mut self) -> Result<String, BrowserError>;

    /// Serialized DOM of the current page.
    async fn content(&mut self) -> Result<String, BrowserError>;

    async fn click(&mut self, target: &ElementTarget) -> Result<(), BrowserError>;

    /// Tear the session down. Called exactly once, by the pool.
    async fn close(&mut self) -> Result<(), BrowserError>;
}

/// Starts new browser sessions.
#[async_trait]
pub trait BrowserLauncher: Send + Sync {
    async fn launch(&self) -> Result<Box<dyn BrowserSession>, BrowserError>;
}

/// Bounded pool of browser sessions.
#[derive(Clone)]
pub struct SessionPool {
    launcher: Arc<dyn BrowserLauncher>,
    permits: Arc<Semaphore>,
}

impl SessionPool {
    /// A pool allowing one live session at a time.
    pub fn new(launcher: Arc<dyn BrowserLauncher>) -> Self {
        Self::with_capacity(launcher, 1)
    }

    pub fn with_capacity(launcher: Arc<dyn BrowserLauncher>, capacity: usize) -> Self {
        Self {
            launcher,
            permits: Arc::new(Semaphore::new(capacity.max(1))),
        }
    }

    /// Wait for a free slot and launch a session into it.
    pub async fn acquire(&self) -> Result<PooledSession, BrowserError> {
        let permit = self
            .permits
            .clone()
            .acquire_owned()
            .await
            .map_err(|e| BrowserError::Internal(e.to_string()))?;
        debug!("launching browser session");
        let session = self.launcher.launch().await?;
        Ok(PooledSession {
            session: Some(session),
            _permit: permit,
        })
    }

    /// Free slots right now.
    pub fn available(&self) -> usize {
        self.permits.available_permits()
    }
}

/// A session checked out of a [`SessionPool`]. Call
/// [`PooledSession::release`] when done.
pub struct PooledSession {
    session: Option<Box<dyn BrowserSession>>,
    _permit: OwnedSemaphorePermit,
}

impl PooledSession {
    pub fn session(&mut self) -> Result<&mut (dyn BrowserSession + 'static), BrowserError> {
        self.session
            .as_deref_mut()
            .ok_or_else(|| BrowserError::Internal("session already released".into()))
    }

    /// Close the session and return its slot to the pool.
    pub async fn release(mut self) {
        if let Some(mut session) = self.session.take() {
            if let Err(err) = session.close().await {
                warn!("browser session did not close cleanly: {err}");
            }
        }
    }
}

impl Drop for PooledSession {
    fn drop(&mut self) {
        if self.session.is_some() {
            warn!("browser session dropped without release");
        }
    }
}
