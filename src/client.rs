use crate::browser::{BrowserError, BrowserSession, SessionPool};
use crate::constants::*;
use crate::detect::{self, Control};
use crate::error::Result;
use crate::extract::{is_http_url, is_mailto};
use crate::models::{Candidate, Config, FailureReason, RemovalOutcome, SuccessMethod};
use crate::transport::{HttpMethod, HttpReply, HttpRequest, HttpTransport, ReqwestTransport, TransportError};
use chrono::Utc;
use futures::FutureExt;
use regex::Regex;
use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep, timeout, Instant};
use tracing::{debug, info, warn};
use url::Url;

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Link carries an expiry marker whose timestamp is already in the past.
fn is_expired(link: &str, now: i64) -> bool {
    let marked = link.to_lowercase().contains("expired")
        || Regex::new(r"(?i)(?:exp|expires|valid_until)=\d+")
            .map(|re| re.is_match(link))
            .unwrap_or(false);
    if !marked {
        return false;
    }

    let Ok(url) = Url::parse(link) else {
        return false;
    };
    let pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();
    EXPIRY_QUERY_KEYS.iter().any(|key| {
        pairs
            .iter()
            .find(|(k, _)| k == key)
            .and_then(|(_, v)| v.parse::<i64>().ok())
            .is_some_and(|ts| ts < now)
    })
}

/// RFC 8058 one-click links are confirmed with a form POST.
fn wants_one_click(link: &str) -> bool {
    if link.contains(ONE_CLICK_BODY) {
        return true;
    }
    Url::parse(link)
        .map(|url| {
            url.query_pairs()
                .any(|(k, _)| k.eq_ignore_ascii_case(ONE_CLICK_QUERY_KEY))
        })
        .unwrap_or(false)
}

fn mailto_address(link: &str) -> &str {
    let rest = link.get("mailto:".len()..).unwrap_or_default();
    rest.split('?').next().unwrap_or_default().trim()
}

/// Removal strategy engine.
///
/// Tries the cheapest route first: a single HTTP request to the unsubscribe
/// link, escalating to a pooled browser session when that request fails for
/// a reason other than a login wall or a manual step. Every attempt ends in a
/// [`RemovalOutcome`]; nothing here returns an error.
pub struct UnsubscribeClient {
    config: Config,
    transport: Arc<dyn HttpTransport>,
    browser: Option<SessionPool>,
}

impl UnsubscribeClient {
    /// Client with the reqwest transport and no browser fallback.
    pub fn new(config: Option<Config>) -> Result<Self> {
        Self::builder().config(config.unwrap_or_default()).build()
    }

    pub fn builder() -> UnsubscribeClientBuilder {
        UnsubscribeClientBuilder::default()
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Whether failed HTTP attempts can escalate to a browser session.
    pub fn has_browser(&self) -> bool {
        self.browser.is_some()
    }

    /// Attempt removal for one candidate.
    pub async fn unsubscribe_candidate(&self, candidate: &Candidate) -> RemovalOutcome {
        debug!(
            "unsubscribing {} ({})",
            candidate.sender_email, candidate.id
        );
        self.unsubscribe(candidate.unsubscribe_link.as_deref()).await
    }

    /// Attempt removal through `link`.
    pub async fn unsubscribe(&self, link: Option<&str>) -> RemovalOutcome {
        let Some(link) = link.map(str::trim).filter(|l| !l.is_empty()) else {
            return RemovalOutcome::failed(
                FailureReason::Failed,
                "No unsubscribe link available",
                None,
                "no unsubscribe link",
            );
        };

        if is_expired(link, Utc::now().timestamp()) {
            info!("unsubscribe link expired: {link}");
            return RemovalOutcome::failed(
                FailureReason::Failed,
                "Unsubscribe link has expired",
                Some(link),
                "expired",
            );
        }

        if is_mailto(link) {
            return self.mailto(link);
        }
        if !is_http_url(link) {
            return RemovalOutcome::failed(
                FailureReason::Failed,
                "Unsupported unsubscribe link",
                Some(link),
                format!("unsupported link scheme: {link}"),
            );
        }

        let outcome = self.try_http(link).await;
        let Some(reason) = outcome.failure_reason() else {
            return outcome;
        };
        if reason.is_terminal_obstacle() {
            return outcome;
        }
        match &self.browser {
            Some(pool) => {
                info!("http attempt failed ({reason:?}), escalating to browser: {link}");
                self.try_browser(pool, link).await
            }
            None => {
                debug!("no browser pool configured, keeping http outcome for {link}");
                outcome
            }
        }
    }

    fn mailto(&self, link: &str) -> RemovalOutcome {
        let address = mailto_address(link);
        if address.is_empty() {
            return RemovalOutcome::failed(
                FailureReason::Failed,
                "Invalid mailto link",
                Some(link),
                "mailto link has no address",
            );
        }
        RemovalOutcome::failed(
            FailureReason::ManualActionNeeded,
            format!("Send an email to {address} with subject 'unsubscribe'"),
            Some(link),
            "mailto unsubscribe requires sending an email",
        )
    }

    async fn try_http(&self, link: &str) -> RemovalOutcome {
        let request = if wants_one_click(link) {
            HttpRequest {
                method: HttpMethod::Post,
                url: link.to_string(),
                form_body: Some(ONE_CLICK_BODY.to_string()),
            }
        } else {
            HttpRequest {
                method: HttpMethod::Get,
                url: link.to_string(),
                form_body: None,
            }
        };
        debug!("{:?} {}", request.method, link);

        let reply = match timeout(self.config.request_timeout, self.transport.send(request)).await
        {
            Ok(Ok(reply)) => reply,
            Ok(Err(TransportError::Timeout)) | Err(_) => {
                warn!("request timed out: {link}");
                return RemovalOutcome::failed(
                    FailureReason::Timeout,
                    "Request timed out",
                    Some(link),
                    "timeout",
                );
            }
            Ok(Err(err)) => {
                warn!("request failed for {link}: {err}");
                return RemovalOutcome::failed(
                    FailureReason::Failed,
                    "Request failed",
                    Some(link),
                    err.to_string(),
                );
            }
        };
        self.judge_reply(link, reply)
    }

    fn judge_reply(&self, link: &str, reply: HttpReply) -> RemovalOutcome {
        let HttpReply {
            status,
            final_url,
            body,
        } = reply;

        if status == 429 || status == 503 {
            return RemovalOutcome::failed(
                FailureReason::Failed,
                "Rate limited by the sender",
                Some(link),
                format!("rate limited (HTTP {status})"),
            );
        }
        if !(200..400).contains(&status) {
            return RemovalOutcome::failed(
                FailureReason::Failed,
                format!("Unsubscribe request returned HTTP {status}"),
                Some(link),
                format!("HTTP {status}"),
            );
        }

        if detect::requires_login(&final_url, &body) {
            return RemovalOutcome::failed(
                FailureReason::LoginRequired,
                "Login required to unsubscribe",
                Some(link),
                format!("login wall at {final_url}"),
            );
        }
        if detect::asks_for_confirmation(&body) {
            return RemovalOutcome::failed(
                FailureReason::ManualActionNeeded,
                "Check your email to confirm the unsubscribe",
                Some(link),
                "confirmation email required",
            );
        }
        if detect::has_success_keyword(&body) {
            return RemovalOutcome::succeeded(
                SuccessMethod::Header,
                "Successfully unsubscribed",
                link,
            );
        }
        if self.config.optimistic_completion {
            RemovalOutcome::succeeded(
                SuccessMethod::Header,
                "Unsubscribe request accepted (confirmation unclear)",
                link,
            )
        } else {
            RemovalOutcome::failed(
                FailureReason::ManualActionNeeded,
                "Request accepted but removal could not be confirmed",
                Some(link),
                "no confirmation on response page",
            )
        }
    }

    async fn try_browser(&self, pool: &SessionPool, link: &str) -> RemovalOutcome {
        let mut lease = match pool.acquire().await {
            Ok(lease) => lease,
            Err(err) => {
                warn!("browser session unavailable: {err}");
                return RemovalOutcome::failed(
                    FailureReason::Failed,
                    "Browser automation failed to start",
                    Some(link),
                    err.to_string(),
                );
            }
        };

        let attempt = match lease.session() {
            Ok(session) => AssertUnwindSafe(self.drive(session, link))
                .catch_unwind()
                .await,
            Err(err) => Ok(Err(err)),
        };
        lease.release().await;

        let result = match attempt {
            Ok(result) => result,
            Err(payload) => {
                let details = panic_message(payload.as_ref());
                warn!("browser automation panicked for {link}: {details}");
                return RemovalOutcome::failed(
                    FailureReason::Failed,
                    "Browser automation error",
                    Some(link),
                    details,
                );
            }
        };

        match result {
            Ok(outcome) => outcome,
            Err(BrowserError::Timeout) => RemovalOutcome::failed(
                FailureReason::Timeout,
                "Page load timed out",
                Some(link),
                "timeout",
            ),
            Err(err) => {
                warn!("browser automation failed for {link}: {err}");
                RemovalOutcome::failed(
                    FailureReason::Failed,
                    "Browser automation error",
                    Some(link),
                    err.to_string(),
                )
            }
        }
    }

    /// Bound a single session call by the page-load timeout.
    async fn bounded<T>(
        &self,
        call: impl Future<Output = std::result::Result<T, BrowserError>>,
    ) -> std::result::Result<T, BrowserError> {
        timeout(self.config.page_load_timeout, call)
            .await
            .map_err(|_| BrowserError::Timeout)?
    }

    async fn drive(
        &self,
        session: &mut dyn BrowserSession,
        link: &str,
    ) -> std::result::Result<RemovalOutcome, BrowserError> {
        self.bounded(session.navigate(link)).await?;
        sleep(self.config.page_settle_delay).await;

        let page_url = self.bounded(session.current_url()).await?;
        let html = self.bounded(session.content()).await?;

        if detect::requires_login(&page_url, &html) {
            return Ok(RemovalOutcome::failed(
                FailureReason::LoginRequired,
                "Login required to unsubscribe",
                Some(link),
                format!("login wall at {page_url}"),
            ));
        }
        if detect::has_challenge(&html) {
            return Ok(RemovalOutcome::failed(
                FailureReason::Captcha,
                "CAPTCHA detected, manual action needed",
                Some(link),
                "captcha",
            ));
        }
        if detect::is_complex_flow(&html) {
            return Ok(RemovalOutcome::failed(
                FailureReason::ManualActionNeeded,
                "Multi-step preference page, manual action needed",
                Some(link),
                "complex preference flow",
            ));
        }

        let Some((control, html)) = self.wait_for_control(session, html).await? else {
            return Ok(RemovalOutcome::failed(
                FailureReason::ManualActionNeeded,
                "No unsubscribe button found",
                Some(link),
                "no unsubscribe control on page",
            ));
        };
        debug!("found control {} ({:?})", control.target, control.label);

        if let Some(checkbox) = detect::find_unsubscribe_checkbox(&html) {
            if !checkbox.checked {
                self.bounded(session.click(&checkbox.target)).await?;
            }
        }
        if detect::has_empty_email_input(&html) {
            return Ok(RemovalOutcome::failed(
                FailureReason::ManualActionNeeded,
                "Form requires your email address",
                Some(link),
                "email input must be filled in",
            ));
        }

        self.bounded(session.click(&control.target)).await?;
        sleep(self.config.click_settle_delay).await;
        let after = self.bounded(session.content()).await?;

        if detect::has_success_keyword(&after) {
            Ok(RemovalOutcome::succeeded(
                SuccessMethod::Browser,
                "Successfully unsubscribed via browser",
                link,
            ))
        } else if self.config.optimistic_completion {
            Ok(RemovalOutcome::succeeded(
                SuccessMethod::Browser,
                "Clicked unsubscribe button (confirmation unclear)",
                link,
            ))
        } else {
            Ok(RemovalOutcome::failed(
                FailureReason::ManualActionNeeded,
                "Clicked unsubscribe button but removal could not be confirmed",
                Some(link),
                "no confirmation after click",
            ))
        }
    }

    /// Poll the page for a control until the element-search timeout.
    async fn wait_for_control(
        &self,
        session: &mut dyn BrowserSession,
        mut html: String,
    ) -> std::result::Result<Option<(Control, String)>, BrowserError> {
        let deadline = Instant::now() + self.config.element_search_timeout;
        let poll = Duration::from_millis(ELEMENT_POLL_INTERVAL_MS);
        loop {
            if let Some(control) = detect::find_unsubscribe_control(&html) {
                return Ok(Some((control, html)));
            }
            let now = Instant::now();
            if now >= deadline {
                return Ok(None);
            }
            sleep(poll.min(deadline - now)).await;
            html = self.bounded(session.content()).await?;
        }
    }
}

/// Builder for [`UnsubscribeClient`].
#[derive(Default)]
pub struct UnsubscribeClientBuilder {
    config: Option<Config>,
    transport: Option<Arc<dyn HttpTransport>>,
    browser: Option<SessionPool>,
}

impl UnsubscribeClientBuilder {
    pub fn config(mut self, config: Config) -> Self {
        self.config = Some(config);
        self
    }

    /// Replace the default reqwest transport.
    pub fn transport(mut self, transport: Arc<dyn HttpTransport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Enable the browser fallback.
    pub fn browser_pool(mut self, pool: SessionPool) -> Self {
        self.browser = Some(pool);
        self
    }

    pub fn build(self) -> Result<UnsubscribeClient> {
        let config = self.config.unwrap_or_default();
        let transport = match self.transport {
            Some(transport) => transport,
            None => Arc::new(ReqwestTransport::new(&config)?),
        };
        Ok(UnsubscribeClient {
            config,
            transport,
            browser: self.browser,
        })
    }
}
