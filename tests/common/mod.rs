#![allow(dead_code)]

use async_trait::async_trait;
use serde_json::json;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use unsubscribe_engine::browser::{BrowserError, BrowserLauncher, BrowserSession, ElementTarget};
use unsubscribe_engine::message::RawMessage;
use unsubscribe_engine::scanner::{MailSource, MessagePage};
use unsubscribe_engine::transport::{HttpReply, HttpRequest, HttpTransport, TransportError};
use unsubscribe_engine::{Error, Result};

/// Canned HTTP responses keyed by URL.
#[derive(Default)]
pub struct MockTransport {
    replies: HashMap<String, std::result::Result<HttpReply, TransportError>>,
    pub requests: Mutex<Vec<HttpRequest>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reply(mut self, url: &str, status: u16, body: &str) -> Self {
        self.replies.insert(
            url.to_string(),
            Ok(HttpReply {
                status,
                final_url: url.to_string(),
                body: body.to_string(),
            }),
        );
        self
    }

    pub fn redirect(mut self, url: &str, final_url: &str, body: &str) -> Self {
        self.replies.insert(
            url.to_string(),
            Ok(HttpReply {
                status: 200,
                final_url: final_url.to_string(),
                body: body.to_string(),
            }),
        );
        self
    }

    pub fn error(mut self, url: &str, err: TransportError) -> Self {
        self.replies.insert(url.to_string(), Err(err));
        self
    }

    pub fn sent(&self) -> Vec<HttpRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl HttpTransport for MockTransport {
    async fn send(&self, request: HttpRequest) -> std::result::Result<HttpReply, TransportError> {
        self.requests.lock().unwrap().push(request.clone());
        self.replies
            .get(&request.url)
            .cloned()
            .unwrap_or_else(|| Err(TransportError::Network(format!("no route to {}", request.url))))
    }
}

/// Transport whose requests never complete.
pub struct StalledTransport;

#[async_trait]
impl HttpTransport for StalledTransport {
    async fn send(&self, _request: HttpRequest) -> std::result::Result<HttpReply, TransportError> {
        std::future::pending().await
    }
}

/// One scripted page: what it shows before and after a click.
#[derive(Clone, Default)]
pub struct ScriptedPage {
    pub url: Option<String>,
    pub html: String,
    pub after_click: Option<String>,
    pub nav_error: Option<BrowserError>,
    /// Served by the first content reads before `html`.
    pub loading: Vec<String>,
    pub stalls: bool,
    pub panics: bool,
}

impl ScriptedPage {
    pub fn html(html: &str) -> Self {
        Self {
            html: html.to_string(),
            ..Default::default()
        }
    }

    pub fn then(mut self, after_click: &str) -> Self {
        self.after_click = Some(after_click.to_string());
        self
    }

    pub fn at(mut self, url: &str) -> Self {
        self.url = Some(url.to_string());
        self
    }

    pub fn loading(mut self, html: &str) -> Self {
        self.loading.push(html.to_string());
        self
    }

    /// Navigation never completes.
    pub fn stalled() -> Self {
        Self {
            stalls: true,
            ..Default::default()
        }
    }

    /// Reading the page content panics.
    pub fn panicking() -> Self {
        Self {
            panics: true,
            ..Default::default()
        }
    }

    pub fn failing(err: BrowserError) -> Self {
        Self {
            nav_error: Some(err),
            ..Default::default()
        }
    }
}

#[derive(Default)]
pub struct BrowserLog {
    pub launches: AtomicUsize,
    pub closes: AtomicUsize,
    pub clicks: Mutex<Vec<ElementTarget>>,
}

impl BrowserLog {
    pub fn launches(&self) -> usize {
        self.launches.load(Ordering::SeqCst)
    }

    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    pub fn clicks(&self) -> Vec<ElementTarget> {
        self.clicks.lock().unwrap().clone()
    }
}

#[derive(Clone, Default)]
pub struct ScriptedLauncher {
    pages: Arc<HashMap<String, ScriptedPage>>,
    pub log: Arc<BrowserLog>,
    fail_launch: bool,
}

impl ScriptedLauncher {
    pub fn new(pages: Vec<(&str, ScriptedPage)>) -> Self {
        Self {
            pages: Arc::new(
                pages
                    .into_iter()
                    .map(|(url, page)| (url.to_string(), page))
                    .collect(),
            ),
            ..Default::default()
        }
    }

    pub fn broken() -> Self {
        Self {
            fail_launch: true,
            ..Default::default()
        }
    }
}

#[async_trait]
impl BrowserLauncher for ScriptedLauncher {
    async fn launch(&self) -> std::result::Result<Box<dyn BrowserSession>, BrowserError> {
        if self.fail_launch {
            return Err(BrowserError::Launch("no chromium binary".into()));
        }
        self.log.launches.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(ScriptedSession {
            pages: self.pages.clone(),
            log: self.log.clone(),
            current: None,
            clicked: false,
            reads: 0,
        }))
    }
}

struct ScriptedSession {
    pages: Arc<HashMap<String, ScriptedPage>>,
    log: Arc<BrowserLog>,
    current: Option<(String, ScriptedPage)>,
    clicked: bool,
    reads: usize,
}

impl ScriptedSession {
    fn page(&self) -> std::result::Result<&(String, ScriptedPage), BrowserError> {
        self.current
            .as_ref()
            .ok_or_else(|| BrowserError::Internal("no page loaded".into()))
    }
}

#[async_trait]
impl BrowserSession for ScriptedSession {
    async fn navigate(&mut self, url: &str) -> std::result::Result<(), BrowserError> {
        let page = self
            .pages
            .get(url)
            .cloned()
            .ok_or_else(|| BrowserError::Navigation {
                url: url.to_string(),
                details: "unknown page".into(),
            })?;
        if page.stalls {
            std::future::pending::<()>().await;
        }
        if let Some(err) = page.nav_error.clone() {
            return Err(err);
        }
        self.current = Some((url.to_string(), page));
        self.clicked = false;
        self.reads = 0;
        Ok(())
    }

    async fn current_url(&mut self) -> std::result::Result<String, BrowserError> {
        let (requested, page) = self.page()?;
        Ok(page.url.clone().unwrap_or_else(|| requested.clone()))
    }

    async fn content(&mut self) -> std::result::Result<String, BrowserError> {
        let clicked = self.clicked;
        let reads = self.reads;
        self.reads += 1;
        let (_, page) = self.page()?;
        if page.panics {
            panic!("renderer crashed");
        }
        if let Some(loading) = page.loading.get(reads) {
            return Ok(loading.clone());
        }
        Ok(match (&page.after_click, clicked) {
            (Some(after), true) => after.clone(),
            _ => page.html.clone(),
        })
    }

    async fn click(&mut self, target: &ElementTarget) -> std::result::Result<(), BrowserError> {
        self.page()?;
        self.log.clicks.lock().unwrap().push(target.clone());
        self.clicked = true;
        Ok(())
    }

    async fn close(&mut self) -> std::result::Result<(), BrowserError> {
        self.log.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// In-memory mailbox serving Gmail-format messages.
pub struct MockMailbox {
    messages: Vec<RawMessage>,
    pub page_size_cap: usize,
    /// Fail listing once this many pages have been served.
    pub fail_after_pages: Option<usize>,
    pub pages_served: AtomicUsize,
    pub requested_sizes: Mutex<Vec<usize>>,
}

impl MockMailbox {
    pub fn new(messages: Vec<RawMessage>) -> Self {
        Self {
            messages,
            page_size_cap: usize::MAX,
            fail_after_pages: None,
            pages_served: AtomicUsize::new(0),
            requested_sizes: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl MailSource for MockMailbox {
    async fn list_message_ids(
        &self,
        _query: &str,
        max_results: usize,
        page_token: Option<&str>,
    ) -> Result<MessagePage> {
        let served = self.pages_served.fetch_add(1, Ordering::SeqCst);
        if self.fail_after_pages.is_some_and(|n| served >= n) {
            return Err(Error::Mailbox("quota exceeded".into()));
        }
        self.requested_sizes.lock().unwrap().push(max_results);

        let start: usize = page_token.map(|t| t.parse().unwrap()).unwrap_or(0);
        let size = max_results.min(self.page_size_cap);
        let end = (start + size).min(self.messages.len());
        let ids = self.messages[start..end].iter().map(|m| m.id.clone()).collect();
        Ok(MessagePage {
            ids,
            next_page_token: (end < self.messages.len()).then(|| end.to_string()),
            result_size_estimate: self.messages.len() as u64,
        })
    }

    async fn get_message(&self, id: &str) -> Result<RawMessage> {
        self.messages
            .iter()
            .find(|m| m.id == id)
            .cloned()
            .ok_or_else(|| Error::Mailbox(format!("message {id} not found")))
    }

    async fn messages_total(&self) -> Result<u64> {
        Ok(self.messages.len() as u64 * 4)
    }
}

/// Gmail-format message with the given headers and an HTML body.
pub fn raw_message(id: &str, from: &str, list_unsubscribe: Option<&str>, html: &str) -> RawMessage {
    use base64::engine::general_purpose::URL_SAFE;
    use base64::Engine;

    let mut headers = vec![
        json!({"name": "From", "value": from}),
        json!({"name": "Subject", "value": format!("Issue {id}")}),
        json!({"name": "Date", "value": "Tue, 1 Oct 2024 09:30:00 +0000"}),
    ];
    if let Some(value) = list_unsubscribe {
        headers.push(json!({"name": "List-Unsubscribe", "value": value}));
    }
    serde_json::from_value(json!({
        "id": id,
        "payload": {
            "mimeType": "multipart/alternative",
            "headers": headers,
            "parts": [
                {"mimeType": "text/plain", "body": {"data": URL_SAFE.encode("plain text")}},
                {"mimeType": "text/html", "body": {"data": URL_SAFE.encode(html)}}
            ]
        }
    }))
    .unwrap()
}
