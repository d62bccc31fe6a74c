//! HTTP capability used by the lightweight removal strategy.

use crate::constants::default_headers;
use crate::models::Config;
use async_trait::async_trait;
use reqwest::{cookie::Jar, header::CONTENT_TYPE, Client, ClientBuilder};
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Post,
}

/// A single unsubscribe request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    pub method: HttpMethod,
    pub url: String,
    /// Form-encoded body, only sent with POST.
    pub form_body: Option<String>,
}

/// Response after redirects have been followed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpReply {
    pub status: u16,
    /// URL of the last hop.
    pub final_url: String,
    pub body: String,
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    /// No response within the request timeout.
    #[error("request timed out")]
    Timeout,
    /// Connection, TLS, redirect or body errors.
    #[error("network error: {0}")]
    Network(String),
    /// The client could not be constructed.
    #[error("transport setup failed: {0}")]
    Build(String),
}

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            TransportError::Timeout
        } else {
            TransportError::Network(err.to_string())
        }
    }
}

/// Sends one request and reports the final response. Implementations must
/// follow redirects and report timeouts as [`TransportError::Timeout`].
#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn send(&self, request: HttpRequest) -> Result<HttpReply, TransportError>;
}

/// [`HttpTransport`] backed by a reqwest client with a cookie jar and
/// browser-like default headers.
pub struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    pub fn new(config: &Config) -> Result<Self, TransportError> {
        let jar = Arc::new(Jar::default());
        let mut builder = ClientBuilder::new()
            .cookie_provider(jar)
            .timeout(config.request_timeout)
            .user_agent(config.user_agent.clone())
            .default_headers(default_headers());

        if let Some(proxy) = &config.proxy_url {
            let proxy =
                reqwest::Proxy::all(proxy).map_err(|e| TransportError::Build(e.to_string()))?;
            builder = builder.proxy(proxy);
        }

        let client = builder
            .build()
            .map_err(|e| TransportError::Build(e.to_string()))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn send(&self, request: HttpRequest) -> Result<HttpReply, TransportError> {
        let builder = match request.method {
            HttpMethod::Get => self.client.get(&request.url),
            HttpMethod::Post => {
                let post = self.client.post(&request.url);
                match request.form_body {
                    Some(body) => post
                        .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
                        .body(body),
                    None => post,
                }
            }
        };

        let resp = builder.send().await?;
        let status = resp.status().as_u16();
        let final_url = resp.url().to_string();
        let body = resp.text().await?;
        debug!("{} answered {} ({} bytes)", final_url, status, body.len());
        Ok(HttpReply {
            status,
            final_url,
            body,
        })
    }
}
