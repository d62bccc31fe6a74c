//! Inbox scanning: page through matching messages and normalize each one into
//! a [`Candidate`].

use crate::constants::{DEFAULT_SCAN_LIMIT, DEFAULT_SCAN_QUERY, MAX_IDS_PER_PAGE, SCAN_PROGRESS_EVERY};
use crate::error::{Error, Result};
use crate::message::{normalize_message, RawMessage};
use crate::models::Candidate;
use async_trait::async_trait;
use serde::{Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, info, warn};

/// One page of message identifiers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MessagePage {
    pub ids: Vec<String>,
    pub next_page_token: Option<String>,
    /// Provider's estimate of the total number of matches.
    pub result_size_estimate: u64,
}

/// Mail retrieval collaborator, e.g. a Gmail API client.
#[async_trait]
pub trait MailSource: Send + Sync {
    /// At most `max_results` identifiers matching `query`, starting at
    /// `page_token`.
    async fn list_message_ids(
        &self,
        query: &str,
        max_results: usize,
        page_token: Option<&str>,
    ) -> Result<MessagePage>;

    async fn get_message(&self, id: &str) -> Result<RawMessage>;

    /// Number of messages in the mailbox.
    async fn messages_total(&self) -> Result<u64>;
}

/// How many messages a scan may inspect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanLimit {
    Limited(usize),
    /// The whole result set ("all").
    Unbounded,
}

impl ScanLimit {
    fn remaining(self, scanned: usize) -> Option<usize> {
        match self {
            ScanLimit::Limited(max) => Some(max.saturating_sub(scanned)),
            ScanLimit::Unbounded => None,
        }
    }

    fn reached(self, scanned: usize) -> bool {
        self.remaining(scanned) == Some(0)
    }
}

impl Default for ScanLimit {
    fn default() -> Self {
        ScanLimit::Limited(DEFAULT_SCAN_LIMIT)
    }
}

impl FromStr for ScanLimit {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        if s.eq_ignore_ascii_case("all") {
            return Ok(ScanLimit::Unbounded);
        }
        s.parse::<usize>()
            .map(ScanLimit::Limited)
            .map_err(|_| Error::Parse(format!("invalid scan limit: {s}")))
    }
}

impl fmt::Display for ScanLimit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScanLimit::Limited(n) => write!(f, "{n}"),
            ScanLimit::Unbounded => f.write_str("all"),
        }
    }
}

impl Serialize for ScanLimit {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            ScanLimit::Limited(n) => serializer.serialize_u64(*n as u64),
            ScanLimit::Unbounded => serializer.serialize_str("all"),
        }
    }
}

/// Periodic scan progress.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanProgress {
    pub scanned: usize,
    pub limit: ScanLimit,
    pub found: usize,
}

#[derive(Debug, Clone)]
pub struct ScanOptions {
    pub query: String,
    pub limit: ScanLimit,
    pub progress: Option<UnboundedSender<ScanProgress>>,
    /// Emit progress after every this many messages.
    pub progress_every: usize,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            query: DEFAULT_SCAN_QUERY.to_string(),
            limit: ScanLimit::default(),
            progress: None,
            progress_every: SCAN_PROGRESS_EVERY,
        }
    }
}

/// Scan result. `error` is set when listing failed part-way; the messages
/// collected up to that point are still reported.
#[derive(Debug, Clone, Serialize)]
pub struct ScanReport {
    pub newsletters: Vec<Candidate>,
    pub total_scanned: usize,
    pub total_found: usize,
    pub scan_limit: ScanLimit,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Walk the messages matching `options.query` until the limit or the last
/// page. Messages that fail to fetch or normalize count as scanned and are
/// skipped.
pub async fn scan_newsletters(source: &dyn MailSource, options: &ScanOptions) -> ScanReport {
    let limit = options.limit;
    let mut newsletters = Vec::new();
    let mut scanned = 0usize;
    let mut error = None;
    let mut page_token: Option<String> = None;
    info!("scanning for newsletters (limit {limit}, query {:?})", options.query);

    loop {
        let batch = limit
            .remaining(scanned)
            .map_or(MAX_IDS_PER_PAGE, |left| left.min(MAX_IDS_PER_PAGE));
        if batch == 0 {
            break;
        }

        let page = match source
            .list_message_ids(&options.query, batch, page_token.as_deref())
            .await
        {
            Ok(page) => page,
            Err(err) => {
                warn!("listing messages failed: {err}");
                error = Some(err.to_string());
                break;
            }
        };
        if page.ids.is_empty() {
            debug!("no more messages");
            break;
        }

        for id in page.ids.iter().take(batch) {
            let fetched = source.get_message(id).await;
            match fetched.and_then(|raw| normalize_message(&raw)) {
                Ok(candidate) => newsletters.push(candidate),
                Err(err) => warn!("skipping message {id}: {err}"),
            }
            scanned += 1;

            if options.progress_every > 0 && scanned % options.progress_every == 0 {
                debug!("processed {scanned} emails, found {} newsletters", newsletters.len());
                if let Some(sink) = &options.progress {
                    let _ = sink.send(ScanProgress {
                        scanned,
                        limit,
                        found: newsletters.len(),
                    });
                }
            }
        }

        if limit.reached(scanned) {
            break;
        }
        match page.next_page_token {
            Some(token) => page_token = Some(token),
            None => {
                debug!("reached end of search results");
                break;
            }
        }
    }

    info!("scan complete: {scanned} scanned, {} found", newsletters.len());
    ScanReport {
        total_found: newsletters.len(),
        newsletters,
        total_scanned: scanned,
        scan_limit: limit,
        error,
    }
}

/// Inbox size figures used to suggest a scan limit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct InboxStats {
    pub total_emails: u64,
    pub estimated_newsletters: u64,
    pub recommended_limit: usize,
}

/// Smallest standard limit covering `estimated_newsletters`, capped at 1000.
pub fn recommend_scan_limit(estimated_newsletters: u64) -> usize {
    match estimated_newsletters {
        0..=50 => 50,
        51..=100 => 100,
        101..=250 => 250,
        251..=500 => 500,
        _ => 1000,
    }
}

pub async fn inbox_stats(source: &dyn MailSource) -> Result<InboxStats> {
    let total_emails = source.messages_total().await?;
    let probe = source.list_message_ids(DEFAULT_SCAN_QUERY, 1, None).await?;
    let stats = InboxStats {
        total_emails,
        estimated_newsletters: probe.result_size_estimate,
        recommended_limit: recommend_scan_limit(probe.result_size_estimate),
    };
    info!(
        "inbox: {} emails, ~{} newsletters, recommended limit {}",
        stats.total_emails, stats.estimated_newsletters, stats.recommended_limit
    );
    Ok(stats)
}
