//! Public data models shared by the scanner, the removal engine and reporting.

use crate::constants::*;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Where an unsubscribe link was found.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnsubscribeMethod {
    /// `List-Unsubscribe` header directive.
    Header,
    /// Hyperlink or bare URL in the message content.
    Body,
    /// No link located.
    None,
}

/// One scanned message with its extracted unsubscribe metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Candidate {
    /// Opaque message identifier.
    pub id: String,
    /// Sender address, lower-cased.
    pub sender_email: String,
    /// Display name, or the address local-part when the header has none.
    pub sender_name: String,
    pub subject: String,
    /// ISO-8601 when the `Date` header parses, raw header text otherwise.
    pub date: String,
    pub unsubscribe_link: Option<String>,
    pub unsubscribe_method: UnsubscribeMethod,
}

impl Candidate {
    /// Domain part of the sender address, if any.
    pub fn sender_domain(&self) -> Option<&str> {
        self.sender_email
            .rsplit_once('@')
            .map(|(_, domain)| domain)
            .filter(|d| !d.is_empty())
    }
}

/// Static, pre-attempt estimate of how hard removal will be.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Difficulty {
    Easy,
    Medium,
    Hard,
    /// Sender is on the allow-list and is never attempted.
    Whitelisted,
}

impl fmt::Display for Difficulty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Difficulty::Easy => "easy",
            Difficulty::Medium => "medium",
            Difficulty::Hard => "hard",
            Difficulty::Whitelisted => "whitelisted",
        };
        f.write_str(s)
    }
}

/// How a successful removal was completed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SuccessMethod {
    /// A plain HTTP request was accepted.
    Header,
    /// A control was clicked in an automated browser.
    Browser,
}

/// Why a removal could not be completed automatically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureReason {
    ManualActionNeeded,
    LoginRequired,
    Captcha,
    Timeout,
    Failed,
}

impl FailureReason {
    /// Failures the HTTP path hands back without trying a browser.
    pub fn is_terminal_obstacle(self) -> bool {
        matches!(
            self,
            FailureReason::ManualActionNeeded | FailureReason::LoginRequired
        )
    }
}

/// Terminal state of one removal attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Resolution {
    Success(SuccessMethod),
    Failure(FailureReason),
}

/// Flat `method` tag used in serialized outcomes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Method {
    Header,
    Browser,
    ManualActionNeeded,
    LoginRequired,
    Captcha,
    Timeout,
    Failed,
}

impl From<Resolution> for Method {
    fn from(resolution: Resolution) -> Self {
        match resolution {
            Resolution::Success(SuccessMethod::Header) => Method::Header,
            Resolution::Success(SuccessMethod::Browser) => Method::Browser,
            Resolution::Failure(FailureReason::ManualActionNeeded) => Method::ManualActionNeeded,
            Resolution::Failure(FailureReason::LoginRequired) => Method::LoginRequired,
            Resolution::Failure(FailureReason::Captcha) => Method::Captcha,
            Resolution::Failure(FailureReason::Timeout) => Method::Timeout,
            Resolution::Failure(FailureReason::Failed) => Method::Failed,
        }
    }
}

/// Reporting bucket derived from an outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    AutoSuccess,
    ManualRequired,
    Failed,
}

/// Result of one removal attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "OutcomeRecord", try_from = "OutcomeRecord")]
pub struct RemovalOutcome {
    pub resolution: Resolution,
    /// Human-readable summary.
    pub message: String,
    /// Original link, kept for manual fallback.
    pub unsubscribe_url: Option<String>,
    pub error_details: Option<String>,
}

impl RemovalOutcome {
    pub fn succeeded(
        method: SuccessMethod,
        message: impl Into<String>,
        url: impl Into<String>,
    ) -> Self {
        Self {
            resolution: Resolution::Success(method),
            message: message.into(),
            unsubscribe_url: Some(url.into()),
            error_details: None,
        }
    }

    pub fn failed(
        reason: FailureReason,
        message: impl Into<String>,
        url: Option<&str>,
        details: impl Into<String>,
    ) -> Self {
        Self {
            resolution: Resolution::Failure(reason),
            message: message.into(),
            unsubscribe_url: url.map(str::to_string),
            error_details: Some(details.into()),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self.resolution, Resolution::Success(_))
    }

    pub fn method(&self) -> Method {
        self.resolution.into()
    }

    /// Failure reason, `None` for successful outcomes.
    pub fn failure_reason(&self) -> Option<FailureReason> {
        match self.resolution {
            Resolution::Failure(reason) => Some(reason),
            Resolution::Success(_) => None,
        }
    }

    pub fn category(&self) -> Category {
        match self.resolution {
            Resolution::Success(_) => Category::AutoSuccess,
            Resolution::Failure(
                FailureReason::ManualActionNeeded
                | FailureReason::LoginRequired
                | FailureReason::Captcha,
            ) => Category::ManualRequired,
            Resolution::Failure(_) => Category::Failed,
        }
    }
}

/// Wire shape of [`RemovalOutcome`].
#[derive(Debug, Clone, Serialize, Deserialize)]
struct OutcomeRecord {
    success: bool,
    method: Method,
    message: String,
    unsubscribe_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    error_details: Option<String>,
}

impl From<RemovalOutcome> for OutcomeRecord {
    fn from(outcome: RemovalOutcome) -> Self {
        Self {
            success: outcome.is_success(),
            method: outcome.method(),
            message: outcome.message,
            unsubscribe_url: outcome.unsubscribe_url,
            error_details: outcome.error_details,
        }
    }
}

impl TryFrom<OutcomeRecord> for RemovalOutcome {
    type Error = String;

    fn try_from(record: OutcomeRecord) -> std::result::Result<Self, Self::Error> {
        let resolution = match (record.success, record.method) {
            (true, Method::Header) => Resolution::Success(SuccessMethod::Header),
            (true, Method::Browser) => Resolution::Success(SuccessMethod::Browser),
            (false, Method::ManualActionNeeded) => {
                Resolution::Failure(FailureReason::ManualActionNeeded)
            }
            (false, Method::LoginRequired) => Resolution::Failure(FailureReason::LoginRequired),
            (false, Method::Captcha) => Resolution::Failure(FailureReason::Captcha),
            (false, Method::Timeout) => Resolution::Failure(FailureReason::Timeout),
            (false, Method::Failed) => Resolution::Failure(FailureReason::Failed),
            (success, method) => {
                return Err(format!(
                    "outcome with success={success} cannot carry method {method:?}"
                ))
            }
        };
        Ok(Self {
            resolution,
            message: record.message,
            unsubscribe_url: record.unsubscribe_url,
            error_details: record.error_details,
        })
    }
}

/// One processed batch entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchItem {
    #[serde(flatten)]
    pub outcome: RemovalOutcome,
    pub sender_name: String,
    pub sender_email: String,
    pub category: Category,
}

/// Aggregated result of a batch run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchSummary {
    /// Items processed; equals `results.len()`.
    pub total: usize,
    pub auto_success_count: usize,
    pub manual_required_count: usize,
    pub failed_count: usize,
    /// In input order.
    pub results: Vec<BatchItem>,
    pub cancelled: bool,
    /// Candidates left untouched after a cancellation.
    pub skipped: usize,
}

impl BatchSummary {
    pub(crate) fn record(&mut self, item: BatchItem) {
        match item.category {
            Category::AutoSuccess => self.auto_success_count += 1,
            Category::ManualRequired => self.manual_required_count += 1,
            Category::Failed => self.failed_count += 1,
        }
        self.total += 1;
        self.results.push(item);
    }
}

/// Engine configuration. Every wait the engine performs is bounded by one of
/// these values.
#[derive(Debug, Clone)]
pub struct Config {
    pub request_timeout: Duration,
    pub page_load_timeout: Duration,
    /// Total time spent polling a page for an unsubscribe control.
    pub element_search_timeout: Duration,
    /// Pause after navigation before the page is inspected.
    pub page_settle_delay: Duration,
    /// Pause after clicking before the result page is inspected.
    pub click_settle_delay: Duration,
    /// Minimum gap between two batch attempts.
    pub inter_item_delay: Duration,
    pub user_agent: String,
    pub proxy_url: Option<String>,
    /// Count an accepted request or click without a confirmation keyword as
    /// success.
    pub optimistic_completion: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            request_timeout: default_request_timeout(),
            page_load_timeout: default_page_load_timeout(),
            element_search_timeout: default_element_search_timeout(),
            page_settle_delay: Duration::from_secs(DEFAULT_PAGE_SETTLE_SECS),
            click_settle_delay: Duration::from_secs(DEFAULT_CLICK_SETTLE_SECS),
            inter_item_delay: Duration::from_secs(DEFAULT_INTER_ITEM_DELAY_SECS),
            user_agent: USER_AGENT.to_string(),
            proxy_url: None,
            optimistic_completion: true,
        }
    }
}

impl Config {
    /// Configuration with every delay set to zero and short timeouts.
    pub fn immediate() -> Self {
        Self {
            request_timeout: Duration::from_secs(1),
            page_load_timeout: Duration::from_secs(1),
            element_search_timeout: Duration::ZERO,
            page_settle_delay: Duration::ZERO,
            click_settle_delay: Duration::ZERO,
            inter_item_delay: Duration::ZERO,
            ..Self::default()
        }
    }
}
