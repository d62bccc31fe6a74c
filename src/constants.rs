use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use std::time::Duration;

pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_PAGE_LOAD_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_ELEMENT_SEARCH_TIMEOUT_SECS: u64 = 5;
pub const DEFAULT_PAGE_SETTLE_SECS: u64 = 2;
pub const DEFAULT_CLICK_SETTLE_SECS: u64 = 5;
pub const DEFAULT_INTER_ITEM_DELAY_SECS: u64 = 2;

/// Interval between page polls while waiting for an unsubscribe control.
pub const ELEMENT_POLL_INTERVAL_MS: u64 = 250;

pub const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

pub const DEFAULT_HEADERS: &[(&str, &str)] = &[
    ("accept", "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8"),
    ("accept-language", "en-US,en;q=0.5"),
    ("upgrade-insecure-requests", "1"),
];

/// RFC 8058 one-click body and the marker searched for in links.
pub const ONE_CLICK_BODY: &str = "List-Unsubscribe=One-Click";
pub const ONE_CLICK_QUERY_KEY: &str = "one-click";

pub const DEFAULT_SCAN_QUERY: &str = "is:inbox \"unsubscribe\"";
pub const MAX_IDS_PER_PAGE: usize = 100;
pub const DEFAULT_SCAN_LIMIT: usize = 100;
pub const SCAN_PROGRESS_EVERY: usize = 50;

/// Senders whose unsubscribe pages sit behind an account login.
pub const LOGIN_REQUIRED_DOMAINS: &[&str] =
    &["medium.com", "quora.com", "substack.com", "patreon.com"];

/// Bulk-mail platforms with predictable hosted unsubscribe pages.
pub const BULK_MAIL_DOMAINS: &[&str] = &[
    "mailchimp.com",
    "sendgrid.net",
    "constantcontact.com",
    "aweber.com",
    "getresponse.com",
    "activecampaign.com",
];

pub const EXPIRY_QUERY_KEYS: &[&str] = &["exp", "expires", "valid_until"];

pub const SUCCESS_KEYWORDS: &[&str] =
    &["unsubscribed", "removed", "success", "confirmed", "opted out"];

pub const CONFIRMATION_KEYWORDS: &[&str] = &["confirmation email", "check your email"];

pub const LOGIN_PATH_PATTERNS: &[&str] = &["/login", "/signin", "/sign-in", "/auth"];

pub const LOGIN_KEYWORDS: &[&str] = &[
    "sign in",
    "log in",
    "login required",
    "please login",
    "authentication required",
];

pub const CAPTCHA_FRAME_MARKERS: &[&str] = &["recaptcha", "hcaptcha", "turnstile"];

pub const CAPTCHA_KEYWORDS: &[&str] = &["recaptcha", "hcaptcha", "captcha"];

pub const PREFERENCE_KEYWORDS: &[&str] = &[
    "email preferences",
    "manage subscriptions",
    "notification settings",
    "choose which emails",
    "select categories",
    "update preferences",
];

/// More checkboxes than this on a preference page means a multi-step flow.
pub const COMPLEX_FLOW_CHECKBOX_LIMIT: usize = 3;

pub fn default_headers() -> HeaderMap {
    let mut headers = HeaderMap::new();
    for (k, v) in DEFAULT_HEADERS {
        if let Ok(name) = HeaderName::from_bytes(k.as_bytes()) {
            if let Ok(val) = HeaderValue::from_str(v) {
                headers.insert(name, val);
            }
        }
    }
    headers
}

pub fn default_request_timeout() -> Duration {
    Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS)
}

pub fn default_page_load_timeout() -> Duration {
    Duration::from_secs(DEFAULT_PAGE_LOAD_TIMEOUT_SECS)
}

pub fn default_element_search_timeout() -> Duration {
    Duration::from_secs(DEFAULT_ELEMENT_SEARCH_TIMEOUT_SECS)
}
