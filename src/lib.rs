pub mod allow_list;
pub mod batch;
pub mod browser;
pub mod client;
pub mod constants;
pub mod detect;
pub mod difficulty;
pub mod error;
pub mod extract;
pub mod message;
pub mod models;
pub mod scanner;
pub mod transport;

pub use allow_list::{AllowList, AllowListEntry, ExclusionStore};
pub use batch::{BatchOptions, BatchProgress};
pub use browser::{BrowserError, BrowserLauncher, BrowserSession, ElementTarget, SessionPool};
pub use client::{UnsubscribeClient, UnsubscribeClientBuilder};
pub use difficulty::{annotate, categorize, classify, DifficultyCounts, ScannedNewsletter};
pub use error::{Error, Result};
pub use extract::{find_unsubscribe_link_in_body, parse_unsubscribe_header};
pub use message::{extract_body, normalize_message, RawMessage};
pub use models::{
    BatchItem, BatchSummary, Candidate, Category, Config, Difficulty, FailureReason, Method,
    RemovalOutcome, Resolution, SuccessMethod, UnsubscribeMethod,
};
pub use scanner::{
    inbox_stats, scan_newsletters, InboxStats, MailSource, MessagePage, ScanLimit, ScanOptions,
    ScanReport,
};
pub use transport::{HttpTransport, ReqwestTransport};
