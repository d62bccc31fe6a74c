//! Static difficulty scoring for scanned candidates.
//!
//! Classification never touches the network; it only looks at the link, the
//! discovery method and the sender domain.

use crate::allow_list::ExclusionStore;
use crate::constants::{BULK_MAIL_DOMAINS, LOGIN_REQUIRED_DOMAINS};
use crate::models::{Candidate, Difficulty, UnsubscribeMethod};
use serde::{Deserialize, Serialize};
use tracing::debug;
use url::Url;

/// `host` equals `domain` or is one of its subdomains.
pub(crate) fn domain_matches(host: &str, domain: &str) -> bool {
    let host = host.trim_end_matches('.').to_ascii_lowercase();
    host == domain || host.ends_with(&format!(".{domain}"))
}

pub(crate) fn in_domain_set(host: &str, set: &[&str]) -> bool {
    set.iter().any(|d| domain_matches(host, d))
}

/// Score how hard removal is likely to be. First matching rule wins:
///
/// 1. header directive: easy
/// 2. no link: medium
/// 3. sender or link on a login-walled service: hard
/// 4. `mailto:` link: hard
/// 5. bulk-mail platform link: medium
/// 6. body link: medium
/// 7. anything else, including unparsable links: medium
pub fn classify(
    link: Option<&str>,
    method: UnsubscribeMethod,
    sender_domain: Option<&str>,
) -> Difficulty {
    if method == UnsubscribeMethod::Header {
        return Difficulty::Easy;
    }
    let Some(link) = link.filter(|l| !l.trim().is_empty()) else {
        return Difficulty::Medium;
    };
    let parsed = match Url::parse(link.trim()) {
        Ok(url) => url,
        Err(err) => {
            debug!("cannot parse {link} for classification: {err}");
            return Difficulty::Medium;
        }
    };
    let host = parsed.host_str().unwrap_or_default();

    let login_walled = (!host.is_empty() && in_domain_set(host, LOGIN_REQUIRED_DOMAINS))
        || sender_domain.is_some_and(|d| in_domain_set(d, LOGIN_REQUIRED_DOMAINS));
    if login_walled {
        return Difficulty::Hard;
    }
    if parsed.scheme().eq_ignore_ascii_case("mailto") {
        return Difficulty::Hard;
    }
    if !host.is_empty() && in_domain_set(host, BULK_MAIL_DOMAINS) {
        return Difficulty::Medium;
    }
    Difficulty::Medium
}

/// [`classify`] applied to a candidate.
pub fn categorize(candidate: &Candidate) -> Difficulty {
    classify(
        candidate.unsubscribe_link.as_deref(),
        candidate.unsubscribe_method,
        candidate.sender_domain(),
    )
}

/// A candidate with its scan-time annotations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScannedNewsletter {
    #[serde(flatten)]
    pub candidate: Candidate,
    pub difficulty: Difficulty,
    pub whitelisted: bool,
}

impl ScannedNewsletter {
    /// Allow-listed senders must never reach the removal engine.
    pub fn is_removable(&self) -> bool {
        !self.whitelisted
    }
}

/// Per-tier counts for a scan.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DifficultyCounts {
    pub easy: usize,
    pub medium: usize,
    pub hard: usize,
    pub whitelisted: usize,
}

impl DifficultyCounts {
    fn bump(&mut self, tier: Difficulty) {
        match tier {
            Difficulty::Easy => self.easy += 1,
            Difficulty::Medium => self.medium += 1,
            Difficulty::Hard => self.hard += 1,
            Difficulty::Whitelisted => self.whitelisted += 1,
        }
    }
}

/// Mark allow-listed senders and classify everyone else.
pub fn annotate(
    candidates: Vec<Candidate>,
    store: &dyn ExclusionStore,
) -> (Vec<ScannedNewsletter>, DifficultyCounts) {
    let mut counts = DifficultyCounts::default();
    let annotated = candidates
        .into_iter()
        .map(|candidate| {
            let whitelisted =
                !candidate.sender_email.is_empty() && store.is_excluded(&candidate.sender_email);
            let difficulty = if whitelisted {
                debug!("whitelisted sender: {}", candidate.sender_email);
                Difficulty::Whitelisted
            } else {
                categorize(&candidate)
            };
            counts.bump(difficulty);
            ScannedNewsletter {
                candidate,
                difficulty,
                whitelisted,
            }
        })
        .collect();
    (annotated, counts)
}
