//! Unsubscribe link discovery in `List-Unsubscribe` headers and message bodies.

use regex::Regex;
use scraper::{Html, Selector};

pub(crate) fn is_http_url(link: &str) -> bool {
    let lower = link.trim_start().to_ascii_lowercase();
    lower.starts_with("http://") || lower.starts_with("https://")
}

pub(crate) fn is_mailto(link: &str) -> bool {
    link.trim_start().to_ascii_lowercase().starts_with("mailto:")
}

/// Pick the unsubscribe target out of a `List-Unsubscribe` header value.
///
/// The header lists bracketed URIs, e.g.
/// `<mailto:unsub@example.com>, <https://example.com/u>`. The first HTTP(S)
/// URI wins regardless of position; a `mailto:` URI is only returned when no
/// web link is present. Values without bracketed tokens yield `None`.
pub fn parse_unsubscribe_header(value: &str) -> Option<String> {
    let re = Regex::new(r"<([^>]+)>").ok()?;
    let tokens: Vec<&str> = re
        .captures_iter(value)
        .filter_map(|caps| caps.get(1))
        .map(|m| m.as_str().trim())
        .collect();

    tokens
        .iter()
        .find(|t| is_http_url(t))
        .or_else(|| tokens.iter().find(|t| is_mailto(t)))
        .map(|t| t.to_string())
}

/// Find an unsubscribe link in a decoded HTML or plain-text body.
///
/// Anchors qualify when their href or visible text mentions "unsubscribe" and
/// the href is an HTTP(S) URL; the first in document order wins. Bodies with no
/// qualifying anchor are scanned for a bare URL containing "unsubscribe".
pub fn find_unsubscribe_link_in_body(body: &str) -> Option<String> {
    if body.trim().is_empty() {
        return None;
    }

    let doc = Html::parse_document(body);
    if let Ok(sel) = Selector::parse("a[href]") {
        for node in doc.select(&sel) {
            let Some(href) = node.value().attr("href") else {
                continue;
            };
            let href = href.trim();
            let text = node.text().collect::<String>().to_lowercase();
            let mentions =
                href.to_lowercase().contains("unsubscribe") || text.contains("unsubscribe");
            if mentions && is_http_url(href) {
                return Some(href.to_string());
            }
        }
    }

    let re = Regex::new(r#"(?i)https?://[^\s<>"]+unsubscribe[^\s<>"]*"#).ok()?;
    re.find(body).map(|m| m.as_str().to_string())
}
