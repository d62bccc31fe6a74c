//! Page inspection shared by the HTTP and browser strategies.
//!
//! Everything here is a pure function over a page URL and its HTML source, so
//! the same checks run on a fetched response body and on a rendered page.

use crate::browser::ElementTarget;
use crate::constants::*;
use crate::difficulty::in_domain_set;
use scraper::{ElementRef, Html, Selector};
use std::collections::HashMap;
use url::Url;

fn contains_any(haystack: &str, needles: &[&str]) -> bool {
    needles.iter().any(|n| haystack.contains(n))
}

fn attr_lower(el: &ElementRef<'_>, name: &str) -> String {
    el.value().attr(name).unwrap_or_default().trim().to_ascii_lowercase()
}

fn inputs(doc: &Html) -> Vec<ElementRef<'_>> {
    match Selector::parse("input") {
        Ok(sel) => doc.select(&sel).collect(),
        Err(_) => Vec::new(),
    }
}

fn input_type(el: &ElementRef<'_>) -> String {
    let t = attr_lower(el, "type");
    if t.is_empty() {
        "text".to_string()
    } else {
        t
    }
}

pub fn has_success_keyword(html: &str) -> bool {
    contains_any(&html.to_lowercase(), SUCCESS_KEYWORDS)
}

/// The site sent a confirmation mail instead of completing the removal.
pub fn asks_for_confirmation(html: &str) -> bool {
    contains_any(&html.to_lowercase(), CONFIRMATION_KEYWORDS)
}

fn url_parts(url: &str) -> (String, String) {
    match Url::parse(url) {
        Ok(parsed) => (
            parsed.path().to_ascii_lowercase(),
            parsed.host_str().unwrap_or_default().to_ascii_lowercase(),
        ),
        Err(_) => (url.to_ascii_lowercase(), String::new()),
    }
}

/// Login wall: login-like path, a password field, login phrasing, or a
/// service known to require an account.
pub fn requires_login(url: &str, html: &str) -> bool {
    let (path, host) = url_parts(url);
    if contains_any(&path, LOGIN_PATH_PATTERNS) {
        return true;
    }

    let doc = Html::parse_document(html);
    if inputs(&doc).iter().any(|el| input_type(el) == "password") {
        return true;
    }

    if contains_any(&html.to_lowercase(), LOGIN_KEYWORDS) {
        return true;
    }

    !host.is_empty() && in_domain_set(&host, LOGIN_REQUIRED_DOMAINS)
}

/// Automated-challenge widget: an embedded challenge frame or challenge text.
pub fn has_challenge(html: &str) -> bool {
    let doc = Html::parse_document(html);
    if let Ok(sel) = Selector::parse("iframe") {
        let framed = doc
            .select(&sel)
            .any(|el| contains_any(&attr_lower(&el, "src"), CAPTCHA_FRAME_MARKERS));
        if framed {
            return true;
        }
    }
    contains_any(&html.to_lowercase(), CAPTCHA_KEYWORDS)
}

/// Preference-center page: preference phrasing plus more than a handful of
/// checkboxes.
pub fn is_complex_flow(html: &str) -> bool {
    if !contains_any(&html.to_lowercase(), PREFERENCE_KEYWORDS) {
        return false;
    }
    let doc = Html::parse_document(html);
    let checkboxes = inputs(&doc)
        .iter()
        .filter(|el| input_type(el) == "checkbox")
        .count();
    checkboxes > COMPLEX_FLOW_CHECKBOX_LIMIT
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ControlKind {
    Button,
    Link,
    SubmitInput,
}

impl ControlKind {
    fn selector(self) -> &'static str {
        match self {
            ControlKind::Button => "button",
            ControlKind::Link => "a",
            ControlKind::SubmitInput => "input",
        }
    }
}

/// Search order for the control that completes an unsubscribe.
const CONTROL_PATTERNS: &[(ControlKind, &str)] = &[
    (ControlKind::Button, "unsubscribe"),
    (ControlKind::Button, "confirm"),
    (ControlKind::Button, "yes"),
    (ControlKind::Button, "opt out"),
    (ControlKind::Button, "remove me"),
    (ControlKind::Button, "remove"),
    (ControlKind::Link, "unsubscribe"),
    (ControlKind::Link, "confirm"),
    (ControlKind::Link, "opt out"),
    (ControlKind::SubmitInput, "unsubscribe"),
    (ControlKind::SubmitInput, "confirm"),
];

/// A clickable control found on the page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Control {
    pub target: ElementTarget,
    /// Visible text or submit value.
    pub label: String,
}

fn control_label(kind: ControlKind, el: &ElementRef<'_>) -> Option<String> {
    if el.value().attr("disabled").is_some() {
        return None;
    }
    match kind {
        ControlKind::Button | ControlKind::Link => {
            Some(el.text().collect::<String>().trim().to_string())
        }
        ControlKind::SubmitInput => {
            if input_type(el) != "submit" {
                return None;
            }
            Some(el.value().attr("value").unwrap_or_default().trim().to_string())
        }
    }
}

/// First control matching the fixed priority list, by case-insensitive text.
pub fn find_unsubscribe_control(html: &str) -> Option<Control> {
    let doc = Html::parse_document(html);
    for (kind, keyword) in CONTROL_PATTERNS {
        let Ok(sel) = Selector::parse(kind.selector()) else {
            continue;
        };
        for (index, el) in doc.select(&sel).enumerate() {
            let Some(label) = control_label(*kind, &el) else {
                continue;
            };
            if label.to_lowercase().contains(keyword) {
                return Some(Control {
                    target: ElementTarget::new(kind.selector(), index),
                    label,
                });
            }
        }
    }
    None
}

/// An unsubscribe-labelled checkbox.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Checkbox {
    pub target: ElementTarget,
    pub checked: bool,
}

fn label_texts_by_id(doc: &Html) -> HashMap<String, String> {
    let mut labels = HashMap::new();
    if let Ok(sel) = Selector::parse("label[for]") {
        for el in doc.select(&sel) {
            if let Some(id) = el.value().attr("for") {
                labels.insert(id.to_string(), el.text().collect::<String>().to_lowercase());
            }
        }
    }
    labels
}

fn checkbox_label(el: &ElementRef<'_>, by_id: &HashMap<String, String>) -> String {
    if let Some(label) = el
        .ancestors()
        .filter_map(ElementRef::wrap)
        .find(|a| a.value().name() == "label")
    {
        return label.text().collect::<String>().to_lowercase();
    }
    if let Some(text) = el.value().id().and_then(|id| by_id.get(id)) {
        return text.clone();
    }
    el.next_siblings()
        .next()
        .and_then(|n| n.value().as_text().map(|t| t.to_lowercase()))
        .unwrap_or_default()
}

/// Checkbox whose label mentions unsubscribing.
pub fn find_unsubscribe_checkbox(html: &str) -> Option<Checkbox> {
    let doc = Html::parse_document(html);
    let by_id = label_texts_by_id(&doc);
    inputs(&doc)
        .iter()
        .enumerate()
        .filter(|(_, el)| input_type(el) == "checkbox")
        .find(|(_, el)| checkbox_label(el, &by_id).contains("unsubscribe"))
        .map(|(index, el)| Checkbox {
            target: ElementTarget::new("input", index),
            checked: el.value().attr("checked").is_some(),
        })
}

/// The form wants the subscriber's own address typed in.
pub fn has_empty_email_input(html: &str) -> bool {
    let doc = Html::parse_document(html);
    inputs(&doc).iter().any(|el| {
        let is_email = input_type(el) == "email" || attr_lower(el, "name") == "email";
        is_email && el.value().attr("value").map_or(true, |v| v.trim().is_empty())
    })
}
