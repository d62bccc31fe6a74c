//! Sender allow-list: senders that must never be unsubscribed.

use crate::error::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use tracing::{debug, info};

/// Lookup interface consulted before difficulty classification.
pub trait ExclusionStore: Send + Sync {
    fn is_excluded(&self, sender_email: &str) -> bool;
}

/// One allow-listed sender.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllowListEntry {
    pub sender_email: String,
    pub sender_name: Option<String>,
    pub added_date: DateTime<Utc>,
}

/// In-memory allow-list keyed by lower-cased sender address, with JSON
/// persistence.
#[derive(Debug, Clone, Default)]
pub struct AllowList {
    entries: HashMap<String, AllowListEntry>,
}

fn key(sender_email: &str) -> String {
    sender_email.trim().to_lowercase()
}

impl AllowList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a list saved with [`AllowList::save`]. A missing file is an empty
    /// list.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            debug!("allow-list {} not found, starting empty", path.display());
            return Ok(Self::new());
        }
        let raw = std::fs::read_to_string(path)?;
        let stored: Vec<AllowListEntry> = serde_json::from_str(&raw)?;
        let mut list = Self::new();
        for entry in stored {
            list.entries.insert(key(&entry.sender_email), entry);
        }
        info!("loaded {} allow-listed senders", list.count());
        Ok(list)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(&self.list())?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Returns `false` for an empty address or one already present.
    pub fn add(&mut self, sender_email: &str, sender_name: Option<&str>) -> bool {
        let k = key(sender_email);
        if k.is_empty() || self.entries.contains_key(&k) {
            return false;
        }
        info!("added {k} to allow-list");
        self.entries.insert(
            k.clone(),
            AllowListEntry {
                sender_email: k,
                sender_name: sender_name.map(str::to_string),
                added_date: Utc::now(),
            },
        );
        true
    }

    /// Returns `false` when the sender was not listed.
    pub fn remove(&mut self, sender_email: &str) -> bool {
        let removed = self.entries.remove(&key(sender_email)).is_some();
        if removed {
            info!("removed {} from allow-list", key(sender_email));
        }
        removed
    }

    pub fn is_whitelisted(&self, sender_email: &str) -> bool {
        let k = key(sender_email);
        !k.is_empty() && self.entries.contains_key(&k)
    }

    /// Entries, most recently added first.
    pub fn list(&self) -> Vec<AllowListEntry> {
        let mut entries: Vec<AllowListEntry> = self.entries.values().cloned().collect();
        entries.sort_by(|a, b| {
            b.added_date
                .cmp(&a.added_date)
                .then_with(|| a.sender_email.cmp(&b.sender_email))
        });
        entries
    }

    pub fn count(&self) -> usize {
        self.entries.len()
    }

    /// Drops every entry. Does nothing unless `confirm` is set.
    pub fn clear(&mut self, confirm: bool) -> bool {
        if !confirm {
            return false;
        }
        let removed = self.entries.len();
        self.entries.clear();
        info!("cleared allow-list ({removed} entries removed)");
        true
    }
}

impl ExclusionStore for AllowList {
    fn is_excluded(&self, sender_email: &str) -> bool {
        self.is_whitelisted(sender_email)
    }
}
