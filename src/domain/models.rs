//! Domain models for the tab-group document.
//!
//! The document is the payload that every sync target stores as a single
//! JSON snapshot. Its field names are camelCase so snapshots written by the
//! browser extension and by this tool are interchangeable.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::error::{AppError, Result};

/// Newest schema version this build can read and write.
pub const CURRENT_SCHEMA_VERSION: u32 = 1;

/// A saved tab. Owned by exactly one [`TabGroup`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TabEntry {
    pub id: String,
    pub url: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub pinned: bool,
    pub created_at: DateTime<Utc>,
}

impl TabEntry {
    /// Create a new tab entry with a freshly generated id.
    #[must_use]
    pub fn new(url: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            url: url.into(),
            title: title.into(),
            pinned: false,
            created_at: Utc::now(),
        }
    }

    #[must_use]
    pub const fn pinned(mut self) -> Self {
        self.pinned = true;
        self
    }
}

/// A named, ordered collection of tabs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TabGroup {
    pub id: String,
    pub name: String,
    /// Locked groups survive the empty-group cleanup.
    #[serde(default, rename = "isLocked")]
    pub locked: bool,
    #[serde(default)]
    pub tabs: Vec<TabEntry>,
    pub created_at: DateTime<Utc>,
}

impl TabGroup {
    /// Create an empty group with a freshly generated id.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            name: name.into(),
            locked: false,
            tabs: Vec::new(),
            created_at: Utc::now(),
        }
    }

    #[must_use]
    pub fn with_tabs(mut self, tabs: Vec<TabEntry>) -> Self {
        self.tabs = tabs;
        self
    }

    #[must_use]
    pub const fn locked(mut self) -> Self {
        self.locked = true;
        self
    }
}

/// The full exportable snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TabGroupDocument {
    pub schema_version: u32,
    pub last_modified_at: DateTime<Utc>,
    #[serde(default)]
    pub groups: Vec<TabGroup>,
}

impl Default for TabGroupDocument {
    fn default() -> Self {
        Self {
            schema_version: CURRENT_SCHEMA_VERSION,
            last_modified_at: Utc::now(),
            groups: Vec::new(),
        }
    }
}

impl TabGroupDocument {
    #[must_use]
    pub fn new(groups: Vec<TabGroup>) -> Self {
        Self {
            groups,
            ..Self::default()
        }
    }

    /// Parse and validate a serialized snapshot.
    ///
    /// # Errors
    /// Returns a format error for malformed JSON, an unsupported schema
    /// version, or duplicate group ids.
    pub fn from_json(raw: &str) -> Result<Self> {
        let doc: Self = serde_json::from_str(raw).map_err(AppError::json_parse)?;
        doc.validate()?;
        Ok(doc)
    }

    /// Serialize to the snapshot wire format.
    ///
    /// # Errors
    /// Returns error if serialization fails.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(AppError::json_parse)
    }

    /// Reject documents this build cannot interpret.
    ///
    /// # Errors
    /// Returns a format error describing the first problem found.
    pub fn validate(&self) -> Result<()> {
        if !(1..=CURRENT_SCHEMA_VERSION).contains(&self.schema_version) {
            return Err(AppError::format(format!(
                "unsupported schemaVersion {} (supported: 1..={CURRENT_SCHEMA_VERSION})",
                self.schema_version
            )));
        }

        let mut seen = HashSet::new();
        for group in &self.groups {
            if !seen.insert(group.id.as_str()) {
                return Err(AppError::format(format!("duplicate group id {}", group.id)));
            }
        }

        Ok(())
    }

    #[must_use]
    pub fn group_count(&self) -> usize {
        self.groups.len()
    }

    #[must_use]
    pub fn tab_count(&self) -> usize {
        self.groups.iter().map(|g| g.tabs.len()).sum()
    }

    /// Drop empty groups that are not locked. Returns how many were removed.
    pub fn remove_empty_unlocked_groups(&mut self) -> usize {
        let before = self.groups.len();
        self.groups.retain(|g| g.locked || !g.tabs.is_empty());
        before - self.groups.len()
    }

    /// One-line summary used in log messages.
    #[must_use]
    pub fn summary(&self) -> String {
        format!("{} groups / {} tabs", self.group_count(), self.tab_count())
    }
}
