//! Canonical event record produced by the schema normalizer.

#![allow(missing_docs)]

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Coarse device class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum DeviceType {
    Mobile,
    Tablet,
    Desktop,
    #[default]
    Unknown,
}

impl DeviceType {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Mobile => "Mobile",
            Self::Tablet => "Tablet",
            Self::Desktop => "Desktop",
            Self::Unknown => "Unknown",
        }
    }
}

impl fmt::Display for DeviceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One normalized visit. Never mutated after normalization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventRecord {
    pub source_key: String,
    #[serde(rename = "ts")]
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub path: String,
    #[serde(default)]
    pub referrer: String,
    #[serde(default)]
    pub timezone: String,
    #[serde(default)]
    pub session_id: String,
    #[serde(default)]
    pub os: String,
    #[serde(default)]
    pub browser: String,
    #[serde(default)]
    pub device_type: DeviceType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub returning: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
}

/// Composite key used to detect the same visit across overlapping fetches.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct IdentityKey {
    pub source_key: String,
    pub epoch_secs: i64,
    pub session_id: String,
    pub location: String,
}

impl EventRecord {
    /// Minimal record; remaining fields default to empty/unknown.
    #[must_use]
    pub fn new(source_key: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self {
            source_key: source_key.into(),
            timestamp,
            url: String::new(),
            path: String::new(),
            referrer: String::new(),
            timezone: String::new(),
            session_id: String::new(),
            os: String::new(),
            browser: String::new(),
            device_type: DeviceType::Unknown,
            returning: None,
            user_agent: None,
        }
    }

    /// `(source, second, session, path-or-url)`.
    #[must_use]
    pub fn identity_key(&self) -> IdentityKey {
        IdentityKey {
            source_key: self.source_key.clone(),
            epoch_secs: self.timestamp.timestamp(),
            session_id: self.session_id.clone(),
            location: self.location().to_string(),
        }
    }

    /// Path when known, else the full URL, else empty.
    #[must_use]
    pub fn location(&self) -> &str {
        if self.path.is_empty() {
            &self.url
        } else {
            &self.path
        }
    }
}
