//! Per-kind schema profiles and the row normalizer.
//!
//! Each [`SourceKind`] declares, as data, the ordered column aliases accepted
//! for every canonical field. Lookups are case-insensitive and the first alias
//! carrying a value wins. Timezone and returning-visitor fields additionally
//! fall back to a regex scan over all column labels.

#![allow(missing_docs)]

use std::fmt;
use std::str::FromStr;

use chrono::FixedOffset;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::core::errors::{PanelError, Result};
use crate::ingest::row::{RawRow, Scalar};
use crate::normalize::coerce::{extract_path, normalize_device_type, parse_bool, parse_timestamp};
use crate::normalize::record::{DeviceType, EventRecord};
use crate::normalize::user_agent::parse_user_agent;

/// Known source layouts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    /// English title-case columns written by the portfolio tracker.
    Portfolio,
    /// camelCase columns, user-agent only, Portuguese timezone headers.
    Vbp,
    /// Portuguese column names.
    Precos,
}

impl SourceKind {
    pub const ALL: [Self; 3] = [Self::Portfolio, Self::Vbp, Self::Precos];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Portfolio => "portfolio",
            Self::Vbp => "vbp",
            Self::Precos => "precos",
        }
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SourceKind {
    type Err = PanelError;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| PanelError::InvalidConfig {
                details: format!("unknown source kind {s:?}"),
            })
    }
}

/// Column aliases for one source kind, in priority order.
#[derive(Debug, Clone)]
pub struct SchemaProfile {
    pub kind: SourceKind,
    pub timestamp: &'static [&'static str],
    pub url: &'static [&'static str],
    pub path: &'static [&'static str],
    pub referrer: &'static [&'static str],
    pub timezone: &'static [&'static str],
    pub timezone_pattern: Option<&'static str>,
    pub session_id: &'static [&'static str],
    pub os: &'static [&'static str],
    pub browser: &'static [&'static str],
    pub device: &'static [&'static str],
    pub user_agent: &'static [&'static str],
}

/// Aliases shared by every kind for the returning-visitor flag.
pub const RETURNING_ALIASES: &[&str] = &[
    "Returning Visitor",
    "Returning",
    "ReturningVisitor",
    "Returning_Visitor",
    "Is Returning",
    "isReturning",
    "is_returning",
    "Visitante Recorrente",
    "Retornando",
    "Retorno",
];

/// Label scan used when no returning alias matches.
pub const RETURNING_PATTERN: &str = r"(?i)(return|retorn)";

fn builtin_profiles() -> Vec<SchemaProfile> {
    vec![
        SchemaProfile {
            kind: SourceKind::Portfolio,
            timestamp: &["Client Timestamp", "Timestamp"],
            url: &["Page URL", "URL"],
            path: &[],
            referrer: &["Referrer"],
            timezone: &["Timezone"],
            timezone_pattern: None,
            session_id: &["Session ID"],
            os: &["OS"],
            browser: &["Browser"],
            device: &["Device"],
            user_agent: &["User Agent"],
        },
        SchemaProfile {
            kind: SourceKind::Vbp,
            timestamp: &["timestamp", "Date"],
            url: &["url", "Page URL"],
            path: &["page", "pathname", "path"],
            referrer: &["referrer"],
            timezone: &[
                "timezone",
                "Fuso Horario",
                "Fuso horário",
                "Fuso",
                "Time Zone",
                "tz",
                "K",
            ],
            timezone_pattern: Some(r"(?i)(fuso|time\s*zone|timezone|tz)"),
            session_id: &["sessionId", "Session ID"],
            os: &["os"],
            browser: &["browser"],
            device: &["device"],
            user_agent: &["userAgent", "User Agent"],
        },
        SchemaProfile {
            kind: SourceKind::Precos,
            timestamp: &["Timestamp"],
            url: &["URL"],
            path: &["Caminho"],
            referrer: &["Referrer"],
            timezone: &["Timezone"],
            timezone_pattern: None,
            session_id: &["Session ID"],
            os: &["Sistema Operacional"],
            browser: &["Navegador"],
            device: &["Dispositivo"],
            user_agent: &["User Agent"],
        },
    ]
}

#[derive(Debug, Clone)]
struct CompiledProfile {
    profile: SchemaProfile,
    timezone_pattern: Option<Regex>,
}

/// Maps raw rows of any known kind into [`EventRecord`]s.
#[derive(Debug, Clone)]
pub struct SchemaNormalizer {
    offset: FixedOffset,
    profiles: Vec<CompiledProfile>,
    returning_pattern: Regex,
}

impl SchemaNormalizer {
    /// Build with the built-in profiles. `offset` is the wall-clock offset for
    /// zone-less timestamps.
    pub fn new(offset: FixedOffset) -> Result<Self> {
        let profiles = builtin_profiles()
            .into_iter()
            .map(|profile| {
                let timezone_pattern = profile.timezone_pattern.map(compile).transpose()?;
                Ok(CompiledProfile {
                    profile,
                    timezone_pattern,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            offset,
            profiles,
            returning_pattern: compile(RETURNING_PATTERN)?,
        })
    }

    #[must_use]
    pub const fn offset(&self) -> FixedOffset {
        self.offset
    }

    #[must_use]
    pub fn profile(&self, kind: SourceKind) -> Option<&SchemaProfile> {
        self.compiled(kind).map(|c| &c.profile)
    }

    fn compiled(&self, kind: SourceKind) -> Option<&CompiledProfile> {
        self.profiles.iter().find(|c| c.profile.kind == kind)
    }

    /// Normalize one row. Returns `None` when no timestamp resolves.
    #[must_use]
    pub fn normalize(&self, kind: SourceKind, source_key: &str, row: &RawRow) -> Option<EventRecord> {
        let compiled = self.compiled(kind)?;
        let profile = &compiled.profile;

        let timestamp = parse_timestamp(row.first_present(profile.timestamp)?, self.offset)?;

        let url = text(row, profile.url).unwrap_or_default();
        let path = text(row, profile.path).unwrap_or_else(|| extract_path(&url));
        let user_agent = text(row, profile.user_agent);
        let derived = user_agent.as_deref().map(parse_user_agent);

        let os = text(row, profile.os)
            .or_else(|| derived.as_ref().map(|d| d.os.to_string()))
            .unwrap_or_default();
        let browser = text(row, profile.browser)
            .or_else(|| derived.as_ref().map(|d| d.browser.to_string()))
            .unwrap_or_default();
        let device_type = match text(row, profile.device) {
            Some(explicit) => normalize_device_type(Some(&explicit)),
            None => derived
                .as_ref()
                .map_or(DeviceType::Unknown, |d| d.device_type),
        };

        let timezone = text(row, profile.timezone)
            .or_else(|| {
                compiled
                    .timezone_pattern
                    .as_ref()
                    .and_then(|pattern| row.first_matching(pattern))
                    .and_then(Scalar::as_text)
            })
            .unwrap_or_default();

        let returning = parse_bool(
            row.first_present(RETURNING_ALIASES)
                .or_else(|| row.first_matching(&self.returning_pattern)),
        );

        Some(EventRecord {
            source_key: source_key.to_string(),
            timestamp,
            url,
            path,
            referrer: text(row, profile.referrer).unwrap_or_default(),
            timezone,
            session_id: text(row, profile.session_id).unwrap_or_default(),
            os,
            browser,
            device_type,
            returning,
            user_agent,
        })
    }

    /// Normalize a batch, silently dropping rows without a timestamp.
    #[must_use]
    pub fn normalize_rows(
        &self,
        kind: SourceKind,
        source_key: &str,
        rows: &[RawRow],
    ) -> Vec<EventRecord> {
        rows.iter()
            .filter_map(|row| self.normalize(kind, source_key, row))
            .collect()
    }
}

fn text(row: &RawRow, aliases: &[&str]) -> Option<String> {
    row.first_present(aliases).and_then(Scalar::as_text)
}

fn compile(pattern: &str) -> Result<Regex> {
    Regex::new(pattern).map_err(|err| PanelError::InvalidConfig {
        details: format!("invalid column pattern {pattern:?}: {err}"),
    })
}
