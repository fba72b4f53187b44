//! Configuration system: TOML file + env var overrides + built-in source list.

#![allow(missing_docs)]

use std::collections::HashSet;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{FixedOffset, Local, Offset};
use serde::{Deserialize, Serialize};

use crate::core::errors::{PanelError, Result};
use crate::normalize::schema::SourceKind;

/// Largest accepted display offset, in minutes either side of UTC.
const MAX_OFFSET_MINUTES: i32 = 18 * 60;

/// Full panel configuration model.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Config {
    pub refresh: RefreshConfig,
    pub cache: CacheConfig,
    pub display: DisplayConfig,
    pub feed: FeedConfig,
    pub paths: PathsConfig,
    pub sources: Vec<SourceConfig>,
}

/// Polling and fetch behavior.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RefreshConfig {
    pub poll_interval_ms: u64,
    pub fetch_timeout_ms: u64,
    /// Fetch all sources concurrently instead of one after another.
    pub parallel_fetch: bool,
}

/// Local dataset cache.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct CacheConfig {
    pub enabled: bool,
    pub max_age_minutes: u64,
    pub file: PathBuf,
}

/// Presentation knobs.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct DisplayConfig {
    /// Rows in the latest-activity table.
    pub max_latest: usize,
    pub top_periods: usize,
    /// Offset that defines "local time". Unset means the host offset.
    pub utc_offset_minutes: Option<i32>,
}

/// Remote spreadsheet feed.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct FeedConfig {
    pub base_url: String,
}

/// Filesystem paths used by vpanel.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PathsConfig {
    pub config_file: PathBuf,
    pub jsonl_log: PathBuf,
}

/// One data source: a spreadsheet with one or more tabs sharing a schema.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SourceConfig {
    pub key: String,
    pub name: String,
    pub sheet_id: String,
    pub gids: Vec<String>,
    pub kind: SourceKind,
}

impl SourceConfig {
    fn new(key: &str, name: &str, sheet_id: &str, gids: &[&str], kind: SourceKind) -> Self {
        Self {
            key: key.to_string(),
            name: name.to_string(),
            sheet_id: sheet_id.to_string(),
            gids: gids.iter().map(|gid| (*gid).to_string()).collect(),
            kind,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            refresh: RefreshConfig::default(),
            cache: CacheConfig::default(),
            display: DisplayConfig::default(),
            feed: FeedConfig::default(),
            paths: PathsConfig::default(),
            sources: default_sources(),
        }
    }
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 60_000,
            fetch_timeout_ms: 15_000,
            parallel_fetch: false,
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_age_minutes: 10,
            file: data_dir().join("cache.json"),
        }
    }
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            max_latest: 25,
            top_periods: 10,
            utc_offset_minutes: None,
        }
    }
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            base_url: "https://docs.google.com".to_string(),
        }
    }
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            config_file: home_dir().join(".config").join("vpanel").join("config.toml"),
            jsonl_log: data_dir().join("activity.jsonl"),
        }
    }
}

fn home_dir() -> PathBuf {
    env::var_os("HOME").map_or_else(
        || {
            eprintln!("[VP-CONFIG] WARNING: HOME not set, falling back to /tmp for data paths");
            PathBuf::from("/tmp")
        },
        PathBuf::from,
    )
}

fn data_dir() -> PathBuf {
    home_dir().join(".local").join("share").join("vpanel")
}

/// The sources of the deployed panel.
#[must_use]
pub fn default_sources() -> Vec<SourceConfig> {
    vec![
        SourceConfig::new(
            "portfolio",
            "Portfolio",
            "17wXvFfRcrl6bbzFMwX7TF7o99t7XBa3khQBC1Hroq5M",
            &["1617126613"],
            SourceKind::Portfolio,
        ),
        SourceConfig::new(
            "vbp-parana",
            "VBP Parana",
            "1SwbupTGRM0DXleSSg1lO_HllDZbTF6x39ryPJRh5UX4",
            &["13565778", "1184050764"],
            SourceKind::Vbp,
        ),
        SourceConfig::new(
            "precos-florestais",
            "Precos Florestais",
            "1Pz57YYeQxhSgHc10kzSM71akB2VzlhzK_pXxwVnvcGA",
            &["997539922"],
            SourceKind::Precos,
        ),
    ]
}

impl RefreshConfig {
    #[must_use]
    pub const fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    #[must_use]
    pub const fn fetch_timeout(&self) -> Duration {
        Duration::from_millis(self.fetch_timeout_ms)
    }
}

impl CacheConfig {
    #[must_use]
    pub const fn max_age(&self) -> Duration {
        Duration::from_secs(self.max_age_minutes.saturating_mul(60))
    }
}

impl DisplayConfig {
    /// Effective local offset: configured minutes, else the host's current offset.
    #[must_use]
    pub fn offset(&self) -> FixedOffset {
        self.utc_offset_minutes
            .and_then(|minutes| FixedOffset::east_opt(minutes.saturating_mul(60)))
            .unwrap_or_else(|| Local::now().offset().fix())
    }
}

impl Config {
    /// Default configuration path.
    #[must_use]
    pub fn default_path() -> PathBuf {
        PathsConfig::default().config_file
    }

    /// Load config from default or explicit path, then apply env overrides.
    ///
    /// Missing config file is not an error when loading from default path; defaults are used.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path_buf = path.map_or_else(Self::default_path, Path::to_path_buf);

        let mut cfg = if path_buf.exists() {
            let raw = fs::read_to_string(&path_buf).map_err(|source| PanelError::io(&path_buf, source))?;
            Self::from_toml_str(&raw)?
        } else if path.is_some() {
            return Err(PanelError::MissingConfig { path: path_buf });
        } else {
            Self::default()
        };

        cfg.paths.config_file = path_buf;
        cfg.apply_env_overrides_from(env_var)?;
        cfg.normalize();
        cfg.validate()?;
        Ok(cfg)
    }

    /// Parse a TOML document. An absent `[[sources]]` list keeps the defaults.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        Ok(toml::from_str(raw)?)
    }

    /// Look up a configured source by key.
    pub fn source(&self, key: &str) -> Result<&SourceConfig> {
        self.sources
            .iter()
            .find(|source| source.key == key)
            .ok_or_else(|| PanelError::UnknownSource {
                key: key.to_string(),
            })
    }

    /// Source keys in configuration order.
    #[must_use]
    pub fn source_keys(&self) -> Vec<String> {
        self.sources.iter().map(|source| source.key.clone()).collect()
    }

    /// Deterministic hash of the effective config for logging.
    ///
    /// FNV-1a over the canonical JSON form, stable across processes.
    pub fn stable_hash(&self) -> Result<String> {
        let canonical = serde_json::to_string(self)?;
        let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
        for byte in canonical.as_bytes() {
            hash ^= u64::from(*byte);
            hash = hash.wrapping_mul(0x0100_0000_01b3);
        }
        Ok(format!("{hash:016x}"))
    }

    fn apply_env_overrides_from<F>(&mut self, mut lookup: F) -> Result<()>
    where
        F: FnMut(&str) -> Option<String>,
    {
        // refresh
        if let Some(raw) = lookup("VPANEL_POLL_INTERVAL_MS") {
            self.refresh.poll_interval_ms = parse_env("VPANEL_POLL_INTERVAL_MS", &raw)?;
        }
        if let Some(raw) = lookup("VPANEL_FETCH_TIMEOUT_MS") {
            self.refresh.fetch_timeout_ms = parse_env("VPANEL_FETCH_TIMEOUT_MS", &raw)?;
        }
        if let Some(raw) = lookup("VPANEL_PARALLEL_FETCH") {
            self.refresh.parallel_fetch = parse_env_bool("VPANEL_PARALLEL_FETCH", &raw)?;
        }

        // cache
        if let Some(raw) = lookup("VPANEL_CACHE_ENABLED") {
            self.cache.enabled = parse_env_bool("VPANEL_CACHE_ENABLED", &raw)?;
        }
        if let Some(raw) = lookup("VPANEL_CACHE_MAX_AGE_MINUTES") {
            self.cache.max_age_minutes = parse_env("VPANEL_CACHE_MAX_AGE_MINUTES", &raw)?;
        }
        if let Some(raw) = lookup("VPANEL_CACHE_FILE") {
            self.cache.file = PathBuf::from(raw);
        }

        // display
        if let Some(raw) = lookup("VPANEL_MAX_LATEST") {
            self.display.max_latest = parse_env("VPANEL_MAX_LATEST", &raw)?;
        }
        if let Some(raw) = lookup("VPANEL_UTC_OFFSET_MINUTES") {
            self.display.utc_offset_minutes = Some(parse_env("VPANEL_UTC_OFFSET_MINUTES", &raw)?);
        }

        // feed
        if let Some(raw) = lookup("VPANEL_FEED_BASE_URL") {
            self.feed.base_url = raw;
        }

        Ok(())
    }

    fn normalize(&mut self) {
        let trimmed = self.feed.base_url.trim().trim_end_matches('/').to_string();
        self.feed.base_url = trimmed;
        for source in &mut self.sources {
            source.key = source.key.trim().to_string();
            source.gids.retain(|gid| !gid.trim().is_empty());
        }
    }

    /// Check invariants the rest of the panel relies on.
    pub fn validate(&self) -> Result<()> {
        if self.sources.is_empty() {
            return Err(invalid("at least one [[sources]] entry is required"));
        }

        let mut seen = HashSet::new();
        for source in &self.sources {
            if source.key.trim().is_empty() {
                return Err(invalid("sources.key must not be empty"));
            }
            if !seen.insert(source.key.as_str()) {
                return Err(invalid(format!("duplicate source key {:?}", source.key)));
            }
            if source.sheet_id.trim().is_empty() {
                return Err(invalid(format!("source {:?} has an empty sheet_id", source.key)));
            }
            if !source.gids.iter().any(|gid| !gid.trim().is_empty()) {
                return Err(invalid(format!("source {:?} needs at least one gid", source.key)));
            }
        }

        for (name, value) in [
            ("refresh.poll_interval_ms", self.refresh.poll_interval_ms),
            ("refresh.fetch_timeout_ms", self.refresh.fetch_timeout_ms),
            ("cache.max_age_minutes", self.cache.max_age_minutes),
        ] {
            if value == 0 {
                return Err(invalid(format!("{name} must be > 0")));
            }
        }

        if self.display.max_latest == 0 {
            return Err(invalid("display.max_latest must be > 0"));
        }
        if self.display.top_periods == 0 {
            return Err(invalid("display.top_periods must be > 0"));
        }

        if let Some(minutes) = self.display.utc_offset_minutes
            && !(-MAX_OFFSET_MINUTES..=MAX_OFFSET_MINUTES).contains(&minutes)
        {
            return Err(invalid(format!(
                "display.utc_offset_minutes must be within ±{MAX_OFFSET_MINUTES}, got {minutes}"
            )));
        }

        if url::Url::parse(&self.feed.base_url).is_err() {
            return Err(invalid(format!(
                "feed.base_url is not a valid URL: {:?}",
                self.feed.base_url
            )));
        }

        Ok(())
    }
}

fn invalid(details: impl Into<String>) -> PanelError {
    PanelError::InvalidConfig {
        details: details.into(),
    }
}

fn env_var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|raw| !raw.trim().is_empty())
}

fn parse_env<T>(name: &str, raw: &str) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim().parse::<T>().map_err(|error| PanelError::ConfigParse {
        context: "env",
        details: format!("{name}={raw:?}: {error}"),
    })
}

fn parse_env_bool(name: &str, raw: &str) -> Result<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(PanelError::ConfigParse {
            context: "env",
            details: format!("{name}={raw:?}: expected a boolean"),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn vars(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(name, value)| ((*name).to_string(), (*value).to_string()))
            .collect()
    }

    fn details(err: PanelError) -> String {
        match err {
            PanelError::InvalidConfig { details } => details,
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn default_config_is_valid() {
        let cfg = Config::default();
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.sources.len(), 3);
        assert_eq!(cfg.source("vbp-parana").unwrap().gids.len(), 2);
    }

    #[test]
    fn unknown_source_lookup_fails() {
        let err = Config::default().source("nope").unwrap_err();
        assert_eq!(err.code(), "VP-1101");
    }

    #[test]
    fn duplicate_source_keys_rejected() {
        let mut cfg = Config::default();
        cfg.sources[1].key = "portfolio".into();
        assert!(details(cfg.validate().unwrap_err()).contains("duplicate"));
    }

    #[test]
    fn source_without_gids_rejected() {
        let mut cfg = Config::default();
        cfg.sources[0].gids.clear();
        assert!(details(cfg.validate().unwrap_err()).contains("gid"));
    }

    #[test]
    fn empty_source_list_rejected() {
        let mut cfg = Config::default();
        cfg.sources.clear();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn zero_intervals_rejected() {
        let mut cfg = Config::default();
        cfg.refresh.poll_interval_ms = 0;
        assert!(details(cfg.validate().unwrap_err()).contains("poll_interval_ms"));

        let mut cfg = Config::default();
        cfg.cache.max_age_minutes = 0;
        assert!(details(cfg.validate().unwrap_err()).contains("max_age_minutes"));
    }

    #[test]
    fn offset_out_of_range_rejected() {
        let mut cfg = Config::default();
        cfg.display.utc_offset_minutes = Some(19 * 60);
        assert!(cfg.validate().is_err());
        cfg.display.utc_offset_minutes = Some(-180);
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.display.offset().local_minus_utc(), -180 * 60);
    }

    #[test]
    fn env_overrides_apply() {
        let env = vars(&[
            ("VPANEL_POLL_INTERVAL_MS", "5000"),
            ("VPANEL_PARALLEL_FETCH", "true"),
            ("VPANEL_CACHE_FILE", "/tmp/vp-cache.json"),
            ("VPANEL_UTC_OFFSET_MINUTES", "-180"),
            ("VPANEL_FEED_BASE_URL", "http://127.0.0.1:9"),
        ]);
        let mut cfg = Config::default();
        cfg.apply_env_overrides_from(|name| env.get(name).cloned())
            .unwrap();
        assert_eq!(cfg.refresh.poll_interval_ms, 5000);
        assert!(cfg.refresh.parallel_fetch);
        assert_eq!(cfg.cache.file, PathBuf::from("/tmp/vp-cache.json"));
        assert_eq!(cfg.display.utc_offset_minutes, Some(-180));
        assert_eq!(cfg.feed.base_url, "http://127.0.0.1:9");
    }

    #[test]
    fn env_invalid_values_rejected() {
        let env = vars(&[("VPANEL_CACHE_ENABLED", "maybe")]);
        let err = Config::default()
            .apply_env_overrides_from(|name| env.get(name).cloned())
            .unwrap_err();
        assert_eq!(err.code(), "VP-1003");

        let env = vars(&[("VPANEL_MAX_LATEST", "-1")]);
        assert!(
            Config::default()
                .apply_env_overrides_from(|name| env.get(name).cloned())
                .is_err()
        );
    }

    #[test]
    fn toml_sections_override_defaults() {
        let cfg = Config::from_toml_str(
            r#"
            [refresh]
            poll_interval_ms = 30000

            [[sources]]
            key = "blog"
            name = "Blog"
            sheet_id = "abc"
            gids = ["0"]
            kind = "portfolio"
            "#,
        )
        .unwrap();
        assert_eq!(cfg.refresh.poll_interval_ms, 30_000);
        assert_eq!(cfg.refresh.fetch_timeout_ms, 15_000);
        assert_eq!(cfg.source_keys(), vec!["blog".to_string()]);
        assert_eq!(cfg.sources[0].kind, SourceKind::Portfolio);
    }

    #[test]
    fn toml_without_sources_keeps_defaults() {
        let cfg = Config::from_toml_str("[display]\nmax_latest = 5\n").unwrap();
        assert_eq!(cfg.display.max_latest, 5);
        assert_eq!(cfg.sources.len(), 3);
    }

    #[test]
    fn toml_syntax_error_is_parse_error() {
        let err = Config::from_toml_str("[refresh\n").unwrap_err();
        assert_eq!(err.code(), "VP-1003");
    }

    #[test]
    fn normalize_trims_base_url_and_blank_gids() {
        let mut cfg = Config::default();
        cfg.feed.base_url = "https://docs.google.com/ ".into();
        cfg.sources[0].gids.push("  ".into());
        cfg.normalize();
        assert_eq!(cfg.feed.base_url, "https://docs.google.com");
        assert_eq!(cfg.sources[0].gids, vec!["1617126613".to_string()]);
    }

    #[test]
    fn load_returns_error_for_explicit_missing_path() {
        let err = Config::load(Some(Path::new("/nonexistent/vpanel/config.toml"))).unwrap_err();
        assert!(matches!(err, PanelError::MissingConfig { .. }));
    }

    #[test]
    fn load_reads_explicit_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "[display]\ntop_periods = 3\n").unwrap();
        let cfg = Config::load(Some(&path)).unwrap();
        assert_eq!(cfg.display.top_periods, 3);
        assert_eq!(cfg.paths.config_file, path);
    }

    #[test]
    fn stable_hash_changes_when_config_changes() {
        let cfg = Config::default();
        let before = cfg.stable_hash().unwrap();
        assert_eq!(before, cfg.stable_hash().unwrap());
        let mut changed = cfg;
        changed.display.max_latest = 99;
        assert_ne!(before, changed.stable_hash().unwrap());
    }
}
