//! VP-prefixed error types with structured error codes.

#![allow(missing_docs)]

use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::ingest::source::FetchError;

/// Shared `Result` alias for the project.
pub type Result<T> = std::result::Result<T, PanelError>;

/// Top-level error type for the visit panel.
#[derive(Debug, Error)]
pub enum PanelError {
    #[error("[VP-1001] invalid configuration: {details}")]
    InvalidConfig { details: String },

    #[error("[VP-1002] missing configuration file: {path}")]
    MissingConfig { path: PathBuf },

    #[error("[VP-1003] configuration parse failure in {context}: {details}")]
    ConfigParse {
        context: &'static str,
        details: String,
    },

    #[error("[VP-1101] unknown source: {key}")]
    UnknownSource { key: String },

    #[error("[VP-2001] fetch failure for source {source_key}: {source}")]
    Fetch {
        source_key: String,
        #[source]
        source: FetchError,
    },

    #[error("[VP-2101] serialization failure in {context}: {details}")]
    Serialization {
        context: &'static str,
        details: String,
    },

    #[error("[VP-3002] IO failure at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("[VP-3900] runtime failure: {details}")]
    Runtime { details: String },
}

impl PanelError {
    /// Stable machine-parseable error code.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::InvalidConfig { .. } => "VP-1001",
            Self::MissingConfig { .. } => "VP-1002",
            Self::ConfigParse { .. } => "VP-1003",
            Self::UnknownSource { .. } => "VP-1101",
            Self::Fetch { .. } => "VP-2001",
            Self::Serialization { .. } => "VP-2101",
            Self::Io { .. } => "VP-3002",
            Self::Runtime { .. } => "VP-3900",
        }
    }

    /// Whether retrying might resolve the failure.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Fetch { .. } | Self::Io { .. } | Self::Runtime { .. }
        )
    }

    /// Convenience constructor for IO errors with a known path.
    #[must_use]
    pub fn io(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }

    /// Attach the failing source key to a fetch error.
    #[must_use]
    pub fn fetch(source_key: impl Into<String>, source: FetchError) -> Self {
        Self::Fetch {
            source_key: source_key.into(),
            source,
        }
    }
}

impl From<serde_json::Error> for PanelError {
    fn from(value: serde_json::Error) -> Self {
        Self::Serialization {
            context: "serde_json",
            details: value.to_string(),
        }
    }
}

impl From<toml::de::Error> for PanelError {
    fn from(value: toml::de::Error) -> Self {
        Self::ConfigParse {
            context: "toml",
            details: value.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn all_variants() -> Vec<PanelError> {
        vec![
            PanelError::InvalidConfig {
                details: String::new(),
            },
            PanelError::MissingConfig {
                path: PathBuf::new(),
            },
            PanelError::ConfigParse {
                context: "",
                details: String::new(),
            },
            PanelError::UnknownSource { key: String::new() },
            PanelError::fetch("portfolio", FetchError::Timeout { after_ms: 1 }),
            PanelError::Serialization {
                context: "",
                details: String::new(),
            },
            PanelError::Io {
                path: PathBuf::new(),
                source: std::io::Error::other("test"),
            },
            PanelError::Runtime {
                details: String::new(),
            },
        ]
    }

    #[test]
    fn error_codes_are_unique() {
        let errors = all_variants();
        let codes: Vec<&str> = errors.iter().map(PanelError::code).collect();
        let unique: std::collections::HashSet<&&str> = codes.iter().collect();
        assert_eq!(
            codes.len(),
            unique.len(),
            "error codes must be unique: {codes:?}"
        );
    }

    #[test]
    fn error_codes_have_vp_prefix() {
        for err in &all_variants() {
            assert!(
                err.code().starts_with("VP-"),
                "code {} must start with VP-",
                err.code()
            );
        }
    }

    #[test]
    fn error_display_includes_code() {
        let err = PanelError::InvalidConfig {
            details: "bad value".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("VP-1001"), "display should contain code: {msg}");
        assert!(msg.contains("bad value"), "display should contain details: {msg}");
    }

    #[test]
    fn fetch_error_names_source() {
        let err = PanelError::fetch(
            "vbp-parana",
            FetchError::Http { status: 503 },
        );
        assert_eq!(err.code(), "VP-2001");
        assert!(err.to_string().contains("vbp-parana"));
        assert!(err.is_retryable());
    }

    #[test]
    fn config_errors_are_not_retryable() {
        assert!(
            !PanelError::InvalidConfig {
                details: String::new()
            }
            .is_retryable()
        );
        assert!(
            !PanelError::MissingConfig {
                path: PathBuf::new()
            }
            .is_retryable()
        );
        assert!(!PanelError::UnknownSource { key: "x".into() }.is_retryable());
    }

    #[test]
    fn from_serde_json_error() {
        let json_err = serde_json::from_str::<serde_json::Value>("not json").unwrap_err();
        let err: PanelError = json_err.into();
        assert_eq!(err.code(), "VP-2101");
    }

    #[test]
    fn from_toml_error() {
        let toml_err = toml::from_str::<toml::Value>("= invalid").unwrap_err();
        let err: PanelError = toml_err.into();
        assert_eq!(err.code(), "VP-1003");
    }
}
