//! Raw tabular rows as returned by a row source, plus alias-based lookup.
//!
//! Column labels differ per source and even per casing, so a [`RawRow`] is an
//! ordered list of `(label, value)` pairs rather than a typed struct. Lookups
//! go through [`RawRow::first_present`] (case-insensitive alias list, tried in
//! declared order) or [`RawRow::first_matching`] (regex scan over labels).

#![allow(missing_docs)]

use std::fmt;

use chrono::NaiveDateTime;
use regex::Regex;

/// One cell value.
#[derive(Debug, Clone, PartialEq)]
pub enum Scalar {
    Null,
    Bool(bool),
    Number(f64),
    Text(String),
    /// Wall-clock date-time without zone, interpreted in the display offset.
    DateTime(NaiveDateTime),
}

impl Scalar {
    /// Null and empty text count as absent.
    #[must_use]
    pub fn is_present(&self) -> bool {
        match self {
            Self::Null => false,
            Self::Text(s) => !s.is_empty(),
            _ => true,
        }
    }

    /// Render as a label string. Returns `None` for absent values.
    #[must_use]
    pub fn as_text(&self) -> Option<String> {
        if !self.is_present() {
            return None;
        }
        Some(self.to_string())
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => Ok(()),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Number(n) => write!(f, "{n}"),
            Self::Text(s) => f.write_str(s),
            Self::DateTime(dt) => write!(f, "{}", dt.format("%Y-%m-%dT%H:%M:%S")),
        }
    }
}

impl From<&str> for Scalar {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for Scalar {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<f64> for Scalar {
    fn from(value: f64) -> Self {
        Self::Number(value)
    }
}

impl From<bool> for Scalar {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

/// Tabular result for one `(endpoint, sub-range)` fetch.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawTable {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Scalar>>,
}

impl RawTable {
    /// Zip every row with the column labels. Short rows are padded with nulls.
    #[must_use]
    pub fn into_rows(self) -> Vec<RawRow> {
        let columns = self.columns;
        self.rows
            .into_iter()
            .map(|cells| {
                let mut cells = cells.into_iter();
                let fields = columns
                    .iter()
                    .map(|label| (label.clone(), cells.next().unwrap_or(Scalar::Null)))
                    .collect();
                RawRow { fields }
            })
            .collect()
    }
}

/// Untyped mapping from column label to scalar, in column order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawRow {
    fields: Vec<(String, Scalar)>,
}

impl RawRow {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert; a later label that matches an earlier one
    /// case-insensitively replaces it, mirroring object-key semantics.
    #[must_use]
    pub fn with(mut self, label: &str, value: impl Into<Scalar>) -> Self {
        self.insert(label, value.into());
        self
    }

    pub fn insert(&mut self, label: &str, value: Scalar) {
        if let Some(slot) = self
            .fields
            .iter_mut()
            .find(|(existing, _)| existing.eq_ignore_ascii_case(label))
        {
            slot.1 = value;
        } else {
            self.fields.push((label.to_string(), value));
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|(label, _)| label.as_str())
    }

    /// Case-insensitive exact lookup of a single label.
    #[must_use]
    pub fn get(&self, label: &str) -> Option<&Scalar> {
        // Last matching column wins, as when folding keys into a lowercase map.
        self.fields
            .iter()
            .rev()
            .find(|(existing, _)| labels_match(existing, label))
            .map(|(_, value)| value)
    }

    /// First alias (in declared order) whose column carries a present value.
    #[must_use]
    pub fn first_present(&self, aliases: &[&str]) -> Option<&Scalar> {
        aliases
            .iter()
            .filter_map(|alias| self.get(alias))
            .find(|value| value.is_present())
    }

    /// First column (in column order) whose label matches `pattern` and
    /// whose value is present.
    #[must_use]
    pub fn first_matching(&self, pattern: &Regex) -> Option<&Scalar> {
        self.fields
            .iter()
            .filter(|(label, _)| pattern.is_match(label))
            .map(|(_, value)| value)
            .find(|value| value.is_present())
    }
}

impl FromIterator<(String, Scalar)> for RawRow {
    fn from_iter<I: IntoIterator<Item = (String, Scalar)>>(iter: I) -> Self {
        let mut row = Self::new();
        for (label, value) in iter {
            row.insert(&label, value);
        }
        row
    }
}

fn labels_match(a: &str, b: &str) -> bool {
    if a.is_ascii() && b.is_ascii() {
        return a.eq_ignore_ascii_case(b);
    }
    a.to_lowercase() == b.to_lowercase()
}
