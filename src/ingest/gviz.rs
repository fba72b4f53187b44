//! Spreadsheet "gviz" feed adapter.
//!
//! The feed answers `GET {base}/spreadsheets/d/{sheet}/gviz/tq?gid={gid}&tqx=out:json`
//! with a JavaScript wrapper around a JSON payload:
//!
//! ```text
//! /*O_o*/
//! google.visualization.Query.setResponse({"status":"ok","table":{...}});
//! ```
//!
//! [`parse_gviz_response`] strips the wrapper and turns the table into a
//! [`RawTable`]. Date cells arrive as `"Date(2024,0,31,10,5,0)"` strings with a
//! zero-based month and are decoded to naive date-times.

#![allow(missing_docs)]

use std::time::Duration;

use chrono::{NaiveDate, NaiveDateTime};
use serde::Deserialize;
use serde_json::Value;

use crate::ingest::row::{RawTable, Scalar};
use crate::ingest::source::{FetchError, RowSource};

const RESPONSE_MARKER: &str = "setResponse(";

/// `RowSource` backed by the public gviz endpoint.
#[derive(Debug, Clone)]
pub struct GvizRowSource {
    agent: ureq::Agent,
    base_url: String,
}

impl GvizRowSource {
    #[must_use]
    pub fn new(base_url: &str, timeout: Duration) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout(timeout)
            .user_agent(concat!("vpanel/", env!("CARGO_PKG_VERSION")))
            .build();
        Self {
            agent,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    /// Request URL for one sheet tab.
    #[must_use]
    pub fn request_url(&self, sheet_id: &str, gid: &str) -> String {
        format!(
            "{}/spreadsheets/d/{sheet_id}/gviz/tq?gid={gid}&tqx=out:json",
            self.base_url
        )
    }
}

impl RowSource for GvizRowSource {
    fn fetch(&self, endpoint: &str, sub_range: &str) -> Result<RawTable, FetchError> {
        let url = self.request_url(endpoint, sub_range);
        let response = self.agent.get(&url).call().map_err(|error| match error {
            ureq::Error::Status(status, _) => FetchError::Http { status },
            ureq::Error::Transport(transport) => FetchError::Transport {
                details: transport.to_string(),
            },
        })?;
        let body = response.into_string().map_err(|e| FetchError::Transport {
            details: format!("failed to read body: {e}"),
        })?;
        parse_gviz_response(&body)
    }
}

#[derive(Debug, Deserialize)]
struct GvizEnvelope {
    status: String,
    #[serde(default)]
    errors: Vec<GvizMessage>,
    table: Option<GvizTable>,
}

#[derive(Debug, Deserialize)]
struct GvizMessage {
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    detailed_message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GvizTable {
    #[serde(default)]
    cols: Vec<GvizColumn>,
    #[serde(default)]
    rows: Vec<GvizRow>,
}

#[derive(Debug, Deserialize)]
struct GvizColumn {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    label: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GvizRow {
    #[serde(default)]
    c: Vec<Option<GvizCell>>,
}

#[derive(Debug, Deserialize)]
struct GvizCell {
    #[serde(default)]
    v: Value,
}

/// Decode a gviz response body (wrapped or bare JSON).
pub fn parse_gviz_response(body: &str) -> Result<RawTable, FetchError> {
    let json = unwrap_payload(body)?;
    let envelope: GvizEnvelope =
        serde_json::from_str(json).map_err(|e| FetchError::Malformed {
            details: format!("invalid gviz JSON: {e}"),
        })?;

    if envelope.status != "ok" {
        let message = envelope
            .errors
            .into_iter()
            .find_map(|m| m.message.or(m.detailed_message))
            .unwrap_or_else(|| "GViz error".to_string());
        return Err(FetchError::Remote { message });
    }

    let table = envelope.table.ok_or_else(|| FetchError::Malformed {
        details: "response has no table".to_string(),
    })?;

    let columns = table
        .cols
        .into_iter()
        .map(|col| {
            col.label
                .filter(|label| !label.trim().is_empty())
                .or(col.id)
                .unwrap_or_default()
                .trim()
                .to_string()
        })
        .collect();

    let rows = table
        .rows
        .into_iter()
        .map(|row| {
            row.c
                .into_iter()
                .map(|cell| cell.map_or(Scalar::Null, |cell| cell_to_scalar(cell.v)))
                .collect()
        })
        .collect();

    Ok(RawTable { columns, rows })
}

fn unwrap_payload(body: &str) -> Result<&str, FetchError> {
    let trimmed = body.trim();
    if trimmed.starts_with('{') {
        return Ok(trimmed);
    }
    let start = trimmed
        .find(RESPONSE_MARKER)
        .map(|idx| idx + RESPONSE_MARKER.len())
        .ok_or_else(|| FetchError::Malformed {
            details: "missing setResponse wrapper".to_string(),
        })?;
    let end = trimmed.rfind(')').filter(|&end| end > start).ok_or_else(|| {
        FetchError::Malformed {
            details: "unterminated setResponse wrapper".to_string(),
        }
    })?;
    Ok(&trimmed[start..end])
}

fn cell_to_scalar(value: Value) -> Scalar {
    match value {
        Value::Null => Scalar::Null,
        Value::Bool(b) => Scalar::Bool(b),
        Value::Number(n) => n.as_f64().map_or(Scalar::Null, Scalar::Number),
        Value::String(s) => parse_gviz_date(&s).map_or(Scalar::Text(s), Scalar::DateTime),
        other => Scalar::Text(other.to_string()),
    }
}

/// Decode `Date(y,m,d[,h,mi,s[,ms]])` with a zero-based month.
#[must_use]
pub fn parse_gviz_date(raw: &str) -> Option<NaiveDateTime> {
    let inner = raw.strip_prefix("Date(")?.strip_suffix(')')?;
    let parts: Vec<i64> = inner
        .split(',')
        .map(|p| p.trim().parse::<i64>())
        .collect::<Result<_, _>>()
        .ok()?;
    if parts.len() < 3 {
        return None;
    }
    let field = |idx: usize| parts.get(idx).copied().unwrap_or(0);
    let year = i32::try_from(field(0)).ok()?;
    let month = u32::try_from(field(1) + 1).ok()?;
    let day = u32::try_from(field(2)).ok()?;
    let hour = u32::try_from(field(3)).ok()?;
    let minute = u32::try_from(field(4)).ok()?;
    let second = u32::try_from(field(5)).ok()?;
    let milli = u32::try_from(field(6)).ok()?;
    NaiveDate::from_ymd_opt(year, month, day)?.and_hms_milli_opt(hour, minute, second, milli)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"/*O_o*/
google.visualization.Query.setResponse({"version":"0.6","reqId":"0","status":"ok","sig":"1","table":{"cols":[{"id":"A","label":"Timestamp","type":"datetime"},{"id":"B","label":" Session ID ","type":"string"},{"id":"C","label":"","type":"number"},{"id":"D","label":"Returning","type":"boolean"}],"rows":[{"c":[{"v":"Date(2024,0,31,10,5,7)","f":"31/01/2024 10:05:07"},{"v":"abc"},{"v":3.0},{"v":true}]},{"c":[null,{"v":null},{"v":1.5},null]}],"parsedNumHeaders":1}});"#;

    #[test]
    fn parses_wrapped_response() {
        let table = parse_gviz_response(SAMPLE).expect("sample should parse");
        assert_eq!(table.columns, vec!["Timestamp", "Session ID", "C", "Returning"]);
        assert_eq!(table.rows.len(), 2);
        let expected = NaiveDate::from_ymd_opt(2024, 1, 31)
            .unwrap()
            .and_hms_opt(10, 5, 7)
            .unwrap();
        assert_eq!(table.rows[0][0], Scalar::DateTime(expected));
        assert_eq!(table.rows[0][1], Scalar::from("abc"));
        assert_eq!(table.rows[0][2], Scalar::Number(3.0));
        assert_eq!(table.rows[0][3], Scalar::Bool(true));
        assert_eq!(table.rows[1][0], Scalar::Null);
        assert_eq!(table.rows[1][1], Scalar::Null);
    }

    #[test]
    fn accepts_bare_json() {
        let body = r#"{"status":"ok","table":{"cols":[{"id":"A","label":"x"}],"rows":[]}}"#;
        let table = parse_gviz_response(body).expect("bare json should parse");
        assert_eq!(table.columns, vec!["x"]);
        assert!(table.rows.is_empty());
    }

    #[test]
    fn error_status_surfaces_first_message() {
        let body = r#"google.visualization.Query.setResponse({"status":"error","errors":[{"reason":"access_denied","message":"Access denied","detailed_message":"Sheet is private"}]});"#;
        let err = parse_gviz_response(body).expect_err("error status should fail");
        assert_eq!(
            err,
            FetchError::Remote {
                message: "Access denied".to_string()
            }
        );
    }

    #[test]
    fn garbage_is_malformed() {
        let err = parse_gviz_response("<html>nope</html>").expect_err("should fail");
        assert_eq!(err.kind(), "malformed");
        let err = parse_gviz_response("setResponse({\"status\":").expect_err("should fail");
        assert_eq!(err.kind(), "malformed");
    }

    #[test]
    fn gviz_date_forms() {
        let date_only = parse_gviz_date("Date(2023,11,25)").unwrap();
        assert_eq!(date_only.to_string(), "2023-12-25 00:00:00");
        assert!(parse_gviz_date("Date(2023,12,1)").is_none());
        assert!(parse_gviz_date("Date(x)").is_none());
        assert!(parse_gviz_date("2023-12-25").is_none());
    }

    #[test]
    fn request_url_shape() {
        let source = GvizRowSource::new("https://docs.google.com/", Duration::from_secs(1));
        assert_eq!(
            source.request_url("SHEET", "42"),
            "https://docs.google.com/spreadsheets/d/SHEET/gviz/tq?gid=42&tqx=out:json"
        );
    }
}
