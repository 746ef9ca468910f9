//! qmreport: live HTML report viewer for test runs
//!
//! Reads the `summary.json` / `annotations.json` pair written by a test
//! runner, aggregates outcomes, and renders a foldable report page that
//! keeps itself current while the run is still in progress.

pub mod config;
pub mod poll;
pub mod reporter;
pub mod session;
pub mod source;
pub mod store;
pub mod view;

use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Annotation key holding the run start timestamp
pub const START_TIME_KEY: &str = "qmtest.run.start_time";
/// Annotation key holding the run end timestamp (absent or empty while running)
pub const END_TIME_KEY: &str = "qmtest.run.end_time";

/// Result classification of a single test
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Outcome {
    Pass,
    Fail,
    Error,
    Untested,
}

impl Outcome {
    /// Worst-first order used by the summary table
    pub const DISPLAY_ORDER: [Outcome; 4] =
        [Outcome::Fail, Outcome::Error, Outcome::Untested, Outcome::Pass];

    pub fn as_str(self) -> &'static str {
        match self {
            Outcome::Pass => "PASS",
            Outcome::Fail => "FAIL",
            Outcome::Error => "ERROR",
            Outcome::Untested => "UNTESTED",
        }
    }

    /// CSS class suffix for this outcome
    pub fn css_class(self) -> &'static str {
        match self {
            Outcome::Pass => "pass",
            Outcome::Fail => "fail",
            Outcome::Error => "error",
            Outcome::Untested => "untested",
        }
    }
}

impl std::fmt::Display for Outcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Outcome {
    type Err = ReportError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PASS" => Ok(Outcome::Pass),
            "FAIL" => Ok(Outcome::Fail),
            "ERROR" => Ok(Outcome::Error),
            "UNTESTED" => Ok(Outcome::Untested),
            other => Err(ReportError::UnknownOutcome(other.to_string())),
        }
    }
}

/// One test's outcome as ingested from `summary.json`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TestRecord {
    /// Dotted test identifier, stable across a run
    pub id: String,
    pub outcome: Outcome,
    /// Explanatory message for non-PASS outcomes
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cause: Option<String>,
    /// Names of the separately fetched detail documents, in producer order
    pub fields: Vec<String>,
}

/// Address of one field document: `<test id>/<field name>`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FieldKey {
    pub test_id: String,
    pub field: String,
}

impl FieldKey {
    pub fn new(test_id: impl Into<String>, field: impl Into<String>) -> Self {
        Self {
            test_id: test_id.into(),
            field: field.into(),
        }
    }

    /// Relative path of the field document inside the report bundle
    pub fn path(&self) -> String {
        format!("{}/{}", self.test_id, self.field)
    }
}

impl std::fmt::Display for FieldKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.test_id, self.field)
    }
}

/// Errors raised while interpreting report documents
#[derive(Debug, thiserror::Error)]
pub enum ReportError {
    #[error("unknown outcome `{0}`")]
    UnknownOutcome(String),
    #[error("invalid JSON in {document}: {source}")]
    Json {
        document: &'static str,
        #[source]
        source: serde_json::Error,
    },
    #[error("{document} must be a JSON {expected}")]
    Shape {
        document: &'static str,
        expected: &'static str,
    },
    #[error("unsupported report location `{0}` (build with the `http` feature for URLs)")]
    UnsupportedLocation(String),
    #[error(transparent)]
    Fetch(#[from] source::FetchError),
}

/// Escape text for inclusion in HTML element content or attribute values
pub fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}
