//! JSON reporter for machine-readable output

use crate::session::Session;
use crate::store::{Counters, Rejection};
use crate::view::{AnnotationTable, SummaryTable};
use crate::{Outcome, TestRecord};
use serde::Serialize;

/// Reporter for JSON output
pub struct JsonReporter {
    /// Whether to pretty-print JSON
    pretty: bool,
}

impl JsonReporter {
    /// Create a new JSON reporter
    pub fn new() -> Self {
        Self { pretty: false }
    }

    /// Enable pretty-printing
    pub fn pretty(mut self) -> Self {
        self.pretty = true;
        self
    }

    /// Report the session's current summary as a JSON object
    pub fn report(&self, source: &str, session: &Session) -> String {
        let store = session.store();
        let table = SummaryTable::from_store(store);
        let output = JsonOutput {
            source,
            running: session.annotations().map(|a| a.is_running),
            counters: store.counters(),
            percentages: table.rows.iter().map(|r| (r.outcome, r.percent)).collect(),
            not_passed: store
                .not_passed_ids()
                .iter()
                .filter_map(|id| store.get(id))
                .collect(),
            annotations: session.annotations(),
            rejected: session.rejected(),
            errors: session.errors(),
        };

        if self.pretty {
            serde_json::to_string_pretty(&output).unwrap_or_else(|_| "{}".to_string())
        } else {
            serde_json::to_string(&output).unwrap_or_else(|_| "{}".to_string())
        }
    }
}

impl Default for JsonReporter {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct JsonOutput<'a> {
    source: &'a str,
    /// `null` when the annotations document was never read
    running: Option<bool>,
    counters: &'a Counters,
    percentages: Vec<(Outcome, u32)>,
    not_passed: Vec<&'a TestRecord>,
    #[serde(skip_serializing_if = "Option::is_none")]
    annotations: Option<&'a AnnotationTable>,
    rejected: &'a [Rejection],
    errors: Vec<&'a str>,
}
