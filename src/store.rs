//! Parsed test records and derived counters
//!
//! The store is only ever rebuilt wholesale from a full `summary.json`
//! payload; views borrow it and never mutate it.

use crate::{Outcome, ReportError, TestRecord};
use serde::Serialize;
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::collections::{HashMap, HashSet};

/// Per-outcome test counts; the four outcome buckets always sum to `total`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub struct Counters {
    pub pass: usize,
    pub fail: usize,
    pub error: usize,
    pub untested: usize,
    #[serde(rename = "total")]
    pub total: usize,
}

impl Counters {
    pub fn get(&self, outcome: Outcome) -> usize {
        match outcome {
            Outcome::Pass => self.pass,
            Outcome::Fail => self.fail,
            Outcome::Error => self.error,
            Outcome::Untested => self.untested,
        }
    }

    fn bump(&mut self, outcome: Outcome) {
        match outcome {
            Outcome::Pass => self.pass += 1,
            Outcome::Fail => self.fail += 1,
            Outcome::Error => self.error += 1,
            Outcome::Untested => self.untested += 1,
        }
        self.total += 1;
    }
}

/// A summary element that was skipped instead of being counted
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Rejection {
    /// Position in the payload array
    pub index: usize,
    pub id: Option<String>,
    pub reason: String,
}

/// Outcome of one ingest
#[derive(Debug, Clone, Default)]
pub struct IngestReport {
    pub accepted: usize,
    pub rejected: Vec<Rejection>,
    /// Payload differs from the previously ingested one
    pub changed: bool,
}

/// Raw wire form of a `summary.json` element
#[derive(Debug, Clone, Default)]
pub struct RawRecord {
    pub id: Option<String>,
    pub outcome: Option<String>,
    pub cause: Option<String>,
    pub fields: Vec<String>,
}

impl RawRecord {
    pub fn new(id: &str, outcome: &str) -> Self {
        Self {
            id: Some(id.to_string()),
            outcome: Some(outcome.to_string()),
            ..Self::default()
        }
    }

    pub fn with_cause(mut self, cause: &str) -> Self {
        self.cause = Some(cause.to_string());
        self
    }

    pub fn with_fields(mut self, fields: &[&str]) -> Self {
        self.fields = fields.iter().map(|f| f.to_string()).collect();
        self
    }

    fn from_value(value: &Value) -> Result<Self, String> {
        let obj = value.as_object().ok_or("element is not an object")?;
        let text = |key: &str| obj.get(key).and_then(Value::as_str).map(str::to_string);
        let fields = match obj.get("fields") {
            None | Some(Value::Null) => Vec::new(),
            Some(Value::Array(items)) => items
                .iter()
                .map(|f| f.as_str().map(str::to_string).ok_or("non-string field name"))
                .collect::<Result<_, _>>()?,
            Some(_) => return Err("`fields` is not an array".to_string()),
        };
        Ok(Self {
            id: text("id"),
            outcome: text("outcome"),
            cause: text("cause"),
            fields,
        })
    }
}

/// Ingested test records in payload order, plus derived counters
#[derive(Debug, Clone, Default)]
pub struct ResultStore {
    records: HashMap<String, TestRecord>,
    all_ids: Vec<String>,
    not_passed_ids: Vec<String>,
    counters: Counters,
    digest: Option<String>,
}

impl ResultStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild the store from raw records. Malformed records are skipped and
    /// reported; the new contents replace the old ones in a single assignment.
    pub fn ingest(&mut self, raw: &[RawRecord]) -> IngestReport {
        let mut next = ResultStore {
            digest: self.digest.clone(),
            ..ResultStore::default()
        };
        let mut rejected = Vec::new();
        let mut seen = HashSet::new();

        for (index, rec) in raw.iter().enumerate() {
            match next.accept(rec, &mut seen) {
                Ok(()) => {}
                Err(reason) => {
                    tracing::warn!(index, id = ?rec.id, %reason, "skipping summary record");
                    rejected.push(Rejection {
                        index,
                        id: rec.id.clone(),
                        reason,
                    });
                }
            }
        }

        let accepted = next.all_ids.len();
        *self = next;
        IngestReport {
            accepted,
            rejected,
            changed: true,
        }
    }

    fn accept(&mut self, rec: &RawRecord, seen: &mut HashSet<String>) -> Result<(), String> {
        let id = rec.id.as_deref().ok_or("missing `id`")?;
        let outcome = rec
            .outcome
            .as_deref()
            .ok_or("missing `outcome`")?
            .parse::<Outcome>()
            .map_err(|e| e.to_string())?;
        if !seen.insert(id.to_string()) {
            return Err(format!("duplicate id `{}`", id));
        }

        let cause = rec.cause.clone().filter(|c| !c.is_empty());
        self.counters.bump(outcome);
        self.all_ids.push(id.to_string());
        if outcome != Outcome::Pass {
            self.not_passed_ids.push(id.to_string());
        }
        self.records.insert(
            id.to_string(),
            TestRecord {
                id: id.to_string(),
                outcome,
                cause,
                fields: rec.fields.clone(),
            },
        );
        Ok(())
    }

    /// Parse and ingest a `summary.json` payload. A document that is not a
    /// JSON array leaves the store untouched.
    pub fn ingest_json(&mut self, payload: &str) -> Result<IngestReport, ReportError> {
        let value: Value = serde_json::from_str(payload).map_err(|source| ReportError::Json {
            document: "summary.json",
            source,
        })?;
        let items = value.as_array().ok_or(ReportError::Shape {
            document: "summary.json",
            expected: "array",
        })?;

        let mut raw = Vec::with_capacity(items.len());
        let mut shape_rejections = Vec::new();
        for (index, item) in items.iter().enumerate() {
            match RawRecord::from_value(item) {
                Ok(rec) => raw.push((index, rec)),
                Err(reason) => shape_rejections.push(Rejection {
                    index,
                    id: item.get("id").and_then(Value::as_str).map(str::to_string),
                    reason,
                }),
            }
        }

        let digest = payload_digest(payload);
        let changed = self.digest.as_deref() != Some(digest.as_str());

        let records: Vec<RawRecord> = raw.iter().map(|(_, r)| r.clone()).collect();
        let mut report = self.ingest(&records);
        // Map positions back to the payload array
        for rejection in &mut report.rejected {
            rejection.index = raw[rejection.index].0;
        }
        report.rejected.extend(shape_rejections);
        report.rejected.sort_by_key(|r| r.index);
        report.changed = changed;
        self.digest = Some(digest);
        Ok(report)
    }

    pub fn get(&self, id: &str) -> Option<&TestRecord> {
        self.records.get(id)
    }

    pub fn all_ids(&self) -> &[String] {
        &self.all_ids
    }

    pub fn not_passed_ids(&self) -> &[String] {
        &self.not_passed_ids
    }

    pub fn counters(&self) -> &Counters {
        &self.counters
    }

    pub fn is_empty(&self) -> bool {
        self.all_ids.is_empty()
    }
}

/// SHA-256 hex digest of a raw payload
fn payload_digest(payload: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(payload.as_bytes());
    hex::encode(hasher.finalize())
}


#[cfg(test)]
mod proptest_tests {
    use super::*;
    use proptest::prelude::*;

    fn outcome_strategy() -> impl Strategy<Value = &'static str> {
        prop_oneof![
            Just("PASS"),
            Just("FAIL"),
            Just("ERROR"),
            Just("UNTESTED"),
            Just("BOGUS"),
        ]
    }

    fn records_strategy() -> impl Strategy<Value = Vec<RawRecord>> {
        prop::collection::vec((0u16..40, outcome_strategy()), 0..60).prop_map(|items| {
            items
                .into_iter()
                .map(|(n, o)| RawRecord::new(&format!("suite.t{}", n), o))
                .collect()
        })
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(200))]

        #[test]
        fn counters_sum_to_total(records in records_strategy()) {
            let mut store = ResultStore::new();
            let report = store.ingest(&records);
            let c = store.counters();
            prop_assert_eq!(c.pass + c.fail + c.error + c.untested, c.total);
            prop_assert_eq!(c.total, store.all_ids().len());
            prop_assert_eq!(report.accepted + report.rejected.len(), records.len());
        }

        #[test]
        fn not_passed_is_ordered_subset(records in records_strategy()) {
            let mut store = ResultStore::new();
            store.ingest(&records);
            let expected: Vec<String> = store
                .all_ids()
                .iter()
                .filter(|id| store.get(id).map(|r| r.outcome) != Some(Outcome::Pass))
                .cloned()
                .collect();
            prop_assert_eq!(store.not_passed_ids(), expected.as_slice());
        }

        #[test]
        fn valid_input_total_matches_length(outcomes in prop::collection::vec(0usize..4, 0..50)) {
            let names = ["PASS", "FAIL", "ERROR", "UNTESTED"];
            let records: Vec<RawRecord> = outcomes
                .iter()
                .enumerate()
                .map(|(i, o)| RawRecord::new(&format!("t{}", i), names[*o]))
                .collect();
            let mut store = ResultStore::new();
            store.ingest(&records);
            prop_assert_eq!(store.counters().total, records.len());
            for (i, name) in names.iter().enumerate() {
                let outcome: Outcome = name.parse().unwrap();
                let expected = outcomes.iter().filter(|o| **o == i).count();
                prop_assert_eq!(store.counters().get(outcome), expected);
            }
        }
    }
}
